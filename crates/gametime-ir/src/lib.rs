//! SSA intermediate representation consumed by the path analyzer
//!
//! The analyzer never owns IR nodes: an IR producer (a C frontend, or a test
//! harness) populates a [`FunctionUnit`] arena and the analyzer reads it
//! through opaque ids and accessor methods. The contract is deliberately
//! narrow — opcode kind and subkind, ordered source/destination operands,
//! per-operand type metadata, SSA definition links, and phi source pairs.
//!
//! Conventions baked into the contract:
//!
//! - Every operand has at most one defining instruction (static single
//!   assignment); the defining instruction of a destination operand is the
//!   instruction that writes it.
//! - Conditional branches order their successors as `[true_edge, false_edge]`.
//! - Field offsets on memory operands are bit offsets.
//! - Pointer-arithmetic addends count elements of the pointer's referent.

mod builder;
mod ctype;
mod unit;

pub use builder::FunctionUnitBuilder;
pub use ctype::{AggregateType, CType, Field};
pub use unit::{
    BlockData, BlockId, CmpKind, FunctionUnit, InstrData, InstrId, InstrKind, OperandData,
    OperandId, OperandKind, ValueOp,
};
