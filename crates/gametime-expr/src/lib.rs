//! Symbolic expression algebra for the GameTime path analyzer
//!
//! Three layers, leaves first: the fixed [`operator`] vocabulary, the
//! immutable [`expression`] tree with α-aware structural equality, and the
//! [`simplify`] rewriter the rest of the analyzer leans on to keep traced
//! expressions in normal form.

pub mod expression;
pub mod operator;
pub mod simplify;

pub use expression::Expr;
pub use operator::{operators, Arity, Op, OpKind, OperatorStore};
pub use simplify::simplify;
