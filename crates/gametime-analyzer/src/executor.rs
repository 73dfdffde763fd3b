//! Backward symbolic executor
//!
//! Given an SSA operand and the path, produce an expression for the
//! operand's value at its point of use. Dispatch is by operand kind, then by
//! the kind of the defining instruction. Results are memoized per operand —
//! both an optimization and the defense against exponential blow-up on
//! diamond-shaped IR.
//!
//! Traced expressions carry *unversioned* variable names; the path analyzer
//! applies the per-block assignment versions afterwards through
//! `update_expression`.

use crate::error::{AnalyzerError, AnalyzerWarning, Result};
use crate::memory::get_augend_and_addend;
use crate::path::Path;
use gametime_expr::{simplify, Expr, Op};
use gametime_ir::{CmpKind, CType, InstrId, InstrKind, OperandId, OperandKind, ValueOp};
use tracing::{debug, warn};

impl<'u> Path<'u> {
    /// Trace `op_id` backwards to an expression.
    ///
    /// In the normal mode a non-temporary operand short-circuits to a
    /// variable leaf — its assignments are recorded as path conditions, so a
    /// use is just the (versioned) name. The complete mode is invoked by the
    /// path analyzer on the destination of an assignment: the short-circuit
    /// is suppressed so the trace expands through the defining instruction
    /// and yields the right-hand side.
    pub fn trace_operand(&mut self, op_id: OperandId, complete: bool) -> Result<Expr> {
        if !complete {
            if let Some(e) = self.memo.get(&op_id) {
                return Ok(e.clone());
            }
        }
        let result = self.trace_uncached(op_id, complete)?;
        if !complete {
            self.memo.insert(op_id, result.clone());
        }
        Ok(result)
    }

    fn trace_uncached(&mut self, op_id: OperandId, complete: bool) -> Result<Expr> {
        let unit = self.unit;
        let data = unit.operand(op_id);
        match &data.kind {
            OperandKind::IntImmediate(v) => {
                Ok(Expr::constant(*v, data.bits()).with_type(data.ty.clone()))
            }
            OperandKind::FloatImmediate(f) => {
                // Floats are coerced to integers at ingest; the analyzer
                // never emits floating-point terms.
                let truncated = *f as i128;
                warn!(original = *f, truncated, "float immediate truncated to integer");
                self.warnings.push(AnalyzerWarning::FloatTruncated {
                    original: *f,
                    truncated,
                });
                Ok(Expr::constant(truncated, data.bits()).with_type(data.ty.clone()))
            }
            OperandKind::Memory { base, bit_offset } => {
                self.trace_memory(op_id, *base, *bit_offset)
            }
            OperandKind::Variable { .. } => {
                if data.is_address_of {
                    return self.trace_address_of(op_id);
                }
                let def = data.def.filter(|&d| self.on_path(unit.instr(d).block));
                if !complete && !data.is_temporary {
                    return Ok(self.make_leaf(op_id));
                }
                let Some(def_id) = def else {
                    // Defined outside the path, or not at all: a fresh
                    // symbolic input.
                    return Ok(self.make_leaf(op_id));
                };
                let instr = unit.instr(def_id);
                match &instr.kind {
                    InstrKind::Start | InstrKind::Chi => Ok(self.make_leaf(op_id)),
                    InstrKind::Call { callee } => {
                        Ok(self.make_efc_leaf(op_id, callee, instr.line))
                    }
                    InstrKind::Compare(kind) => self.trace_compare(def_id, *kind),
                    InstrKind::Value(vop) => self.trace_value(def_id, *vop, op_id),
                    InstrKind::Phi => self.trace_phi(def_id),
                    other => Err(AnalyzerError::UnknownOpcode(format!(
                        "operand defined by {other:?}"
                    ))),
                }
            }
        }
    }

    // ---- leaves ----

    /// Fresh `Variable`/`ArrayVariable` leaf for an operand, registered in
    /// the path's variable sets. Aggregate-typed leaves are word-wide: an
    /// aggregate only ever serves as an index carrier.
    pub(crate) fn make_leaf(&mut self, op_id: OperandId) -> Expr {
        let data = self.unit.operand(op_id);
        let name = demangle(data.name().unwrap_or_default()).to_string();
        let bits = if data.ty.is_aggregate() {
            self.config.word_bits
        } else {
            data.bits()
        };
        let leaf = if data.ty.is_pointer() || data.ty.is_unmanaged_array() {
            Expr::array_variable(name, bits)
        } else {
            Expr::variable(name, bits)
        }
        .with_type(data.ty.clone());
        self.register_leaf(&leaf);
        leaf
    }

    /// One distinct symbolic value per textual call site.
    fn make_efc_leaf(&mut self, op_id: OperandId, callee: &str, line: u32) -> Expr {
        let data = self.unit.operand(op_id);
        let name = format!("{}{}@{}", self.config.ident_efc, demangle(callee), line);
        debug!(%name, "external function call value");
        let leaf = Expr::variable(name, data.bits()).with_type(data.ty.clone());
        self.register_leaf(&leaf);
        leaf
    }

    pub(crate) fn register_leaf(&mut self, leaf: &Expr) {
        match leaf.op() {
            Op::ArrayVariable => {
                if !self.array_variables.contains(leaf) {
                    self.array_variables.push(leaf.clone());
                }
            }
            Op::Variable => {
                if !self.variables.contains(leaf) {
                    self.variables.push(leaf.clone());
                }
            }
            _ => {}
        }
    }

    // ---- defining-instruction dispatch ----

    fn trace_compare(&mut self, instr_id: InstrId, kind: CmpKind) -> Result<Expr> {
        let unit = self.unit;
        let instr = unit.instr(instr_id);
        let (&a_id, &b_id) = match (instr.srcs.first(), instr.srcs.get(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(AnalyzerError::MalformedIr(
                    "compare instruction with fewer than two sources".to_string(),
                ))
            }
        };
        let a_ty = unit.operand(a_id).ty.clone();
        let b_ty = unit.operand(b_id).ty.clone();
        let a = self.trace_operand(a_id, false)?;
        let b = self.trace_operand(b_id, false)?;
        let op = comparison_op(kind, &a_ty, &b_ty);
        let mut cmp = Expr::compare(op, a, b, self.config.word_bits);
        // When the compare directly feeds a conditional branch and the path
        // takes the false edge, the condition is negated here.
        if let Some(next_id) = unit.next_in_block(instr_id) {
            let next = unit.instr(next_id);
            if matches!(next.kind, InstrKind::Branch) {
                let succs = &unit.block(next.block).succs;
                if succs.len() == 2 {
                    if let Some(taken) = self.successor_on_path(next.block) {
                        if taken == succs[1] && taken != succs[0] {
                            cmp = Expr::not(cmp);
                        }
                    }
                }
            }
        }
        Ok(cmp)
    }

    fn trace_value(&mut self, instr_id: InstrId, vop: ValueOp, dst_id: OperandId) -> Result<Expr> {
        let unit = self.unit;
        let instr = unit.instr(instr_id);
        let dst_data = unit.operand(dst_id);
        let dst_ty = dst_data.ty.clone();
        let dst_bits = dst_data.bits();
        let src_at = |i: usize| -> Result<OperandId> {
            instr.srcs.get(i).copied().ok_or_else(|| {
                AnalyzerError::MalformedIr(format!(
                    "value instruction is missing source operand {i}"
                ))
            })
        };
        match vop {
            ValueOp::Assign => self.trace_operand(src_at(0)?, false),
            ValueOp::Add | ValueOp::Sub if dst_ty.is_pointer() => {
                self.trace_pointer_arith(instr_id, vop, dst_id)
            }
            ValueOp::Add
            | ValueOp::Sub
            | ValueOp::Mul
            | ValueOp::Div
            | ValueOp::Rem
            | ValueOp::BitAnd
            | ValueOp::BitOr
            | ValueOp::BitXor
            | ValueOp::Shl
            | ValueOp::Shr => {
                let a_id = src_at(0)?;
                let b_id = src_at(1)?;
                let a_ty = unit.operand(a_id).ty.clone();
                let b_ty = unit.operand(b_id).ty.clone();
                let a = self.trace_operand(a_id, false)?;
                let b = self.trace_operand(b_id, false)?;
                let op = binary_op(vop, &a_ty, &b_ty);
                Ok(simplify(&Expr::binary(op, a, b)).with_type(dst_ty))
            }
            ValueOp::Neg => {
                let a = self.trace_operand(src_at(0)?, false)?;
                Ok(simplify(&Expr::unary(Op::Negate, a)).with_type(dst_ty))
            }
            ValueOp::BitNot => {
                let a = self.trace_operand(src_at(0)?, false)?;
                Ok(Expr::unary(Op::BitComplement, a).with_type(dst_ty))
            }
            ValueOp::LogicalNot => {
                // !x lowers to ite(x = 0, 1, 0) at the destination width.
                let a = self.trace_operand(src_at(0)?, false)?;
                let zero = Expr::constant(0, a.bits());
                let test = Expr::eq(a, zero, self.config.word_bits);
                Ok(Expr::ite(
                    test,
                    Expr::constant(1, dst_bits),
                    Expr::constant(0, dst_bits),
                )
                .with_type(dst_ty))
            }
            ValueOp::Convert => {
                let src_id = src_at(0)?;
                let src_ty = unit.operand(src_id).ty.clone();
                let e = self.trace_operand(src_id, false)?;
                if src_ty.is_pointer() && dst_ty.is_pointer() {
                    // A pointer-to-pointer conversion keeps the source
                    // expression and its type.
                    return Ok(e);
                }
                let signed = !src_ty.is_unsigned();
                Ok(adjust_bit_size(e, signed, dst_bits).with_type(dst_ty))
            }
            ValueOp::Subscript => self.trace_subscript(instr_id, dst_id),
        }
    }

    /// Pointer-typed `p ± n`: split into (base, offset), scale the offset by
    /// the referent's element width, and push it into the dereferencing
    /// function.
    fn trace_pointer_arith(
        &mut self,
        instr_id: InstrId,
        vop: ValueOp,
        dst_id: OperandId,
    ) -> Result<Expr> {
        let unit = self.unit;
        let instr = unit.instr(instr_id);
        let (&a_id, &b_id) = match (instr.srcs.first(), instr.srcs.get(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(AnalyzerError::MalformedIr(
                    "pointer arithmetic with fewer than two sources".to_string(),
                ))
            }
        };
        let dst_ty = unit.operand(dst_id).ty.clone();
        let a = self.trace_operand(a_id, false)?;
        let b = self.trace_operand(b_id, false)?;
        let composed = Expr::binary(
            if vop == ValueOp::Add { Op::Add } else { Op::Sub },
            a,
            b,
        );
        let (augend, addend) = get_augend_and_addend(&composed);
        // The alias table is consulted only when the first source was a
        // non-temporary operand.
        let lookup_alias = !unit.operand(a_id).is_temporary;
        let f = self.pointer_function_for(&augend, lookup_alias);
        let elem_bits = self.referent_bits(&augend).unwrap_or_else(|| {
            dst_ty
                .referent()
                .map(|t| t.bit_size())
                .unwrap_or(self.config.word_bits)
        });
        let scale = if vop == ValueOp::Add {
            elem_bits as i128
        } else {
            -(elem_bits as i128)
        };
        let delta = simplify(&Expr::mul(
            addend.clone(),
            Expr::constant(scale, addend.bits()),
        ));
        let offset = self.add_offset_to_pointer(&f, &delta, elem_bits);
        Ok(offset.with_type(dst_ty))
    }

    /// One level of `p[i]`: build the dereferencing function (through the
    /// alias table), apply it with the traced index, and resolve the result.
    fn trace_subscript(&mut self, instr_id: InstrId, dst_id: OperandId) -> Result<Expr> {
        let unit = self.unit;
        let instr = unit.instr(instr_id);
        let (&arr_id, &idx_id) = match (instr.srcs.first(), instr.srcs.get(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(AnalyzerError::MalformedIr(
                    "subscript with fewer than two sources".to_string(),
                ))
            }
        };
        let access_bits = unit.operand(dst_id).bits();
        let base = self.trace_operand(arr_id, false)?;
        let f = self.pointer_function_for(&base, true);
        let idx = self.trace_operand(idx_id, false)?;
        let zero = Expr::constant(0, self.config.word_bits);
        let applied = simplify(&f.apply(&[idx, zero]));
        self.resolve_offsets(&applied, true, access_bits)
    }

    /// `*p` or `p->f`: trace the base pointer, push the field displacement
    /// into the dereferencing function, and dereference.
    fn trace_memory(&mut self, op_id: OperandId, base_id: OperandId, bit_offset: u64) -> Result<Expr> {
        let unit = self.unit;
        let data = unit.operand(op_id);
        let access_bits = data.bits();
        let access_ty = data.ty.clone();
        let base_ty = unit.operand(base_id).ty.clone();
        // When the access and the traced pointer's referent are the same
        // aggregate, this is aggregate aliasing: skip the field
        // decomposition.
        let resolve_fields = !(access_ty.is_aggregate()
            && base_ty.referent().is_some_and(|r| *r == access_ty));
        let base = self.trace_operand(base_id, false)?;
        let mut f = self.pointer_function_for(&base, true);
        if bit_offset > 0 {
            let referent_bits = base_ty
                .referent()
                .map(|t| t.bit_size().max(1))
                .unwrap_or(access_bits);
            let delta = Expr::constant(bit_offset as i128, self.config.word_bits);
            f = self.add_offset_to_pointer(&f, &delta, referent_bits);
        }
        self.dereference(&f, resolve_fields, access_bits)
    }

    fn trace_phi(&mut self, instr_id: InstrId) -> Result<Expr> {
        let instr = self.unit.instr(instr_id);
        // Among the phi's sources, take the one whose defining block lies on
        // the path and comes latest in path order.
        let mut best: Option<(usize, OperandId)> = None;
        for &(src, block) in &instr.phi_sources {
            if let Some(pos) = self.path_position(block) {
                if best.map_or(true, |(bp, _)| pos > bp) {
                    best = Some((pos, src));
                }
            }
        }
        let (_, chosen) = best.ok_or_else(|| {
            AnalyzerError::MalformedIr("phi instruction with no source block on the path".to_string())
        })?;
        self.trace_operand(chosen, false)
    }

    pub(crate) fn referent_bits(&self, e: &Expr) -> Option<u32> {
        let elem = e.ty().and_then(|t| t.element())?;
        Some(if elem.is_aggregate() {
            self.config.word_bits
        } else {
            elem.bit_size()
        })
    }
}

/// Strip one linker-style mangling sigil from the front of a name.
pub(crate) fn demangle(name: &str) -> &str {
    name.strip_prefix(['$', '@', '?'])
        .unwrap_or(name)
}

/// Comparison operator variant from the operand types: float beats
/// unsigned, unsigned requires both sides unsigned.
fn comparison_op(kind: CmpKind, a: &CType, b: &CType) -> Op {
    let float = a.is_float() || b.is_float();
    let unsigned = a.is_unsigned() && b.is_unsigned();
    match kind {
        CmpKind::Lt => {
            if float {
                Op::FLt
            } else if unsigned {
                Op::ULt
            } else {
                Op::SLt
            }
        }
        CmpKind::Le => {
            if float {
                Op::FLe
            } else if unsigned {
                Op::ULe
            } else {
                Op::SLe
            }
        }
        CmpKind::Gt => {
            if float {
                Op::FGt
            } else if unsigned {
                Op::UGt
            } else {
                Op::SGt
            }
        }
        CmpKind::Ge => {
            if float {
                Op::FGe
            } else if unsigned {
                Op::UGe
            } else {
                Op::SGe
            }
        }
        CmpKind::Eq => Op::Eq,
        CmpKind::Ne => Op::Ne,
    }
}

/// Binary operator from a value opcode and the source types. Division is
/// unsigned only when both operands are; shift-right is logical iff the
/// first operand is unsigned.
fn binary_op(vop: ValueOp, a: &CType, b: &CType) -> Op {
    match vop {
        ValueOp::Add => Op::Add,
        ValueOp::Sub => Op::Sub,
        ValueOp::Mul => Op::Mul,
        ValueOp::Div => {
            if a.is_unsigned() && b.is_unsigned() {
                Op::UDiv
            } else {
                Op::SDiv
            }
        }
        ValueOp::Rem => Op::Rem,
        ValueOp::BitAnd => Op::BitAnd,
        ValueOp::BitOr => Op::BitOr,
        ValueOp::BitXor => Op::BitXor,
        ValueOp::Shl => Op::Shl,
        ValueOp::Shr => {
            if a.is_unsigned() {
                Op::LShr
            } else {
                Op::AShr
            }
        }
        _ => unreachable!("binary_op on non-binary value opcode"),
    }
}

/// Sign- or zero-extend, or extract, to reach `target` bits. Constants are
/// re-made at the target width directly.
pub(crate) fn adjust_bit_size(e: Expr, signed: bool, target: u32) -> Expr {
    if e.bits() == target {
        return e;
    }
    if let Some(v) = e.const_value() {
        return Expr::constant(v, target);
    }
    if e.bits() < target {
        let count = target - e.bits();
        if signed {
            Expr::sign_extend(e, count)
        } else {
            Expr::zero_extend(e, count)
        }
    } else {
        Expr::bit_extract(e, 0, target - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demangle_strips_one_sigil() {
        assert_eq!(demangle("$x"), "x");
        assert_eq!(demangle("@foo"), "foo");
        assert_eq!(demangle("plain"), "plain");
        assert_eq!(demangle("_leading"), "_leading");
    }

    #[test]
    fn adjust_bit_size_extends_and_extracts() {
        let x = Expr::variable("x", 16);
        let widened = adjust_bit_size(x.clone(), true, 32);
        assert_eq!(widened.op(), Op::SignExtend);
        assert_eq!(widened.bits(), 32);
        let widened = adjust_bit_size(x.clone(), false, 32);
        assert_eq!(widened.op(), Op::ZeroExtend);
        let narrowed = adjust_bit_size(Expr::variable("y", 32), true, 8);
        assert_eq!(narrowed.op(), Op::BitExtract);
        assert_eq!(narrowed.bits(), 8);
        // Same width passes through; constants are re-made directly.
        assert_eq!(adjust_bit_size(x.clone(), true, 16), x);
        assert_eq!(
            adjust_bit_size(Expr::constant(-2, 16), true, 32),
            Expr::constant(-2, 32)
        );
    }

    #[test]
    fn comparison_variants_follow_operand_types() {
        let s = CType::int(32);
        let u = CType::uint(32);
        let f = CType::float(32);
        assert_eq!(comparison_op(CmpKind::Lt, &s, &s), Op::SLt);
        assert_eq!(comparison_op(CmpKind::Lt, &u, &u), Op::ULt);
        // Mixed signedness stays signed.
        assert_eq!(comparison_op(CmpKind::Lt, &u, &s), Op::SLt);
        assert_eq!(comparison_op(CmpKind::Ge, &f, &s), Op::FGe);
        assert_eq!(comparison_op(CmpKind::Eq, &u, &u), Op::Eq);
    }

    #[test]
    fn shift_right_follows_first_operand() {
        let s = CType::int(32);
        let u = CType::uint(32);
        assert_eq!(binary_op(ValueOp::Shr, &u, &s), Op::LShr);
        assert_eq!(binary_op(ValueOp::Shr, &s, &u), Op::AShr);
        assert_eq!(binary_op(ValueOp::Div, &u, &u), Op::UDiv);
        assert_eq!(binary_op(ValueOp::Div, &u, &s), Op::SDiv);
    }
}
