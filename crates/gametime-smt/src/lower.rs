//! QF_AUFBV serialization
//!
//! Produces an SMT-LIB v2 query from a finished path. Every condition `c_k`
//! is bound to a fresh boolean constant and asserted equal to it, the
//! conjunction of the booleans is asserted, and the query closes with
//! `(check-sat)` and `(exit)` — the structure the caller needs for
//! unsat-core extraction.
//!
//! Operator mapping:
//!
//! | Expression | SMT-LIB |
//! |---|---|
//! | `Add`/`Sub`/`Mul` | `bvadd`/`bvsub`/`bvmul` |
//! | `SDiv`/`UDiv`/`Rem` | `bvsdiv`/`bvudiv`/`bvsmod` |
//! | `Shl`/`AShr`/`LShr` | `bvshl`/`bvashr`/`bvlshr` |
//! | `BitAnd`/`BitOr`/`BitXor` | `bvand`/`bvor`/`bvxor` |
//! | `BitComplement`/`Negate` | `bvnot`/`bvneg` |
//! | comparisons | `bvslt`…/`bvult`… by variant |
//! | `Concat` | `concat` |
//! | `ZeroExtend`/`SignExtend`/`BitExtract` | `(_ zero_extend k)` / `(_ sign_extend k)` / `(_ extract hi lo)` |
//! | `Select`/`Store`/`Ite` | `select`/`store`/`ite` |
//!
//! Boolean sub-terms in bitvector contexts are lifted with
//! `ite(b, (_ bv1 W), (_ bv0 W))`; equalities with a boolean side apply the
//! lift to both sides uniformly. The remainder operator lowers to `bvsmod`
//! even for unsigned operands, mirroring the analyzed source.

use crate::{LowerError, Query};
use gametime_analyzer::{original_name, AnalyzerConfig, ArrayModel, Path};
use gametime_expr::{Expr, Op};
use std::fmt::Write as _;

/// Serialize a finished path to a QF_AUFBV query.
pub fn lower_path(path: &Path) -> Result<Query, LowerError> {
    let config = path.config();
    let mut out = String::new();
    out.push_str("(set-logic QF_AUFBV)\n");

    for (name, sort) in declarations(path)? {
        let _ = writeln!(out, "(declare-fun {name} () {sort})");
    }

    for (k, cond) in path.conditions.iter().enumerate() {
        let name = format!("{}{}", config.ident_constraint, k);
        let body = emit(&cond.expr, Ctx::Bool, config)?;
        let _ = writeln!(out, "(declare-fun {name} () Bool)");
        let _ = writeln!(out, "(assert (= {name} {body}))");
    }

    let conjuncts: Vec<String> = (0..path.conditions.len())
        .map(|k| format!("{}{}", config.ident_constraint, k))
        .collect();
    let _ = writeln!(out, "(assert (and {}))", conjuncts.join(" "));
    out.push_str("(check-sat)\n(exit)\n");

    Ok(Query::new(
        out,
        path.conditions.len(),
        config.ident_constraint.clone(),
    ))
}

/// Free variable declarations, in first-occurrence order across the
/// conditions. Scalars declare as bitvectors of their width; array
/// variables declare with the sort derived from their dimension list, in
/// the configured modelling mode.
fn declarations(path: &Path) -> Result<Vec<(String, String)>, LowerError> {
    let config = path.config();
    let mut leaves: Vec<Expr> = Vec::new();
    for cond in &path.conditions {
        cond.expr.collect_leaves(&mut leaves);
    }
    let mut decls = Vec::new();
    for leaf in leaves {
        let name = leaf.value().unwrap_or_default().to_string();
        let sort = match leaf.op() {
            Op::ArrayVariable => {
                let dims = path
                    .array_dimensions
                    .get(original_name(&name))
                    .cloned()
                    .unwrap_or_else(|| vec![config.word_bits, leaf.bits()]);
                array_sort(&dims, config.array_model)
            }
            _ => format!("(_ BitVec {})", leaf.bits()),
        };
        decls.push((name, sort));
    }
    Ok(decls)
}

/// `(Array idx (Array idx elem))` nesting, or a single array over the
/// concatenated index in flat mode. The last dimension is the element
/// width.
fn array_sort(dims: &[u32], model: ArrayModel) -> String {
    let (elem, indices) = match dims.split_last() {
        Some((elem, indices)) if !indices.is_empty() => (*elem, indices),
        _ => return format!("(_ BitVec {})", dims.first().copied().unwrap_or(32)),
    };
    match model {
        ArrayModel::Nested => {
            let mut sort = format!("(_ BitVec {elem})");
            for idx in indices.iter().rev() {
                sort = format!("(Array (_ BitVec {idx}) {sort})");
            }
            sort
        }
        ArrayModel::Flat => {
            let total: u32 = indices.iter().sum();
            format!("(Array (_ BitVec {total}) (_ BitVec {elem}))")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Bool,
    Bv,
}

fn is_boolean(e: &Expr) -> bool {
    e.op().is_boolean()
}

fn emit(e: &Expr, ctx: Ctx, config: &AnalyzerConfig) -> Result<String, LowerError> {
    if is_boolean(e) {
        let b = emit_bool(e, config)?;
        return Ok(match ctx {
            Ctx::Bool => b,
            Ctx::Bv => lift(&b, e.bits()),
        });
    }
    let t = emit_bv(e, config)?;
    Ok(match ctx {
        Ctx::Bv => t,
        // A bitvector where a truth value is expected reads as "non-zero".
        Ctx::Bool => format!("(not (= {t} (_ bv0 {})))", e.bits()),
    })
}

fn lift(b: &str, bits: u32) -> String {
    format!("(ite {b} (_ bv1 {bits}) (_ bv0 {bits}))")
}

fn emit_bool(e: &Expr, config: &AnalyzerConfig) -> Result<String, LowerError> {
    match e.op() {
        Op::True => Ok("true".to_string()),
        Op::False => Ok("false".to_string()),
        Op::Not => Ok(format!(
            "(not {})",
            emit(e.get_parameter(0), Ctx::Bool, config)?
        )),
        Op::And | Op::Or | Op::Implies => {
            let name = match e.op() {
                Op::And => "and",
                Op::Or => "or",
                _ => "=>",
            };
            Ok(format!(
                "({} {} {})",
                name,
                emit(e.get_parameter(0), Ctx::Bool, config)?,
                emit(e.get_parameter(1), Ctx::Bool, config)?
            ))
        }
        Op::Iff => Ok(format!(
            "(= {} {})",
            emit(e.get_parameter(0), Ctx::Bool, config)?,
            emit(e.get_parameter(1), Ctx::Bool, config)?
        )),
        Op::Eq | Op::Ne => {
            // Both sides go through the bitvector context, which lifts any
            // boolean side uniformly and leaves plain bitvectors alone.
            let lhs = emit(e.get_parameter(0), Ctx::Bv, config)?;
            let rhs = emit(e.get_parameter(1), Ctx::Bv, config)?;
            let eq = format!("(= {lhs} {rhs})");
            Ok(if e.op() == Op::Ne {
                format!("(not {eq})")
            } else {
                eq
            })
        }
        Op::SLt | Op::SLe | Op::SGt | Op::SGe | Op::ULt | Op::ULe | Op::UGt | Op::UGe
        | Op::FLt | Op::FLe | Op::FGt | Op::FGe => {
            // Float comparisons lower as signed: floats were coerced to
            // integers at ingest.
            let name = match e.op() {
                Op::SLt | Op::FLt => "bvslt",
                Op::SLe | Op::FLe => "bvsle",
                Op::SGt | Op::FGt => "bvsgt",
                Op::SGe | Op::FGe => "bvsge",
                Op::ULt => "bvult",
                Op::ULe => "bvule",
                Op::UGt => "bvugt",
                Op::UGe => "bvuge",
                _ => unreachable!(),
            };
            Ok(format!(
                "({} {} {})",
                name,
                emit(e.get_parameter(0), Ctx::Bv, config)?,
                emit(e.get_parameter(1), Ctx::Bv, config)?
            ))
        }
        other => Err(LowerError::UnsupportedOperator(other.symbol().to_string())),
    }
}

fn emit_bv(e: &Expr, config: &AnalyzerConfig) -> Result<String, LowerError> {
    match e.op() {
        Op::Constant => {
            let v = e.const_value().ok_or_else(|| {
                LowerError::MalformedExpression("constant without a numeric value".to_string())
            })?;
            Ok(bv_literal(v, e.bits()))
        }
        Op::Variable | Op::ArrayVariable => Ok(e.value().unwrap_or_default().to_string()),
        Op::Add | Op::Sub | Op::Mul | Op::SDiv | Op::UDiv | Op::Rem | Op::BitAnd | Op::BitOr
        | Op::BitXor | Op::Shl | Op::AShr | Op::LShr | Op::Concat => {
            let name = match e.op() {
                Op::Add => "bvadd",
                Op::Sub => "bvsub",
                Op::Mul => "bvmul",
                Op::SDiv => "bvsdiv",
                Op::UDiv => "bvudiv",
                Op::Rem => "bvsmod",
                Op::BitAnd => "bvand",
                Op::BitOr => "bvor",
                Op::BitXor => "bvxor",
                Op::Shl => "bvshl",
                Op::AShr => "bvashr",
                Op::LShr => "bvlshr",
                Op::Concat => "concat",
                _ => unreachable!(),
            };
            Ok(format!(
                "({} {} {})",
                name,
                emit(e.get_parameter(0), Ctx::Bv, config)?,
                emit(e.get_parameter(1), Ctx::Bv, config)?
            ))
        }
        Op::Negate => Ok(format!(
            "(bvneg {})",
            emit(e.get_parameter(0), Ctx::Bv, config)?
        )),
        Op::BitComplement => Ok(format!(
            "(bvnot {})",
            emit(e.get_parameter(0), Ctx::Bv, config)?
        )),
        Op::ZeroExtend | Op::SignExtend => {
            let count = e.get_parameter(1).const_value().unwrap_or(0);
            let name = if e.op() == Op::ZeroExtend {
                "zero_extend"
            } else {
                "sign_extend"
            };
            Ok(format!(
                "((_ {} {}) {})",
                name,
                count,
                emit(e.get_parameter(0), Ctx::Bv, config)?
            ))
        }
        Op::BitExtract => {
            let lo = e.get_parameter(1).const_value().unwrap_or(0);
            let hi = e.get_parameter(2).const_value().unwrap_or(0);
            Ok(format!(
                "((_ extract {} {}) {})",
                hi,
                lo,
                emit(e.get_parameter(0), Ctx::Bv, config)?
            ))
        }
        Op::Ite => Ok(format!(
            "(ite {} {} {})",
            emit(e.get_parameter(0), Ctx::Bool, config)?,
            emit(e.get_parameter(1), Ctx::Bv, config)?,
            emit(e.get_parameter(2), Ctx::Bv, config)?
        )),
        Op::Select => match config.array_model {
            ArrayModel::Nested => Ok(format!(
                "(select {} {})",
                emit(e.get_parameter(0), Ctx::Bv, config)?,
                emit(e.get_parameter(1), Ctx::Bv, config)?
            )),
            ArrayModel::Flat => {
                let (base, indices) = select_chain(e);
                let idx = concat_indices(&indices, config)?;
                Ok(format!("(select {} {})", emit(&base, Ctx::Bv, config)?, idx))
            }
        },
        Op::Store => emit_store(e, config),
        other => Err(LowerError::UnsupportedOperator(other.symbol().to_string())),
    }
}

fn emit_store(e: &Expr, config: &AnalyzerConfig) -> Result<String, LowerError> {
    match config.array_model {
        ArrayModel::Nested => Ok(format!(
            "(store {} {} {})",
            emit(e.get_parameter(0), Ctx::Bv, config)?,
            emit(e.get_parameter(1), Ctx::Bv, config)?,
            emit(e.get_parameter(2), Ctx::Bv, config)?
        )),
        ArrayModel::Flat => {
            // A nested store rebuilt from `store(a, i, store(select(a, i),
            // j, v))` collapses to one store over the concatenated index.
            let (array, indices, value) = flatten_store(e)?;
            let idx = concat_indices(&indices, config)?;
            Ok(format!(
                "(store {} {} {})",
                emit(&array, Ctx::Bv, config)?,
                idx,
                emit(&value, Ctx::Bv, config)?
            ))
        }
    }
}

/// Outermost-first index chain of nested selects.
fn select_chain(e: &Expr) -> (Expr, Vec<Expr>) {
    let mut indices = Vec::new();
    let mut cur = e.clone();
    while cur.op() == Op::Select {
        indices.push(cur.get_parameter(1).clone());
        let next = cur.get_parameter(0).clone();
        cur = next;
    }
    indices.reverse();
    (cur, indices)
}

fn flatten_store(e: &Expr) -> Result<(Expr, Vec<Expr>, Expr), LowerError> {
    // Walk to the innermost store; its array operand's select chain already
    // carries every outer index.
    let value = e.get_parameter(2);
    if value.op() == Op::Store && value.get_parameter(0).op() == Op::Select {
        return flatten_store(value);
    }
    let (base, mut indices) = select_chain(e.get_parameter(0));
    if !matches!(base.op(), Op::ArrayVariable | Op::Variable) {
        return Err(LowerError::MalformedExpression(
            "store whose base is not an array variable".to_string(),
        ));
    }
    indices.push(e.get_parameter(1).clone());
    Ok((base, indices, value.clone()))
}

fn concat_indices(indices: &[Expr], config: &AnalyzerConfig) -> Result<String, LowerError> {
    let mut parts = Vec::with_capacity(indices.len());
    for idx in indices {
        parts.push(emit(idx, Ctx::Bv, config)?);
    }
    let mut iter = parts.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| LowerError::MalformedExpression("array access with no index".to_string()))?;
    Ok(iter.fold(first, |acc, next| format!("(concat {acc} {next})")))
}

/// `(_ bvN W)` for non-negative constants, `(bvneg (_ bvN W))` for
/// negatives.
pub(crate) fn bv_literal(value: i128, bits: u32) -> String {
    if value >= 0 {
        format!("(_ bv{value} {bits})")
    } else {
        format!("(bvneg (_ bv{} {bits}))", -value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bv_literals() {
        assert_eq!(bv_literal(4, 32), "(_ bv4 32)");
        assert_eq!(bv_literal(-3, 16), "(bvneg (_ bv3 16))");
        assert_eq!(bv_literal(0, 8), "(_ bv0 8)");
    }

    #[test]
    fn array_sorts() {
        assert_eq!(
            array_sort(&[32, 32], ArrayModel::Nested),
            "(Array (_ BitVec 32) (_ BitVec 32))"
        );
        assert_eq!(
            array_sort(&[32, 16, 8], ArrayModel::Nested),
            "(Array (_ BitVec 32) (Array (_ BitVec 16) (_ BitVec 8)))"
        );
        assert_eq!(
            array_sort(&[32, 16, 8], ArrayModel::Flat),
            "(Array (_ BitVec 48) (_ BitVec 8))"
        );
    }

    #[test]
    fn comparison_emission() {
        let config = AnalyzerConfig::default();
        let e = Expr::compare(
            Op::ULt,
            Expr::variable("x", 32),
            Expr::constant(5, 32),
            32,
        );
        assert_eq!(
            emit(&e, Ctx::Bool, &config).unwrap(),
            "(bvult x (_ bv5 32))"
        );
        // Lifted when embedded in a bitvector context.
        assert_eq!(
            emit(&e, Ctx::Bv, &config).unwrap(),
            "(ite (bvult x (_ bv5 32)) (_ bv1 32) (_ bv0 32))"
        );
    }

    #[test]
    fn equality_lifts_boolean_side() {
        let config = AnalyzerConfig::default();
        let cmp = Expr::compare(
            Op::SLt,
            Expr::variable("x", 32),
            Expr::constant(0, 32),
            32,
        );
        let e = Expr::eq(cmp, Expr::variable("y", 32), 32);
        let lowered = emit(&e, Ctx::Bool, &config).unwrap();
        assert_eq!(
            lowered,
            "(= (ite (bvslt x (_ bv0 32)) (_ bv1 32) (_ bv0 32)) y)"
        );
    }

    #[test]
    fn flat_select_concatenates() {
        let config = AnalyzerConfig::builder()
            .array_model(ArrayModel::Flat)
            .build();
        let a = Expr::array_variable("a", 64);
        let inner = Expr::select(a, Expr::variable("i", 32), 32);
        let outer = Expr::select(inner, Expr::variable("j", 32), 8);
        assert_eq!(
            emit(&outer, Ctx::Bv, &config).unwrap(),
            "(select a (concat i j))"
        );
    }

    #[test]
    fn remainder_spells_bvsmod() {
        let config = AnalyzerConfig::default();
        let e = Expr::rem(Expr::variable("x", 32), Expr::constant(3, 32));
        assert_eq!(
            emit(&e, Ctx::Bv, &config).unwrap(),
            "(bvsmod x (_ bv3 32))"
        );
    }
}
