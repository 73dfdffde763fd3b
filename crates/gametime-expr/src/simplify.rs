//! Arithmetic and algebraic simplification
//!
//! An operator-dispatched structural rewriter. Children are simplified first,
//! then a per-operator rule set is applied to the rebuilt node. Rules only
//! fold or peel structure — the one rule that redistributes (division and
//! remainder over `+`/`-`) builds its result from already-simplified pieces
//! and never re-enters itself on them, so the pass terminates and is
//! idempotent.
//!
//! | Pattern | Result |
//! |---------|--------|
//! | `c1 op c2` (arithmetic) | folded constant |
//! | `x + 0`, `x - 0`, `x * 1`, `x / 1` | `x` |
//! | `x * 0` | `0` at `x`'s width |
//! | `x % 1` | `0` |
//! | `(x * c) / d`, `d` divides `c` | `x * (c / d)` |
//! | `(x * c) % d`, `d` divides `c` | `0` |
//! | `(a ± b) / d`, one side exactly divisible | `a/d ± b/d` |
//! | `(a ± b) % d`, both remainders constant | folded constant |
//! | `ite(true, a, b)` / `ite(false, a, b)` | `a` / `b` |
//! | `c1 == c2` | `true` / `false` |
//!
//! Division by a (possibly symbolic) zero is never folded, and double
//! negation is deliberately left alone.

use crate::expression::Expr;
use crate::operator::{Arity, Op};

/// Simplify an expression bottom-up. Idempotent: simplifying a simplified
/// expression returns an equal expression.
pub fn simplify(e: &Expr) -> Expr {
    if e.op().arity() == Arity::Nil {
        return e.clone();
    }
    let mut out = e.clone();
    for (i, a) in e.args().iter().enumerate() {
        let s = simplify(a);
        if s != **a {
            out = out.update_parameter(i, s);
        }
    }
    apply_rules(out)
}

fn apply_rules(e: Expr) -> Expr {
    match e.op() {
        Op::Add => rule_add(e),
        Op::Sub => rule_sub(e),
        Op::Mul => rule_mul(e),
        Op::SDiv | Op::UDiv => rule_div(e),
        Op::Rem => rule_rem(e),
        Op::Ite => rule_ite(e),
        Op::Eq => rule_eq(e),
        _ => e,
    }
}

fn rule_add(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0), e.get_parameter(1));
    match (a.const_value(), b.const_value()) {
        (Some(x), Some(y)) => Expr::constant(x + y, e.bits()),
        (Some(0), _) => b.clone(),
        (_, Some(0)) => a.clone(),
        _ => e,
    }
}

fn rule_sub(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0), e.get_parameter(1));
    match (a.const_value(), b.const_value()) {
        (Some(x), Some(y)) => Expr::constant(x - y, e.bits()),
        (_, Some(0)) => a.clone(),
        _ => e,
    }
}

fn rule_mul(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0), e.get_parameter(1));
    match (a.const_value(), b.const_value()) {
        (Some(x), Some(y)) => Expr::constant(x * y, e.bits()),
        (Some(0), _) | (_, Some(0)) => Expr::constant(0, e.bits()),
        (Some(1), _) => b.clone(),
        (_, Some(1)) => a.clone(),
        _ => e,
    }
}

fn rule_div(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0).clone(), e.get_parameter(1).clone());
    let d = match b.const_value() {
        Some(d) if d != 0 => d,
        // A zero or symbolic divisor is never folded; the divisor-nonzero
        // guard keeps the query honest instead.
        _ => return e,
    };
    if let Some(n) = a.const_value() {
        return Expr::constant(n / d, e.bits());
    }
    if d == 1 {
        return a;
    }
    // (x * c) / d  ->  x * (c / d) when d divides c. This is what undoes
    // pointer arithmetic after offsets are split by the referent width.
    if a.op() == Op::Mul {
        let (u, v) = (a.get_parameter(0), a.get_parameter(1));
        if let Some(c) = v.const_value() {
            if c % d == 0 {
                return apply_rules(Expr::mul(u.clone(), Expr::constant(c / d, a.bits())));
            }
        }
        if let Some(c) = u.const_value() {
            if c % d == 0 {
                return apply_rules(Expr::mul(v.clone(), Expr::constant(c / d, a.bits())));
            }
        }
    }
    // (u ± v) / d distributes when one side is exactly divisible.
    if matches!(a.op(), Op::Add | Op::Sub) {
        let (u, v) = (a.get_parameter(0).clone(), a.get_parameter(1).clone());
        let ru = simplify(&Expr::binary(Op::Rem, u.clone(), b.clone()));
        let rv = simplify(&Expr::binary(Op::Rem, v.clone(), b.clone()));
        if ru.is_const(0) || rv.is_const(0) {
            let du = simplify(&Expr::binary(e.op(), u, b.clone()));
            let dv = simplify(&Expr::binary(e.op(), v, b));
            return apply_rules(Expr::binary(a.op(), du, dv));
        }
    }
    e
}

fn rule_rem(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0).clone(), e.get_parameter(1).clone());
    let d = match b.const_value() {
        Some(d) if d != 0 => d,
        _ => return e,
    };
    if let Some(n) = a.const_value() {
        return Expr::constant(n % d, e.bits());
    }
    if d == 1 {
        return Expr::constant(0, e.bits());
    }
    // (x * c) % d vanishes when d divides c.
    if a.op() == Op::Mul {
        let (u, v) = (a.get_parameter(0), a.get_parameter(1));
        let factor = v.const_value().or_else(|| u.const_value());
        if let Some(c) = factor {
            if c % d == 0 {
                return Expr::constant(0, e.bits());
            }
        }
    }
    // (u ± v) % d folds when both side remainders are constants.
    if matches!(a.op(), Op::Add | Op::Sub) {
        let (u, v) = (a.get_parameter(0).clone(), a.get_parameter(1).clone());
        let ru = simplify(&Expr::rem(u, b.clone()));
        let rv = simplify(&Expr::rem(v, b));
        if let (Some(x), Some(y)) = (ru.const_value(), rv.const_value()) {
            let combined = if a.op() == Op::Add { x + y } else { x - y };
            return Expr::constant(combined % d, e.bits());
        }
    }
    e
}

fn rule_ite(e: Expr) -> Expr {
    let c = e.get_parameter(0);
    if c.is_true() {
        e.get_parameter(1).clone()
    } else if c.is_false() {
        e.get_parameter(2).clone()
    } else {
        e
    }
}

fn rule_eq(e: Expr) -> Expr {
    let (a, b) = (e.get_parameter(0), e.get_parameter(1));
    if let (Some(x), Some(y)) = (a.const_value(), b.const_value()) {
        return if x == y {
            Expr::bool_true(e.bits())
        } else {
            Expr::bool_false(e.bits())
        };
    }
    e
}
