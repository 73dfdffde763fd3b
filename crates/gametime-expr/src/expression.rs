//! Immutable typed expression trees
//!
//! An expression is (operator, bit size, optional leaf value, children,
//! optional source-level type). Children are shared behind `Arc`, so cloning
//! is cheap and sharing can never leak mutation.
//!
//! Equality is structural modulo α-renaming of `Function` formals: two
//! function literals are equal when substituting the left formals with the
//! right formals makes the bodies equal. Hashing is consistent with that
//! equality — bound formal occurrences hash as de Bruijn positions, not as
//! names. The attached source-level type never participates in equality or
//! hashing; an expression is the same table key whatever type annotation it
//! carries.

use crate::operator::{Arity, Op};
use gametime_ir::CType;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Expr {
    op: Op,
    bits: u32,
    value: Option<String>,
    args: Vec<Arc<Expr>>,
    ty: Option<CType>,
}

impl Expr {
    fn node(op: Op, bits: u32, args: Vec<Expr>) -> Expr {
        debug_assert!(op.arity() != Arity::Nil);
        Expr {
            op,
            bits,
            value: None,
            args: args.into_iter().map(Arc::new).collect(),
            ty: None,
        }
    }

    fn leaf(op: Op, value: String, bits: u32) -> Expr {
        debug_assert!(op.arity() == Arity::Nil);
        Expr {
            op,
            bits,
            value: Some(value),
            args: Vec::new(),
            ty: None,
        }
    }

    // ---- leaf constructors ----

    /// Integer constant; the leaf value is its decimal rendering, with a
    /// leading `-` for negatives.
    pub fn constant(value: i128, bits: u32) -> Expr {
        Expr::leaf(Op::Constant, value.to_string(), bits)
    }

    pub fn variable(name: impl Into<String>, bits: u32) -> Expr {
        Expr::leaf(Op::Variable, name.into(), bits)
    }

    pub fn array_variable(name: impl Into<String>, bits: u32) -> Expr {
        Expr::leaf(Op::ArrayVariable, name.into(), bits)
    }

    pub fn bool_true(bits: u32) -> Expr {
        Expr::leaf(Op::True, "true".to_string(), bits)
    }

    pub fn bool_false(bits: u32) -> Expr {
        Expr::leaf(Op::False, "false".to_string(), bits)
    }

    /// Attach a source-level type. Types ride along for pointer and
    /// aggregate resolution; they are ignored by equality and hashing.
    pub fn with_type(mut self, ty: CType) -> Expr {
        self.ty = Some(ty);
        self
    }

    // ---- internal-node constructors ----

    pub fn unary(op: Op, a: Expr) -> Expr {
        debug_assert!(op.arity() == Arity::Unary);
        let bits = a.bits;
        Expr::node(op, bits, vec![a])
    }

    /// Generic binary node; the result width is the first child's width.
    /// Shape, memory and comparison nodes have dedicated constructors.
    pub fn binary(op: Op, a: Expr, b: Expr) -> Expr {
        debug_assert!(op.arity() == Arity::Binary);
        let bits = a.bits;
        Expr::node(op, bits, vec![a, b])
    }

    pub fn add(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::Add, a, b)
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::Sub, a, b)
    }

    pub fn mul(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::Mul, a, b)
    }

    pub fn sdiv(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::SDiv, a, b)
    }

    pub fn rem(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::Rem, a, b)
    }

    /// Comparison node. The result width is the machine word size, not 1,
    /// so comparisons embed uniformly in bitvector arithmetic.
    pub fn compare(op: Op, a: Expr, b: Expr, word_bits: u32) -> Expr {
        debug_assert!(op.is_comparison());
        Expr::node(op, word_bits, vec![a, b])
    }

    pub fn eq(a: Expr, b: Expr, word_bits: u32) -> Expr {
        Expr::compare(Op::Eq, a, b, word_bits)
    }

    pub fn ne(a: Expr, b: Expr, word_bits: u32) -> Expr {
        Expr::compare(Op::Ne, a, b, word_bits)
    }

    pub fn not(a: Expr) -> Expr {
        Expr::unary(Op::Not, a)
    }

    pub fn and(a: Expr, b: Expr) -> Expr {
        Expr::binary(Op::And, a, b)
    }

    pub fn ite(cond: Expr, then_: Expr, else_: Expr) -> Expr {
        let bits = then_.bits;
        Expr::node(Op::Ite, bits, vec![cond, then_, else_])
    }

    /// `hi ++ lo`; the width is the sum of the children's widths.
    pub fn concat(hi: Expr, lo: Expr) -> Expr {
        let bits = hi.bits + lo.bits;
        Expr::node(Op::Concat, bits, vec![hi, lo])
    }

    /// Widen `x` by `count` zero bits.
    pub fn zero_extend(x: Expr, count: u32) -> Expr {
        let bits = x.bits + count;
        Expr::node(Op::ZeroExtend, bits, vec![x, Expr::constant(count as i128, 32)])
    }

    pub fn sign_extend(x: Expr, count: u32) -> Expr {
        let bits = x.bits + count;
        Expr::node(Op::SignExtend, bits, vec![x, Expr::constant(count as i128, 32)])
    }

    /// Bits `lo..=hi` of `x`; yields `hi - lo + 1` bits.
    pub fn bit_extract(x: Expr, lo: u32, hi: u32) -> Expr {
        debug_assert!(lo <= hi);
        let bits = hi - lo + 1;
        Expr::node(
            Op::BitExtract,
            bits,
            vec![x, Expr::constant(lo as i128, 32), Expr::constant(hi as i128, 32)],
        )
    }

    /// Symbolic array access `a[i]`, yielding an element of `elem_bits`.
    pub fn array_access(array: Expr, index: Expr, elem_bits: u32) -> Expr {
        Expr::node(Op::Array, elem_bits, vec![array, index])
    }

    /// Aggregate/byte-offset reference `(base . offset)` reading `bits`.
    pub fn offset(base: Expr, off: Expr, bits: u32) -> Expr {
        Expr::node(Op::Offset, bits, vec![base, off])
    }

    pub fn select(array: Expr, index: Expr, elem_bits: u32) -> Expr {
        Expr::node(Op::Select, elem_bits, vec![array, index])
    }

    pub fn store(array: Expr, index: Expr, value: Expr) -> Expr {
        let bits = array.bits;
        Expr::node(Op::Store, bits, vec![array, index, value])
    }

    /// Function literal `(f (formals…) body)`. Formals must be variable
    /// leaves; the body is the last child.
    pub fn function(formals: Vec<Expr>, body: Expr) -> Expr {
        debug_assert!(formals.iter().all(|f| f.op == Op::Variable));
        let bits = body.bits;
        let mut args = formals;
        args.push(body);
        Expr::node(Op::Function, bits, args)
    }

    pub fn function_call(func: Expr, call_args: Vec<Expr>) -> Expr {
        let bits = func.bits;
        let mut args = vec![func];
        args.extend(call_args);
        Expr::node(Op::FunctionCall, bits, args)
    }

    // ---- accessors ----

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn ty(&self) -> Option<&CType> {
        self.ty.as_ref()
    }

    pub fn args(&self) -> &[Arc<Expr>] {
        &self.args
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Child at `index`. Panics on an out-of-range index; passing one is a
    /// programmer error, not an input error.
    pub fn get_parameter(&self, index: usize) -> &Expr {
        match self.args.get(index) {
            Some(a) => a,
            None => panic!(
                "parameter index {index} out of range for {} with {} children",
                self.op.symbol(),
                self.args.len()
            ),
        }
    }

    /// Fresh expression with the child at `index` replaced and the width
    /// re-derived for shape-sensitive operators.
    pub fn update_parameter(&self, index: usize, child: Expr) -> Expr {
        assert!(
            index < self.args.len(),
            "parameter index {index} out of range for {}",
            self.op.symbol()
        );
        let mut args = self.args.clone();
        args[index] = Arc::new(child);
        let mut out = Expr {
            op: self.op,
            bits: self.bits,
            value: None,
            args,
            ty: self.ty.clone(),
        };
        out.bits = out.derive_bits();
        out
    }

    fn derive_bits(&self) -> u32 {
        match self.op {
            Op::Concat => self.args[0].bits + self.args[1].bits,
            Op::ZeroExtend | Op::SignExtend => {
                let count = self.args[1].const_value().unwrap_or(0) as u32;
                self.args[0].bits + count
            }
            Op::BitExtract => {
                let lo = self.args[1].const_value().unwrap_or(0) as u32;
                let hi = self.args[2].const_value().unwrap_or(0) as u32;
                hi.saturating_sub(lo) + 1
            }
            Op::Ite => self.args[1].bits,
            Op::Function => self.args[self.args.len() - 1].bits,
            Op::Store => self.args[0].bits,
            _ => self.bits,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.op == Op::Constant
    }

    /// Numeric value of a constant leaf.
    pub fn const_value(&self) -> Option<i128> {
        if self.op != Op::Constant {
            return None;
        }
        self.value.as_ref()?.parse().ok()
    }

    pub fn is_const(&self, value: i128) -> bool {
        self.const_value() == Some(value)
    }

    pub fn is_true(&self) -> bool {
        self.op == Op::True
    }

    pub fn is_false(&self) -> bool {
        self.op == Op::False
    }

    /// Does `needle` occur in this expression (α-aware)?
    pub fn contains(&self, needle: &Expr) -> bool {
        if self == needle {
            return true;
        }
        self.args.iter().any(|a| a.contains(needle))
    }

    /// α-aware structural substitution. Leaves not equal to `needle` are
    /// cloned; internal nodes recurse and re-derive their width.
    pub fn replace(&self, needle: &Expr, replacement: &Expr) -> Expr {
        if self == needle {
            return replacement.clone();
        }
        if self.op.arity() == Arity::Nil {
            return self.clone();
        }
        let args: Vec<Arc<Expr>> = self
            .args
            .iter()
            .map(|a| Arc::new(a.replace(needle, replacement)))
            .collect();
        let mut out = Expr {
            op: self.op,
            bits: self.bits,
            value: None,
            args,
            ty: self.ty.clone(),
        };
        out.bits = out.derive_bits();
        out
    }

    /// β-reduce a function literal: substitute each formal with the
    /// corresponding argument. Formals are synthesized fresh per function,
    /// so capture cannot occur.
    pub fn apply(&self, call_args: &[Expr]) -> Expr {
        assert!(
            self.op == Op::Function,
            "apply on a non-function expression {}",
            self.op.symbol()
        );
        let formal_count = self.args.len() - 1;
        assert_eq!(
            formal_count,
            call_args.len(),
            "function arity mismatch: {} formals, {} arguments",
            formal_count,
            call_args.len()
        );
        let mut body = self.args[formal_count].as_ref().clone();
        for (formal, actual) in self.args[..formal_count].iter().zip(call_args) {
            body = body.replace(formal, actual);
        }
        body
    }

    /// Collect free `Variable`/`ArrayVariable` leaves in first-occurrence
    /// order, skipping formals bound by enclosing function literals.
    pub fn collect_leaves(&self, out: &mut Vec<Expr>) {
        let mut bound = Vec::new();
        self.collect_leaves_inner(&mut bound, out);
    }

    fn collect_leaves_inner(&self, bound: &mut Vec<String>, out: &mut Vec<Expr>) {
        match self.op {
            Op::Variable | Op::ArrayVariable => {
                let name = self.value.as_deref().unwrap_or_default();
                if !bound.iter().any(|b| b.as_str() == name) && !out.contains(self) {
                    out.push(self.clone());
                }
            }
            Op::Function => {
                let formal_count = self.args.len() - 1;
                for formal in &self.args[..formal_count] {
                    bound.push(formal.value.clone().unwrap_or_default());
                }
                self.args[formal_count].collect_leaves_inner(bound, out);
                bound.truncate(bound.len() - formal_count);
            }
            _ => {
                for a in &self.args {
                    a.collect_leaves_inner(bound, out);
                }
            }
        }
    }

    /// Canonical rendering. Recomputed from the children on every call, so
    /// it can never go stale.
    pub fn value_string(&self) -> String {
        match self.op.arity() {
            Arity::Nil => self.value.clone().unwrap_or_default(),
            Arity::Unary => format!("({} {})", self.op.symbol(), self.args[0].value_string()),
            Arity::Binary => match self.op {
                Op::Array => format!(
                    "{}[{}]",
                    self.args[0].value_string(),
                    self.args[1].value_string()
                ),
                Op::Offset => format!(
                    "({} . {})",
                    self.args[0].value_string(),
                    self.args[1].value_string()
                ),
                Op::Select => format!(
                    "select({}, {})",
                    self.args[0].value_string(),
                    self.args[1].value_string()
                ),
                Op::ZeroExtend | Op::SignExtend => format!(
                    "{}({}, {})",
                    self.op.symbol(),
                    self.args[0].value_string(),
                    self.args[1].value_string()
                ),
                _ => format!(
                    "({} {} {})",
                    self.args[0].value_string(),
                    self.op.symbol(),
                    self.args[1].value_string()
                ),
            },
            Arity::Ternary => match self.op {
                Op::Ite => format!(
                    "ite({}, {}, {})",
                    self.args[0].value_string(),
                    self.args[1].value_string(),
                    self.args[2].value_string()
                ),
                Op::Store => format!(
                    "store({}, {}, {})",
                    self.args[0].value_string(),
                    self.args[1].value_string(),
                    self.args[2].value_string()
                ),
                Op::BitExtract => format!(
                    "{}[{}:{}]",
                    self.args[0].value_string(),
                    self.args[2].value_string(),
                    self.args[1].value_string()
                ),
                _ => unreachable!("ternary operator {}", self.op.symbol()),
            },
            Arity::Polynary => match self.op {
                Op::Function => {
                    let formal_count = self.args.len() - 1;
                    let formals: Vec<String> = self.args[..formal_count]
                        .iter()
                        .map(|f| f.value_string())
                        .collect();
                    format!(
                        "(f ({}) {})",
                        formals.join(", "),
                        self.args[formal_count].value_string()
                    )
                }
                _ => {
                    let call_args: Vec<String> =
                        self.args[1..].iter().map(|a| a.value_string()).collect();
                    format!("{}({})", self.args[0].value_string(), call_args.join(", "))
                }
            },
        }
    }

    // ---- α-aware equality and hashing ----

    fn alpha_eq(&self, other: &Expr) -> bool {
        if self.op != other.op || self.bits != other.bits {
            return false;
        }
        if self.op.arity() == Arity::Nil {
            return self.value == other.value;
        }
        if self.args.len() != other.args.len() {
            return false;
        }
        if self.op == Op::Function {
            // Substitute left formals with right formals, then compare
            // bodies structurally.
            let formal_count = self.args.len() - 1;
            let mut body = self.args[formal_count].as_ref().clone();
            for (l, r) in self.args[..formal_count].iter().zip(&other.args[..formal_count]) {
                if l.op != Op::Variable || r.op != Op::Variable {
                    return false;
                }
                body = body.replace(l, r);
            }
            return body.alpha_eq(&other.args[formal_count]);
        }
        self.args
            .iter()
            .zip(&other.args)
            .all(|(a, b)| a.alpha_eq(b))
    }

    fn alpha_hash<H: Hasher>(&self, state: &mut H, scope: &mut Vec<(String, u32)>) {
        discriminant(&self.op).hash(state);
        if self.op == Op::Variable {
            // A bound formal hashes as its de Bruijn position so that
            // α-equal function literals hash identically; the formal's own
            // name is folded away by substitution during comparison, so it
            // must not contribute here either. Substitution is
            // width-sensitive, so the scope match is too.
            if let Some(name) = self.value.as_deref() {
                if let Some(pos) = scope
                    .iter()
                    .rposition(|(b, w)| b.as_str() == name && *w == self.bits)
                {
                    pos.hash(state);
                    return;
                }
            }
        }
        self.bits.hash(state);
        if self.op.arity() == Arity::Nil {
            self.value.hash(state);
            return;
        }
        if self.op == Op::Function {
            let formal_count = self.args.len() - 1;
            formal_count.hash(state);
            for formal in &self.args[..formal_count] {
                scope.push((formal.value.clone().unwrap_or_default(), formal.bits));
            }
            self.args[formal_count].alpha_hash(state, scope);
            scope.truncate(scope.len() - formal_count);
            return;
        }
        self.args.len().hash(state);
        for a in &self.args {
            a.alpha_hash(state, scope);
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.alpha_eq(other)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alpha_hash(state, &mut Vec::new());
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value_string())
    }
}
