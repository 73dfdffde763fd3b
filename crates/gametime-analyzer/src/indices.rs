//! Array bookkeeping passes
//!
//! Post-processing over the collected conditions, in the order the path
//! analyzer runs them:
//!
//! 1. **Array dimensions** — for every referenced array variable, one width
//!    per index level plus the element width, memoized per variable.
//! 2. **Index replacement** — every array/store/select access gets its index
//!    expression replaced by a fresh temporary; an equality anchors the
//!    temporary to the original expression and a bounds conjunction is added
//!    for fixed-size levels. Accesses are witnessed as they are rewritten.
//! 3. **`Array` → `Select` lowering** — access nodes become SMT-facing
//!    selects.
//! 4. **Divisor guards** — `b ≠ 0` for every division or remainder subterm,
//!    once per distinct divisor.

use crate::addendum::original_name;
use crate::config::ArrayModel;
use crate::error::{AnalyzerError, Result};
use crate::path::{Condition, Path};
use gametime_expr::{Expr, Op};
use gametime_ir::{BlockId, CType};
use rustc_hash::FxHashMap;
use tracing::debug;

impl<'u> Path<'u> {
    /// Compute (and memoize) the dimension list of every referenced array
    /// variable: the index width of each pointer/unmanaged-array level —
    /// the machine word on this target — then the element width. Aggregate
    /// referents collapse to a word-wide carrier level.
    pub(crate) fn compute_array_dimensions(&mut self) {
        let word = self.config.word_bits;
        let arrays = self.array_variables.clone();
        for av in arrays {
            let name = original_name(av.value().unwrap_or_default()).to_string();
            if self.array_dimensions.contains_key(&name) {
                continue;
            }
            let mut dims = Vec::new();
            let mut lens = Vec::new();
            let mut cur = av.ty().cloned();
            loop {
                match cur {
                    Some(CType::Pointer { ref referent, .. }) => {
                        dims.push(word);
                        lens.push(None);
                        cur = Some((**referent).clone());
                    }
                    Some(CType::Array {
                        ref element,
                        length,
                    }) => {
                        dims.push(word);
                        lens.push(length);
                        cur = Some((**element).clone());
                    }
                    Some(CType::Aggregate(_)) => {
                        dims.push(word);
                        break;
                    }
                    Some(ref t) => {
                        dims.push(t.bit_size().max(1));
                        break;
                    }
                    None => {
                        dims.push(av.bits());
                        break;
                    }
                }
            }
            if dims.len() == 1 {
                // No index level was visible from the type; model one
                // word-indexed level.
                dims.insert(0, word);
                lens.push(None);
            }
            debug!(array = %name, ?dims, "array dimensions");
            self.array_dimensions.insert(name.clone(), dims);
            self.array_lengths.insert(name, lens);
        }
    }

    /// Replace every access index with a `__gtINDEX<k>` temporary. Each
    /// distinct original index expression gets exactly one temporary and
    /// one anchoring equality, however many accesses share it.
    pub(crate) fn replace_indices(&mut self) -> Result<()> {
        let mut conds = std::mem::take(&mut self.conditions);
        let mut extra: Vec<Condition> = Vec::new();
        let mut memo: FxHashMap<Expr, u32> = FxHashMap::default();
        for cond in conds.iter_mut() {
            let rewritten =
                self.replace_in(&cond.expr, cond.block, cond.line, &mut extra, &mut memo)?;
            cond.expr = rewritten;
        }
        conds.extend(extra);
        self.conditions = conds;
        Ok(())
    }

    fn replace_in(
        &mut self,
        e: &Expr,
        block: BlockId,
        line: u32,
        extra: &mut Vec<Condition>,
        memo: &mut FxHashMap<Expr, u32>,
    ) -> Result<Expr> {
        match e.op() {
            Op::Array | Op::Select => {
                let Some((base, levels)) = split_array_chain(e) else {
                    return Err(AnalyzerError::Unsupported(
                        "array access whose base is not an array variable".to_string(),
                    ));
                };
                let array_name = original_name(base.value().unwrap_or_default()).to_string();
                let select = e.op() == Op::Select;
                let mut numbers = Vec::new();
                let mut cur = base;
                for (level, (idx, elem_bits)) in levels.iter().enumerate() {
                    let idx = self.replace_in(idx, block, line, extra, memo)?;
                    let (mut nums, leaf) =
                        self.index_temp(&idx, &array_name, level, block, line, extra, memo)?;
                    numbers.append(&mut nums);
                    cur = if select {
                        Expr::select(cur, leaf, *elem_bits)
                    } else {
                        Expr::array_access(cur, leaf, *elem_bits)
                    };
                }
                self.array_accesses.push((array_name, numbers));
                Ok(cur)
            }
            Op::Store => {
                let array = self.replace_in(e.get_parameter(0), block, line, extra, memo)?;
                let value = self.replace_in(e.get_parameter(2), block, line, extra, memo)?;
                let idx = self.replace_in(e.get_parameter(1), block, line, extra, memo)?;
                let array_name = store_base_name(e);
                let (nums, leaf) =
                    self.index_temp(&idx, &array_name, 0, block, line, extra, memo)?;
                if e.get_parameter(0).op() == Op::ArrayVariable {
                    self.array_accesses.push((array_name, nums));
                }
                Ok(Expr::store(array, leaf, value))
            }
            op if op.is_leaf() => Ok(e.clone()),
            _ => {
                let mut out = e.clone();
                for i in 0..e.arg_count() {
                    let child = self.replace_in(e.get_parameter(i), block, line, extra, memo)?;
                    if child != *e.get_parameter(i) {
                        out = out.update_parameter(i, child);
                    }
                }
                Ok(out)
            }
        }
    }

    /// The temporary standing in for one index expression, plus its
    /// number(s). Under flat array modelling a concatenated index splits at
    /// the concatenation boundary and each half is replaced independently.
    #[allow(clippy::too_many_arguments)]
    fn index_temp(
        &mut self,
        idx: &Expr,
        array_name: &str,
        level: usize,
        block: BlockId,
        line: u32,
        extra: &mut Vec<Condition>,
        memo: &mut FxHashMap<Expr, u32>,
    ) -> Result<(Vec<u32>, Expr)> {
        // Already a bare temporary: nothing to do (idempotence).
        if idx.op() == Op::Variable {
            if let Some(rest) = idx
                .value()
                .unwrap_or_default()
                .strip_prefix(self.config.ident_temp_index.as_str())
            {
                if let Ok(n) = rest.parse::<u32>() {
                    return Ok((vec![n], idx.clone()));
                }
            }
        }
        if self.config.array_model == ArrayModel::Flat && idx.op() == Op::Concat {
            let (mut hi_nums, hi) =
                self.index_temp(idx.get_parameter(0), array_name, level, block, line, extra, memo)?;
            let (mut lo_nums, lo) = self.index_temp(
                idx.get_parameter(1),
                array_name,
                level + 1,
                block,
                line,
                extra,
                memo,
            )?;
            hi_nums.append(&mut lo_nums);
            return Ok((hi_nums, Expr::concat(hi, lo)));
        }
        if let Some(&n) = memo.get(idx) {
            let leaf = Expr::variable(
                format!("{}{}", self.config.ident_temp_index, n),
                idx.bits(),
            );
            return Ok((vec![n], leaf));
        }
        let n = self.fresh_temp_index();
        let leaf = Expr::variable(
            format!("{}{}", self.config.ident_temp_index, n),
            idx.bits(),
        );
        self.register_leaf(&leaf);
        memo.insert(idx.clone(), n);
        self.temporary_index_expressions.insert(n, idx.clone());
        let word = self.config.word_bits;
        extra.push(Condition {
            expr: Expr::eq(leaf.clone(), idx.clone(), word),
            block,
            line,
            branch: None,
        });
        // Bounds for fixed-size levels.
        let length = self
            .array_lengths
            .get(array_name)
            .and_then(|lens| lens.get(level))
            .copied()
            .flatten();
        if let Some(n_elems) = length {
            let zero = Expr::constant(0, leaf.bits());
            let count = Expr::constant(n_elems as i128, leaf.bits());
            let lower = Expr::compare(Op::SLe, zero, leaf.clone(), word);
            let upper = Expr::compare(Op::SLt, leaf.clone(), count, word);
            extra.push(Condition {
                expr: Expr::and(lower, upper),
                block,
                line,
                branch: None,
            });
        }
        Ok((vec![n], leaf))
    }

    /// Lower every remaining `Array` access node to `Select`.
    pub(crate) fn lower_array_accesses(&mut self) {
        let mut conds = std::mem::take(&mut self.conditions);
        for cond in conds.iter_mut() {
            cond.expr = arrays_to_selects(&cond.expr);
        }
        self.conditions = conds;
    }

    /// Append `b ≠ 0` for every division or remainder subterm present in
    /// any condition, once per distinct divisor. Emitted even for literal
    /// constant divisors.
    pub(crate) fn append_divisor_guards(&mut self) {
        let word = self.config.word_bits;
        let mut seen_divisors: Vec<Expr> = Vec::new();
        let mut guards: Vec<Condition> = Vec::new();
        for cond in &self.conditions {
            collect_divisors(&cond.expr, &mut |divisor| {
                if !seen_divisors.contains(divisor) {
                    seen_divisors.push(divisor.clone());
                    let zero = Expr::constant(0, divisor.bits());
                    guards.push(Condition {
                        expr: Expr::ne(divisor.clone(), zero, word),
                        block: cond.block,
                        line: cond.line,
                        branch: None,
                    });
                }
            });
        }
        self.conditions.extend(guards);
    }
}

/// Decompose `Array`/`Select` nesting into (base leaf, per-level
/// (index, element width)) with indices ordered outermost first.
pub(crate) fn split_array_chain(e: &Expr) -> Option<(Expr, Vec<(Expr, u32)>)> {
    let mut levels = Vec::new();
    let mut cur = e.clone();
    while matches!(cur.op(), Op::Array | Op::Select) {
        levels.push((cur.get_parameter(1).clone(), cur.bits()));
        let next = cur.get_parameter(0).clone();
        cur = next;
    }
    if matches!(cur.op(), Op::ArrayVariable | Op::Variable) {
        levels.reverse();
        Some((cur, levels))
    } else {
        None
    }
}

fn store_base_name(store: &Expr) -> String {
    let mut cur = store.get_parameter(0).clone();
    while matches!(cur.op(), Op::Array | Op::Select | Op::Store) {
        let next = cur.get_parameter(0).clone();
        cur = next;
    }
    original_name(cur.value().unwrap_or_default()).to_string()
}

fn arrays_to_selects(e: &Expr) -> Expr {
    if e.op().is_leaf() {
        return e.clone();
    }
    let mut out = e.clone();
    for i in 0..e.arg_count() {
        let child = arrays_to_selects(e.get_parameter(i));
        if child != *e.get_parameter(i) {
            out = out.update_parameter(i, child);
        }
    }
    if out.op() == Op::Array {
        let bits = out.bits();
        Expr::select(
            out.get_parameter(0).clone(),
            out.get_parameter(1).clone(),
            bits,
        )
    } else {
        out
    }
}

fn collect_divisors(e: &Expr, visit: &mut impl FnMut(&Expr)) {
    if e.op().is_division() {
        visit(e.get_parameter(1));
    }
    for a in e.args() {
        collect_divisors(a, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_array_chain_orders_indices_outermost_first() {
        let a = Expr::array_variable("a", 64);
        let i = Expr::variable("i", 32);
        let j = Expr::variable("j", 32);
        let chain = Expr::array_access(Expr::array_access(a.clone(), i.clone(), 128), j.clone(), 32);
        let (base, levels) = split_array_chain(&chain).unwrap();
        assert_eq!(base, a);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].0, i);
        assert_eq!(levels[0].1, 128);
        assert_eq!(levels[1].0, j);
        assert_eq!(levels[1].1, 32);
        // A non-variable base refuses to split.
        let bad = Expr::array_access(Expr::constant(0, 32), i, 32);
        assert!(split_array_chain(&bad).is_none());
    }

    #[test]
    fn arrays_become_selects() {
        let a = Expr::array_variable("a", 64);
        let access = Expr::array_access(a.clone(), Expr::variable("i", 32), 32);
        let eq = Expr::eq(Expr::variable("y", 32), access, 32);
        let lowered = arrays_to_selects(&eq);
        assert_eq!(lowered.value_string(), "(y == select(a, i))");
    }

    #[test]
    fn divisors_are_collected_recursively() {
        let x = Expr::variable("x", 32);
        let inner = Expr::sdiv(x.clone(), Expr::constant(3, 32));
        let outer = Expr::rem(Expr::add(inner, x), Expr::constant(5, 32));
        let mut seen = Vec::new();
        collect_divisors(&outer, &mut |d| seen.push(d.clone()));
        assert_eq!(seen, vec![Expr::constant(5, 32), Expr::constant(3, 32)]);
    }
}
