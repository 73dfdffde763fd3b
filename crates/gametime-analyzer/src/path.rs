//! Path analyzer (orchestrator)
//!
//! A [`Path`] owns all per-path state: the block sequence, the accumulated
//! conditions, the alias and aggregate-offset tables, the address-taken map
//! and the assignment addenda. `generate_conditions_and_assignments` walks
//! the blocks in order, invoking the backward executor on IR operands, and
//! then post-processes the collected conditions:
//!
//! 1. array dimensions for every referenced array variable,
//! 2. array-index replacement (with witnesses),
//! 3. `Array` access nodes lowered to `Select`,
//! 4. divisor-nonzero guards.
//!
//! After the walk a path is consumed by the SMT lowering; none of its tables
//! change once lowering begins.

use crate::addendum::PathAddenda;
use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, AnalyzerWarning, Result};
use gametime_expr::{simplify, Expr, Op};
use gametime_ir::{BlockId, FunctionUnit, InstrId, InstrKind, OperandId, OperandKind};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::debug;

/// One accumulated path condition, stamped with the block it arose in.
#[derive(Debug, Clone)]
pub struct Condition {
    pub expr: Expr,
    /// Predecessor block this condition belongs to.
    pub block: BlockId,
    /// Source line of the originating instruction (0 when synthetic).
    pub line: u32,
    /// For conditional-branch conditions: the direction the path takes.
    pub branch: Option<bool>,
}

/// All analysis state for one acyclic path through one function unit.
#[derive(Debug)]
pub struct Path<'u> {
    pub(crate) unit: &'u FunctionUnit,
    pub(crate) config: &'u AnalyzerConfig,
    blocks: Vec<BlockId>,
    pub(crate) addenda: PathAddenda,

    pub conditions: Vec<Condition>,
    /// Scalar variable leaves referenced by the path, in first-use order.
    pub variables: Vec<Expr>,
    /// Array variable leaves referenced by the path, in first-use order.
    pub array_variables: Vec<Expr>,
    /// Per array variable: the width of each index level, then the element
    /// width.
    pub array_dimensions: FxHashMap<String, Vec<u32>>,
    /// Per array variable: the declared element count of each fixed-size
    /// level.
    pub(crate) array_lengths: FxHashMap<String, Vec<Option<u64>>>,
    /// Variable whose address was taken → synthetic temporary pointer.
    pub address_taken: FxHashMap<Expr, Expr>,
    /// Expression → expression it is definitionally equal to.
    pub alias_table: FxHashMap<Expr, Expr>,
    /// Aggregate expression → (base aggregate, bit-offset expression).
    pub aggregate_offset_table: FxHashMap<Expr, (Expr, Expr)>,
    /// Witnessed accesses: (array variable name, temporary-index numbers).
    pub array_accesses: Vec<(String, Vec<u32>)>,
    /// Temporary-index number → the original index expression it replaced.
    pub temporary_index_expressions: FxHashMap<u32, Expr>,
    /// Arguments of `simulate` annotation calls, in path order.
    pub simulated: Vec<Expr>,
    pub warnings: Vec<AnalyzerWarning>,

    pub(crate) lines: BTreeSet<u32>,
    pub(crate) memo: FxHashMap<OperandId, Expr>,
    pub(crate) next_temp_var: u32,
    pub(crate) next_temp_index: u32,
    pub(crate) next_temp_ptr: u32,
    pub(crate) cur_block: BlockId,
    pub(crate) cur_line: u32,
}

impl<'u> Path<'u> {
    /// Create a path over `blocks` of `unit`. The block list must be
    /// non-empty, acyclic (no block repeats) and entirely within the unit.
    pub fn new(
        unit: &'u FunctionUnit,
        config: &'u AnalyzerConfig,
        blocks: &[BlockId],
    ) -> Result<Self> {
        if blocks.is_empty() {
            return Err(AnalyzerError::MalformedIr(
                "path specification is empty".to_string(),
            ));
        }
        for &b in blocks {
            if !unit.contains_block(b) {
                return Err(AnalyzerError::FunctionUnit(format!(
                    "block {b} is not part of function unit {}",
                    unit.name
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for &b in blocks {
            if !seen.insert(b) {
                return Err(AnalyzerError::MalformedIr(format!(
                    "path revisits block {b}; paths must be acyclic"
                )));
            }
        }
        Ok(Self {
            unit,
            config,
            blocks: blocks.to_vec(),
            addenda: PathAddenda::new(blocks),
            conditions: Vec::new(),
            variables: Vec::new(),
            array_variables: Vec::new(),
            array_dimensions: FxHashMap::default(),
            array_lengths: FxHashMap::default(),
            address_taken: FxHashMap::default(),
            alias_table: FxHashMap::default(),
            aggregate_offset_table: FxHashMap::default(),
            array_accesses: Vec::new(),
            temporary_index_expressions: FxHashMap::default(),
            simulated: Vec::new(),
            warnings: Vec::new(),
            lines: BTreeSet::new(),
            memo: FxHashMap::default(),
            next_temp_var: 0,
            next_temp_index: 0,
            next_temp_ptr: 0,
            cur_block: blocks[0],
            cur_line: 0,
        })
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn config(&self) -> &AnalyzerConfig {
        self.config
    }

    /// Sorted unique source lines touched by the path.
    pub fn line_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.iter().copied()
    }

    pub(crate) fn on_path(&self, block: BlockId) -> bool {
        self.addenda.position(block).is_some()
    }

    pub(crate) fn path_position(&self, block: BlockId) -> Option<usize> {
        self.addenda.position(block)
    }

    /// The block the path enters after `block`, if any.
    pub(crate) fn successor_on_path(&self, block: BlockId) -> Option<BlockId> {
        let i = self.addenda.position(block)?;
        self.blocks.get(i + 1).copied()
    }

    // ---- main walk ----

    /// Walk the blocks in order, accumulating conditions and assignments,
    /// then post-process. Call exactly once per path.
    pub fn generate_conditions_and_assignments(&mut self) -> Result<()> {
        let unit = self.unit;
        for i in 0..self.blocks.len() {
            let b = self.blocks[i];
            self.cur_block = b;
            let instrs = unit.block(b).instrs.clone();
            for instr_id in instrs {
                self.visit_instr(instr_id)?;
            }
            if let Some(&next) = self.blocks.get(i + 1) {
                self.handle_branch(b, next)?;
            }
        }
        if self.conditions.is_empty() {
            // Downstream consumers expect a well-formed, non-empty path.
            let t = Expr::bool_true(self.config.word_bits);
            self.push_condition(t, self.blocks[0], 0, None);
        }
        self.post_process()
    }

    fn visit_instr(&mut self, instr_id: InstrId) -> Result<()> {
        let unit = self.unit;
        let config = self.config;
        let instr = unit.instr(instr_id);
        if instr.line > 0 {
            self.lines.insert(instr.line);
        }
        self.cur_line = instr.line;
        match &instr.kind {
            InstrKind::Switch => Err(AnalyzerError::SwitchInstruction {
                block: instr.block.to_string(),
            }),
            InstrKind::Value(_) | InstrKind::Compare(_) => self.process_assignment(instr_id),
            InstrKind::Call { callee } => {
                if *callee == config.annotation_assume {
                    self.process_assume(instr_id)
                } else if *callee == config.annotation_simulate {
                    self.process_simulate(instr_id)
                } else {
                    // An ordinary call assigning a non-temporary receives
                    // the call's symbolic value.
                    self.process_assignment(instr_id)
                }
            }
            InstrKind::Phi
            | InstrKind::Start
            | InstrKind::Chi
            | InstrKind::Label
            | InstrKind::Branch
            | InstrKind::Return => Ok(()),
        }
    }

    /// Value/compare/call instruction whose destination is non-temporary:
    /// trace destination and right-hand side, then dispatch on the
    /// destination's shape.
    fn process_assignment(&mut self, instr_id: InstrId) -> Result<()> {
        let unit = self.unit;
        let instr = unit.instr(instr_id);
        let Some(&dst) = instr.dsts.first() else {
            return Ok(());
        };
        let dst_data = unit.operand(dst);
        if dst_data.is_temporary {
            // Temporaries are expanded inline at their uses.
            return Ok(());
        }
        let block = instr.block;
        let line = instr.line;
        let dst_raw = self.trace_operand(dst, false)?;
        let rhs_raw = if matches!(dst_data.kind, OperandKind::Memory { .. }) {
            // A store through memory carries its value as the source
            // operand; the complete trace applies to variable destinations.
            let &src = instr.srcs.first().ok_or_else(|| {
                AnalyzerError::MalformedIr("store instruction without a source operand".to_string())
            })?;
            self.trace_operand(src, false)?
        } else {
            self.trace_operand(dst, true)?
        };
        self.cur_line = line;
        let dst_expr = self.update_expression(&simplify(&dst_raw), block);
        let rhs = self.update_expression(&simplify(&rhs_raw), block);
        debug!(dst = %dst_expr, rhs = %rhs, "assignment");
        self.generate_and_log_assignment(dst_expr, rhs)
    }

    fn process_assume(&mut self, instr_id: InstrId) -> Result<()> {
        let instr = self.unit.instr(instr_id);
        let &arg = instr.srcs.first().ok_or_else(|| {
            AnalyzerError::MalformedIr("assume annotation without an argument".to_string())
        })?;
        let block = instr.block;
        let line = instr.line;
        let e = self.trace_operand(arg, false)?;
        let e = self.update_expression(&simplify(&e), block);
        let zero = Expr::constant(0, e.bits());
        let cond = Expr::ne(e, zero, self.config.word_bits);
        self.push_condition(cond, block, line, None);
        Ok(())
    }

    fn process_simulate(&mut self, instr_id: InstrId) -> Result<()> {
        let instr = self.unit.instr(instr_id);
        let &arg = instr.srcs.first().ok_or_else(|| {
            AnalyzerError::MalformedIr("simulate annotation without an argument".to_string())
        })?;
        let block = instr.block;
        let e = self.trace_operand(arg, false)?;
        let e = self.update_expression(&simplify(&e), block);
        self.simulated.push(e);
        Ok(())
    }

    /// Conditional branch at the end of `block`: trace the condition and
    /// record it, reflecting the taken direction.
    fn handle_branch(&mut self, block: BlockId, next: BlockId) -> Result<()> {
        let unit = self.unit;
        let succs = unit.block(block).succs.clone();
        if succs.len() < 2 {
            return Ok(());
        }
        let term = unit.terminator(block).ok_or_else(|| {
            AnalyzerError::MalformedIr(format!("multi-successor block {block} has no terminator"))
        })?;
        let instr = unit.instr(term);
        if !matches!(instr.kind, InstrKind::Branch) {
            return Err(AnalyzerError::MalformedIr(format!(
                "multi-successor block {block} does not end in a branch"
            )));
        }
        let &cond_op = instr.srcs.first().ok_or_else(|| {
            AnalyzerError::MalformedIr(format!("conditional branch in {block} has no condition"))
        })?;
        if !succs.contains(&next) {
            return Err(AnalyzerError::MalformedIr(format!(
                "path leaves block {block} through non-successor {next}"
            )));
        }
        let line = instr.line;
        let taken_true = succs[0] == next;
        // The executor folds the direction into the comparison when the
        // compare directly feeds this branch; mirror its trigger so the
        // direction is applied exactly once.
        let handled_by_executor = {
            let data = unit.operand(cond_op);
            data.is_temporary
                && data
                    .def
                    .filter(|&d| self.on_path(unit.instr(d).block))
                    .map(|d| {
                        matches!(unit.instr(d).kind, InstrKind::Compare(_))
                            && unit.next_in_block(d) == Some(term)
                    })
                    .unwrap_or(false)
        };
        let c = self.trace_operand(cond_op, false)?;
        let c = self.update_expression(&simplify(&c), block);
        let mut cond = if c.op().is_boolean() {
            c
        } else {
            let zero = Expr::constant(0, c.bits());
            Expr::ne(c, zero, self.config.word_bits)
        };
        if !taken_true && !handled_by_executor {
            cond = Expr::not(cond);
        }
        self.push_condition(cond, block, line, Some(taken_true));
        Ok(())
    }

    pub(crate) fn push_condition(
        &mut self,
        expr: Expr,
        block: BlockId,
        line: u32,
        branch: Option<bool>,
    ) {
        debug!(condition = %expr, %block, "condition recorded");
        self.conditions.push(Condition {
            expr,
            block,
            line,
            branch,
        });
    }

    // ---- expression versioning ----

    /// Rename every free variable leaf of `e` to its version in `block`.
    pub fn update_expression(&self, e: &Expr, block: BlockId) -> Expr {
        let mut bound = Vec::new();
        self.update_inner(e, block, &mut bound)
    }

    fn update_inner(&self, e: &Expr, block: BlockId, bound: &mut Vec<String>) -> Expr {
        match e.op() {
            Op::Variable | Op::ArrayVariable => {
                let name = e.value().unwrap_or_default();
                if bound.iter().any(|b| b.as_str() == name) {
                    return e.clone();
                }
                let renamed = self.addenda.render(block, name);
                if renamed == name {
                    e.clone()
                } else {
                    self.rebuild_leaf(e, renamed)
                }
            }
            Op::Function => {
                let formal_count = e.arg_count() - 1;
                for formal in &e.args()[..formal_count] {
                    bound.push(formal.value().unwrap_or_default().to_string());
                }
                let body = self.update_inner(e.get_parameter(formal_count), block, bound);
                bound.truncate(bound.len() - formal_count);
                e.update_parameter(formal_count, body)
            }
            op if op.is_leaf() => e.clone(),
            _ => {
                let mut out = e.clone();
                for i in 0..e.arg_count() {
                    let child = self.update_inner(e.get_parameter(i), block, bound);
                    if child != *e.get_parameter(i) {
                        out = out.update_parameter(i, child);
                    }
                }
                out
            }
        }
    }

    pub(crate) fn rebuild_leaf(&self, e: &Expr, name: String) -> Expr {
        let leaf = match e.op() {
            Op::Variable => Expr::variable(name, e.bits()),
            Op::ArrayVariable => Expr::array_variable(name, e.bits()),
            _ => unreachable!("rebuild_leaf on non-variable leaf"),
        };
        match e.ty() {
            Some(t) => leaf.with_type(t.clone()),
            None => leaf,
        }
    }

    // ---- assignment dispatch ----

    /// Structural recursion on the destination shape; see the dispatch table
    /// in the module documentation of [`crate`].
    pub(crate) fn generate_and_log_assignment(&mut self, dst: Expr, src: Expr) -> Result<()> {
        match dst.op() {
            Op::Concat => {
                let hi = dst.get_parameter(0).clone();
                let lo = dst.get_parameter(1).clone();
                let lo_bits = lo.bits();
                let hi_slice = simplify(&Expr::bit_extract(src.clone(), lo_bits, dst.bits() - 1));
                let lo_slice = simplify(&Expr::bit_extract(src, 0, lo_bits - 1));
                self.generate_and_log_assignment(hi, hi_slice)?;
                self.generate_and_log_assignment(lo, lo_slice)
            }
            Op::ZeroExtend | Op::SignExtend => {
                let x = dst.get_parameter(0).clone();
                let truncated = simplify(&Expr::bit_extract(src, 0, x.bits() - 1));
                self.generate_and_log_assignment(x, truncated)
            }
            Op::BitExtract => {
                let x = dst.get_parameter(0).clone();
                let lo = dst.get_parameter(1).const_value().unwrap_or(0) as u32;
                let hi = dst.get_parameter(2).const_value().unwrap_or(0) as u32;
                // Reassemble x around the stored slice.
                let mut out = if hi + 1 <= x.bits() - 1 {
                    let high = Expr::bit_extract(x.clone(), hi + 1, x.bits() - 1);
                    Expr::concat(high, src)
                } else {
                    src
                };
                if lo > 0 {
                    let low = Expr::bit_extract(x.clone(), 0, lo - 1);
                    out = Expr::concat(out, low);
                }
                self.generate_and_log_assignment(x, simplify(&out))
            }
            Op::Ite => {
                let c = dst.get_parameter(0).clone();
                let a = dst.get_parameter(1).clone();
                let b = dst.get_parameter(2).clone();
                let guarded = simplify(&Expr::ite(c, src.clone(), a.clone()));
                self.generate_and_log_assignment(a, guarded)?;
                self.generate_and_log_assignment(b, src)
            }
            Op::Function => {
                // A pointer destination: record the definitional alias.
                debug!(dst = %dst, "alias recorded");
                self.alias_table.insert(dst, src);
                Ok(())
            }
            Op::Array => self.log_array_assignment(dst, src),
            Op::Variable | Op::ArrayVariable => {
                if dst.ty().is_some_and(|t| t.is_pointer()) {
                    debug!(dst = %dst, "alias recorded");
                    self.alias_table.insert(dst, src);
                    return Ok(());
                }
                if dst.ty().is_some_and(|t| t.is_aggregate()) {
                    let entry = self.base_and_offset(&src);
                    debug!(dst = %dst, base = %entry.0, "aggregate offset recorded");
                    self.aggregate_offset_table.insert(dst, entry);
                    return Ok(());
                }
                self.log_scalar_assignment(dst, src)
            }
            _ => Err(AnalyzerError::Unsupported(format!(
                "assignment destination shape {}",
                dst.op().symbol()
            ))),
        }
    }

    fn log_scalar_assignment(&mut self, dst: Expr, src: Expr) -> Result<()> {
        let name = dst.value().unwrap_or_default().to_string();
        let block = self.cur_block;
        self.addenda.bump(block, &name);
        let renamed = self.addenda.render(block, &name);
        let lhs = self.rebuild_leaf(&dst, renamed);
        let cond = Expr::eq(lhs, src, self.config.word_bits);
        self.push_condition(cond, block, self.cur_line, None);
        Ok(())
    }

    fn log_array_assignment(&mut self, dst: Expr, src: Expr) -> Result<()> {
        let Some((base, levels)) = crate::indices::split_array_chain(&dst) else {
            return Err(AnalyzerError::Unsupported(
                "array store whose base is not an array variable".to_string(),
            ));
        };
        let name = base.value().unwrap_or_default().to_string();
        let block = self.cur_block;
        self.addenda.bump(block, &name);
        let renamed = self.addenda.render(block, &name);
        let new_leaf = self.rebuild_leaf(&base, renamed);
        let store = build_store(&base, &levels, src);
        let cond = Expr::eq(new_leaf, store, self.config.word_bits);
        self.push_condition(cond, block, self.cur_line, None);
        Ok(())
    }

    /// Reduce `src` to its (base aggregate, bit offset) through the
    /// aggregate-offset table; an unknown aggregate is its own base at
    /// offset zero.
    pub(crate) fn base_and_offset(&self, src: &Expr) -> (Expr, Expr) {
        let mut base = src.clone();
        let mut off = Expr::constant(0, self.config.word_bits);
        while let Some((b, o)) = self.aggregate_offset_table.get(&base) {
            if *b == base {
                break;
            }
            off = simplify(&Expr::add(off, o.clone()));
            base = b.clone();
        }
        (base, off)
    }

    // ---- fresh names ----

    pub(crate) fn fresh_temp_var(&mut self, bits: u32) -> Expr {
        let n = self.next_temp_var;
        self.next_temp_var += 1;
        Expr::variable(format!("{}{}", self.config.ident_temp_var, n), bits)
    }

    pub(crate) fn fresh_temp_index(&mut self) -> u32 {
        let n = self.next_temp_index;
        self.next_temp_index += 1;
        n
    }

    pub(crate) fn fresh_temp_ptr_name(&mut self) -> String {
        let n = self.next_temp_ptr;
        self.next_temp_ptr += 1;
        format!("{}{}", self.config.ident_temp_ptr, n)
    }

    fn post_process(&mut self) -> Result<()> {
        self.compute_array_dimensions();
        self.replace_indices()?;
        self.lower_array_accesses();
        self.append_divisor_guards();
        Ok(())
    }
}

/// Nested store chain for an assignment through an index chain:
/// one level gives `store(a, i, v)`; deeper levels rebuild the inner
/// array first, `store(a, i, store(select(a, i), j, v))`.
fn build_store(array: &Expr, levels: &[(Expr, u32)], value: Expr) -> Expr {
    let (index, elem_bits) = &levels[0];
    if levels.len() == 1 {
        Expr::store(array.clone(), index.clone(), value)
    } else {
        let inner = Expr::select(array.clone(), index.clone(), *elem_bits);
        let stored = build_store(&inner, &levels[1..], value);
        Expr::store(array.clone(), index.clone(), stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gametime_ir::{CType, FunctionUnitBuilder};

    fn unit_with_block() -> (gametime_ir::FunctionUnit, BlockId) {
        let mut b = FunctionUnitBuilder::new("t");
        let b0 = b.add_block();
        (b.finish(), b0)
    }

    fn strings(path: &Path<'_>) -> Vec<String> {
        path.conditions
            .iter()
            .map(|c| c.expr.value_string())
            .collect()
    }

    #[test]
    fn concat_destination_splits_the_source() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let dst = Expr::concat(Expr::variable("hi", 16), Expr::variable("lo", 16));
        let src = Expr::variable("s", 32);
        path.generate_and_log_assignment(dst, src).unwrap();
        assert_eq!(
            strings(&path),
            vec!["(hi<1> == s[31:16])", "(lo<1> == s[15:0])"]
        );
    }

    #[test]
    fn extend_destination_truncates_the_source() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let dst = Expr::zero_extend(Expr::variable("x", 16), 16);
        let src = Expr::variable("s", 32);
        path.generate_and_log_assignment(dst, src).unwrap();
        assert_eq!(strings(&path), vec!["(x<1> == s[15:0])"]);
    }

    #[test]
    fn extract_destination_reassembles_the_variable() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let dst = Expr::bit_extract(Expr::variable("x", 32), 8, 15);
        let src = Expr::variable("s", 8);
        path.generate_and_log_assignment(dst, src).unwrap();
        assert_eq!(
            strings(&path),
            vec!["(x<1> == ((x[31:16] ++ s) ++ x[7:0]))"]
        );
    }

    #[test]
    fn ite_destination_guards_the_first_arm() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let c = Expr::variable("c", 32);
        let dst = Expr::ite(c, Expr::variable("a", 32), Expr::variable("b", 32));
        let src = Expr::variable("s", 32);
        path.generate_and_log_assignment(dst, src).unwrap();
        assert_eq!(
            strings(&path),
            vec!["(a<1> == ite(c, s, a))", "(b<1> == s)"]
        );
    }

    #[test]
    fn pointer_destination_records_an_alias_only() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let dst = Expr::array_variable("p", 32).with_type(CType::pointer(CType::int(32), 32));
        let src = Expr::array_variable("q", 32).with_type(CType::pointer(CType::int(32), 32));
        path.generate_and_log_assignment(dst.clone(), src.clone()).unwrap();
        assert!(path.conditions.is_empty());
        assert_eq!(path.alias_table.get(&dst), Some(&src));
    }

    #[test]
    fn aggregate_destination_records_base_and_offset() {
        let (unit, b0) = unit_with_block();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        let decl = std::sync::Arc::new(gametime_ir::AggregateType {
            name: "S".to_string(),
            bits: 32,
            is_union: false,
            fields: Vec::new(),
        });
        let dst = Expr::variable("s", 32).with_type(CType::aggregate(decl.clone()));
        let src = Expr::variable("r", 32).with_type(CType::aggregate(decl));
        path.generate_and_log_assignment(dst.clone(), src.clone()).unwrap();
        assert!(path.conditions.is_empty());
        let (base, off) = path.aggregate_offset_table.get(&dst).unwrap();
        assert_eq!(base, &src);
        assert!(off.is_const(0));
    }

    #[test]
    fn update_expression_skips_bound_formals() {
        let mut builder = FunctionUnitBuilder::new("t");
        let b0 = builder.add_block();
        let unit = builder.finish();
        let config = AnalyzerConfig::default();
        let mut path = Path::new(&unit, &config, &[b0]).unwrap();
        path.addenda.bump(b0, "x");
        path.addenda.bump(b0, "y");
        let x = Expr::variable("x", 32);
        let y = Expr::variable("y", 32);
        let f = Expr::function(vec![x.clone()], Expr::add(x, y));
        let updated = path.update_expression(&f, b0);
        // The formal x stays; the free y picks up its version.
        assert_eq!(updated.value_string(), "(f (x) (x + y<1>))");
    }

    #[test]
    fn path_validation_rejects_cycles_and_foreign_blocks() {
        let mut builder = FunctionUnitBuilder::new("t");
        let b0 = builder.add_block();
        let unit = builder.finish();
        let config = AnalyzerConfig::default();
        assert!(matches!(
            Path::new(&unit, &config, &[b0, b0]),
            Err(AnalyzerError::MalformedIr(_))
        ));
        assert!(matches!(
            Path::new(&unit, &config, &[]),
            Err(AnalyzerError::MalformedIr(_))
        ));
        let mut other = FunctionUnitBuilder::new("o");
        let o0 = other.add_block();
        let o1 = other.add_block();
        let _ = (o0, other.finish());
        assert!(matches!(
            Path::new(&unit, &config, &[o1]),
            Err(AnalyzerError::FunctionUnit(_))
        ));
    }
}
