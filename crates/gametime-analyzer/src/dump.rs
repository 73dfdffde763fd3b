//! Sidecar artifact writers
//!
//! One ASCII artifact per writer, emitted from a finished [`Path`]. Callers
//! own the writers (and therefore the files); everything here is plain
//! `io::Write`, so the artifacts can go to files, buffers or pipes alike.

use crate::path::Path;
use std::io::{self, Write};

impl<'u> Path<'u> {
    /// Condition expressions, one per line, in path order.
    pub fn dump_conditions<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for cond in &self.conditions {
            writeln!(w, "{}", cond.expr)?;
        }
        Ok(())
    }

    /// Sorted unique source line numbers, space-separated on one line.
    pub fn dump_line_numbers<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let lines: Vec<String> = self.line_numbers().map(|l| l.to_string()).collect();
        writeln!(w, "{}", lines.join(" "))
    }

    /// Per-condition edges `k: src sink`. The two mapping functions adjust
    /// IR block ids to DAG node ids; the sink is the block the path enters
    /// after the condition's block (the block itself for the final block).
    pub fn dump_condition_edges<W, F, G>(&self, w: &mut W, src_id: F, sink_id: G) -> io::Result<()>
    where
        W: Write,
        F: Fn(gametime_ir::BlockId) -> i64,
        G: Fn(gametime_ir::BlockId) -> i64,
    {
        for (k, cond) in self.conditions.iter().enumerate() {
            let sink = self.successor_on_path(cond.block).unwrap_or(cond.block);
            writeln!(w, "{}: {} {}", k, src_id(cond.block), sink_id(sink))?;
        }
        Ok(())
    }

    /// Conditional-branch line numbers with the direction the path takes,
    /// one `line: True|False` per line.
    pub fn dump_branch_directions<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for cond in &self.conditions {
            if let Some(direction) = cond.branch {
                writeln!(
                    w,
                    "{}: {}",
                    cond.line,
                    if direction { "True" } else { "False" }
                )?;
            }
        }
        Ok(())
    }

    /// Witnessed array accesses as `name: [(idx0, idx1, …)]`, one per
    /// access, followed by the aggregate-field index expressions as
    /// `k: <expression>` with index brackets and the temporary-index prefix
    /// stripped.
    pub fn dump_array_accesses<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for (name, numbers) in &self.array_accesses {
            let rendered: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
            writeln!(w, "{}: [({})]", name, rendered.join(", "))?;
        }
        let field_prefix = &self.config().ident_field;
        let index_prefix = &self.config().ident_temp_index;
        let mut aggregate_indices: Vec<u32> = self
            .array_accesses
            .iter()
            .filter(|(name, _)| name.starts_with(field_prefix.as_str()))
            .flat_map(|(_, numbers)| numbers.iter().copied())
            .collect();
        aggregate_indices.sort_unstable();
        aggregate_indices.dedup();
        for k in aggregate_indices {
            if let Some(expr) = self.temporary_index_expressions.get(&k) {
                let text = expr
                    .value_string()
                    .replace(index_prefix.as_str(), "")
                    .replace(['[', ']'], "");
                writeln!(w, "{k}: {text}")?;
            }
        }
        Ok(())
    }

    /// Simulated expressions as `k: <expression>`, one per line.
    pub fn dump_simulated<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for (k, expr) in self.simulated.iter().enumerate() {
            writeln!(w, "{k}: {expr}")?;
        }
        Ok(())
    }
}
