//! SMT lowering: QF_AUFBV queries from analyzed paths
//!
//! [`lower_path`] serializes a finished path to an SMT-LIB v2 string wrapped
//! in a [`Query`], which also carries the bookkeeping a driver needs to map
//! an unsat core back to condition indices.

mod lower;

pub use lower::lower_path;

use thiserror::Error;

/// Errors during query serialization.
#[derive(Debug, Error)]
pub enum LowerError {
    /// An operator with no QF_AUFBV spelling survived into a condition;
    /// pointer and aggregate machinery must be resolved before lowering.
    #[error("operator {0} cannot appear in a lowered condition")]
    UnsupportedOperator(String),

    #[error("malformed expression: {0}")]
    MalformedExpression(String),
}

/// A serialized satisfiability query plus the constraint-boolean census.
#[derive(Debug, Clone)]
pub struct Query {
    smt: String,
    num_constraints: usize,
    constraint_ident: String,
}

impl Query {
    pub(crate) fn new(smt: String, num_constraints: usize, constraint_ident: String) -> Self {
        Self {
            smt,
            num_constraints,
            constraint_ident,
        }
    }

    /// The QF_AUFBV query text.
    pub fn smt(&self) -> &str {
        &self.smt
    }

    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    /// The declared name of constraint boolean `k`.
    pub fn constraint_name(&self, k: usize) -> String {
        format!("{}{}", self.constraint_ident, k)
    }

    /// Map solver-returned unsat-core labels back to condition indices by
    /// stripping the constraint prefix. Labels that are not constraint
    /// booleans are ignored.
    pub fn unsat_core_indices<I, S>(&self, labels: I) -> Vec<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices: Vec<usize> = labels
            .into_iter()
            .filter_map(|label| {
                label
                    .as_ref()
                    .strip_prefix(self.constraint_ident.as_str())
                    .and_then(|rest| rest.parse().ok())
            })
            .filter(|&k| k < self.num_constraints)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_round_trip() {
        let q = Query::new(String::new(), 3, "gtCONSTRAINT".to_string());
        assert_eq!(q.constraint_name(2), "gtCONSTRAINT2");
        assert_eq!(
            q.unsat_core_indices(["gtCONSTRAINT2", "gtCONSTRAINT0", "other"]),
            vec![0, 2]
        );
        // Out-of-range labels are dropped.
        assert_eq!(q.unsat_core_indices(["gtCONSTRAINT9"]), Vec::<usize>::new());
    }
}
