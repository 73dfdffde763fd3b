//! GameTime symbolic path analysis
//!
//! Facade over the analysis stack: IR contract (`gametime-ir`), expression
//! algebra (`gametime-expr`), backward symbolic executor and path analyzer
//! (`gametime-analyzer`), and QF_AUFBV lowering (`gametime-smt`).
//!
//! The one-call entry point is [`analyze_path`]: given a function unit, a
//! configuration and an ordered block list, it produces the analyzed
//! [`Path`] (conditions, tables, warnings, dump writers) together with the
//! serialized [`Query`].
//!
//! ```no_run
//! use gametime::{analyze_path, AnalyzerConfig, CType, FunctionUnitBuilder};
//!
//! let mut b = FunctionUnitBuilder::new("f");
//! let block = b.add_block();
//! let unit = b.finish();
//! let config = AnalyzerConfig::default();
//! let analyzed = analyze_path(&unit, &config, &[block]).unwrap();
//! println!("{}", analyzed.query.smt());
//! ```

pub use gametime_analyzer::{
    original_name, versioned, AggregateField, AnalyzerConfig, AnalyzerConfigBuilder,
    AnalyzerError, AnalyzerWarning, ArrayModel, Condition, Endianness, Path, PathAddenda,
};
pub use gametime_expr::{operators, simplify, Arity, Expr, Op, OpKind, OperatorStore};
pub use gametime_ir::{
    AggregateType, BlockData, BlockId, CType, CmpKind, Field, FunctionUnit, FunctionUnitBuilder,
    InstrData, InstrId, InstrKind, OperandData, OperandId, OperandKind, ValueOp,
};
pub use gametime_smt::{lower_path, LowerError, Query};

use thiserror::Error;

/// Any failure of the full analyze-and-lower pipeline.
#[derive(Debug, Error)]
pub enum GametimeError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Lower(#[from] LowerError),
}

/// A finished analysis: the path with all its tables, and the query.
#[derive(Debug)]
pub struct AnalyzedPath<'u> {
    pub path: Path<'u>,
    pub query: Query,
}

/// Analyze one acyclic path through `unit` and serialize its query.
pub fn analyze_path<'u>(
    unit: &'u FunctionUnit,
    config: &'u AnalyzerConfig,
    blocks: &[BlockId],
) -> Result<AnalyzedPath<'u>, GametimeError> {
    let mut path = Path::new(unit, config, blocks)?;
    path.generate_conditions_and_assignments()?;
    let query = lower_path(&path)?;
    Ok(AnalyzedPath { path, query })
}
