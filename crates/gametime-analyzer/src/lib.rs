//! Backward symbolic execution of one acyclic path through a C function's
//! SSA control-flow graph
//!
//! The analyzer walks a chosen block sequence, traces every conditional
//! branch and every assignment to a non-temporary backwards through the IR,
//! and accumulates a list of condition expressions whose satisfying input
//! valuations drive the program down exactly that path. Pointers become
//! Church-encoded dereferencing functions, aggregates become per-field
//! arrays, array indices are replaced by anchored temporaries, and every
//! division picks up a divisor-nonzero guard.
//!
//! The assignment dispatch (destination shape → action):
//!
//! | Destination | Action |
//! |---|---|
//! | `concat(hi, lo)` | split the source at the boundary, recurse twice |
//! | `zero_extend`/`sign_extend` | truncate the source, recurse |
//! | `extract` | reassemble the whole variable around the slice, recurse |
//! | `ite(c, a, b)` | recurse on both arms, guarding the first |
//! | pointer | record a definitional alias, no condition |
//! | aggregate | record a base/offset entry, no condition |
//! | `a[i]` | bump the array's version, emit a `store` equality |
//! | scalar | bump the variable's version, emit an equality |
//!
//! The crate is single-threaded and synchronous; all mutable state is
//! scoped to one [`Path`] and nothing global is written after the operator
//! registry is initialized.

mod addendum;
mod config;
mod dump;
mod error;
mod executor;
mod indices;
mod memory;
mod path;

pub use addendum::{original_name, versioned, PathAddenda};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, ArrayModel, Endianness};
pub use error::{AnalyzerError, AnalyzerWarning, Result};
pub use memory::AggregateField;
pub use path::{Condition, Path};
