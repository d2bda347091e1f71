//! ELT execution core
//!
//! - [`table`]: table specs and how a run's table set is resolved
//! - [`window`]: date windows and query template substitution
//! - [`extract`]: source query into a [`crate::batch::Batch`]
//! - [`load`]: transactional truncate plus multi-row insert
//! - [`orchestrator`]: drives extract and load over a table set
//! - [`bootstrap`]: runs the warehouse DDL before the first load

pub mod bootstrap;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod table;
pub mod window;

pub use bootstrap::bootstrap;
pub use extract::extract;
pub use load::{LoadMode, LoadPlan, LoadReport, MultiRowInsert, build_insert_statements, load};
pub use orchestrator::{Orchestrator, RunReport, RunSettings, RunState, TableOutcome};
pub use table::{LoadKind, TableKind, TableSource, TableSpec, resolve_tables, validate_identifier};
pub use window::{DateWindow, substitute_window};
