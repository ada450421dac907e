//! The adopt-or-create reconciliation pipelines: one module per top-level
//! operation, each walking its resources in the order the engine commits
//! persistence rows.

mod create;
mod delete;
mod stop_start;
mod update;

pub use create::create;
pub use delete::delete;
pub use stop_start::{start, stop};
pub use update::update;
