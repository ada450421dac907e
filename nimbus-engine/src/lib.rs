pub mod context;
pub mod messages;
pub mod reconcile;
pub mod router;
pub mod waiter;

pub use context::EngineContext;
pub use router::{RouteKey, TaskRouter};
pub use waiter::{AsyncWaiter, ResourceWaiter};
