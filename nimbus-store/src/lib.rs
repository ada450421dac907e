mod audit;
mod resources;
mod store;

pub use audit::AuditLogExt;
pub use resources::ResourceStoreExt;
pub use store::Store;
