pub mod error;
pub mod model;
pub mod sizes;

pub use error::{Error, ErrorKind, Result};
