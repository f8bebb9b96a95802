pub mod deadline;
pub mod error;
pub mod signal;

pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
