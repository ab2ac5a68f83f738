//! The domain layer: pure models, the error taxonomy, and the port traits
//! adapters must implement. No I/O lives here.

pub mod errors;
pub mod models;
pub mod ports;
