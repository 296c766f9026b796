// Core types and functionality for the OpenPaye relay

pub mod types;
pub mod error;
pub mod payroll;
pub mod storage;

pub use error::ValidationError;
pub use types::*;
