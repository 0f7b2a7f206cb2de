pub mod config;
pub mod error;
pub mod types;

pub use error::{LumosError, LumosResult};
pub use types::CodeRecord;
