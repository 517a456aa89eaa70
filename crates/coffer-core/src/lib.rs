pub mod config;
pub mod encoding;
pub mod error;
pub mod master_key;

pub use error::{CofferError, CofferResult};
