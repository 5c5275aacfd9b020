mod config;
mod constants;
mod error;
mod stats;
mod transaction;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use stats::*;
pub use transaction::*;
