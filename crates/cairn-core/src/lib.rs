pub mod config;
pub mod error;
pub mod types;

pub use error::{CairnError, CairnResult};
pub use types::{ContentId, SecretRecord};
