//! cairn-storage: moving bytes in and out of the storage network
//!
//! Every call into a [`ContentStore`] made by [`TransferClient`] goes through
//! [`retry::run_with_retry`], and payloads are optionally wrapped by the
//! content cipher before they leave the process.

pub mod client;
pub mod operator;
pub mod retry;
pub mod store;

pub use client::{TransferClient, TransferError};
pub use operator::{build_from_core_config, build_operator, S3Credentials};
pub use retry::{run_with_retry, run_with_retry_with, RetryPolicy};
pub use store::{ContentStore, OpendalStore};
