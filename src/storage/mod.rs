//! Report Store
//!
//! Content-addressed persistence of analysis reports on the local
//! filesystem: one `<contentHash>.json` per unique hash.

mod report_store;

pub use report_store::{ReportStore, StoreError};
