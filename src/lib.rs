//! Upload Analyzer Library
//!
//! Streaming upload analysis with one isolated worker per upload and
//! content-addressed reports on disk. The binary in main.rs wires these
//! pieces into the supervisor, request server and archive commands.
//!
//! # Modules
//!
//! - `analysis`: Analysis Worker, line counting and report validation
//! - `storage`: Report Store keyed by content hash
//! - `archive`: Archive Job over the reports directory
//! - `routes`: HTTP surface (`POST /upload`, `GET /archive`)
//! - `server`: One request server process
//! - `supervisor`: Keeps N request server processes alive

pub mod analysis;
pub mod archive;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage;
pub mod supervisor;
