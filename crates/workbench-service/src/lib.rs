#![warn(missing_docs)]
//! `workbench-service` - the worker boundary for `workbench-core`.
//!
//! The core pipeline is transport-agnostic. This crate carries its requests and responses
//! across a byte stream: every message is a `Content-Length` framed JSON body
//! ([`MessageCodec`]), requests run on a background [`Worker`], and [`serve`] ties both to a
//! reader/writer pair. The `workbench-worker` binary serves stdio with the grammar languages
//! of `workbench-grammar`.

pub mod codec;
pub mod worker;

pub use codec::{CodecConfig, CodecError, MessageCodec};
pub use worker::{Worker, WorkerError, serve};
