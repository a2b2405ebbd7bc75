//! A render-graph context sitting above a thin, backend-agnostic GPU
//! abstraction.
//!
//! Client code drives a small number of [`Queue`](queue::Queue)s through
//! [`Context`](context::Context), recording typed commands, then calls
//! [`Context::execute_all`](context::Context::execute_all) once per frame.
//! `execute_all` walks every queue's pending commands twice: a
//! pseudo-execution pass that resolves swap-chain state, propagates
//! per-subresource access history and computes the barrier set, and a
//! recording pass that emits native calls through the [`Backend`](backend::Backend)
//! trait and submits.
//!
//! This crate never talks to a concrete GPU API - `Backend` is a trait
//! contract an external crate implements, the way `autograph-render`'s
//! examples plug in `render-gl`.

pub mod access;
pub mod backend;
pub mod cache;
pub mod command;
pub mod config;
pub mod context;
pub mod descriptor_materializer;
pub mod error;
pub mod graveyard;
pub mod ids;
pub mod image_data;
pub mod logging;
pub mod memory;
pub mod queue;
pub mod resources;
pub mod staging;
pub mod transition;

/// An in-memory `Backend` implementation for tests - not behind `#[cfg(test)]`
/// so integration tests under `tests/` can use it too.
pub mod mock;

pub use context::Context;
pub use error::{Error, Result};
pub use queue::Queue;
