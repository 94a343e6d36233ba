//! Host-side rendering support for store bindings.
//!
//! This module provides the component model hooks run inside: per-component
//! hook slots, the thread-local render context, and re-render scheduling.

mod context;

pub use context::{RenderRuntime, MAX_RENDER_PASSES};
pub(crate) use context::{lock, Hook};
