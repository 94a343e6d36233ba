//! Bindings between stores and rendering components.
//!
//! A binding lets a component read a selected slice of a store without
//! tearing: within one render every hook sees the same store generation, and
//! an update that lands between renders is never missed.

mod hook;
mod sync;

pub use hook::{create_bound_hook, use_store, BoundHook, StoreBinding};
pub use sync::{use_sync_external_store, ExternalStore, OnStoreChange};
