//! # Stashbox
//!
//! Minimal observable state stores with tearing-free bindings for rendering
//! components.
//!
//! Stashbox is split into two layers:
//!
//! ## Store (state container)
//!
//! A single state value behind a small API:
//! - `get_state` - Current snapshot as an `Arc<T>`
//! - `set_state` - Shallow-merge or replace, then notify listeners in order
//! - `subscribe` / `destroy` - Listener management
//!
//! Stores are built from an initializer that receives the store's own
//! setter and getter, so actions can live inside the state they modify.
//!
//! ## Binding (rendering glue)
//!
//! Hooks that read a selected slice of a store inside a component render:
//! - `use_store` - Read through a selector
//! - `BoundHook<T>` - A store plus its hooks in one handle
//! - `RenderRuntime` - The component model hooks run in
//!
//! Decorators in [`middleware`] add logging and persistence without
//! changing the store's contract.

pub mod binding;
pub mod error;
pub mod middleware;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use binding::{create_bound_hook, use_store, BoundHook, StoreBinding};
pub use error::{BindingError, PersistError};
pub use store::{create_store, Candidate, Getter, Merge, Setter, StoreApi, Unsubscribe, Update};
