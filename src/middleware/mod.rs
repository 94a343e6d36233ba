//! Initializer decorators.
//!
//! A decorator takes an initializer and returns a new one with the same
//! `(Setter, Getter, StoreApi) -> T` shape, so decorators compose by nesting:
//!
//! ```
//! use stashbox::create_store;
//! use stashbox::middleware::{logger, persist, MemoryStorage, PersistOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let options = PersistOptions::new("test_persist", Arc::new(MemoryStorage::new()));
//! let store = create_store(logger(persist(
//!     |_set, _get, _api| json!({ "aaa": "", "bbb": "" }),
//!     options,
//! )));
//! assert_eq!(store.get_state()["bbb"], "");
//! ```
//!
//! A decorator intercepts writes by handing its own [`Setter`](crate::Setter)
//! to the initializer it wraps, and may also replace the store's own setter
//! through [`StoreApi::wrap_set_state`](crate::StoreApi::wrap_set_state).

mod logger;
mod persist;
mod storage;

pub use logger::logger;
pub use persist::{persist, Persist, PersistOptions};
pub use storage::{FileStorage, MemoryStorage, StateStorage};
