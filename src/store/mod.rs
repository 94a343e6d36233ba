//! Observable state stores.
//!
//! A store owns a single state value and the set of listeners interested in
//! it. Updates are synchronous: the new value is committed, then every
//! listener is called in subscription order before `set_state` returns.

mod merge;
mod store;

pub use merge::Merge;
pub use store::{
    create_store, Candidate, Getter, Listener, Setter, StoreApi, Unsubscribe, Update,
};
