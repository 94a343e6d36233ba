use super::{use_sync_external_store, ExternalStore, OnStoreChange};
use crate::error::BindingError;
use crate::store::{create_store, Getter, Merge, Setter, StoreApi, Unsubscribe};
use std::ops::Deref;
use std::sync::Arc;

type Selector<T, U> = Arc<dyn Fn(&Arc<T>) -> U + Send + Sync>;

/// A store seen through a selector, in the shape [`ExternalStore`] expects.
///
/// Subscribing forwards straight to the store and drops the
/// `(next, previous)` payload. Reading applies the selector to the current
/// state on every call; nothing is cached here.
pub struct StoreBinding<T: Merge, U> {
    store: StoreApi<T>,
    selector: Selector<T, U>,
    equal: fn(&U, &U) -> bool,
}

impl<T: Merge, U: PartialEq> StoreBinding<T, U> {
    /// Bind `store` through `selector`. Selected values compare with
    /// `PartialEq`.
    pub fn new<S>(store: &StoreApi<T>, selector: S) -> Self
    where
        S: Fn(&Arc<T>) -> U + Send + Sync + 'static,
    {
        Self {
            store: store.clone(),
            selector: Arc::new(selector),
            equal: |a, b| a == b,
        }
    }
}

impl<T: Merge> StoreBinding<T, Arc<T>> {
    /// Bind the whole state. Snapshots compare by pointer.
    pub fn identity(store: &StoreApi<T>) -> Self {
        Self {
            store: store.clone(),
            selector: Arc::new(|state: &Arc<T>| Arc::clone(state)),
            equal: |a, b| Arc::ptr_eq(a, b),
        }
    }
}

impl<T: Merge, U> StoreBinding<T, U> {
    /// The bound store.
    pub fn store(&self) -> &StoreApi<T> {
        &self.store
    }
}

impl<T, U> ExternalStore for StoreBinding<T, U>
where
    T: Merge,
    U: Clone + Send + Sync + 'static,
{
    type Snapshot = U;

    fn subscribe(&self, on_store_change: OnStoreChange) -> Unsubscribe {
        self.store.subscribe(move |_next, _previous| on_store_change())
    }

    fn get_snapshot(&self) -> U {
        (self.selector)(&self.store.get_state())
    }

    fn snapshots_equal(&self, a: &U, b: &U) -> bool {
        (self.equal)(a, b)
    }

    fn same_source(&self, other: &Self) -> bool {
        self.store.ptr_eq(&other.store)
    }
}

/// Read a slice of `store` from inside a component render.
///
/// The component re-renders when the selected value changes, and the value
/// returned within one render is never older or newer than what the store's
/// listeners have seen. Selectors must be pure and cheap: they run on every
/// render and on every store update.
///
/// # Errors
///
/// See [`use_sync_external_store`].
pub fn use_store<T, U, S>(store: &StoreApi<T>, selector: S) -> Result<U, BindingError>
where
    T: Merge,
    U: Clone + PartialEq + Send + Sync + 'static,
    S: Fn(&Arc<T>) -> U + Send + Sync + 'static,
{
    use_sync_external_store(StoreBinding::new(store, selector))
}

/// A store bundled with its hooks.
///
/// Derefs to [`StoreApi`], so `get_state`, `set_state`, `subscribe` and
/// `destroy` are available directly for use outside of rendering.
pub struct BoundHook<T: Merge> {
    store: StoreApi<T>,
}

impl<T: Merge> BoundHook<T> {
    /// Read the whole state inside a render.
    pub fn use_store(&self) -> Result<Arc<T>, BindingError> {
        use_sync_external_store(StoreBinding::identity(&self.store))
    }

    /// Read a slice of the state inside a render.
    pub fn use_selector<U, S>(&self, selector: S) -> Result<U, BindingError>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        S: Fn(&Arc<T>) -> U + Send + Sync + 'static,
    {
        use_store(&self.store, selector)
    }

    /// The underlying store handle.
    pub fn api(&self) -> &StoreApi<T> {
        &self.store
    }
}

impl<T: Merge> Clone for BoundHook<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Merge> Deref for BoundHook<T> {
    type Target = StoreApi<T>;

    fn deref(&self) -> &StoreApi<T> {
        &self.store
    }
}

impl<T: Merge> std::fmt::Debug for BoundHook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoundHook").field(&self.store).finish()
    }
}

/// Build a store from `initializer` and return it bound to its hooks.
///
/// # Examples
///
/// ```
/// use stashbox::create_bound_hook;
/// use stashbox::runtime::RenderRuntime;
/// use serde_json::json;
///
/// let use_form = create_bound_hook(|_set, _get, _api| json!({ "aaa": "x" }));
/// let component = RenderRuntime::new();
///
/// let len = component.render(|| {
///     use_form
///         .use_selector(|s| s["aaa"].as_str().map_or(0, str::len))
///         .unwrap()
/// });
/// assert_eq!(len, 1);
///
/// use_form.set_patch(json!({ "aaa": "xyz" }));
/// assert!(component.needs_render());
/// ```
pub fn create_bound_hook<T, F>(initializer: F) -> BoundHook<T>
where
    T: Merge,
    F: FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T,
{
    BoundHook {
        store: create_store(initializer),
    }
}
