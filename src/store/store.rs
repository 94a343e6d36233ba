use super::Merge;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Callback invoked with `(next, previous)` after every accepted update.
pub type Listener<T> = Arc<dyn Fn(&Arc<T>, &Arc<T>) + Send + Sync>;

type SetFn<T> = dyn Fn(Update<T>, bool) + Send + Sync;
type GetFn<T> = dyn Fn() -> Option<Arc<T>> + Send + Sync;

/// Candidate next value produced by an update.
pub enum Candidate<T: Merge> {
    /// A complete value. Installed as-is when replacing, and otherwise merged
    /// over the state where [`Merge::merge_whole`] allows it.
    Whole(Arc<T>),
    /// A partial value, shallow-merged into the current state. Installed as
    /// the whole state when replacing, where [`Merge::from_patch`] allows it.
    Patch(T::Patch),
}

impl<T: Merge> Candidate<T> {
    /// Wrap a complete value.
    pub fn whole(value: T) -> Self {
        Candidate::Whole(Arc::new(value))
    }
}

/// Argument to [`StoreApi::set_state`]: either a candidate value, or a
/// function computing one from the current state.
pub enum Update<T: Merge> {
    Now(Candidate<T>),
    With(Box<dyn FnOnce(&Arc<T>) -> Candidate<T>>),
}

impl<T: Merge> Update<T> {
    /// An update that patches the current state.
    pub fn patch(patch: T::Patch) -> Self {
        Update::Now(Candidate::Patch(patch))
    }

    /// An update that installs a complete value.
    pub fn whole(value: T) -> Self {
        Update::Now(Candidate::whole(value))
    }

    /// An update computed from the current state.
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&Arc<T>) -> Candidate<T> + 'static,
    {
        Update::With(Box::new(f))
    }
}

impl<T: Merge> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Now(Candidate::Whole(_)) => f.write_str("Update::Now(Whole)"),
            Update::Now(Candidate::Patch(_)) => f.write_str("Update::Now(Patch)"),
            Update::With(_) => f.write_str("Update::With(..)"),
        }
    }
}

/// Cloneable handle to a store's `set_state` function.
///
/// Decorators substitute their own `Setter` to observe or extend writes; the
/// `(update, replace)` signature is the same at every layer.
pub struct Setter<T: Merge>(Arc<SetFn<T>>);

impl<T: Merge> Setter<T> {
    /// Build a setter from a raw `(update, replace)` function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Update<T>, bool) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Apply `update`, replacing instead of merging when `replace` is true.
    pub fn call(&self, update: Update<T>, replace: bool) {
        (self.0)(update, replace)
    }

    /// Shallow-merge `patch` into the current state.
    pub fn patch(&self, patch: T::Patch) {
        self.call(Update::patch(patch), false);
    }

    /// Replace the whole state with `value`.
    pub fn replace(&self, value: T) {
        self.call(Update::whole(value), true);
    }

    /// Compute a candidate from the current state and apply it.
    ///
    /// `f` may itself write to the store; see
    /// [`StoreApi::set_state_with`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Arc<T>) -> Candidate<T> + 'static,
    {
        self.call(Update::with(f), false);
    }

    /// Compute a patch from the current state and merge it.
    pub fn patch_with<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T::Patch + 'static,
    {
        self.update(move |state| Candidate::Patch(f(state)));
    }
}

impl<T: Merge> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Cloneable handle to a store's `get_state` function.
pub struct Getter<T: Merge>(Arc<GetFn<T>>);

impl<T: Merge> Getter<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self(Arc::new(move || Some(f())))
    }

    /// Current state snapshot.
    ///
    /// # Panics
    ///
    /// Panics while the store's initializer is still running.
    pub fn get(&self) -> Arc<T> {
        match (self.0)() {
            Some(state) => state,
            None => panic!("store state read before its initializer returned"),
        }
    }

    /// Current state snapshot, or `None` before the store is initialized.
    pub fn try_get(&self) -> Option<Arc<T>> {
        (self.0)()
    }
}

impl<T: Merge> Clone for Getter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Handle returned by `subscribe`; removes exactly the registration it was
/// issued for.
///
/// Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    remove: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Unsubscribe {
    pub(crate) fn new<F>(remove: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            remove: Some(Arc::new(remove)),
        }
    }

    /// A handle that does nothing when called.
    pub fn noop() -> Self {
        Self { remove: None }
    }

    /// Remove the listener. Calling this more than once has no effect.
    pub fn unsubscribe(&self) {
        if let Some(remove) = &self.remove {
            remove();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("noop", &self.remove.is_none())
            .finish()
    }
}

struct Listeners<T> {
    next_id: usize,
    entries: Vec<(usize, Listener<T>)>,
    destroyed: bool,
}

struct StoreInner<T: Merge> {
    // Empty until the initializer returns.
    state: RwLock<Option<Arc<T>>>,
    // Serializes writers; never held while listeners run.
    commit: Mutex<()>,
    listeners: RwLock<Listeners<T>>,
    setter: RwLock<Option<Setter<T>>>,
}

fn read<G>(lock: &RwLock<G>) -> RwLockReadGuard<'_, G> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<G>(lock: &RwLock<G>) -> RwLockWriteGuard<'_, G> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Merge> StoreInner<T> {
    fn current(&self) -> Option<Arc<T>> {
        read(&self.state).clone()
    }

    fn commit(&self, update: Update<T>, replace: bool) {
        let candidate = match update {
            Update::Now(candidate) => candidate,
            // Runs outside the writer lock so the updater may set state itself.
            Update::With(f) => match self.current() {
                Some(current) => f(&current),
                None => {
                    tracing::warn!("set_state called before the store initializer returned; ignored");
                    return;
                }
            },
        };

        let (next, previous) = {
            let _writer = lock(&self.commit);
            let Some(current) = self.current() else {
                tracing::warn!("set_state called before the store initializer returned; ignored");
                return;
            };

            let next = match candidate {
                Candidate::Whole(value) => {
                    if Arc::ptr_eq(&value, &current) || current.is_same(&value) {
                        tracing::trace!("set_state candidate is the current state; skipped");
                        return;
                    }
                    if replace {
                        value
                    } else {
                        current.merge_whole(&value).map_or(value, Arc::new)
                    }
                }
                Candidate::Patch(patch) => {
                    if current.patch_is_noop(&patch) {
                        tracing::trace!("set_state patch leaves the state unchanged; skipped");
                        return;
                    }
                    if !replace {
                        Arc::new(current.merge(patch))
                    } else {
                        match T::from_patch(patch) {
                            Ok(value) => Arc::new(value),
                            Err(patch) => {
                                tracing::warn!("set_state patch cannot replace the whole state; merging instead");
                                Arc::new(current.merge(patch))
                            }
                        }
                    }
                }
            };

            *write(&self.state) = Some(Arc::clone(&next));
            (next, current)
        };

        let listeners: Vec<Listener<T>> = read(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::trace!(listeners = listeners.len(), replace, "state committed");

        for listener in listeners {
            listener(&next, &previous);
        }
    }

    fn unsubscribe(&self, id: usize) {
        write(&self.listeners).entries.retain(|(entry, _)| *entry != id);
    }
}

/// Shared handle to a store: the `{set_state, get_state, subscribe, destroy}`
/// bundle.
///
/// Every clone refers to the same state and the same listener set. The state
/// is held as an `Arc<T>` that is swapped, never mutated in place, on each
/// accepted update.
///
/// # Examples
///
/// ```
/// use stashbox::{create_store, Candidate};
/// use std::sync::Arc;
///
/// let store = create_store(|_set, _get, _api| 0i64);
/// store.subscribe(|next, previous| assert_eq!(**next, **previous + 1));
/// store.set_state_with(|n| Candidate::Patch(**n + 1));
/// assert_eq!(*store.get_state(), 1);
/// ```
pub struct StoreApi<T: Merge> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Merge> Clone for StoreApi<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Merge> StoreApi<T> {
    fn raw_setter(&self) -> Setter<T> {
        let inner = Arc::downgrade(&self.inner);
        Setter::new(move |update, replace| {
            if let Some(inner) = inner.upgrade() {
                inner.commit(update, replace);
            }
        })
    }

    fn raw_getter(&self) -> Getter<T> {
        let inner = Arc::downgrade(&self.inner);
        Getter(Arc::new(move || inner.upgrade().and_then(|inner| inner.current())))
    }

    /// Current state snapshot.
    ///
    /// # Panics
    ///
    /// Panics when called from inside the store's own initializer, before the
    /// initial state exists.
    pub fn get_state(&self) -> Arc<T> {
        get_or_panic(&self.inner)
    }

    /// Current state snapshot, or `None` while the initializer is running.
    pub fn try_get_state(&self) -> Option<Arc<T>> {
        self.inner.current()
    }

    /// Apply an update through the store's current setter.
    ///
    /// The candidate is discarded when it is the current state itself.
    /// Otherwise it is shallow-merged into the state, or installed in its
    /// place when `replace` is true, then every listener is called in
    /// subscription order. A whole value that cannot be merged (see
    /// [`Merge::merge_whole`]) is installed as-is; a patch that cannot stand
    /// for a whole value (see [`Merge::from_patch`]) is merged even when
    /// replacing, with a warning. A panicking listener
    /// propagates out of this call after the new state has been committed,
    /// and the listeners after it are not called.
    pub fn set_state(&self, update: Update<T>, replace: bool) {
        self.setter().call(update, replace);
    }

    /// Shallow-merge `patch` into the state.
    pub fn set_patch(&self, patch: T::Patch) {
        self.set_state(Update::patch(patch), false);
    }

    /// Compute a candidate from the current state and apply it.
    ///
    /// `f` runs before the write is taken, so it may update the store
    /// itself. Its candidate is then applied to the state as it stands after
    /// those nested updates.
    pub fn set_state_with<F>(&self, f: F)
    where
        F: FnOnce(&Arc<T>) -> Candidate<T> + 'static,
    {
        self.set_state(Update::with(f), false);
    }

    /// Replace the whole state with `value`.
    pub fn replace_state(&self, value: T) {
        self.set_state(Update::whole(value), true);
    }

    /// The setter currently installed for [`set_state`](Self::set_state).
    pub fn setter(&self) -> Setter<T> {
        read(&self.inner.setter)
            .clone()
            .unwrap_or_else(|| self.raw_setter())
    }

    /// Install a new setter built from the current one.
    ///
    /// Used by decorators that must see writes made directly on the store
    /// handle, not only those made by the initializer's actions.
    pub fn wrap_set_state<F>(&self, wrap: F)
    where
        F: FnOnce(Setter<T>) -> Setter<T>,
    {
        let current = self.setter();
        *write(&self.inner.setter) = Some(wrap(current));
    }

    /// Register a callback for every accepted update.
    ///
    /// Each call registers a new listener. Listeners added while a
    /// notification is in progress are first called for the next update.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&Arc<T>, &Arc<T>) + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(listener))
    }

    /// Register a shared listener. Registering the same `Arc` twice keeps a
    /// single registration.
    pub fn subscribe_listener(&self, listener: Listener<T>) -> Unsubscribe {
        let id = {
            let mut listeners = write(&self.inner.listeners);
            if listeners.destroyed {
                tracing::debug!("subscribe called on a destroyed store; ignored");
                return Unsubscribe::noop();
            }

            let existing = listeners
                .entries
                .iter()
                .find(|(_, entry)| same_listener(entry, &listener))
                .map(|(id, _)| *id);

            match existing {
                Some(id) => id,
                None => {
                    let id = listeners.next_id;
                    listeners.next_id += 1;
                    listeners.entries.push((id, listener));
                    id
                }
            }
        };

        let inner: Weak<StoreInner<T>> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.unsubscribe(id);
            }
        })
    }

    /// Remove every listener. The state is kept; later updates still commit
    /// but notify nobody, and later subscriptions are ignored.
    pub fn destroy(&self) {
        let mut listeners = write(&self.inner.listeners);
        if !listeners.destroyed {
            tracing::debug!(listeners = listeners.entries.len(), "store destroyed");
        }
        listeners.destroyed = true;
        listeners.entries.clear();
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        read(&self.inner.listeners).destroyed
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        read(&self.inner.listeners).entries.len()
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Merge> fmt::Debug for StoreApi<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreApi")
            .field("initialized", &self.inner.current().is_some())
            .field("listeners", &self.listener_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn get_or_panic<T: Merge>(inner: &StoreInner<T>) -> Arc<T> {
    match inner.current() {
        Some(state) => state,
        None => panic!("store state read before its initializer returned"),
    }
}

fn same_listener<T>(a: &Listener<T>, b: &Listener<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Build a store from an initializer.
///
/// The initializer receives the store's setter, getter and handle, and
/// returns the initial state. It may capture the setter and getter to build
/// actions that live inside the state. It must not read or write the state
/// while it runs: reads panic and writes are ignored until it returns.
///
/// # Examples
///
/// ```
/// use stashbox::{create_store, Merge};
/// use std::sync::Arc;
///
/// struct Counter {
///     count: i32,
///     inc: Arc<dyn Fn() + Send + Sync>,
/// }
///
/// impl Merge for Counter {
///     type Patch = i32;
///
///     fn merge(&self, count: i32) -> Self {
///         Self { count, inc: Arc::clone(&self.inc) }
///     }
/// }
///
/// let store = create_store(|set, _get, _api| Counter {
///     count: 0,
///     inc: Arc::new(move || set.patch_with(|s: &Counter| s.count + 1)),
/// });
///
/// for _ in 0..3 {
///     (store.get_state().inc)();
/// }
/// assert_eq!(store.get_state().count, 3);
/// ```
pub fn create_store<T, F>(initializer: F) -> StoreApi<T>
where
    T: Merge,
    F: FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T,
{
    let api = StoreApi {
        inner: Arc::new(StoreInner {
            state: RwLock::new(None),
            commit: Mutex::new(()),
            listeners: RwLock::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
                destroyed: false,
            }),
            setter: RwLock::new(None),
        }),
    };

    let initial = initializer(api.raw_setter(), api.raw_getter(), api.clone());
    *write(&api.inner.state) = Some(Arc::new(initial));
    tracing::trace!("store initialized");

    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct AppState {
        count: usize,
        name: Arc<String>,
    }

    #[derive(Default)]
    struct AppPatch {
        count: Option<usize>,
        name: Option<Arc<String>>,
    }

    impl Merge for AppState {
        type Patch = AppPatch;

        fn merge(&self, patch: AppPatch) -> Self {
            Self {
                count: patch.count.unwrap_or(self.count),
                name: patch.name.unwrap_or_else(|| Arc::clone(&self.name)),
            }
        }
    }

    fn app_store() -> StoreApi<AppState> {
        create_store(|_, _, _| AppState {
            count: 0,
            name: Arc::new("test".to_string()),
        })
    }

    #[test]
    fn store_merge_keeps_other_fields() {
        let store = app_store();
        let before = store.get_state();

        store.set_patch(AppPatch {
            count: Some(42),
            ..Default::default()
        });

        let after = store.get_state();
        assert_eq!(after.count, 42);
        assert!(Arc::ptr_eq(&before.name, &after.name));
    }

    #[test]
    fn store_replace_installs_value() {
        let store = app_store();
        let replacement = Arc::new(AppState {
            count: 7,
            name: Arc::new("new".to_string()),
        });

        store.set_state(Update::Now(Candidate::Whole(Arc::clone(&replacement))), true);

        assert!(Arc::ptr_eq(&store.get_state(), &replacement));
    }

    #[test]
    fn json_patch_with_replace_discards_old_keys() {
        let store = create_store(|_, _, _| json!({ "aaa": "x", "bbb": "y" }));

        store.set_state(Update::patch(json!({ "ccc": 1 })), true);

        assert_eq!(*store.get_state(), json!({ "ccc": 1 }));
    }

    #[test]
    fn json_whole_value_without_replace_is_merged() {
        let store = create_store(|_, _, _| json!({ "aaa": "x", "bbb": "y" }));

        store.set_state(Update::whole(json!({ "aaa": "z" })), false);
        assert_eq!(*store.get_state(), json!({ "aaa": "z", "bbb": "y" }));

        store.set_state_with(|_| Candidate::whole(json!({ "bbb": "w" })));
        assert_eq!(*store.get_state(), json!({ "aaa": "z", "bbb": "w" }));
    }

    #[test]
    fn json_whole_non_object_is_installed() {
        let store = create_store(|_, _, _| json!({ "aaa": "x" }));

        store.set_state(Update::whole(json!([1, 2])), false);

        assert_eq!(*store.get_state(), json!([1, 2]));
    }

    #[test]
    fn struct_patch_with_replace_is_merged() {
        let store = app_store();
        let before = store.get_state();

        store.set_state(
            Update::patch(AppPatch {
                count: Some(3),
                ..Default::default()
            }),
            true,
        );

        let after = store.get_state();
        assert_eq!(after.count, 3);
        assert!(Arc::ptr_eq(&before.name, &after.name));
    }

    #[test]
    fn updater_may_write_to_its_own_store() {
        let store = create_store(|_, _, _| json!({ "aaa": 0 }));
        let nested = store.clone();

        store.set_state_with(move |_| {
            nested.set_patch(json!({ "aaa": 1 }));
            Candidate::Patch(json!({ "bbb": 2 }))
        });

        assert_eq!(*store.get_state(), json!({ "aaa": 1, "bbb": 2 }));
    }

    #[test]
    fn float_state_follows_bit_identity() {
        let store = create_store(|_, _, _| f64::NAN);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        store.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set_patch(f64::NAN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.set_patch(0.0);
        store.set_patch(-0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.get_state().is_sign_negative());
    }

    #[test]
    fn store_skips_identical_candidate() {
        let store = app_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        store.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set_state_with(|state| Candidate::Whole(Arc::clone(state)));
        store.set_state(Update::Now(Candidate::Whole(store.get_state())), true);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn store_primitive_same_value_is_noop() {
        let store = create_store(|_, _, _| 5u32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        store.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set_patch(5);
        store.replace_state(5);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.set_patch(6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*store.get_state(), 6);
    }

    #[test]
    fn store_subscribe() {
        let store = app_store();

        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        store.subscribe(move |_next, _previous| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        store.set_state_with(|s| {
            Candidate::Patch(AppPatch {
                count: Some(s.count + 1),
                ..Default::default()
            })
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        store.set_state_with(|s| {
            Candidate::Patch(AppPatch {
                count: Some(s.count + 1),
                ..Default::default()
            })
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_state().count, 2);
    }

    #[test]
    fn listener_receives_next_and_previous() {
        let store = create_store(|_, _, _| 1i32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.subscribe(move |next, previous| {
            seen_clone.lock().unwrap().push((**next, **previous));
        });

        store.set_patch(2);
        store.set_patch(3);

        assert_eq!(*seen.lock().unwrap(), vec![(2, 1), (3, 2)]);
    }

    #[test]
    fn shared_listener_registers_once() {
        let store = create_store(|_, _, _| 0i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let listener: Listener<i32> = Arc::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let first = store.subscribe_listener(Arc::clone(&listener));
        let _second = store.subscribe_listener(listener);
        assert_eq!(store.listener_count(), 1);

        store.set_patch(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        first.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = create_store(|_, _, _| 0i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let unsubscribe = store.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let other = store.subscribe(|_, _| {});

        unsubscribe.unsubscribe();
        unsubscribe.unsubscribe();
        store.set_patch(1);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.listener_count(), 1);
        other.unsubscribe();
    }

    #[test]
    fn subscribe_during_notification_waits_for_next_update() {
        let store = create_store(|_, _, _| 0i32);
        let late_calls = Arc::new(AtomicUsize::new(0));

        let handle = store.clone();
        let late_calls_clone = late_calls.clone();
        store.subscribe(move |_, _| {
            let late_calls = late_calls_clone.clone();
            handle.subscribe(move |_, _| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        store.set_patch(1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        store.set_patch(2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_set_state_reentrantly() {
        let store = create_store(|_, _, _| 0i32);
        let handle = store.clone();
        store.subscribe(move |next, _| {
            if **next < 3 {
                handle.set_patch(**next + 1);
            }
        });

        store.set_patch(1);
        assert_eq!(*store.get_state(), 3);
    }

    #[test]
    fn destroy_stops_notifications_and_keeps_state() {
        let store = create_store(|_, _, _| 0i32);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        store.subscribe(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set_patch(1);
        store.destroy();
        store.destroy();
        store.set_patch(2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*store.get_state(), 2);
        assert!(store.is_destroyed());

        let late = store.subscribe(|_, _| panic!("destroyed store notified a listener"));
        store.set_patch(3);
        late.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_keeps_commit() {
        let store = create_store(|_, _, _| 0i32);
        let after = Arc::new(AtomicUsize::new(0));
        let after_clone = after.clone();
        store.subscribe(|_, _| panic!("listener failure"));
        store.subscribe(move |_, _| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handle = store.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handle.set_patch(9);
        }));

        assert!(result.is_err());
        assert_eq!(*store.get_state(), 9);
        assert_eq!(after.load(Ordering::SeqCst), 0);

        // The store is still usable afterwards.
        assert!(store.try_get_state().is_some());
    }

    #[test]
    fn initializer_writes_are_ignored() {
        let store = create_store(|set: Setter<i32>, _get, api| {
            assert!(api.try_get_state().is_none());
            set.patch(10);
            1
        });

        assert_eq!(*store.get_state(), 1);
    }

    #[test]
    fn wrapped_setter_sees_direct_writes() {
        let store = create_store(|_, _, _| 0i32);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        store.wrap_set_state(move |inner| {
            Setter::new(move |update, replace| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
                inner.call(update, replace);
            })
        });

        store.set_patch(1);
        store.replace_state(2);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(*store.get_state(), 2);
    }
}
