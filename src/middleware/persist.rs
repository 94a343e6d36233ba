use super::StateStorage;
use crate::error::PersistError;
use crate::store::{Getter, Merge, Setter, StoreApi};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// State that can be written to and restored from durable storage.
///
/// Only the data part of a state needs to persist; actions stored inside
/// the state are rebuilt by the initializer on every start.
pub trait Persist: Merge {
    /// Serializable projection of the state.
    type Persisted: Serialize + DeserializeOwned;

    /// Project the current state for storage.
    fn persisted(&self) -> Self::Persisted;

    /// Turn stored data back into a patch over the initializer's state.
    fn rehydrate(persisted: Self::Persisted) -> Self::Patch;
}

impl Persist for Value {
    type Persisted = Value;

    fn persisted(&self) -> Value {
        self.clone()
    }

    fn rehydrate(persisted: Value) -> Value {
        persisted
    }
}

/// Configuration for [`persist`].
#[derive(Clone)]
pub struct PersistOptions {
    name: String,
    version: u32,
    storage: Arc<dyn StateStorage>,
}

impl PersistOptions {
    /// Persist under the key `name` in `storage`, at version 0.
    pub fn new(name: impl Into<String>, storage: Arc<dyn StateStorage>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            storage,
        }
    }

    /// Version tag written with the state. Stored data carrying any other
    /// version is discarded on load.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Envelope stored under the persist key.
#[derive(Serialize, Deserialize)]
struct StorageValue<S> {
    state: S,
    version: u32,
}

fn load<T: Persist>(options: &PersistOptions) -> Result<Option<T::Persisted>, PersistError> {
    let Some(raw) = options.storage.get_item(&options.name)? else {
        return Ok(None);
    };

    let stored: StorageValue<Value> = serde_json::from_str(&raw)?;
    if stored.version != options.version {
        return Err(PersistError::VersionMismatch {
            stored: stored.version,
            expected: options.version,
        });
    }

    Ok(Some(serde_json::from_value(stored.state)?))
}

fn save<T: Persist>(options: &PersistOptions, state: &T) -> Result<(), PersistError> {
    let encoded = serde_json::to_string(&StorageValue {
        state: state.persisted(),
        version: options.version,
    })?;
    options.storage.set_item(&options.name, &encoded)
}

fn save_or_warn<T: Persist>(options: &PersistOptions, state: &T) {
    if let Err(e) = save(options, state) {
        tracing::warn!(name = %options.name, error = %e, "failed to persist state");
    }
}

/// Wrap `inner` so every accepted update is written to storage.
fn persisting<T: Persist>(inner: Setter<T>, get: Getter<T>, options: Arc<PersistOptions>) -> Setter<T> {
    Setter::new(move |update, replace| {
        let before = get.try_get();
        inner.call(update, replace);
        let Some(after) = get.try_get() else {
            return;
        };
        let changed = before.map_or(true, |before| !Arc::ptr_eq(&before, &after));
        if changed {
            save_or_warn(&options, &*after);
        }
    })
}

/// Decorate an initializer so its state survives restarts.
///
/// When the store is built, data stored under the configured name is merged
/// over the initializer's value and the result is written back. After that,
/// every update that changes the state, whether made by the initializer's
/// actions or directly through [`StoreApi::set_state`], writes the full
/// persisted projection. Storage and decoding failures are logged and never
/// block an update.
///
/// # Examples
///
/// ```
/// use stashbox::middleware::{persist, MemoryStorage, PersistOptions, StateStorage};
/// use stashbox::create_store;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let storage = Arc::new(MemoryStorage::new());
/// let options = PersistOptions::new("settings", storage.clone());
///
/// let store = create_store(persist(|_set, _get, _api| json!({ "theme": "light" }), options.clone()));
/// store.set_patch(json!({ "theme": "dark" }));
///
/// let restored = create_store(persist(|_set, _get, _api| json!({ "theme": "light" }), options));
/// assert_eq!(restored.get_state()["theme"], "dark");
/// assert!(storage.get_item("settings").unwrap().is_some());
/// ```
pub fn persist<T, I>(
    initializer: I,
    options: PersistOptions,
) -> impl FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T
where
    T: Persist,
    I: FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T,
{
    move |set: Setter<T>, get: Getter<T>, api: StoreApi<T>| {
        let options = Arc::new(options);

        api.wrap_set_state({
            let get = get.clone();
            let options = Arc::clone(&options);
            move |inner| persisting(inner, get, options)
        });

        let set = persisting(set, get.clone(), Arc::clone(&options));
        let initial = initializer(set, get, api);

        let seeded = match load::<T>(&options) {
            Ok(Some(persisted)) => {
                tracing::debug!(name = %options.name, "rehydrated persisted state");
                initial.merge(T::rehydrate(persisted))
            }
            Ok(None) => initial,
            Err(e) => {
                tracing::warn!(name = %options.name, error = %e, "discarding persisted state");
                initial
            }
        };

        save_or_warn(&options, &seeded);
        seeded
    }
}
