use crate::store::{Getter, Merge, Setter, StoreApi};
use std::fmt::Debug;

/// Decorate an initializer so every write made through its setter is logged.
///
/// The state as it was before the write is emitted at `DEBUG` level, then the
/// write is passed on unchanged. Writes made directly on the store handle are
/// not seen by this decorator.
///
/// # Examples
///
/// ```
/// use stashbox::middleware::logger;
/// use stashbox::{create_store, Merge, Setter};
/// use std::sync::Arc;
///
/// struct Title {
///     text: String,
///     rename: Arc<dyn Fn(&str) + Send + Sync>,
/// }
///
/// impl std::fmt::Debug for Title {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.debug_struct("Title").field("text", &self.text).finish_non_exhaustive()
///     }
/// }
///
/// impl Merge for Title {
///     type Patch = String;
///
///     fn merge(&self, text: String) -> Self {
///         Self { text, rename: Arc::clone(&self.rename) }
///     }
/// }
///
/// let store = create_store(logger(|set: Setter<Title>, _get, _api| Title {
///     text: String::new(),
///     rename: Arc::new(move |text: &str| set.patch(text.to_string())),
/// }));
///
/// (store.get_state().rename)("draft");
/// assert_eq!(store.get_state().text, "draft");
/// ```
pub fn logger<T, I>(initializer: I) -> impl FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T
where
    T: Merge + Debug,
    I: FnOnce(Setter<T>, Getter<T>, StoreApi<T>) -> T,
{
    move |set: Setter<T>, get: Getter<T>, api: StoreApi<T>| {
        let current = get.clone();
        let logged = Setter::new(move |update, replace| {
            match current.try_get() {
                Some(state) => tracing::debug!(state = ?state, ?update, replace, "set_state called"),
                None => tracing::debug!(?update, replace, "set_state called before initialization"),
            }
            set.call(update, replace);
        });

        initializer(logged, get, api)
    }
}
