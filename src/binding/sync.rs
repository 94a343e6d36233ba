use crate::error::BindingError;
use crate::runtime::{lock, Hook, RenderRuntime};
use crate::store::Unsubscribe;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Change pulse handed to [`ExternalStore::subscribe`]. Carries no payload.
pub type OnStoreChange = Arc<dyn Fn() + Send + Sync>;

/// A source of state that lives outside the render tree.
///
/// This is the contract [`use_sync_external_store`] reads through: a way to
/// be told that something changed, and a cheap way to read the current
/// value. `get_snapshot` may be called any number of times, including more
/// often than the source changes, and must return equal snapshots while the
/// source is unchanged.
pub trait ExternalStore: Send + Sync + 'static {
    type Snapshot: Clone + Send + Sync + 'static;

    /// Register `on_store_change` to be called after every change.
    fn subscribe(&self, on_store_change: OnStoreChange) -> Unsubscribe;

    /// Read the current value.
    fn get_snapshot(&self) -> Self::Snapshot;

    /// Whether two snapshots represent the same value.
    fn snapshots_equal(&self, a: &Self::Snapshot, b: &Self::Snapshot) -> bool;

    /// Whether `other` reads from the same underlying source, so that a
    /// subscription made through one also covers the other.
    fn same_source(&self, other: &Self) -> bool;
}

/// Hook state for one external store read inside a component.
pub(crate) struct SyncExternalStore<E: ExternalStore> {
    // Latest source passed by the component; replaced on every render.
    source: Mutex<Option<E>>,
    rendered: Mutex<Option<E::Snapshot>>,
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl<E: ExternalStore> SyncExternalStore<E> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(None),
            rendered: Mutex::new(None),
            unsubscribe: Mutex::new(None),
        })
    }

    fn read(self: &Arc<Self>, source: E, runtime: &Arc<RenderRuntime>) -> E::Snapshot {
        let mut current = lock(&self.source);

        {
            let mut unsubscribe = lock(&self.unsubscribe);
            let moved = current
                .as_ref()
                .is_some_and(|previous| !previous.same_source(&source));
            if moved {
                tracing::debug!("hook source changed; resubscribing");
                if let Some(previous) = unsubscribe.take() {
                    previous.unsubscribe();
                }
                *lock(&self.rendered) = None;
            }
            if unsubscribe.is_none() {
                *unsubscribe = Some(source.subscribe(self.on_change(runtime)));
            }
        }

        let source = current.insert(source);
        let fresh = source.get_snapshot();

        let mut rendered = lock(&self.rendered);
        match rendered.as_ref() {
            Some(previous) if source.snapshots_equal(previous, &fresh) => previous.clone(),
            _ => {
                *rendered = Some(fresh.clone());
                fresh
            }
        }
    }

    fn on_change(self: &Arc<Self>, runtime: &Arc<RenderRuntime>) -> OnStoreChange {
        let hook = Arc::downgrade(self);
        let runtime = Arc::downgrade(runtime);
        Arc::new(move || {
            let Some(hook) = hook.upgrade() else {
                return;
            };
            if hook.is_consistent() {
                return;
            }
            if let Some(runtime) = runtime.upgrade() {
                runtime.request_render();
            }
        })
    }
}

impl<E: ExternalStore> Hook for SyncExternalStore<E> {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn is_consistent(&self) -> bool {
        let source = lock(&self.source);
        let rendered = lock(&self.rendered);
        match (source.as_ref(), rendered.as_ref()) {
            (Some(source), Some(rendered)) => source.snapshots_equal(rendered, &source.get_snapshot()),
            _ => true,
        }
    }

    fn unmount(&self) {
        if let Some(unsubscribe) = lock(&self.unsubscribe).take() {
            unsubscribe.unsubscribe();
        }
        *lock(&self.rendered) = None;
    }
}

/// Read an external store from inside a component render.
///
/// On the first render of the component the hook subscribes to `source`;
/// later renders reuse that subscription and only swap in the new `source`
/// value, so a fresh selector closure can be passed every time. When a later
/// render passes a different source (see [`ExternalStore::same_source`]), the
/// old subscription is dropped and the new source subscribed. The returned
/// snapshot is the previously rendered one whenever the fresh snapshot
/// compares equal to it.
///
/// # Errors
///
/// [`BindingError::OutsideRender`] when no component is rendering on this
/// thread, and [`BindingError::HookMismatch`] when this hook's slot held a
/// different hook on the previous render. Neither subscribes to anything.
pub fn use_sync_external_store<E: ExternalStore>(source: E) -> Result<E::Snapshot, BindingError> {
    let runtime = RenderRuntime::current().ok_or(BindingError::OutsideRender)?;
    let hook = runtime.use_hook(SyncExternalStore::<E>::new)?;
    Ok(hook.read(source, &runtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A bare counter source with hand-rolled subscription.
    #[derive(Clone)]
    struct Counter {
        value: Arc<AtomicUsize>,
        listeners: Arc<Mutex<Vec<OnStoreChange>>>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                value: Arc::new(AtomicUsize::new(0)),
                listeners: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn bump(&self) {
            self.value.fetch_add(1, Ordering::SeqCst);
            let listeners = self.listeners.lock().unwrap().clone();
            for listener in listeners {
                listener();
            }
        }
    }

    impl ExternalStore for Counter {
        type Snapshot = usize;

        fn subscribe(&self, on_store_change: OnStoreChange) -> Unsubscribe {
            self.listeners.lock().unwrap().push(on_store_change);
            let listeners = self.listeners.clone();
            Unsubscribe::new(move || listeners.lock().unwrap().clear())
        }

        fn get_snapshot(&self) -> usize {
            self.value.load(Ordering::SeqCst)
        }

        fn snapshots_equal(&self, a: &usize, b: &usize) -> bool {
            a == b
        }

        fn same_source(&self, other: &Self) -> bool {
            Arc::ptr_eq(&self.value, &other.value)
        }
    }

    #[test]
    fn outside_render_fails_without_subscribing() {
        let counter = Counter::new();
        let err = use_sync_external_store(counter.clone()).unwrap_err();

        assert!(matches!(err, BindingError::OutsideRender));
        assert!(counter.listeners.lock().unwrap().is_empty());
    }

    #[test]
    fn subscribes_once_across_renders() {
        let counter = Counter::new();
        let runtime = RenderRuntime::new();

        for _ in 0..3 {
            runtime.render(|| use_sync_external_store(counter.clone()).unwrap());
        }

        assert_eq!(counter.listeners.lock().unwrap().len(), 1);
    }

    #[test]
    fn change_marks_component_dirty() {
        let counter = Counter::new();
        let runtime = RenderRuntime::new();

        assert_eq!(runtime.render(|| use_sync_external_store(counter.clone()).unwrap()), 0);
        assert!(!runtime.needs_render());

        counter.bump();
        assert!(runtime.needs_render());
        assert_eq!(runtime.render(|| use_sync_external_store(counter.clone()).unwrap()), 1);
    }

    #[test]
    fn change_during_render_renders_again() {
        let counter = Counter::new();
        let runtime = RenderRuntime::new();
        let mut bumped = false;

        let seen = runtime.render(|| {
            let value = use_sync_external_store(counter.clone()).unwrap();
            if !bumped {
                bumped = true;
                counter.bump();
            }
            value
        });

        assert_eq!(seen, 1);
        assert_eq!(runtime.render_count(), 2);
    }

    #[test]
    fn switching_source_moves_subscription() {
        let first = Counter::new();
        let second = Counter::new();
        second.bump();
        let runtime = RenderRuntime::new();

        assert_eq!(runtime.render(|| use_sync_external_store(first.clone()).unwrap()), 0);
        assert_eq!(runtime.render(|| use_sync_external_store(second.clone()).unwrap()), 1);

        assert!(first.listeners.lock().unwrap().is_empty());
        assert_eq!(second.listeners.lock().unwrap().len(), 1);

        first.bump();
        assert!(!runtime.needs_render());
        second.bump();
        assert!(runtime.needs_render());
    }

    #[test]
    fn unmount_releases_subscription() {
        let counter = Counter::new();
        let runtime = RenderRuntime::new();

        runtime.render(|| use_sync_external_store(counter.clone()).unwrap());
        runtime.unmount();

        assert!(counter.listeners.lock().unwrap().is_empty());
    }
}
