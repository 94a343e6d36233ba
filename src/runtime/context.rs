use crate::error::BindingError;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Upper bound on synchronous re-renders triggered by state that changed
/// while a component was rendering.
pub const MAX_RENDER_PASSES: usize = 25;

/// State kept by a hook between renders of one component.
pub(crate) trait Hook: Send + Sync + 'static {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Whether the value handed out on the last render is still current.
    fn is_consistent(&self) -> bool;

    /// Release subscriptions held by the hook.
    fn unmount(&self);
}

/// Hook slots of a component, indexed by call order.
struct RuntimeInner {
    hooks: Vec<Arc<dyn Hook>>,
    cursor: usize,
}

pub(crate) fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A rendering component: the host side of store bindings.
///
/// Each runtime owns the hook slots of one component. While
/// [`render`](Self::render) runs, the runtime sits on a thread-local stack
/// and hooks such as [`use_store`](crate::use_store) claim the next slot of
/// the component on top of it. Slots persist between renders, so a hook keeps
/// its subscription and last rendered value for as long as the component is
/// mounted.
///
/// When a store a hook reads changes in a way that alters the selected value,
/// the runtime is marked as needing a render and its scheduler, if any, is
/// called. The caller decides when to render again.
///
/// # Examples
///
/// ```
/// use stashbox::runtime::RenderRuntime;
/// use stashbox::{create_bound_hook, Candidate};
///
/// let counter = create_bound_hook(|_set, _get, _api| 0i32);
/// let component = RenderRuntime::new();
///
/// let rendered = component.render(|| *counter.use_store().unwrap());
/// assert_eq!(rendered, 0);
///
/// counter.set_state_with(|n| Candidate::Patch(**n + 1));
/// assert!(component.needs_render());
/// assert_eq!(component.render(|| *counter.use_store().unwrap()), 1);
/// ```
pub struct RenderRuntime {
    id: usize,
    inner: Mutex<RuntimeInner>,
    renders: AtomicUsize,
    dirty: AtomicBool,
    scheduler: Option<Box<dyn Fn() + Send + Sync>>,
}

// Thread-local stack of components currently rendering
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<RenderRuntime>>> = RefCell::new(vec![]);
}

static NEXT_COMPONENT_ID: AtomicUsize = AtomicUsize::new(0);

impl RenderRuntime {
    fn build(scheduler: Option<Box<dyn Fn() + Send + Sync>>) -> Arc<Self> {
        Arc::new(RenderRuntime {
            id: NEXT_COMPONENT_ID.fetch_add(1, Ordering::SeqCst),
            inner: Mutex::new(RuntimeInner {
                hooks: Vec::new(),
                cursor: 0,
            }),
            renders: AtomicUsize::new(0),
            dirty: AtomicBool::new(true),
            scheduler,
        })
    }

    /// Create a component with no scheduler. Poll
    /// [`needs_render`](Self::needs_render) to find out when to render.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Create a component that calls `scheduler` whenever it needs to be
    /// rendered again.
    ///
    /// The scheduler runs on the thread that updated the store, from inside
    /// the store's notification pass. It should only enqueue work.
    pub fn with_scheduler<F>(scheduler: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(scheduler)))
    }

    /// Unique id of this component.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The component currently rendering on this thread, if any.
    pub fn current() -> Option<Arc<Self>> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Run `f` as a render of this component and return its output.
    ///
    /// After `f` returns, every hook re-reads its source. If any value
    /// changed during the render, `f` runs again so that the returned output
    /// never mixes values from before and after a store update. Renders are
    /// repeated at most [`MAX_RENDER_PASSES`] times.
    pub fn render<F, R>(self: &Arc<Self>, mut f: F) -> R
    where
        F: FnMut() -> R,
    {
        let mut passes = 0;
        loop {
            passes += 1;
            self.dirty.store(false, Ordering::SeqCst);
            lock(&self.inner).cursor = 0;

            let result = Self::with_runtime(Arc::clone(self), &mut f);
            self.renders.fetch_add(1, Ordering::SeqCst);

            let hooks = lock(&self.inner).hooks.clone();
            if hooks.iter().all(|hook| hook.is_consistent()) {
                return result;
            }

            if passes >= MAX_RENDER_PASSES {
                tracing::warn!(
                    component = self.id,
                    passes,
                    "store kept changing during render; giving up"
                );
                self.dirty.store(true, Ordering::SeqCst);
                return result;
            }

            tracing::debug!(
                component = self.id,
                pass = passes,
                "store changed during render; rendering again"
            );
        }
    }

    /// Run a function with this component as the current render context.
    fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Claim the next hook slot, creating its state with `init` on the first
    /// render.
    pub(crate) fn use_hook<H, F>(&self, init: F) -> Result<Arc<H>, BindingError>
    where
        H: Hook,
        F: FnOnce() -> Arc<H>,
    {
        let (slot, existing) = {
            let mut inner = lock(&self.inner);
            let slot = inner.cursor;
            inner.cursor += 1;
            (slot, inner.hooks.get(slot).cloned())
        };

        match existing {
            Some(hook) => hook
                .into_any()
                .downcast::<H>()
                .map_err(|_| BindingError::HookMismatch { slot }),
            None => {
                let hook = init();
                let mut inner = lock(&self.inner);
                if inner.hooks.len() != slot {
                    return Err(BindingError::HookMismatch { slot });
                }
                inner.hooks.push(Arc::clone(&hook) as Arc<dyn Hook>);
                Ok(hook)
            }
        }
    }

    /// Mark the component as needing a render and notify its scheduler.
    pub fn request_render(&self) {
        let already = self.dirty.swap(true, Ordering::SeqCst);
        tracing::trace!(component = self.id, already, "render requested");
        if let Some(scheduler) = &self.scheduler {
            scheduler();
        }
    }

    /// Whether a store this component reads has changed since its last
    /// render. True before the first render.
    pub fn needs_render(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Number of times the render function has run, including re-renders.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Number of hook slots in use.
    pub fn hook_count(&self) -> usize {
        lock(&self.inner).hooks.len()
    }

    /// Drop every hook, releasing their store subscriptions. The next render
    /// starts from empty slots.
    pub fn unmount(&self) {
        let hooks = std::mem::take(&mut lock(&self.inner).hooks);
        if !hooks.is_empty() {
            tracing::debug!(component = self.id, hooks = hooks.len(), "component unmounted");
        }
        for hook in hooks {
            hook.unmount();
        }
        self.dirty.store(true, Ordering::SeqCst);
    }
}

impl Drop for RenderRuntime {
    fn drop(&mut self) {
        let hooks = std::mem::take(&mut lock(&self.inner).hooks);
        for hook in hooks {
            hook.unmount();
        }
    }
}

impl fmt::Debug for RenderRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRuntime")
            .field("id", &self.id)
            .field("hooks", &self.hook_count())
            .field("renders", &self.render_count())
            .field("needs_render", &self.needs_render())
            .finish()
    }
}
