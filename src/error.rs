//! Crate-level error types for bindings and persistence.

/// Error returned when a store hook is used incorrectly.
///
/// Both variants are raised synchronously, before the hook subscribes to
/// anything.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// A hook was called while no component was rendering.
    ///
    /// Hooks read their slot from the component currently on the render
    /// stack, so they only work inside [`RenderRuntime::render`](crate::runtime::RenderRuntime::render).
    #[error("invalid argument: hook called outside of a render pass")]
    OutsideRender,

    /// The hook at `slot` has a different type than on the previous render.
    ///
    /// Hooks must be called in the same order, with the same selected type,
    /// on every render of a component.
    #[error("invalid argument: hook at slot {slot} changed type between renders")]
    HookMismatch { slot: usize },
}

/// Error returned by a [`StateStorage`](crate::middleware::StateStorage)
/// backend or while decoding persisted state.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Disk I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Persisted data was written by a different state version.
    #[error("persisted state version {stored} does not match expected version {expected}")]
    VersionMismatch { stored: u32, expected: u32 },

    /// The storage key cannot be used as a file name.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}
