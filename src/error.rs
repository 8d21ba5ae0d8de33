//! Driver error types.

use thiserror::Error;

/// Errors that can occur in the resource and context layer.
///
/// The taxonomy mirrors how failures are handled:
///
/// - [`Configuration`](DriverError::Configuration) is fatal to startup.
/// - [`SurfaceCreation`](DriverError::SurfaceCreation) and
///   [`ContextCreation`](DriverError::ContextCreation) are surfaced only
///   after the internal fallback sequence is exhausted.
/// - [`Allocation`](DriverError::Allocation) is per-resource; the caller is
///   expected to degrade to a non-hardware code path for that resource.
/// - [`InvalidRenderTarget`](DriverError::InvalidRenderTarget) and
///   [`InvalidParameter`](DriverError::InvalidParameter) are programmer
///   errors, surfaced immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Bad or impossible creation parameters.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The platform could not create a drawable surface.
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),
    /// The platform could not create a rendering context.
    #[error("context creation failed: {0}")]
    ContextCreation(String),
    /// A backend resource allocation failed.
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// A texture ineligible as a render target was passed to a bind call.
    #[error("invalid render target: {0}")]
    InvalidRenderTarget(String),
    /// An invalid argument was passed by the caller.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// No loader could decode a texture stream.
    #[error("texture load failed: {0}")]
    TextureLoad(String),
}
