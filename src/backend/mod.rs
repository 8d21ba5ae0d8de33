//! Backend abstraction layer.
//!
//! The policy layer in this crate is backend-agnostic: every GPU-affecting
//! concern is expressed through a small set of capability traits, implemented
//! per backend and injected into the driver facade:
//!
//! - [`NativePlatform`] — the window-system handshake consumed by
//!   [`NativeContextManager`](crate::context::NativeContextManager)
//! - [`ResourceFactory`] — creation/destruction of backend resources
//! - [`CommandSubmitter`] — draw submission, target binding, queries
//!
//! The shipped [`SoftwareBackend`] implements all three; it performs no real
//! GPU work and doubles as the simulated platform used by the test suite.

pub mod software;

pub use software::{SoftwareBackend, SurfaceSupport};

use crate::context::{ContextCreationParams, ExposedContextData};
use crate::error::DriverError;
use crate::types::{BufferKind, BufferUsage, ClearFlags, ClearValues, ColorFormat, Extent2d};

/// Opaque handle to a backend texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a backend buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque handle to a backend visibility query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// A resolved backend entry point.
///
/// Carried as an opaque non-zero address; resolution failure is expressed as
/// `Option::None`, never as an error, so callers can probe for capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcAddress(pub usize);

/// Where draw data comes from: a hardware allocation or raw CPU memory.
///
/// Raw submission is the fallback whenever a hardware copy is unavailable
/// (below the upload threshold, hint `Never`, or a failed allocation).
#[derive(Debug, Clone, Copy)]
pub enum BufferSource<'a> {
    /// Submit directly from CPU memory.
    Raw(&'a [u8]),
    /// Consume an uploaded hardware copy.
    Hardware(BufferHandle),
}

/// Window-system glue for acquiring and releasing a rendering context.
///
/// Implementations wrap a real platform (WGL, GLX, EGL) or a simulation.
/// All operations are synchronous; the single-rendering-thread contract of
/// the crate applies (see crate-level docs).
pub trait NativePlatform: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Open the platform display/server connection.
    fn open_display(&self, params: &ContextCreationParams) -> Result<(), DriverError>;

    /// Close the display connection. Safe to call when never opened.
    fn close_display(&self);

    /// Probe whether a drawable with exactly these settings can be created.
    ///
    /// This is the predicate the pixel-format fallback policy iterates over;
    /// it must be side-effect free.
    fn supports_pixel_format(&self, params: &ContextCreationParams) -> bool;

    /// Create the drawable surface for previously accepted settings.
    ///
    /// Returns context data with window and surface handles populated and a
    /// null rendering-context handle.
    fn create_surface(
        &self,
        params: &ContextCreationParams,
    ) -> Result<ExposedContextData, DriverError>;

    /// Release the drawable. Safe to call when never created.
    fn destroy_surface(&self);

    /// Attribute-based (versioned) context creation.
    ///
    /// Returns `None` when the preferred entry point is absent at run time,
    /// in which case the caller falls back to [`create_context_legacy`].
    ///
    /// [`create_context_legacy`]: NativePlatform::create_context_legacy
    fn create_context_attribs(
        &self,
        surface: &ExposedContextData,
    ) -> Option<Result<ExposedContextData, DriverError>>;

    /// Legacy context creation path.
    fn create_context_legacy(
        &self,
        surface: &ExposedContextData,
    ) -> Result<ExposedContextData, DriverError>;

    /// Destroy a rendering context. Safe to call on a never-created context.
    fn destroy_context(&self, context: &ExposedContextData);

    /// Make `context` current on the calling thread; `false` on failure.
    fn make_current(&self, context: &ExposedContextData) -> bool;

    /// Release the calling thread's current context; `false` on failure.
    fn release_current(&self) -> bool;

    /// Resolve a backend entry point by symbolic name.
    fn get_proc_address(&self, name: &str) -> Option<ProcAddress>;

    /// Present the current frame. Presentation failure is routinely
    /// non-fatal (occluded window), hence a flag rather than an error.
    fn swap_buffers(&self, context: &ExposedContextData) -> bool;
}

/// Creation and destruction of backend-owned resources.
pub trait ResourceFactory: Send + Sync {
    /// Create a backend texture.
    fn create_texture(
        &self,
        name: &str,
        size: Extent2d,
        format: ColorFormat,
        render_target: bool,
    ) -> Result<TextureHandle, DriverError>;

    /// Destroy a backend texture.
    fn destroy_texture(&self, handle: TextureHandle);

    /// Create a backend buffer allocation.
    ///
    /// Fails with [`DriverError::Allocation`]; the caller degrades to raw
    /// submission for the affected draw rather than aborting the frame.
    fn create_buffer(
        &self,
        kind: BufferKind,
        size: usize,
        usage: BufferUsage,
    ) -> Result<BufferHandle, DriverError>;

    /// Update an existing allocation in place. The data must not exceed the
    /// allocation's capacity.
    fn update_buffer(&self, handle: BufferHandle, data: &[u8]) -> Result<(), DriverError>;

    /// Destroy a buffer allocation.
    fn destroy_buffer(&self, handle: BufferHandle);

    /// Create a visibility query object.
    fn create_query(&self) -> Result<QueryHandle, DriverError>;

    /// Destroy a visibility query object.
    fn destroy_query(&self, handle: QueryHandle);

    /// Whether the backend supports true off-screen render targets.
    ///
    /// When `false`, target switches are emulated by copying frame contents,
    /// and render-target textures must not exceed the primary surface size.
    fn supports_offscreen_targets(&self) -> bool;

    /// Maximum render target size.
    fn max_target_size(&self) -> Extent2d;

    /// Round a requested texture size up to what the backend will actually
    /// allocate (e.g. the next power of two).
    fn adjust_texture_size(&self, size: Extent2d) -> Extent2d {
        size
    }
}

/// Draw submission, render-target binding and query execution.
pub trait CommandSubmitter: Send + Sync {
    /// Bind a set of color attachments plus an optional depth attachment as
    /// the active render target.
    fn bind_target(&self, colors: &[TextureHandle], depth: Option<TextureHandle>);

    /// Restore rendering to the primary window surface.
    fn bind_primary(&self);

    /// Clear the requested buffers of the active target.
    fn clear(&self, flags: ClearFlags, values: &ClearValues);

    /// Submit one draw.
    fn draw(
        &self,
        vertices: BufferSource<'_>,
        vertex_count: u32,
        indices: BufferSource<'_>,
        primitive_count: u32,
    );

    /// Begin a visibility query. When `writes_enabled` is false the draw
    /// contributes nothing to color or depth (pure occlusion test).
    fn begin_query(&self, query: QueryHandle, writes_enabled: bool);

    /// End the active visibility query.
    fn end_query(&self, query: QueryHandle);

    /// Retrieve a query's pixel count. `blocking = false` may return `None`
    /// ("not ready") instead of waiting; that is a normal outcome, not an
    /// error. Results are a conservative over-estimate, never an
    /// under-estimate.
    fn query_result(&self, query: QueryHandle, blocking: bool) -> Option<u32>;
}
