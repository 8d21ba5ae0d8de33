//! Software backend.
//!
//! Performs no real GPU work but implements every capability trait with
//! enough bookkeeping to validate the policy layer: handles are minted from
//! a counter, uploads and draws are counted, and visibility queries
//! accumulate a stand-in pixel count. Simulation knobs (`with_*` builders)
//! let tests shape what the "platform" claims to support.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::context::{ContextCreationParams, ExposedContextData};
use crate::error::DriverError;
use crate::types::{BufferKind, BufferUsage, ClearFlags, ClearValues, ColorFormat, Extent2d};

use super::{
    BufferHandle, BufferSource, CommandSubmitter, NativePlatform, ProcAddress, QueryHandle,
    ResourceFactory, TextureHandle,
};

/// The symbolic name of the attribute-based context creation entry point.
pub const PROC_CREATE_CONTEXT_ATTRIBS: &str = "vg_create_context_attribs";

/// What the simulated platform accepts when choosing a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSupport {
    /// A stencil buffer can be allocated.
    pub stencil: bool,
    /// Highest accepted multisample count.
    pub max_samples: u8,
    /// Double buffering is available.
    pub double_buffer: bool,
    /// Stereo framebuffers are available.
    pub stereo: bool,
}

impl Default for SurfaceSupport {
    fn default() -> Self {
        Self {
            stencil: true,
            max_samples: 16,
            double_buffer: true,
            stereo: false,
        }
    }
}

#[derive(Debug)]
struct BufferRecord {
    kind: BufferKind,
    capacity: usize,
    usage: BufferUsage,
    writes: u32,
}

#[derive(Debug)]
struct TextureRecord {
    name: String,
}

#[derive(Debug, Default)]
struct QueryRecord {
    writes_enabled: bool,
    accumulated: u32,
    result: Option<u32>,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    display_open: bool,
    surface: Option<(u64, u64)>,
    contexts: HashSet<u64>,
    current_context: Option<u64>,
    buffers: HashMap<u64, BufferRecord>,
    textures: HashMap<u64, TextureRecord>,
    queries: HashMap<u64, QueryRecord>,
    active_query: Option<u64>,
    offscreen_bound: bool,
    last_clear: Option<(ClearFlags, ClearValues)>,
    draw_calls: u32,
    alloc_failures_remaining: u32,
}

impl Inner {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Software implementation of the backend capability traits.
pub struct SoftwareBackend {
    support: SurfaceSupport,
    surface_available: bool,
    display_available: bool,
    attribs_available: bool,
    presentation_works: bool,
    offscreen_targets: bool,
    power_of_two_textures: bool,
    max_target: Extent2d,
    inner: Mutex<Inner>,
}

impl SoftwareBackend {
    /// Create a backend with permissive defaults.
    pub fn new() -> Self {
        Self {
            support: SurfaceSupport::default(),
            surface_available: true,
            display_available: true,
            attribs_available: true,
            presentation_works: true,
            offscreen_targets: true,
            power_of_two_textures: false,
            max_target: Extent2d::new(16384, 16384),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Constrain what the simulated platform accepts for surfaces.
    pub fn with_surface_support(mut self, support: SurfaceSupport) -> Self {
        self.support = support;
        self
    }

    /// Reject every pixel format, exhausting the fallback chain.
    pub fn with_unsupported_surface(mut self) -> Self {
        self.surface_available = false;
        self
    }

    /// Make the display connection fail on open.
    pub fn with_unavailable_display(mut self) -> Self {
        self.display_available = false;
        self
    }

    /// Remove the attribute-based context creation entry point.
    pub fn without_attrib_context(mut self) -> Self {
        self.attribs_available = false;
        self
    }

    /// Make presentation report failure (occluded-window analog).
    pub fn with_failing_presentation(mut self) -> Self {
        self.presentation_works = false;
        self
    }

    /// Toggle support for true off-screen render targets.
    pub fn with_offscreen_targets(mut self, supported: bool) -> Self {
        self.offscreen_targets = supported;
        self
    }

    /// Round texture allocations up to the next power of two.
    pub fn with_power_of_two_textures(mut self) -> Self {
        self.power_of_two_textures = true;
        self
    }

    /// Limit the maximum render target size.
    pub fn with_max_target_size(mut self, size: Extent2d) -> Self {
        self.max_target = size;
        self
    }

    /// Make the next `count` buffer allocations fail.
    pub fn fail_allocations(&self, count: u32) {
        self.inner.lock().alloc_failures_remaining = count;
    }

    // ---- observation hooks for tests -----------------------------------

    /// Number of live backend buffer allocations.
    pub fn buffer_count(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// Number of live backend textures.
    pub fn texture_count(&self) -> usize {
        self.inner.lock().textures.len()
    }

    /// Number of live rendering contexts.
    pub fn context_count(&self) -> usize {
        self.inner.lock().contexts.len()
    }

    /// How many times a buffer allocation has been written.
    pub fn buffer_writes(&self, handle: BufferHandle) -> Option<u32> {
        self.inner.lock().buffers.get(&handle.0).map(|b| b.writes)
    }

    /// Capacity of a buffer allocation.
    pub fn buffer_capacity(&self, handle: BufferHandle) -> Option<usize> {
        self.inner.lock().buffers.get(&handle.0).map(|b| b.capacity)
    }

    /// Usage class of a buffer allocation.
    pub fn buffer_usage(&self, handle: BufferHandle) -> Option<BufferUsage> {
        self.inner.lock().buffers.get(&handle.0).map(|b| b.usage)
    }

    /// Total draws submitted.
    pub fn draw_calls(&self) -> u32 {
        self.inner.lock().draw_calls
    }

    /// Flags and values of the most recent clear.
    pub fn last_clear(&self) -> Option<(ClearFlags, ClearValues)> {
        self.inner.lock().last_clear
    }

    /// Whether an off-screen target is currently bound.
    pub fn offscreen_bound(&self) -> bool {
        self.inner.lock().offscreen_bound
    }

    /// The context current on the simulated platform, if any.
    pub fn current_context(&self) -> Option<u64> {
        self.inner.lock().current_context
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SoftwareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBackend")
            .field("support", &self.support)
            .field("offscreen_targets", &self.offscreen_targets)
            .finish()
    }
}

fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

impl NativePlatform for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn open_display(&self, _params: &ContextCreationParams) -> Result<(), DriverError> {
        if !self.display_available {
            return Err(DriverError::Configuration(
                "could not open platform display".to_string(),
            ));
        }
        self.inner.lock().display_open = true;
        Ok(())
    }

    fn close_display(&self) {
        let mut inner = self.inner.lock();
        inner.display_open = false;
        inner.surface = None;
        inner.contexts.clear();
        inner.current_context = None;
    }

    fn supports_pixel_format(&self, params: &ContextCreationParams) -> bool {
        if !self.surface_available {
            return false;
        }
        if params.stencil && !self.support.stencil {
            return false;
        }
        if params.samples > self.support.max_samples {
            return false;
        }
        if params.double_buffer && !self.support.double_buffer {
            return false;
        }
        if params.stereo && !self.support.stereo {
            return false;
        }
        true
    }

    fn create_surface(
        &self,
        params: &ContextCreationParams,
    ) -> Result<ExposedContextData, DriverError> {
        let mut inner = self.inner.lock();
        if !inner.display_open {
            return Err(DriverError::SurfaceCreation(
                "display is not open".to_string(),
            ));
        }
        let window = if params.external_window != 0 {
            params.external_window
        } else {
            inner.mint()
        };
        let surface = inner.mint();
        inner.surface = Some((window, surface));
        log::trace!("software: created surface {surface} on window {window}");
        Ok(ExposedContextData::Offscreen {
            window,
            surface,
            context: 0,
        })
    }

    fn destroy_surface(&self) {
        self.inner.lock().surface = None;
    }

    fn create_context_attribs(
        &self,
        surface: &ExposedContextData,
    ) -> Option<Result<ExposedContextData, DriverError>> {
        if !self.attribs_available {
            return None;
        }
        Some(self.create_context_legacy(surface))
    }

    fn create_context_legacy(
        &self,
        surface: &ExposedContextData,
    ) -> Result<ExposedContextData, DriverError> {
        let mut inner = self.inner.lock();
        if inner.surface.is_none() {
            return Err(DriverError::ContextCreation(
                "no surface to create a context against".to_string(),
            ));
        }
        let context = inner.mint();
        inner.contexts.insert(context);
        log::trace!("software: created context {context}");
        Ok(surface.with_context_handle(context))
    }

    fn destroy_context(&self, context: &ExposedContextData) {
        let mut inner = self.inner.lock();
        let handle = context.context_handle();
        inner.contexts.remove(&handle);
        if inner.current_context == Some(handle) {
            inner.current_context = None;
        }
    }

    fn make_current(&self, context: &ExposedContextData) -> bool {
        let mut inner = self.inner.lock();
        let handle = context.context_handle();
        if !inner.contexts.contains(&handle) {
            return false;
        }
        inner.current_context = Some(handle);
        true
    }

    fn release_current(&self) -> bool {
        self.inner.lock().current_context = None;
        true
    }

    fn get_proc_address(&self, name: &str) -> Option<ProcAddress> {
        match name {
            PROC_CREATE_CONTEXT_ATTRIBS if self.attribs_available => Some(ProcAddress(1)),
            "vg_swap_interval" => Some(ProcAddress(2)),
            _ => None,
        }
    }

    fn swap_buffers(&self, context: &ExposedContextData) -> bool {
        if !self.presentation_works {
            return false;
        }
        let inner = self.inner.lock();
        inner.surface.is_some()
            && inner.current_context.is_some()
            && inner.current_context == Some(context.context_handle())
    }
}

impl ResourceFactory for SoftwareBackend {
    fn create_texture(
        &self,
        name: &str,
        size: Extent2d,
        format: ColorFormat,
        render_target: bool,
    ) -> Result<TextureHandle, DriverError> {
        let mut inner = self.inner.lock();
        let handle = inner.mint();
        inner.textures.insert(
            handle,
            TextureRecord {
                name: name.to_string(),
            },
        );
        log::trace!(
            "software: created texture '{name}' ({size}, {format:?}, target: {render_target})"
        );
        Ok(TextureHandle(handle))
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        if let Some(record) = self.inner.lock().textures.remove(&handle.0) {
            log::trace!("software: destroyed texture '{}'", record.name);
        }
    }

    fn create_buffer(
        &self,
        kind: BufferKind,
        size: usize,
        usage: BufferUsage,
    ) -> Result<BufferHandle, DriverError> {
        let mut inner = self.inner.lock();
        if inner.alloc_failures_remaining > 0 {
            inner.alloc_failures_remaining -= 1;
            return Err(DriverError::Allocation(format!(
                "could not create {kind:?} buffer of {size} bytes"
            )));
        }
        let handle = inner.mint();
        inner.buffers.insert(
            handle,
            BufferRecord {
                kind,
                capacity: size,
                usage,
                writes: 0,
            },
        );
        Ok(BufferHandle(handle))
    }

    fn update_buffer(&self, handle: BufferHandle, data: &[u8]) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        let record = inner.buffers.get_mut(&handle.0).ok_or_else(|| {
            DriverError::Allocation(format!("unknown buffer handle {}", handle.0))
        })?;
        if data.len() > record.capacity {
            return Err(DriverError::Allocation(format!(
                "update of {} bytes exceeds capacity {}",
                data.len(),
                record.capacity
            )));
        }
        record.writes += 1;
        Ok(())
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        if let Some(record) = self.inner.lock().buffers.remove(&handle.0) {
            log::trace!("software: destroyed {:?} buffer {}", record.kind, handle.0);
        }
    }

    fn create_query(&self) -> Result<QueryHandle, DriverError> {
        let mut inner = self.inner.lock();
        let handle = inner.mint();
        inner.queries.insert(handle, QueryRecord::default());
        Ok(QueryHandle(handle))
    }

    fn destroy_query(&self, handle: QueryHandle) {
        let mut inner = self.inner.lock();
        inner.queries.remove(&handle.0);
        if inner.active_query == Some(handle.0) {
            inner.active_query = None;
        }
    }

    fn supports_offscreen_targets(&self) -> bool {
        self.offscreen_targets
    }

    fn max_target_size(&self) -> Extent2d {
        self.max_target
    }

    fn adjust_texture_size(&self, size: Extent2d) -> Extent2d {
        if self.power_of_two_textures {
            Extent2d::new(
                next_power_of_two(size.width),
                next_power_of_two(size.height),
            )
        } else {
            size
        }
    }
}

impl CommandSubmitter for SoftwareBackend {
    fn bind_target(&self, colors: &[TextureHandle], depth: Option<TextureHandle>) {
        log::trace!(
            "software: bind target ({} color, depth: {})",
            colors.len(),
            depth.is_some()
        );
        self.inner.lock().offscreen_bound = true;
    }

    fn bind_primary(&self) {
        self.inner.lock().offscreen_bound = false;
    }

    fn clear(&self, flags: ClearFlags, values: &ClearValues) {
        self.inner.lock().last_clear = Some((flags, *values));
    }

    fn draw(
        &self,
        _vertices: BufferSource<'_>,
        vertex_count: u32,
        _indices: BufferSource<'_>,
        _primitive_count: u32,
    ) {
        let mut inner = self.inner.lock();
        inner.draw_calls += 1;
        if let Some(active) = inner.active_query {
            if let Some(query) = inner.queries.get_mut(&active) {
                // Stand-in pixel count; a conservative over-estimate.
                query.accumulated = query.accumulated.saturating_add(vertex_count);
            }
        }
    }

    fn begin_query(&self, query: QueryHandle, writes_enabled: bool) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.queries.get_mut(&query.0) {
            record.writes_enabled = writes_enabled;
            record.accumulated = 0;
        }
        inner.active_query = Some(query.0);
    }

    fn end_query(&self, query: QueryHandle) {
        let mut inner = self.inner.lock();
        if inner.active_query == Some(query.0) {
            inner.active_query = None;
        }
        if let Some(record) = inner.queries.get_mut(&query.0) {
            record.result = Some(record.accumulated);
            log::trace!(
                "software: query {} finished with {} (writes: {})",
                query.0,
                record.accumulated,
                record.writes_enabled
            );
        }
    }

    fn query_result(&self, query: QueryHandle, _blocking: bool) -> Option<u32> {
        self.inner
            .lock()
            .queries
            .get(&query.0)
            .and_then(|record| record.result)
    }
}

static_assertions::assert_impl_all!(SoftwareBackend: Send, Sync);
