//! Driver facade.
//!
//! `GraphicsDriver` owns every subsystem and exposes the engine-facing API:
//! texture management, mesh drawing with transparent hardware caching,
//! render target binding, visibility queries and the frame loop. Teardown
//! runs in dependency order so no subsystem touches a backend object another
//! one already released.

use std::sync::Arc;

use crate::backend::{
    CommandSubmitter, NativePlatform, ProcAddress, ResourceFactory, SoftwareBackend,
};
use crate::context::{ContextCreationParams, ExposedContextData, NativeContextManager};
use crate::error::DriverError;
use crate::image::{Image, ImageLoader, LoaderRegistry};
use crate::occlusion::{SceneNode, SceneNodeId, VisibilityQueryTracker};
use crate::resources::{
    HardwareBufferCache, MeshBuffer, ResourceTable, Texture, TextureSource,
};
use crate::target::{RenderTarget, RenderTargetPool};
use crate::types::{ClearFlags, ClearValues, ColorFormat, Extent2d, FrameStats};

/// Top-level driver tying the context, resource and submission layers
/// together.
pub struct GraphicsDriver {
    queries: VisibilityQueryTracker,
    targets: RenderTargetPool,
    textures: ResourceTable,
    buffers: HardwareBufferCache,
    loaders: LoaderRegistry,
    context: NativeContextManager,
    factory: Arc<dyn ResourceFactory>,
    submitter: Arc<dyn CommandSubmitter>,
    screen_size: Extent2d,
    frame_stats: FrameStats,
}

impl GraphicsDriver {
    /// Bring up a driver: open the display, create the surface (running the
    /// pixel-format fallback), create and activate a rendering context.
    pub fn new(
        params: ContextCreationParams,
        window: ExposedContextData,
        platform: Arc<dyn NativePlatform>,
        factory: Arc<dyn ResourceFactory>,
        submitter: Arc<dyn CommandSubmitter>,
    ) -> Result<Self, DriverError> {
        let screen_size = params.window_size;
        let mut context = NativeContextManager::new(platform);
        context.initialize(params, window)?;
        let brought_up = match context.generate_surface() {
            Ok(()) => context.generate_context(),
            Err(error) => Err(error),
        };
        if let Err(error) = brought_up {
            context.terminate();
            return Err(error);
        }
        if !context.activate_context(context.context(), false) {
            context.terminate();
            return Err(DriverError::ContextCreation(
                "could not activate the fresh rendering context".to_string(),
            ));
        }

        Ok(Self {
            queries: VisibilityQueryTracker::new(factory.clone(), submitter.clone()),
            targets: RenderTargetPool::new(factory.clone(), submitter.clone(), screen_size),
            textures: ResourceTable::new(),
            buffers: HardwareBufferCache::new(factory.clone()),
            loaders: LoaderRegistry::new(),
            context,
            factory,
            submitter,
            screen_size,
            frame_stats: FrameStats::default(),
        })
    }

    /// Bring up a driver on the software backend, mainly for tests and
    /// headless tools.
    pub fn with_software_backend(params: ContextCreationParams) -> Result<Self, DriverError> {
        let backend = Arc::new(SoftwareBackend::new());
        Self::with_backend(params, backend)
    }

    /// Bring up a driver on a specific software backend instance, keeping
    /// the caller's handle for observation.
    pub fn with_backend(
        params: ContextCreationParams,
        backend: Arc<SoftwareBackend>,
    ) -> Result<Self, DriverError> {
        Self::new(
            params,
            ExposedContextData::None,
            backend.clone() as Arc<dyn NativePlatform>,
            backend.clone() as Arc<dyn ResourceFactory>,
            backend as Arc<dyn CommandSubmitter>,
        )
    }

    // ---- textures ------------------------------------------------------

    /// Create an empty texture and register it under `name`.
    ///
    /// An existing texture of the same name is returned instead, marked as
    /// served from cache; the requested parameters are then ignored.
    pub fn add_texture(
        &mut self,
        name: &str,
        size: Extent2d,
        format: ColorFormat,
    ) -> Result<Arc<Texture>, DriverError> {
        self.register_texture(name, size, format, false, TextureSource::Created)
    }

    /// Create a render-target capable texture and register it under `name`.
    pub fn add_render_target_texture(
        &mut self,
        name: &str,
        size: Extent2d,
        format: ColorFormat,
    ) -> Result<Arc<Texture>, DriverError> {
        self.register_texture(name, size, format, true, TextureSource::Created)
    }

    fn register_texture(
        &mut self,
        name: &str,
        size: Extent2d,
        format: ColorFormat,
        render_target: bool,
        source: TextureSource,
    ) -> Result<Arc<Texture>, DriverError> {
        if name.is_empty() {
            log::warn!("refusing to create a texture with an empty name");
            return Err(DriverError::InvalidParameter(
                "texture name must not be empty".to_string(),
            ));
        }
        if let Some(existing) = self.textures.find(name) {
            log::warn!("texture '{name}' already exists, returning the cached one");
            existing.mark_cached();
            return Ok(existing.clone());
        }
        let texture = Arc::new(Texture::new(
            &self.factory,
            name,
            size,
            format,
            render_target,
            source,
        )?);
        self.textures.insert(texture.clone());
        Ok(texture)
    }

    /// Fetch a texture by name, decoding and uploading `bytes` on a miss.
    ///
    /// # Errors
    ///
    /// [`DriverError::TextureLoad`] when no registered loader can decode the
    /// data.
    pub fn get_texture(&mut self, name: &str, bytes: &[u8]) -> Result<Arc<Texture>, DriverError> {
        if let Some(existing) = self.textures.find(name) {
            existing.mark_cached();
            return Ok(existing.clone());
        }
        let image = self.loaders.load(name, bytes).ok_or_else(|| {
            DriverError::TextureLoad(format!("no loader could decode '{name}'"))
        })?;
        let texture = self.register_texture(
            name,
            image.size,
            image.format,
            false,
            TextureSource::FromFile,
        )?;
        log::debug!("loaded texture '{name}' ({})", image.size);
        Ok(texture)
    }

    /// Unregister one texture. The texture stays alive for holders of other
    /// references but can no longer be found by name.
    pub fn remove_texture(&mut self, texture: &Arc<Texture>) -> bool {
        self.textures.remove(texture)
    }

    /// Look a texture up by name without loading anything.
    pub fn find_texture(&self, name: &str) -> Option<Arc<Texture>> {
        self.textures.find(name).cloned()
    }

    /// Number of registered textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Register an image loader for [`get_texture`](Self::get_texture).
    pub fn register_image_loader(&mut self, loader: Box<dyn ImageLoader>) {
        self.loaders.register(loader);
    }

    /// Decode raw file bytes without creating a texture.
    pub fn load_image(&self, name: &str, bytes: &[u8]) -> Option<Image> {
        self.loaders.load(name, bytes)
    }

    // ---- meshes --------------------------------------------------------

    /// Draw a mesh buffer, reconciling its hardware state first.
    ///
    /// A hardware allocation failure is not fatal; the draw falls back to
    /// raw CPU data for that frame.
    pub fn draw_mesh_buffer(&mut self, buffer: &Arc<MeshBuffer>) {
        let sources = match self.buffers.reconcile(buffer) {
            Ok(sources) => sources,
            Err(error) => {
                log::warn!("hardware buffer upload failed, drawing from CPU data: {error}");
                crate::resources::DrawSources {
                    vertices: None,
                    indices: None,
                }
            }
        };
        let vertices = buffer.vertices();
        let indices = buffer.indices();
        let (vertex_source, index_source) =
            HardwareBufferCache::sources_for(&sources, &vertices, &indices);
        let primitive_count = buffer.index_count() / 3;
        self.submitter.draw(
            vertex_source,
            buffer.vertex_count(),
            index_source,
            primitive_count,
        );
        self.frame_stats.draw_calls += 1;
        self.frame_stats.primitives_drawn += u64::from(primitive_count);
    }

    /// Release the hardware buffers of one mesh buffer.
    pub fn remove_hardware_buffer(&mut self, buffer: &MeshBuffer) {
        self.buffers.remove(buffer.id());
    }

    /// Release every hardware buffer. CPU-side mesh data is untouched; the
    /// next draw re-uploads eligible buffers.
    pub fn remove_all_hardware_buffers(&mut self) {
        self.buffers.clear();
    }

    /// Adjust the minimum vertex count for hardware upload.
    pub fn set_min_vertex_count_for_upload(&mut self, count: u32) {
        self.buffers.set_min_vertex_count(count);
    }

    /// Number of live hardware buffer links.
    pub fn hardware_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    // ---- render targets ------------------------------------------------

    /// Render into a single color texture with a pooled depth attachment.
    pub fn set_render_target(
        &mut self,
        color: &Arc<Texture>,
        clear: ClearFlags,
        values: &ClearValues,
    ) -> Result<(), DriverError> {
        self.targets
            .bind_simple(&mut self.textures, color, clear, values)
    }

    /// Render into a prepared multi-attachment target, or back to the
    /// primary surface with `None`.
    pub fn set_render_target_raw(
        &mut self,
        target: Option<RenderTarget>,
        clear: ClearFlags,
        values: &ClearValues,
    ) -> Result<(), DriverError> {
        self.targets.bind_raw(target, clear, values)
    }

    /// The pooled depth texture for a target size, if one was created.
    pub fn shared_depth_texture(&self, size: Extent2d) -> Option<Arc<Texture>> {
        self.targets.shared_depth(size).cloned()
    }

    /// Drop the active target and the pooled depth attachments. Pooled
    /// textures still registered in the table are removed from it too.
    pub fn remove_all_render_targets(&mut self) {
        let pooled: Vec<Arc<Texture>> = self
            .textures
            .iter()
            .filter(|texture| texture.name() == crate::target::SHARED_DEPTH_NAME)
            .cloned()
            .collect();
        for texture in &pooled {
            self.textures.remove(texture);
        }
        self.targets.remove_all();
    }

    // ---- visibility queries --------------------------------------------

    /// Register a scene node for visibility testing.
    pub fn add_occlusion_query(&mut self, node: &SceneNode) -> Result<(), DriverError> {
        self.queries.track(node)
    }

    /// Remove a node's visibility query.
    pub fn remove_occlusion_query(&mut self, node: SceneNodeId) {
        self.queries.untrack(node);
    }

    /// Remove every visibility query.
    pub fn remove_all_occlusion_queries(&mut self) {
        self.queries.untrack_all();
    }

    /// Run the visibility query of one node.
    pub fn run_occlusion_query(&mut self, node: SceneNodeId, visible_hint: bool) {
        self.queries.run_query(node, visible_hint);
    }

    /// Run every registered visibility query.
    pub fn run_all_occlusion_queries(&mut self, visible_hint: bool) {
        self.queries.run_all(visible_hint);
    }

    /// Latest pixel count for a node, `None` when untracked.
    pub fn occlusion_query_result(&mut self, node: SceneNodeId, blocking: bool) -> Option<u32> {
        self.queries.poll_result(node, blocking)
    }

    /// Whether a node currently has a visibility query.
    pub fn has_occlusion_query(&self, node: SceneNodeId) -> bool {
        self.queries.tracked(node)
    }

    // ---- frame loop ----------------------------------------------------

    /// Start a frame: reset counters and clear the bound target.
    pub fn begin_frame(&mut self, clear: ClearFlags, values: &ClearValues) {
        self.frame_stats = FrameStats::default();
        self.submitter.clear(clear, values);
    }

    /// Finish a frame: sweep orphaned hardware buffers, collect query
    /// results and age the queries, then present.
    ///
    /// Returns whether presentation succeeded. A `false` is not fatal; an
    /// occluded or minimized window reports it routinely.
    pub fn end_frame(&mut self) -> bool {
        self.buffers.sweep();
        self.queries.update_all(false);
        let presented = self.context.swap_buffers();
        if !presented {
            log::debug!("presentation skipped or failed");
        }
        presented
    }

    /// Track a window resize.
    pub fn on_resize(&mut self, size: Extent2d) {
        if size == self.screen_size {
            return;
        }
        log::info!("screen resized to {size}");
        self.screen_size = size;
        self.targets.on_resize(size);
    }

    /// Counters for the frame in flight.
    pub fn frame_stats(&self) -> FrameStats {
        self.frame_stats
    }

    /// Current screen size.
    pub fn screen_size(&self) -> Extent2d {
        self.screen_size
    }

    /// The context parameters actually in effect after fallback.
    pub fn context_params(&self) -> Option<&ContextCreationParams> {
        self.context.params()
    }

    /// Resolve a backend entry point by name.
    pub fn get_proc_address(&self, name: &str) -> Option<ProcAddress> {
        self.context.get_proc_address(name)
    }

    /// Direct access to the context manager, for handing the rendering
    /// context between threads.
    pub fn context_manager(&mut self) -> &mut NativeContextManager {
        &mut self.context
    }
}

impl Drop for GraphicsDriver {
    fn drop(&mut self) {
        self.queries.untrack_all();
        self.targets.remove_all();
        self.textures.purge_all();
        self.buffers.clear();
        self.context.destroy_context();
        self.context.destroy_surface();
        self.context.terminate();
    }
}

impl std::fmt::Debug for GraphicsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDriver")
            .field("screen_size", &self.screen_size)
            .field("textures", &self.textures.len())
            .field("hardware_buffers", &self.buffers.len())
            .field("queries", &self.queries.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDriver: Send);
