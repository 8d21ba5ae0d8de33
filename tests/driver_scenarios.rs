//! End-to-end driver scenarios.
//!
//! These tests run the full driver facade against the software backend and
//! verify the cross-module behavior: context bring-up with pixel-format
//! fallback, frame-loop maintenance, hardware buffer caching under real draw
//! traffic, render target pooling and multi-thread context handoff.
//!
//! # Test Categories
//!
//! - **Bring-up Tests**: Surface fallback visible through driver parameters
//! - **Frame Loop Tests**: Sweeping, query aging and presentation
//! - **Caching Tests**: Upload thresholds and minimal re-uploads
//! - **Target Tests**: Shared depth pooling across binds
//! - **Threading Tests**: Context handoff between threads
//!
//! ```bash
//! cargo test --test driver_scenarios
//! ```

use std::sync::Arc;

use rstest::rstest;

use vermilion_graphics::backend::{SoftwareBackend, SurfaceSupport};
use vermilion_graphics::occlusion::STALE_QUERY_FRAMES;
use vermilion_graphics::types::{BufferKind, ClearFlags, ClearValues, ColorFormat, Extent2d};
use vermilion_graphics::{
    ContextCreationParams, ExposedContextData, GraphicsDriver, Image, ImageLoader, MappingHint,
    MeshBuffer, SceneNode, SceneNodeId,
};

fn driver_on(backend: SoftwareBackend) -> (Arc<SoftwareBackend>, GraphicsDriver) {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(backend);
    let driver = GraphicsDriver::with_backend(ContextCreationParams::default(), backend.clone())
        .expect("driver bring-up");
    (backend, driver)
}

fn mesh(vertex_count: usize, hint: MappingHint) -> Arc<MeshBuffer> {
    let buffer = Arc::new(MeshBuffer::new());
    buffer.set_vertices(&vec![[0.0f32; 3]; vertex_count]);
    buffer.set_indices(&vec![0u32; vertex_count * 3]);
    buffer.set_hardware_hint(BufferKind::Vertex, hint);
    buffer.set_hardware_hint(BufferKind::Index, hint);
    buffer
}

// ============================================================================
// Bring-up Tests
// ============================================================================

/// A platform refusing both stencil and multisampling forces the fallback
/// chain through sample reduction and the stencil flip; double buffering
/// survives because it is only dropped as the very last resort.
#[test]
fn test_fallback_chain_reported_through_driver() {
    let backend = Arc::new(
        SoftwareBackend::new().with_surface_support(SurfaceSupport {
            stencil: false,
            max_samples: 0,
            double_buffer: true,
            stereo: false,
        }),
    );
    let requested = ContextCreationParams::default().with_samples(4);
    let driver = GraphicsDriver::with_backend(requested, backend).expect("driver bring-up");

    let obtained = driver.context_params().expect("params committed");
    assert!(!obtained.stencil);
    assert_eq!(obtained.samples, 0);
    assert!(obtained.double_buffer);
}

#[test]
fn test_failed_bring_up_leaves_no_backend_state() {
    let backend = Arc::new(SoftwareBackend::new().with_unsupported_surface());
    let result = GraphicsDriver::with_backend(ContextCreationParams::default(), backend.clone());
    assert!(result.is_err());
    assert_eq!(backend.context_count(), 0);
}

// ============================================================================
// Frame Loop Tests
// ============================================================================

/// A query that is tracked but never run ages out after the stale threshold
/// and is reclaimed by the frame loop; a query that keeps running stays.
#[test]
fn test_stale_visibility_query_reclaimed_by_frame_loop() {
    let (_, mut driver) = driver_on(SoftwareBackend::new());
    let active = SceneNode {
        id: SceneNodeId(1),
        geometry: Some(mesh(8, MappingHint::Never)),
    };
    let abandoned = SceneNode {
        id: SceneNodeId(2),
        geometry: Some(mesh(8, MappingHint::Never)),
    };
    driver.add_occlusion_query(&active).unwrap();
    driver.add_occlusion_query(&abandoned).unwrap();

    for _ in 0..=STALE_QUERY_FRAMES {
        driver.begin_frame(ClearFlags::all(), &ClearValues::default());
        driver.run_occlusion_query(SceneNodeId(1), false);
        driver.end_frame();
    }

    assert!(driver.has_occlusion_query(SceneNodeId(1)));
    assert!(!driver.has_occlusion_query(SceneNodeId(2)));
    assert_eq!(driver.occlusion_query_result(SceneNodeId(2), true), None);
}

#[test]
fn test_orphaned_mesh_buffers_swept_at_end_of_frame() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let kept = mesh(600, MappingHint::Static);
    let dropped = mesh(600, MappingHint::Static);

    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
    driver.draw_mesh_buffer(&kept);
    driver.draw_mesh_buffer(&dropped);
    assert_eq!(driver.hardware_buffer_count(), 2);
    driver.end_frame();

    drop(dropped);
    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
    driver.end_frame();

    assert_eq!(driver.hardware_buffer_count(), 1);
    assert_eq!(backend.buffer_count(), 2);
}

#[test]
fn test_presentation_failure_is_reported_not_fatal() {
    let (_, mut driver) = driver_on(SoftwareBackend::new().with_failing_presentation());
    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
    assert!(!driver.end_frame());
    // The driver stays usable.
    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
}

// ============================================================================
// Caching Tests
// ============================================================================

/// Drawing the same unmodified mesh many frames in a row uploads exactly
/// once; touching only the vertex half re-uploads only that half.
#[test]
fn test_uploads_are_minimal_across_frames() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let buffer = mesh(600, MappingHint::Static);

    for _ in 0..5 {
        driver.begin_frame(ClearFlags::all(), &ClearValues::default());
        driver.draw_mesh_buffer(&buffer);
        driver.end_frame();
    }
    // One vertex and one index allocation, reused every frame.
    assert_eq!(backend.buffer_count(), 2);

    buffer.set_vertices(&vec![[1.0f32; 3]; 600]);
    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
    driver.draw_mesh_buffer(&buffer);
    driver.end_frame();
    assert_eq!(backend.buffer_count(), 2);
}

#[rstest]
#[case::below_threshold(499, 0)]
#[case::at_threshold(500, 2)]
#[case::above_threshold(2000, 2)]
fn test_upload_threshold_gating(#[case] vertex_count: usize, #[case] expected_buffers: usize) {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let buffer = mesh(vertex_count, MappingHint::Static);

    driver.begin_frame(ClearFlags::all(), &ClearValues::default());
    driver.draw_mesh_buffer(&buffer);
    driver.end_frame();

    assert_eq!(backend.buffer_count(), expected_buffers);
    assert_eq!(driver.frame_stats().draw_calls, 1);
}

#[test]
fn test_lowered_threshold_takes_effect_next_draw() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let buffer = mesh(100, MappingHint::Static);

    driver.draw_mesh_buffer(&buffer);
    assert_eq!(backend.buffer_count(), 0);

    driver.set_min_vertex_count_for_upload(50);
    driver.draw_mesh_buffer(&buffer);
    assert_eq!(backend.buffer_count(), 2);
}

// ============================================================================
// Target Tests
// ============================================================================

/// Two binds of equally sized target textures share one pooled depth
/// attachment, registered once in the texture table.
#[test]
fn test_shared_depth_pooled_across_binds() {
    let (_, mut driver) = driver_on(SoftwareBackend::new());
    let size = Extent2d::new(256, 256);
    let first = driver
        .add_render_target_texture("rt_a", size, ColorFormat::A8R8G8B8)
        .unwrap();
    let second = driver
        .add_render_target_texture("rt_b", size, ColorFormat::A8R8G8B8)
        .unwrap();

    driver
        .set_render_target(&first, ClearFlags::all(), &ClearValues::default())
        .unwrap();
    let depth_first = driver.shared_depth_texture(size).expect("pooled depth");

    driver
        .set_render_target(&second, ClearFlags::all(), &ClearValues::default())
        .unwrap();
    let depth_second = driver.shared_depth_texture(size).expect("pooled depth");

    assert!(Arc::ptr_eq(&depth_first, &depth_second));
    assert_eq!(depth_first.format(), ColorFormat::D24S8);
    // rt_a, rt_b and exactly one pooled depth texture.
    assert_eq!(driver.texture_count(), 3);

    driver
        .set_render_target_raw(None, ClearFlags::COLOR, &ClearValues::default())
        .unwrap();
}

#[test]
fn test_texture_outlives_table_removal() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let texture = driver
        .add_texture("held", Extent2d::new(32, 32), ColorFormat::A8R8G8B8)
        .unwrap();

    assert!(driver.remove_texture(&texture));
    assert!(driver.find_texture("held").is_none());
    // Still alive through our reference, released once it drops.
    assert_eq!(backend.texture_count(), 1);
    drop(texture);
    assert_eq!(backend.texture_count(), 0);
}

struct SolidLoader;

impl ImageLoader for SolidLoader {
    fn is_loadable_extension(&self, extension: &str) -> bool {
        extension == "solid"
    }

    fn is_loadable_format(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"SOLID")
    }

    fn load(&self, bytes: &[u8]) -> Option<Image> {
        bytes.starts_with(b"SOLID").then(|| Image {
            size: Extent2d::new(4, 4),
            format: ColorFormat::A8R8G8B8,
            data: vec![0xff; 64],
        })
    }
}

#[test]
fn test_get_texture_loads_once_then_serves_cache() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    driver.register_image_loader(Box::new(SolidLoader));

    let first = driver.get_texture("fill.solid", b"SOLID....").unwrap();
    let second = driver.get_texture("fill.solid", b"SOLID....").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.texture_count(), 1);

    // Content sniffing recovers a misnamed file.
    assert!(driver.get_texture("misnamed.png", b"SOLID....").is_ok());
    assert!(driver.get_texture("garbage.png", b"noise").is_err());
}

// ============================================================================
// Threading Tests
// ============================================================================

/// The rendering context can be handed from one thread to another: the
/// owning thread releases it, the receiving thread activates it and renders.
#[test]
fn test_context_handoff_between_threads() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let context = driver.context_manager().context();
    assert!(context.is_complete());

    // Release on this thread.
    assert!(driver
        .context_manager()
        .activate_context(ExposedContextData::None, false));
    assert_eq!(backend.current_context(), None);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            assert!(driver.context_manager().activate_context(context, true));
            driver.begin_frame(ClearFlags::all(), &ClearValues::default());
            assert!(driver.end_frame());
        });
    });

    assert_eq!(backend.current_context(), Some(context.context_handle()));
}

/// Partially null context data never deactivates; the primary context is
/// restored instead.
#[test]
fn test_partial_context_data_restores_primary() {
    let (backend, mut driver) = driver_on(SoftwareBackend::new());
    let primary = driver.context_manager().primary_context();

    assert!(driver
        .context_manager()
        .activate_context(ExposedContextData::None, false));
    let partial = primary.with_context_handle(0);
    assert!(driver.context_manager().activate_context(partial, false));

    assert_eq!(backend.current_context(), Some(primary.context_handle()));
}
