//! Native context lifecycle management.
//!
//! [`NativeContextManager`] owns the platform handshake: open the display,
//! choose a pixel format (with the documented fallback sequence), create the
//! drawable surface and the rendering context, and arbitrate which context is
//! current on the calling thread.
//!
//! # State machine
//!
//! ```text
//! (fresh) --initialize--> initialized --generate_surface--> surfaced
//!         --generate_context--> contexted --activate_context--> active
//! ```
//!
//! `destroy_surface`, `destroy_context` and `terminate` each tear down one
//! stage and are safe to call in any order, including when the corresponding
//! resource was never created. After `terminate` a fresh `initialize` is
//! required.
//!
//! # Threading
//!
//! At most one thread may hold an active context at a time. Handoff between
//! threads is a documented caller contract, not enforced by a lock: the
//! outgoing thread must release (activate with a fully-null value and
//! `restore_primary_on_zero = false`) before the incoming thread activates
//! its own context.

use std::sync::Arc;

use crate::backend::{NativePlatform, ProcAddress};
use crate::error::DriverError;

use super::{ContextCreationParams, ExposedContextData};

/// Fallback phases for pixel-format selection, tried in this exact order.
///
/// The order (multisample reduction inside each phase, then stencil, then
/// double-buffer as the last resort) is authoritative; see the crate docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackPhase {
    AsRequested,
    DropStencil,
    DropDoubleBuffer,
}

const FALLBACK_PHASES: [FallbackPhase; 3] = [
    FallbackPhase::AsRequested,
    FallbackPhase::DropStencil,
    FallbackPhase::DropDoubleBuffer,
];

/// Owns the handshake with a platform rendering context.
pub struct NativeContextManager {
    platform: Arc<dyn NativePlatform>,
    params: Option<ContextCreationParams>,
    /// The first context ever created; restored on null activation.
    primary: ExposedContextData,
    /// The context the calling thread currently owns.
    current: ExposedContextData,
    /// Window + surface handles, rendering-context handle still null.
    surface: ExposedContextData,
    display_open: bool,
    surface_created: bool,
}

impl NativeContextManager {
    /// Create a manager over a platform implementation.
    pub fn new(platform: Arc<dyn NativePlatform>) -> Self {
        Self {
            platform,
            params: None,
            primary: ExposedContextData::None,
            current: ExposedContextData::None,
            surface: ExposedContextData::None,
            display_open: false,
            surface_created: false,
        }
    }

    /// Store creation parameters and open the platform display.
    ///
    /// Records `window` as the primary native window identity unless one was
    /// already recorded; re-invocation with a different surface descriptor
    /// therefore only affects non-primary contexts.
    ///
    /// # Errors
    ///
    /// [`DriverError::Configuration`] when the platform display/server
    /// cannot be opened.
    pub fn initialize(
        &mut self,
        params: ContextCreationParams,
        window: ExposedContextData,
    ) -> Result<(), DriverError> {
        self.platform.open_display(&params)?;
        self.display_open = true;
        self.params = Some(params);
        self.current = window;
        if self.primary.is_fully_null() {
            self.primary = window;
        }
        log::info!("context manager initialized on {}", self.platform.name());
        Ok(())
    }

    /// Create the drawable surface, applying the pixel-format fallback
    /// policy.
    ///
    /// The fully-specified request is tried first. On failure the sample
    /// count is progressively reduced to zero; then the stencil request is
    /// flipped off (with a warning) and the reduction loop redone; then
    /// double buffering is dropped as the last resort. The working copy of
    /// the parameters carries across phases, and only a successful outcome
    /// replaces the stored parameters, so a partial-failure state is never
    /// observable through [`params`](Self::params).
    ///
    /// # Errors
    ///
    /// [`DriverError::SurfaceCreation`] once every fallback step is
    /// exhausted, or when the platform fails to create the drawable for an
    /// accepted format.
    pub fn generate_surface(&mut self) -> Result<(), DriverError> {
        let requested = self.params.ok_or_else(|| {
            DriverError::Configuration("generate_surface called before initialize".to_string())
        })?;

        let mut working = requested;
        let mut accepted = false;

        'phases: for phase in FALLBACK_PHASES {
            match phase {
                FallbackPhase::AsRequested => {}
                FallbackPhase::DropStencil => {
                    if !working.stencil {
                        continue;
                    }
                    working.stencil = false;
                    log::warn!(
                        "cannot create a surface with stencil buffer, disabling stencil shadows"
                    );
                }
                FallbackPhase::DropDoubleBuffer => {
                    if !working.double_buffer {
                        continue;
                    }
                    working.double_buffer = false;
                    log::warn!("cannot create a double-buffered surface, disabling double buffering");
                }
            }

            let phase_samples = working.samples;
            let mut reduced_in_phase = false;
            loop {
                if self.platform.supports_pixel_format(&working) {
                    if reduced_in_phase {
                        if working.samples == 0 {
                            log::warn!(
                                "multisampling not available at {} samples, disabling anti-aliasing",
                                phase_samples
                            );
                        } else {
                            log::warn!(
                                "multisampling reduced from {} to {} samples",
                                phase_samples,
                                working.samples
                            );
                        }
                    }
                    accepted = true;
                    break 'phases;
                }
                if working.samples == 0 {
                    break;
                }
                working.samples /= 2;
                reduced_in_phase = true;
            }
        }

        if !accepted {
            return Err(DriverError::SurfaceCreation(
                "no pixel format matches the requested capabilities".to_string(),
            ));
        }

        let surface = self.platform.create_surface(&working)?;

        // Commit only now: queries after a successful fallback reflect what
        // was actually obtained.
        self.params = Some(working);
        self.surface = surface;
        self.surface_created = true;
        self.current = surface;
        if self.primary.is_fully_null() {
            self.primary = surface;
        }
        log::debug!("surface created: {:?}", surface);
        Ok(())
    }

    /// Create the rendering context against the current surface.
    ///
    /// The attribute-based creation path is preferred; when its entry point
    /// is absent at run time, or when it fails, the legacy path is tried
    /// transparently.
    ///
    /// # Errors
    ///
    /// [`DriverError::ContextCreation`] when every available creation path
    /// failed.
    pub fn generate_context(&mut self) -> Result<(), DriverError> {
        if !self.surface_created {
            return Err(DriverError::ContextCreation(
                "generate_context called before generate_surface".to_string(),
            ));
        }

        let context = match self.platform.create_context_attribs(&self.surface) {
            Some(Ok(data)) => data,
            Some(Err(err)) => {
                log::warn!(
                    "attribute-based context creation failed ({err}), trying legacy path"
                );
                self.platform.create_context_legacy(&self.surface)?
            }
            None => {
                log::debug!("attribute-based context creation unavailable, using legacy path");
                self.platform.create_context_legacy(&self.surface)?
            }
        };

        self.current = context;
        if self.primary.context_handle() == 0 {
            self.primary = context;
        }
        log::debug!("rendering context created: {:?}", context);
        Ok(())
    }

    /// Make a specific context current on the calling thread.
    ///
    /// Three behaviors, keyed on the zero-ness of `data`:
    ///
    /// 1. complete handles — make that context current;
    /// 2. fully null and `restore_primary_on_zero == false` — release the
    ///    thread's current context;
    /// 3. fully null with the flag set, or partially null — re-activate the
    ///    primary context.
    ///
    /// Returns `false` when the platform switch failed; the previous current
    /// context is left untouched in that case.
    pub fn activate_context(
        &mut self,
        data: ExposedContextData,
        restore_primary_on_zero: bool,
    ) -> bool {
        if data.is_complete() {
            if !self.platform.make_current(&data) {
                log::warn!("render context switch failed");
                return false;
            }
            self.current = data;
        } else if data.is_fully_null() && !restore_primary_on_zero {
            if !self.platform.release_current() {
                log::warn!("render context release failed");
                return false;
            }
            self.current = ExposedContextData::None;
        } else if self.current != self.primary {
            if !self.platform.make_current(&self.primary) {
                log::warn!("render context switch back to primary failed");
                return false;
            }
            self.current = self.primary;
        }
        true
    }

    /// Release the drawable surface. No-op when never created.
    pub fn destroy_surface(&mut self) {
        if self.surface_created {
            self.platform.destroy_surface();
            self.surface = ExposedContextData::None;
            self.surface_created = false;
        }
    }

    /// Release the rendering context. No-op when never created.
    ///
    /// A released thread (`current` null after a handoff release) still owns
    /// the primary context; teardown destroys that one so the native handle
    /// cannot leak.
    pub fn destroy_context(&mut self) {
        let target = if self.current.context_handle() != 0 {
            self.current
        } else {
            self.primary
        };
        if target.context_handle() != 0 {
            self.platform.release_current();
            self.platform.destroy_context(&target);
            if self.primary.context_handle() == target.context_handle() {
                self.primary = self.primary.with_context_handle(0);
            }
            if self.current.context_handle() == target.context_handle() {
                self.current = self.current.with_context_handle(0);
            }
        }
    }

    /// Reset all stored state and close the display.
    ///
    /// A fresh [`initialize`](Self::initialize) is required before the
    /// manager is usable again. Safe to call at any point.
    pub fn terminate(&mut self) {
        if self.display_open {
            self.platform.close_display();
            self.display_open = false;
        }
        self.params = None;
        self.primary = ExposedContextData::None;
        self.current = ExposedContextData::None;
        self.surface = ExposedContextData::None;
        self.surface_created = false;
    }

    /// Resolve a backend entry point; `None` when unresolved.
    pub fn get_proc_address(&self, name: &str) -> Option<ProcAddress> {
        self.platform.get_proc_address(name)
    }

    /// Present the current frame. `false` is routinely non-fatal.
    pub fn swap_buffers(&self) -> bool {
        self.platform.swap_buffers(&self.current)
    }

    /// The currently active context data.
    pub fn context(&self) -> ExposedContextData {
        self.current
    }

    /// The primary context data.
    pub fn primary_context(&self) -> ExposedContextData {
        self.primary
    }

    /// The stored creation parameters, downgraded in place by any fallback
    /// step that succeeded.
    pub fn params(&self) -> Option<&ContextCreationParams> {
        self.params.as_ref()
    }

    /// Whether `initialize` has been called since construction or the last
    /// `terminate`.
    pub fn is_initialized(&self) -> bool {
        self.params.is_some()
    }
}

impl std::fmt::Debug for NativeContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeContextManager")
            .field("platform", &self.platform.name())
            .field("current", &self.current)
            .field("primary", &self.primary)
            .field("surface_created", &self.surface_created)
            .finish()
    }
}

static_assertions::assert_impl_all!(NativeContextManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SoftwareBackend, SurfaceSupport};

    fn manager_with(support: SurfaceSupport) -> NativeContextManager {
        let backend = Arc::new(SoftwareBackend::new().with_surface_support(support));
        NativeContextManager::new(backend)
    }

    // Collects log records so tests can assert on the downgrade warnings.
    // Entries are tagged with the emitting thread so concurrently running
    // tests cannot pollute each other's observations.
    struct CapturingLogger;

    static CAPTURED: parking_lot::Mutex<Vec<(std::thread::ThreadId, log::Level, String)>> =
        parking_lot::Mutex::new(Vec::new());
    static LOGGER: CapturingLogger = CapturingLogger;

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED.lock().push((
                std::thread::current().id(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    fn capture_warnings(run: impl FnOnce()) -> Vec<String> {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(log::LevelFilter::Trace);
        });
        let thread = std::thread::current().id();
        let start = CAPTURED.lock().len();
        run();
        CAPTURED.lock()[start..]
            .iter()
            .filter(|(id, level, _)| *id == thread && *level == log::Level::Warn)
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    fn bring_up(manager: &mut NativeContextManager, params: ContextCreationParams) {
        manager
            .initialize(params, ExposedContextData::None)
            .unwrap();
        manager.generate_surface().unwrap();
        manager.generate_context().unwrap();
    }

    #[test]
    fn test_full_request_accepted_unchanged() {
        let mut manager = manager_with(SurfaceSupport::default());
        let params = ContextCreationParams::default().with_samples(4);
        bring_up(&mut manager, params);
        assert_eq!(manager.params(), Some(&params));
        assert!(manager.context().is_complete());
    }

    #[test]
    fn test_stencil_fallback_downgrades_stored_params() {
        let support = SurfaceSupport {
            stencil: false,
            max_samples: 0,
            double_buffer: true,
            stereo: true,
        };
        let mut manager = manager_with(support);
        let params = ContextCreationParams::default().with_samples(4);
        bring_up(&mut manager, params);

        let obtained = manager.params().unwrap();
        assert!(!obtained.stencil);
        assert_eq!(obtained.samples, 0);
        assert!(obtained.double_buffer);
    }

    #[test]
    fn test_double_buffer_is_last_resort() {
        let support = SurfaceSupport {
            stencil: false,
            max_samples: 0,
            double_buffer: false,
            stereo: true,
        };
        let mut manager = manager_with(support);
        bring_up(&mut manager, ContextCreationParams::default().with_samples(2));

        let obtained = manager.params().unwrap();
        assert!(!obtained.stencil);
        assert!(!obtained.double_buffer);
        assert_eq!(obtained.samples, 0);
    }

    #[test]
    fn test_surface_failure_leaves_params_untouched() {
        let backend = Arc::new(SoftwareBackend::new().with_unsupported_surface());
        let mut manager = NativeContextManager::new(backend);
        let params = ContextCreationParams::default().with_samples(4);
        manager
            .initialize(params, ExposedContextData::None)
            .unwrap();

        let err = manager.generate_surface().unwrap_err();
        assert!(matches!(err, DriverError::SurfaceCreation(_)));
        // Never commit a partially downgraded request.
        assert_eq!(manager.params(), Some(&params));
    }

    #[test]
    fn test_legacy_context_path_when_attribs_absent() {
        let backend = Arc::new(SoftwareBackend::new().without_attrib_context());
        let mut manager = NativeContextManager::new(backend);
        bring_up(&mut manager, ContextCreationParams::default());
        assert!(manager.context().is_complete());
    }

    #[test]
    fn test_teardown_is_idempotent_in_any_order() {
        let mut manager = manager_with(SurfaceSupport::default());

        // Never created anything at all.
        manager.destroy_context();
        manager.destroy_surface();
        manager.terminate();

        bring_up(&mut manager, ContextCreationParams::default());
        manager.terminate();
        manager.destroy_surface();
        manager.destroy_context();

        // Usable again after terminate.
        bring_up(&mut manager, ContextCreationParams::default());
        assert!(manager.context().is_complete());
    }

    #[test]
    fn test_activate_release_and_restore_primary() {
        let mut manager = manager_with(SurfaceSupport::default());
        bring_up(&mut manager, ContextCreationParams::default());
        let primary = manager.context();

        // Release: fully-null data with the restore flag off.
        assert!(manager.activate_context(ExposedContextData::None, false));
        assert!(manager.context().is_fully_null());

        // Fully-null with the restore flag set goes back to the primary.
        assert!(manager.activate_context(ExposedContextData::None, true));
        assert_eq!(manager.context(), primary);
    }

    #[test]
    fn test_partial_data_restores_primary() {
        let mut manager = manager_with(SurfaceSupport::default());
        bring_up(&mut manager, ContextCreationParams::default());
        let primary = manager.context();
        assert!(manager.activate_context(ExposedContextData::None, false));

        let partial = ExposedContextData::Offscreen {
            window: 0,
            surface: 0,
            context: 77,
        };
        assert!(manager.activate_context(partial, false));
        assert_eq!(manager.context(), primary);
    }

    #[test]
    fn test_destroy_after_release_still_frees_the_context() {
        let backend = Arc::new(SoftwareBackend::new());
        let mut manager = NativeContextManager::new(backend.clone());
        bring_up(&mut manager, ContextCreationParams::default());
        assert_eq!(backend.context_count(), 1);

        // Handoff release nulls `current`; teardown must still destroy the
        // primary context instead of leaking the native handle.
        assert!(manager.activate_context(ExposedContextData::None, false));
        manager.destroy_context();
        assert_eq!(backend.context_count(), 0);
        assert_eq!(manager.primary_context().context_handle(), 0);

        manager.destroy_context();
        assert_eq!(backend.context_count(), 0);
    }

    #[test]
    fn test_stencil_fallback_warns_exactly_once() {
        let support = SurfaceSupport {
            stencil: false,
            max_samples: 0,
            double_buffer: true,
            stereo: true,
        };
        let mut manager = manager_with(support);

        // Samples are reduced to zero inside the first phase; the stencil
        // flip then succeeds immediately, so the stencil warning is the only
        // downgrade event reported.
        let warnings = capture_warnings(|| {
            bring_up(&mut manager, ContextCreationParams::default().with_samples(4));
        });
        assert_eq!(warnings.len(), 1, "unexpected warnings: {warnings:?}");
        assert!(warnings[0].contains("stencil"));
    }

    #[test]
    fn test_get_proc_address_unresolved_is_none() {
        let manager = manager_with(SurfaceSupport::default());
        assert!(manager.get_proc_address("no_such_entry_point").is_none());
    }
}
