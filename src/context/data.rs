//! Exposed native context data.
//!
//! [`ExposedContextData`] describes "this context, on this surface, on this
//! display" with exactly the native handles the target platform needs. It is
//! a proper tagged union; only one platform representation is ever active,
//! which rules out the type-confusion bugs of overlapping raw storage.

/// Native handle triple identifying a rendering context.
///
/// Handles are opaque integers owned by the platform layer; `0` means
/// "no handle". Produced by
/// [`NativeContextManager::context`](crate::context::NativeContextManager::context)
/// and consumed by
/// [`NativeContextManager::activate_context`](crate::context::NativeContextManager::activate_context),
/// possibly on a different thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExposedContextData {
    /// No handles at all; the fully-null value.
    #[default]
    None,
    /// Win32: window handle, device-context handle, rendering-context handle.
    Win32 {
        /// HWND.
        window: u64,
        /// HDC.
        device_context: u64,
        /// HGLRC.
        rendering_context: u64,
    },
    /// X11: display connection, window, GLX context.
    Xlib {
        /// Display pointer.
        display: u64,
        /// Window XID.
        window: u64,
        /// Context handle.
        context: u64,
    },
    /// Headless/software: minted window, surface and context identifiers.
    Offscreen {
        /// Pseudo window identifier.
        window: u64,
        /// Surface identifier.
        surface: u64,
        /// Context identifier.
        context: u64,
    },
}

impl ExposedContextData {
    /// The handle triple as `(window, surface/display, context)`, or `None`
    /// for the fully-null variant.
    pub fn parts(&self) -> Option<(u64, u64, u64)> {
        match *self {
            Self::None => None,
            Self::Win32 {
                window,
                device_context,
                rendering_context,
            } => Some((window, device_context, rendering_context)),
            Self::Xlib {
                display,
                window,
                context,
            } => Some((window, display, context)),
            Self::Offscreen {
                window,
                surface,
                context,
            } => Some((window, surface, context)),
        }
    }

    /// All three handles are present.
    pub fn is_complete(&self) -> bool {
        matches!(self.parts(), Some((w, s, c)) if w != 0 && s != 0 && c != 0)
    }

    /// No handle is present at all.
    pub fn is_fully_null(&self) -> bool {
        matches!(self.parts(), None | Some((0, 0, 0)))
    }

    /// The rendering-context handle, or 0 if absent.
    pub fn context_handle(&self) -> u64 {
        self.parts().map(|(_, _, c)| c).unwrap_or(0)
    }

    /// A copy with the rendering-context handle replaced.
    pub fn with_context_handle(self, handle: u64) -> Self {
        match self {
            Self::None => Self::None,
            Self::Win32 {
                window,
                device_context,
                ..
            } => Self::Win32 {
                window,
                device_context,
                rendering_context: handle,
            },
            Self::Xlib {
                display, window, ..
            } => Self::Xlib {
                display,
                window,
                context: handle,
            },
            Self::Offscreen {
                window, surface, ..
            } => Self::Offscreen {
                window,
                surface,
                context: handle,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_classification() {
        assert!(ExposedContextData::None.is_fully_null());
        assert!(!ExposedContextData::None.is_complete());

        let zeroed = ExposedContextData::Offscreen {
            window: 0,
            surface: 0,
            context: 0,
        };
        assert!(zeroed.is_fully_null());
    }

    #[test]
    fn test_partial_is_neither() {
        let partial = ExposedContextData::Offscreen {
            window: 1,
            surface: 2,
            context: 0,
        };
        assert!(!partial.is_complete());
        assert!(!partial.is_fully_null());
    }

    #[test]
    fn test_with_context_handle() {
        let surface_only = ExposedContextData::Win32 {
            window: 10,
            device_context: 11,
            rendering_context: 0,
        };
        let full = surface_only.with_context_handle(12);
        assert!(full.is_complete());
        assert_eq!(full.context_handle(), 12);
    }
}
