//! Buffer-related value types.

/// Caller-supplied intent guiding the hardware buffer caching policy.
///
/// `Never` opts a buffer out of hardware upload entirely; the other hints
/// tag the backend allocation for the expected update frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MappingHint {
    /// Never upload a hardware copy; always submit raw CPU data.
    #[default]
    Never,
    /// Uploaded once, rarely changed.
    Static,
    /// Changed occasionally.
    Dynamic,
    /// Rewritten nearly every frame.
    Stream,
}

impl MappingHint {
    /// The backend usage class a hardware allocation gets under this hint.
    pub fn usage(&self) -> BufferUsage {
        match self {
            Self::Never | Self::Static => BufferUsage::Static,
            Self::Dynamic | Self::Stream => BufferUsage::Dynamic,
        }
    }
}

/// Which half of a mesh buffer an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Vertex data.
    Vertex,
    /// Index data.
    Index,
}

/// Usage class for a backend buffer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Rarely updated after the initial upload.
    Static,
    /// Updated frequently.
    Dynamic,
}
