//! CPU-side mesh buffers.
//!
//! A `MeshBuffer` holds vertex and index data in raw bytes, each half with
//! its own change serial. The hardware cache compares serials against the
//! ones it captured at upload time, so touching only the vertices leaves the
//! index allocation alone and vice versa.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::types::{BufferKind, MappingHint};

static NEXT_MESH_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct MeshBufferData {
    vertices: Vec<u8>,
    vertex_count: u32,
    indices: Vec<u8>,
    index_count: u32,
    vertex_hint: MappingHint,
    index_hint: MappingHint,
}

/// Shared, internally synchronized mesh buffer.
#[derive(Debug)]
pub struct MeshBuffer {
    id: u64,
    inner: RwLock<MeshBufferData>,
    vertex_serial: AtomicU64,
    index_serial: AtomicU64,
}

impl MeshBuffer {
    /// Create an empty mesh buffer with a process-unique id.
    pub fn new() -> Self {
        Self {
            id: NEXT_MESH_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            inner: RwLock::new(MeshBufferData::default()),
            vertex_serial: AtomicU64::new(1),
            index_serial: AtomicU64::new(1),
        }
    }

    /// Stable id used as the hardware cache key.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Replace the vertex data and bump the vertex serial.
    pub fn set_vertices<T: bytemuck::Pod>(&self, vertices: &[T]) {
        let mut data = self.inner.write();
        data.vertices = bytemuck::cast_slice(vertices).to_vec();
        data.vertex_count = vertices.len() as u32;
        drop(data);
        self.vertex_serial.fetch_add(1, Ordering::Release);
    }

    /// Replace the index data and bump the index serial.
    pub fn set_indices<T: bytemuck::Pod>(&self, indices: &[T]) {
        let mut data = self.inner.write();
        data.indices = bytemuck::cast_slice(indices).to_vec();
        data.index_count = indices.len() as u32;
        drop(data);
        self.index_serial.fetch_add(1, Ordering::Release);
    }

    /// Request hardware mapping for one half of the buffer.
    pub fn set_hardware_hint(&self, kind: BufferKind, hint: MappingHint) {
        let mut data = self.inner.write();
        match kind {
            BufferKind::Vertex => data.vertex_hint = hint,
            BufferKind::Index => data.index_hint = hint,
        }
    }

    /// Current mapping hint for one half.
    pub fn hardware_hint(&self, kind: BufferKind) -> MappingHint {
        let data = self.inner.read();
        match kind {
            BufferKind::Vertex => data.vertex_hint,
            BufferKind::Index => data.index_hint,
        }
    }

    /// Raw vertex bytes.
    pub fn vertices(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.inner.read(), |data| data.vertices.as_slice())
    }

    /// Raw index bytes.
    pub fn indices(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.inner.read(), |data| data.indices.as_slice())
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> u32 {
        self.inner.read().vertex_count
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.inner.read().index_count
    }

    /// Serial of the vertex half, bumped on every vertex write.
    pub fn vertex_serial(&self) -> u64 {
        self.vertex_serial.load(Ordering::Acquire)
    }

    /// Serial of the index half, bumped on every index write.
    pub fn index_serial(&self) -> u64 {
        self.index_serial.load(Ordering::Acquire)
    }
}

impl Default for MeshBuffer {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(MeshBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = MeshBuffer::new();
        let b = MeshBuffer::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_serials_track_halves_independently() {
        let buffer = MeshBuffer::new();
        let vertex_before = buffer.vertex_serial();
        let index_before = buffer.index_serial();

        buffer.set_vertices(&[[0.0f32; 3]; 4]);
        assert!(buffer.vertex_serial() > vertex_before);
        assert_eq!(buffer.index_serial(), index_before);

        buffer.set_indices(&[0u16, 1, 2, 2, 1, 3]);
        assert!(buffer.index_serial() > index_before);
    }

    #[test]
    fn test_byte_layout_and_counts() {
        let buffer = MeshBuffer::new();
        buffer.set_vertices(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        buffer.set_indices(&[0u32, 1]);

        assert_eq!(buffer.vertex_count(), 2);
        assert_eq!(buffer.index_count(), 2);
        assert_eq!(buffer.vertices().len(), 2 * 3 * 4);
        assert_eq!(buffer.indices().len(), 2 * 4);
    }

    #[test]
    fn test_hints_default_to_never() {
        let buffer = MeshBuffer::new();
        assert_eq!(buffer.hardware_hint(BufferKind::Vertex), MappingHint::Never);
        buffer.set_hardware_hint(BufferKind::Vertex, MappingHint::Static);
        assert_eq!(buffer.hardware_hint(BufferKind::Vertex), MappingHint::Static);
        assert_eq!(buffer.hardware_hint(BufferKind::Index), MappingHint::Never);
    }
}
