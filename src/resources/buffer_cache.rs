//! Hardware buffer cache.
//!
//! Maps mesh buffer ids to their hardware allocations and reconciles them
//! lazily: an upload happens only when the half's change serial differs from
//! the serial captured at the last upload. Small or opted-out buffers never
//! get a hardware copy; the draw path falls back to raw CPU data for them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{BufferHandle, BufferSource, ResourceFactory};
use crate::error::DriverError;
use crate::resources::mesh::MeshBuffer;
use crate::types::{BufferKind, BufferUsage, MappingHint};

/// Buffers below this vertex count stay CPU-side; uploading them costs more
/// than it saves. Indices use three times the value.
pub const DEFAULT_MIN_VERTEX_COUNT: u32 = 500;

#[derive(Debug)]
struct HardwareAllocation {
    handle: BufferHandle,
    capacity: usize,
    usage: BufferUsage,
}

/// Cache entry tying a mesh buffer to its uploaded state.
#[derive(Debug)]
struct HardwareBufferLink {
    buffer: Arc<MeshBuffer>,
    vertex_serial: u64,
    index_serial: u64,
    vertex_alloc: Option<HardwareAllocation>,
    index_alloc: Option<HardwareAllocation>,
}

/// Sources to draw a mesh buffer from after reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct DrawSources {
    /// Hardware vertex handle, when uploaded.
    pub vertices: Option<BufferHandle>,
    /// Hardware index handle, when uploaded.
    pub indices: Option<BufferHandle>,
}

/// Id-keyed cache of hardware buffer allocations.
pub struct HardwareBufferCache {
    factory: Arc<dyn ResourceFactory>,
    links: HashMap<u64, HardwareBufferLink>,
    min_vertex_count: u32,
}

impl HardwareBufferCache {
    /// Create an empty cache working against the given factory.
    pub fn new(factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            factory,
            links: HashMap::new(),
            min_vertex_count: DEFAULT_MIN_VERTEX_COUNT,
        }
    }

    /// Change the upload threshold. Existing allocations are untouched; the
    /// new value applies from the next reconcile on.
    pub fn set_min_vertex_count(&mut self, count: u32) {
        self.min_vertex_count = count;
    }

    /// Current upload threshold.
    pub fn min_vertex_count(&self) -> u32 {
        self.min_vertex_count
    }

    fn element_threshold(&self, kind: BufferKind) -> u32 {
        match kind {
            BufferKind::Vertex => self.min_vertex_count,
            BufferKind::Index => self.min_vertex_count.saturating_mul(3),
        }
    }

    /// Whether a half of the buffer is worth a hardware copy right now.
    pub fn should_upload(&self, buffer: &MeshBuffer, kind: BufferKind) -> bool {
        if buffer.hardware_hint(kind) == MappingHint::Never {
            return false;
        }
        let count = match kind {
            BufferKind::Vertex => buffer.vertex_count(),
            BufferKind::Index => buffer.index_count(),
        };
        count >= self.element_threshold(kind)
    }

    /// Bring the hardware state of `buffer` up to date and return the draw
    /// sources. Halves whose serial is unchanged are not touched. A half
    /// that became ineligible (hint cleared or data shrunk below the
    /// threshold) has its allocation released.
    pub fn reconcile(&mut self, buffer: &Arc<MeshBuffer>) -> Result<DrawSources, DriverError> {
        let wants_vertices = self.should_upload(buffer, BufferKind::Vertex);
        let wants_indices = self.should_upload(buffer, BufferKind::Index);

        if !wants_vertices && !wants_indices {
            self.remove(buffer.id());
            return Ok(DrawSources {
                vertices: None,
                indices: None,
            });
        }

        if !self.links.contains_key(&buffer.id()) {
            let link = HardwareBufferLink {
                buffer: buffer.clone(),
                // Zero never matches a live serial, forcing the first upload.
                vertex_serial: 0,
                index_serial: 0,
                vertex_alloc: None,
                index_alloc: None,
            };
            self.links.insert(buffer.id(), link);
        }

        let vertex_result = self.reconcile_half(buffer, BufferKind::Vertex, wants_vertices);
        let index_result = self.reconcile_half(buffer, BufferKind::Index, wants_indices);

        // An allocation failure for either half drops the whole link so the
        // next frame retries from scratch.
        if let Err(error) = vertex_result.and(index_result) {
            self.remove(buffer.id());
            return Err(error);
        }

        let link = &self.links[&buffer.id()];
        Ok(DrawSources {
            vertices: link.vertex_alloc.as_ref().map(|alloc| alloc.handle),
            indices: link.index_alloc.as_ref().map(|alloc| alloc.handle),
        })
    }

    fn reconcile_half(
        &mut self,
        buffer: &MeshBuffer,
        kind: BufferKind,
        wanted: bool,
    ) -> Result<(), DriverError> {
        let link = self
            .links
            .get_mut(&buffer.id())
            .ok_or_else(|| DriverError::Allocation("missing cache link".to_string()))?;

        let (current_serial, uploaded_serial, alloc_slot) = match kind {
            BufferKind::Vertex => (
                buffer.vertex_serial(),
                &mut link.vertex_serial,
                &mut link.vertex_alloc,
            ),
            BufferKind::Index => (
                buffer.index_serial(),
                &mut link.index_serial,
                &mut link.index_alloc,
            ),
        };

        if !wanted {
            if let Some(alloc) = alloc_slot.take() {
                self.factory.destroy_buffer(alloc.handle);
                *uploaded_serial = 0;
            }
            return Ok(());
        }

        if *uploaded_serial == current_serial && alloc_slot.is_some() {
            return Ok(());
        }

        let usage = buffer.hardware_hint(kind).usage();
        let data = match kind {
            BufferKind::Vertex => buffer.vertices(),
            BufferKind::Index => buffer.indices(),
        };

        let reusable = alloc_slot
            .as_ref()
            .map(|alloc| data.len() <= alloc.capacity && alloc.usage == usage)
            .unwrap_or(false);
        if !reusable {
            if let Some(alloc) = alloc_slot.take() {
                self.factory.destroy_buffer(alloc.handle);
            }
            let handle = self.factory.create_buffer(kind, data.len(), usage)?;
            *alloc_slot = Some(HardwareAllocation {
                handle,
                capacity: data.len(),
                usage,
            });
        }

        let handle = alloc_slot
            .as_ref()
            .map(|alloc| alloc.handle)
            .ok_or_else(|| DriverError::Allocation("allocation vanished".to_string()))?;
        self.factory.update_buffer(handle, &data)?;
        *uploaded_serial = current_serial;
        log::trace!(
            "uploaded {kind:?} half of mesh buffer {} ({} bytes)",
            buffer.id(),
            data.len()
        );
        Ok(())
    }

    /// Release the hardware state of one mesh buffer.
    pub fn remove(&mut self, buffer_id: u64) {
        if let Some(link) = self.links.remove(&buffer_id) {
            if let Some(alloc) = link.vertex_alloc {
                self.factory.destroy_buffer(alloc.handle);
            }
            if let Some(alloc) = link.index_alloc {
                self.factory.destroy_buffer(alloc.handle);
            }
        }
    }

    /// Evict links whose mesh buffer is no longer referenced outside the
    /// cache. Called once per frame; this is the only automatic eviction.
    pub fn sweep(&mut self) {
        let orphaned: Vec<u64> = self
            .links
            .iter()
            .filter(|(_, link)| Arc::strong_count(&link.buffer) == 1)
            .map(|(&id, _)| id)
            .collect();
        if !orphaned.is_empty() {
            log::trace!("evicting {} orphaned hardware buffer link(s)", orphaned.len());
        }
        for id in orphaned {
            self.remove(id);
        }
    }

    /// Release everything.
    pub fn clear(&mut self) {
        let ids: Vec<u64> = self.links.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
    }

    /// Number of live links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Build draw sources for submission, falling back to raw CPU slices for
    /// halves without a hardware copy.
    pub fn sources_for<'a>(
        sources: &DrawSources,
        vertices: &'a [u8],
        indices: &'a [u8],
    ) -> (BufferSource<'a>, BufferSource<'a>) {
        let vertex_source = match sources.vertices {
            Some(handle) => BufferSource::Hardware(handle),
            None => BufferSource::Raw(vertices),
        };
        let index_source = match sources.indices {
            Some(handle) => BufferSource::Hardware(handle),
            None => BufferSource::Raw(indices),
        };
        (vertex_source, index_source)
    }
}

impl std::fmt::Debug for HardwareBufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareBufferCache")
            .field("links", &self.links.len())
            .field("min_vertex_count", &self.min_vertex_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(HardwareBufferCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    fn backend() -> (Arc<SoftwareBackend>, HardwareBufferCache) {
        let backend = Arc::new(SoftwareBackend::new());
        let cache = HardwareBufferCache::new(backend.clone() as Arc<dyn ResourceFactory>);
        (backend, cache)
    }

    fn big_buffer() -> Arc<MeshBuffer> {
        let buffer = Arc::new(MeshBuffer::new());
        buffer.set_vertices(&vec![[0.0f32; 3]; 600]);
        buffer.set_indices(&vec![0u32; 1800]);
        buffer.set_hardware_hint(BufferKind::Vertex, MappingHint::Static);
        buffer.set_hardware_hint(BufferKind::Index, MappingHint::Static);
        buffer
    }

    #[test]
    fn test_small_buffers_stay_cpu_side() {
        let (backend, mut cache) = backend();
        let buffer = Arc::new(MeshBuffer::new());
        buffer.set_vertices(&[[0.0f32; 3]; 10]);
        buffer.set_hardware_hint(BufferKind::Vertex, MappingHint::Static);

        let sources = cache.reconcile(&buffer).unwrap();
        assert!(sources.vertices.is_none());
        assert_eq!(backend.buffer_count(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_never_hint_blocks_upload_regardless_of_size() {
        let (backend, mut cache) = backend();
        let buffer = Arc::new(MeshBuffer::new());
        buffer.set_vertices(&vec![[0.0f32; 3]; 5000]);

        let sources = cache.reconcile(&buffer).unwrap();
        assert!(sources.vertices.is_none());
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn test_unchanged_serials_skip_upload() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();

        let first = cache.reconcile(&buffer).unwrap();
        let vertex_handle = first.vertices.unwrap();
        assert_eq!(backend.buffer_writes(vertex_handle), Some(1));

        cache.reconcile(&buffer).unwrap();
        cache.reconcile(&buffer).unwrap();
        assert_eq!(backend.buffer_writes(vertex_handle), Some(1));
    }

    #[test]
    fn test_touching_one_half_leaves_the_other_alone() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();

        let first = cache.reconcile(&buffer).unwrap();
        let vertex_handle = first.vertices.unwrap();
        let index_handle = first.indices.unwrap();

        buffer.set_vertices(&vec![[1.0f32; 3]; 600]);
        let second = cache.reconcile(&buffer).unwrap();

        assert_eq!(backend.buffer_writes(second.vertices.unwrap()), Some(2));
        assert_eq!(second.indices, Some(index_handle));
        assert_eq!(backend.buffer_writes(index_handle), Some(1));
        assert_eq!(second.vertices, Some(vertex_handle));
    }

    #[test]
    fn test_growth_reallocates_shrink_updates_in_place() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();

        let first = cache.reconcile(&buffer).unwrap();
        let original = first.vertices.unwrap();

        // Shrinking fits in the existing capacity.
        buffer.set_vertices(&vec![[0.0f32; 3]; 550]);
        let shrunk = cache.reconcile(&buffer).unwrap();
        assert_eq!(shrunk.vertices, Some(original));

        // Growing past capacity forces a new allocation.
        buffer.set_vertices(&vec![[0.0f32; 3]; 1200]);
        let grown = cache.reconcile(&buffer).unwrap();
        assert_ne!(grown.vertices, Some(original));
        assert!(backend.buffer_capacity(grown.vertices.unwrap()).unwrap() >= 1200 * 12);
    }

    #[test]
    fn test_allocation_failure_leaves_no_link() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();
        backend.fail_allocations(2);

        assert!(cache.reconcile(&buffer).is_err());
        assert!(cache.is_empty());
        assert_eq!(backend.buffer_count(), 0);

        // The budget is spent, so the retry succeeds.
        assert!(cache.reconcile(&buffer).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_evicts_only_orphans() {
        let (backend, mut cache) = backend();
        let held = big_buffer();
        let dropped = big_buffer();

        cache.reconcile(&held).unwrap();
        cache.reconcile(&dropped).unwrap();
        assert_eq!(backend.buffer_count(), 4);

        drop(dropped);
        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert_eq!(backend.buffer_count(), 2);

        cache.sweep();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hint_cleared_releases_half() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();
        cache.reconcile(&buffer).unwrap();
        assert_eq!(backend.buffer_count(), 2);

        buffer.set_hardware_hint(BufferKind::Index, MappingHint::Never);
        let sources = cache.reconcile(&buffer).unwrap();
        assert!(sources.indices.is_none());
        assert!(sources.vertices.is_some());
        assert_eq!(backend.buffer_count(), 1);
    }

    #[test]
    fn test_clear_releases_everything() {
        let (backend, mut cache) = backend();
        let buffer = big_buffer();
        cache.reconcile(&buffer).unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(backend.buffer_count(), 0);
    }
}
