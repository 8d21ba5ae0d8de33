//! Resource layer: textures, mesh buffers and their hardware caches.

pub mod buffer_cache;
pub mod mesh;
pub mod table;
pub mod texture;

pub use buffer_cache::{DrawSources, HardwareBufferCache, DEFAULT_MIN_VERTEX_COUNT};
pub use mesh::MeshBuffer;
pub use table::ResourceTable;
pub use texture::{Texture, TextureSource};
