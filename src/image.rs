//! CPU images and the pluggable loader registry.
//!
//! Loading runs in two passes. The extension pass asks loaders, newest
//! registered first, whether they claim the file extension and lets each
//! claimant try the bytes. The sniff pass then offers the bytes to the
//! remaining loaders so a misnamed file still loads.

use crate::types::{ColorFormat, Extent2d};

/// A decoded image in CPU memory.
#[derive(Debug, Clone)]
pub struct Image {
    /// Pixel dimensions.
    pub size: Extent2d,
    /// Pixel format of `data`.
    pub format: ColorFormat,
    /// Tightly packed pixel data.
    pub data: Vec<u8>,
}

/// A decoder for one image file format.
pub trait ImageLoader: Send + Sync {
    /// Whether this loader claims files with the given extension
    /// (lower-case, without the dot).
    fn is_loadable_extension(&self, extension: &str) -> bool;

    /// Whether the byte prefix looks like this loader's format.
    fn is_loadable_format(&self, bytes: &[u8]) -> bool;

    /// Decode the file. `None` when the data turns out malformed.
    fn load(&self, bytes: &[u8]) -> Option<Image>;
}

/// Ordered collection of image loaders.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn ImageLoader>>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader. Later registrations take priority, so an
    /// application loader overrides a built-in one for the same extension.
    pub fn register(&mut self, loader: Box<dyn ImageLoader>) {
        self.loaders.push(loader);
    }

    /// Number of registered loaders.
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Whether no loaders are registered.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Decode `bytes` for a file named `name`.
    pub fn load(&self, name: &str, bytes: &[u8]) -> Option<Image> {
        let extension = extension_of(name);

        for loader in self.loaders.iter().rev() {
            if loader.is_loadable_extension(&extension) {
                if let Some(image) = loader.load(bytes) {
                    return Some(image);
                }
                log::warn!("loader claiming extension '.{extension}' failed on '{name}'");
            }
        }

        for loader in self.loaders.iter().rev() {
            if loader.is_loadable_extension(&extension) {
                continue;
            }
            if loader.is_loadable_format(bytes) {
                if let Some(image) = loader.load(bytes) {
                    log::debug!("'{name}' loaded by content sniffing");
                    return Some(image);
                }
            }
        }

        None
    }
}

fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default()
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(LoaderRegistry: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLoader {
        extension: &'static str,
        magic: &'static [u8],
        works: bool,
    }

    impl ImageLoader for StubLoader {
        fn is_loadable_extension(&self, extension: &str) -> bool {
            extension == self.extension
        }

        fn is_loadable_format(&self, bytes: &[u8]) -> bool {
            bytes.starts_with(self.magic)
        }

        fn load(&self, _bytes: &[u8]) -> Option<Image> {
            self.works.then(|| Image {
                size: Extent2d::new(2, 2),
                format: ColorFormat::A8R8G8B8,
                data: vec![0; 16],
            })
        }
    }

    #[test]
    fn test_extension_match_wins() {
        let mut registry = LoaderRegistry::new();
        registry.register(Box::new(StubLoader {
            extension: "tga",
            magic: b"TGA",
            works: true,
        }));
        assert!(registry.load("skin.tga", b"TGA....").is_some());
        assert!(registry.load("skin.TGA", b"TGA....").is_some());
    }

    #[test]
    fn test_sniffing_recovers_misnamed_files() {
        let mut registry = LoaderRegistry::new();
        registry.register(Box::new(StubLoader {
            extension: "png",
            magic: b"\x89PNG",
            works: true,
        }));
        assert!(registry.load("actually_png.bmp", b"\x89PNG....").is_some());
        assert!(registry.load("noise.bmp", b"garbage").is_none());
    }

    #[test]
    fn test_later_registration_takes_priority() {
        let mut registry = LoaderRegistry::new();
        registry.register(Box::new(StubLoader {
            extension: "img",
            magic: b"A",
            works: false,
        }));
        registry.register(Box::new(StubLoader {
            extension: "img",
            magic: b"A",
            works: true,
        }));
        // The broken builtin is shadowed by the working override.
        assert!(registry.load("a.img", b"A").is_some());
    }
}
