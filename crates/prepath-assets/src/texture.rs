//! Decoded-texture side-cache.
//!
//! Decoding PNG/JPEG is slow, so every decoded texture is also written to a
//! sidecar file next to its source (`albedo.png` -> `albedo.png.bin`):
//!
//! ```text
//!   magic:        [u8; 4] = b"PPTX"
//!   version:      u32 LE
//!   source mtime: u64 LE seconds + u32 LE nanoseconds since the Unix epoch
//!   width:        u32 LE
//!   height:       u32 LE
//!   pixels:       width * height * 4 bytes, RGBA8
//! ```
//!
//! A sidecar whose recorded mtime differs from the source image's is stale
//! and gets rebuilt.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::codec::{self, CodecError, Reader, Writer};
use crate::config::CacheConfig;
use crate::error::AssetError;
use crate::freshness::modified_time;

pub const SIDECAR_MAGIC: [u8; 4] = *b"PPTX";
pub const SIDECAR_VERSION: u32 = 1;

/// Color used when a texture cannot be decoded.
pub const FALLBACK_PIXEL: [u8; 4] = [255, 0, 255, 255];

/// A decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// 1x1 magenta placeholder.
    pub fn fallback() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: FALLBACK_PIXEL.to_vec(),
        }
    }
}

/// Result of a texture load. Never an error: a texture that cannot be
/// decoded comes back as the placeholder with `fallback` set.
#[derive(Debug, Clone)]
pub struct LoadedTexture {
    pub image: Arc<DecodedImage>,
    pub fallback: bool,
}

/// Decode an image file and force it to RGBA8.
pub fn decode_image(path: &Path) -> Result<DecodedImage, AssetError> {
    let img = image::open(path)
        .map_err(|e| AssetError::ImageLoadFailed(path.to_path_buf(), e.to_string()))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(DecodedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// Source mtime as stored in a sidecar header. Unknown and pre-epoch times
/// are both `(0, 0)`.
fn mtime_parts(time: Option<SystemTime>) -> (u64, u32) {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| (d.as_secs(), d.subsec_nanos()))
        .unwrap_or((0, 0))
}

fn encode_sidecar(image: &DecodedImage, source_mtime: Option<SystemTime>) -> Vec<u8> {
    let (secs, nanos) = mtime_parts(source_mtime);
    let mut w = Writer::new();
    w.write_bytes(&SIDECAR_MAGIC);
    w.write_u32(SIDECAR_VERSION);
    w.write_u64(secs);
    w.write_u32(nanos);
    w.write_u32(image.width);
    w.write_u32(image.height);
    w.write_bytes(&image.pixels);
    w.into_inner()
}

/// Decoded sidecar contents plus the raw source mtime it was built from.
struct Sidecar {
    image: DecodedImage,
    source_mtime: (u64, u32),
}

fn decode_sidecar(data: &[u8]) -> Result<Sidecar, CodecError> {
    let mut r = Reader::new(data);
    if r.read_bytes(SIDECAR_MAGIC.len())? != SIDECAR_MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = r.read_u32()?;
    if version != SIDECAR_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let source_mtime = (r.read_u64()?, r.read_u32()?);

    let width = r.read_u32()?;
    let height = r.read_u32()?;
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| CodecError::Invalid(format!("image size {width}x{height} overflows")))?;
    let pixels = r.read_bytes(len)?.to_vec();
    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }

    Ok(Sidecar {
        image: DecodedImage {
            width,
            height,
            pixels,
        },
        source_mtime,
    })
}

/// Decoded textures referenced by a model, keyed by path.
#[derive(Debug, Default)]
pub struct TexturePreload {
    textures: HashMap<String, LoadedTexture>,
}

impl TexturePreload {
    pub fn get(&self, path: &str) -> Option<&LoadedTexture> {
        self.textures.get(path)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Paths that could not be decoded and were replaced by the placeholder,
    /// sorted.
    pub fn fallbacks(&self) -> Vec<&str> {
        let mut paths: Vec<_> = self
            .textures
            .iter()
            .filter(|(_, t)| t.fallback)
            .map(|(p, _)| p.as_str())
            .collect();
        paths.sort_unstable();
        paths
    }
}

/// Memoizing texture loader backed by on-disk sidecars.
pub struct TextureCache {
    sidecar_extension: String,
    parallel: bool,
    loaded: Mutex<HashMap<PathBuf, LoadedTexture>>,
    /// Sidecars currently being written; a second writer for the same path
    /// skips its write.
    writing: Mutex<HashSet<PathBuf>>,
}

impl TextureCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            sidecar_extension: config.texture_sidecar_extension.clone(),
            parallel: config.parallel_texture_decode,
            loaded: Mutex::new(HashMap::new()),
            writing: Mutex::new(HashSet::new()),
        }
    }

    /// Sidecar location for a texture: the full path plus the extension.
    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(&self.sidecar_extension);
        PathBuf::from(name)
    }

    /// Load a texture, from memory, its sidecar, or the source image, in that
    /// order.
    pub fn load_texture(&self, path: &Path) -> LoadedTexture {
        if let Some(loaded) = self.loaded.lock().get(path) {
            return loaded.clone();
        }

        let loaded = self.load_uncached(path);
        self.loaded
            .lock()
            .entry(path.to_path_buf())
            .or_insert(loaded)
            .clone()
    }

    /// Load every path, on the rayon pool when parallel decoding is enabled.
    pub fn preload(&self, paths: &[String]) -> TexturePreload {
        info!("Preloading {} textures", paths.len());
        let load = |path: &String| (path.clone(), self.load_texture(Path::new(path)));
        let textures = if self.parallel {
            paths.par_iter().map(load).collect()
        } else {
            paths.iter().map(load).collect()
        };
        TexturePreload { textures }
    }

    /// Forget every in-memory texture. Sidecars on disk are kept.
    pub fn clear(&self) {
        self.loaded.lock().clear();
    }

    fn load_uncached(&self, path: &Path) -> LoadedTexture {
        debug!("Loading texture: {}", path.display());
        let sidecar_path = self.sidecar_path(path);
        let source_mtime = modified_time(path);
        if source_mtime.is_none() {
            info!("Texture doesn't exist: {}", path.display());
        }

        if let Some(image) = self.read_sidecar(&sidecar_path, source_mtime) {
            return LoadedTexture {
                image: Arc::new(image),
                fallback: false,
            };
        }

        let image = match decode_image(path) {
            Ok(image) => image,
            Err(e) => {
                error!("Failed to load texture: {}", e);
                return LoadedTexture {
                    image: Arc::new(DecodedImage::fallback()),
                    fallback: true,
                };
            }
        };

        self.write_sidecar(&sidecar_path, &image, source_mtime);
        LoadedTexture {
            image: Arc::new(image),
            fallback: false,
        }
    }

    /// A usable sidecar, or `None` if it is missing, corrupt or stale.
    /// When the source image is gone the sidecar is trusted as is.
    fn read_sidecar(&self, path: &Path, source_mtime: Option<SystemTime>) -> Option<DecodedImage> {
        let data = fs::read(path).ok()?;
        let sidecar = match decode_sidecar(&data) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Ignoring unreadable texture sidecar '{}': {}", path.display(), e);
                return None;
            }
        };

        if source_mtime.is_some() && sidecar.source_mtime != mtime_parts(source_mtime) {
            debug!("Texture sidecar '{}' is stale", path.display());
            return None;
        }
        Some(sidecar.image)
    }

    fn write_sidecar(&self, path: &Path, image: &DecodedImage, source_mtime: Option<SystemTime>) {
        if !self.writing.lock().insert(path.to_path_buf()) {
            debug!("Sidecar '{}' is already being written", path.display());
            return;
        }

        let bytes = encode_sidecar(image, source_mtime);
        if let Err(e) = codec::write_atomic(path, &bytes) {
            warn!("Failed to write cached texture '{}': {}", path.display(), e);
        }

        self.writing.lock().remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn write_png(path: &Path, width: u32, height: u32, pixel: [u8; 4]) {
        image::RgbaImage::from_pixel(width, height, image::Rgba(pixel))
            .save(path)
            .unwrap();
    }

    fn cache() -> TextureCache {
        TextureCache::new(&CacheConfig {
            parallel_texture_decode: false,
            ..Default::default()
        })
    }

    #[test]
    fn decodes_and_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 2, 3, [10, 20, 30, 255]);

        let cache = cache();
        let loaded = cache.load_texture(&png);
        assert!(!loaded.fallback);
        assert_eq!((loaded.image.width, loaded.image.height), (2, 3));
        assert_eq!(&loaded.image.pixels[..4], &[10, 20, 30, 255]);

        let sidecar = cache.sidecar_path(&png);
        assert_eq!(sidecar, dir.path().join("albedo.png.bin"));
        let decoded = decode_sidecar(&fs::read(&sidecar).unwrap()).unwrap();
        assert_eq!(decoded.image, *loaded.image);
        assert_eq!(decoded.source_mtime, mtime_parts(modified_time(&png)));
    }

    #[test]
    fn sidecar_is_used_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 1, 1, [1, 2, 3, 4]);

        // Hand-written sidecar with different pixels proves it is what gets read.
        let cache = cache();
        let marker = DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![9, 9, 9, 9],
        };
        fs::write(
            cache.sidecar_path(&png),
            encode_sidecar(&marker, modified_time(&png)),
        )
        .unwrap();

        assert_eq!(*cache.load_texture(&png).image, marker);
    }

    #[test]
    fn stale_sidecar_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 1, 1, [1, 2, 3, 4]);

        let cache = cache();
        let old = UNIX_EPOCH + Duration::from_secs(1_000);
        let marker = DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![9, 9, 9, 9],
        };
        fs::write(cache.sidecar_path(&png), encode_sidecar(&marker, Some(old))).unwrap();

        let loaded = cache.load_texture(&png);
        assert_eq!(loaded.image.pixels, vec![1, 2, 3, 4]);
        let rewritten = decode_sidecar(&fs::read(cache.sidecar_path(&png)).unwrap()).unwrap();
        assert_eq!(rewritten.source_mtime, mtime_parts(modified_time(&png)));
    }

    #[test]
    fn sidecar_for_epoch_source_stays_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 1, 1, [1, 2, 3, 4]);
        File::options()
            .write(true)
            .open(&png)
            .unwrap()
            .set_modified(UNIX_EPOCH)
            .unwrap();

        let cache = cache();
        let marker = DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![9, 9, 9, 9],
        };
        fs::write(
            cache.sidecar_path(&png),
            encode_sidecar(&marker, modified_time(&png)),
        )
        .unwrap();

        assert_eq!(*cache.load_texture(&png).image, marker);
    }

    #[test]
    fn sidecar_without_source_is_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("shipped.png");
        let cache = cache();
        let image = DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![5, 6, 7, 8],
        };
        fs::write(
            cache.sidecar_path(&png),
            encode_sidecar(&image, Some(UNIX_EPOCH + Duration::from_secs(42))),
        )
        .unwrap();

        let loaded = cache.load_texture(&png);
        assert!(!loaded.fallback);
        assert_eq!(*loaded.image, image);
    }

    #[test]
    fn undecodable_texture_falls_back_to_magenta() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.png");
        fs::write(&bogus, b"definitely not a png").unwrap();

        let cache = cache();
        let loaded = cache.load_texture(&bogus);
        assert!(loaded.fallback);
        assert_eq!(*loaded.image, DecodedImage::fallback());
        assert!(!cache.sidecar_path(&bogus).exists());

        let missing = cache.load_texture(&dir.path().join("missing.png"));
        assert!(missing.fallback);
    }

    #[test]
    fn truncated_sidecar_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 2, 2, [7, 7, 7, 255]);

        let cache = cache();
        let full = encode_sidecar(&decode_image(&png).unwrap(), modified_time(&png));
        fs::write(cache.sidecar_path(&png), &full[..full.len() - 3]).unwrap();

        let loaded = cache.load_texture(&png);
        assert_eq!(loaded.image.pixels.len(), 16);
        assert!(decode_sidecar(&fs::read(cache.sidecar_path(&png)).unwrap()).is_ok());
    }

    #[test]
    fn repeated_loads_share_memory() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("albedo.png");
        write_png(&png, 1, 1, [0, 0, 0, 255]);

        let cache = cache();
        let a = cache.load_texture(&png);
        let b = cache.load_texture(&png);
        assert!(Arc::ptr_eq(&a.image, &b.image));
    }

    #[test]
    fn parallel_preload_reports_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        write_png(&good, 1, 1, [0, 255, 0, 255]);
        let bad = dir.path().join("bad.png");
        File::create(&bad).unwrap();

        let cache = TextureCache::new(&CacheConfig::default());
        let paths = vec![
            good.to_string_lossy().into_owned(),
            bad.to_string_lossy().into_owned(),
        ];
        let preload = cache.preload(&paths);
        assert_eq!(preload.len(), 2);
        assert_eq!(preload.fallbacks(), vec![paths[1].as_str()]);
        assert!(!preload.get(&paths[0]).unwrap().fallback);
    }
}
