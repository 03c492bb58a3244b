use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::error::AssetError;
use crate::flatten::{collect_texture_paths, create_cached_material, flatten};
use crate::freshness::is_fresh;
use crate::lights::extract_lights;
use crate::model::CachedModelData;
use crate::scene::SceneImporter;
use crate::texture::TextureCache;

/// Where a loaded model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Cache,
    Import,
}

/// A problem that degraded a load without failing it.
#[derive(Debug, thiserror::Error)]
pub enum LoadWarning {
    /// The cache file existed but could not be used; the model was rebuilt.
    #[error("discarded unusable cache: {0}")]
    CorruptCache(#[source] AssetError),

    /// The model was imported but its cache could not be persisted.
    #[error("cache not written: {0}")]
    CacheWriteFailed(#[source] AssetError),

    /// A referenced texture could not be decoded and was replaced by the
    /// placeholder.
    #[error("texture '{0}' replaced by fallback")]
    TextureFallback(String),
}

/// Result of [`ModelCache::load`].
#[derive(Debug)]
pub struct LoadedModel {
    pub data: CachedModelData,
    pub origin: LoadOrigin,
    pub warnings: Vec<LoadWarning>,
}

impl LoadedModel {
    /// Whether the load completed without any degradation.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Steps of a model load.
#[derive(Debug)]
pub enum LoadState {
    CheckFreshness,
    LoadFromCache,
    ImportFresh,
    WriteCache(CachedModelData),
    Ready(CachedModelData, LoadOrigin),
    Failed(AssetError),
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadState::CheckFreshness => "CheckFreshness",
            LoadState::LoadFromCache => "LoadFromCache",
            LoadState::ImportFresh => "ImportFresh",
            LoadState::WriteCache(_) => "WriteCache",
            LoadState::Ready(..) => "Ready",
            LoadState::Failed(_) => "Failed",
        })
    }
}

/// Loads models through an on-disk cache, importing from source on a miss.
pub struct ModelCache<I: SceneImporter> {
    config: CacheConfig,
    importer: I,
    textures: TextureCache,
}

impl<I: SceneImporter> ModelCache<I> {
    pub fn new(config: CacheConfig, importer: I) -> Self {
        info!(
            "ModelCache created (extension '.{}', write_cache {})",
            config.model_cache_extension, config.write_cache
        );
        let textures = TextureCache::new(&config);
        Self {
            config,
            importer,
            textures,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Texture side-cache shared by every model this cache loads.
    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// Cache file location for a model: the full path plus the extension
    /// (`scene.gltf` -> `scene.gltf.modelcache`).
    pub fn cache_path_for(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(&self.config.model_cache_extension);
        PathBuf::from(name)
    }

    /// Delete the cache file for `path`, forcing the next load to import.
    pub fn invalidate(&self, path: &Path) -> Result<(), AssetError> {
        let cache_path = self.cache_path_for(path);
        match fs::remove_file(&cache_path) {
            Ok(()) => {
                info!("Invalidated model cache '{}'", cache_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssetError::Io(cache_path, e)),
        }
    }

    /// Load a model, from its cache file when that is fresh and readable,
    /// otherwise from source (refreshing the cache on the way).
    pub fn load(&self, path: &Path) -> Result<LoadedModel, AssetError> {
        let cache_path = self.cache_path_for(path);
        let mut warnings = Vec::new();
        let mut state = LoadState::CheckFreshness;

        let (data, origin) = loop {
            debug!("Loading '{}': {}", path.display(), state);
            state = match state {
                LoadState::Ready(data, origin) => break (data, origin),
                LoadState::Failed(e) => {
                    error!("Failed to load model '{}': {}", path.display(), e);
                    return Err(e);
                }
                other => self.step(other, path, &cache_path, &mut warnings),
            };
        };

        if self.config.preload_textures && !data.texture_paths.is_empty() {
            let preload = self.textures.preload(&data.texture_paths);
            warnings.extend(
                preload
                    .fallbacks()
                    .into_iter()
                    .map(|p| LoadWarning::TextureFallback(p.to_string())),
            );
        }

        info!(
            "Loaded model '{}' from {}: {} meshes, {} vertices, {} materials, {} lights",
            path.display(),
            match origin {
                LoadOrigin::Cache => "cache",
                LoadOrigin::Import => "source",
            },
            data.meshes.len(),
            data.vertex_count(),
            data.materials.len(),
            data.lights.len()
        );

        Ok(LoadedModel {
            data,
            origin,
            warnings,
        })
    }

    fn step(
        &self,
        state: LoadState,
        path: &Path,
        cache_path: &Path,
        warnings: &mut Vec<LoadWarning>,
    ) -> LoadState {
        match state {
            LoadState::CheckFreshness => {
                if is_fresh(path, cache_path) {
                    LoadState::LoadFromCache
                } else {
                    LoadState::ImportFresh
                }
            }
            LoadState::LoadFromCache => match codec::read_model_file(cache_path) {
                Ok(data) => LoadState::Ready(data, LoadOrigin::Cache),
                Err(e) if e.is_cache_miss() => {
                    warn!("Rebuilding '{}': {}", path.display(), e);
                    warnings.push(LoadWarning::CorruptCache(e));
                    LoadState::ImportFresh
                }
                Err(e) => LoadState::Failed(e),
            },
            LoadState::ImportFresh => match self.import(path) {
                Ok(data) if self.config.write_cache => LoadState::WriteCache(data),
                Ok(data) => LoadState::Ready(data, LoadOrigin::Import),
                Err(e) => LoadState::Failed(e),
            },
            LoadState::WriteCache(data) => {
                if let Err(e) = codec::write_model_file(cache_path, &data) {
                    warn!("Failed to write model cache: {}", e);
                    warnings.push(LoadWarning::CacheWriteFailed(e));
                } else {
                    debug!("Wrote model cache '{}'", cache_path.display());
                }
                LoadState::Ready(data, LoadOrigin::Import)
            }
            terminal @ (LoadState::Ready(..) | LoadState::Failed(_)) => terminal,
        }
    }

    /// Import the source file and build the cache payload.
    fn import(&self, path: &Path) -> Result<CachedModelData, AssetError> {
        info!("Importing model '{}'", path.display());
        let scene = self.importer.import(path).map_err(|e| match e {
            AssetError::ImportFailure(..) => e,
            other => AssetError::ImportFailure(path.to_path_buf(), other.to_string()),
        })?;

        if !scene.has_meshes() {
            return Err(AssetError::ImportFailure(
                path.to_path_buf(),
                "scene contains no meshes".to_string(),
            ));
        }
        let root = scene.root_node().ok_or_else(|| {
            AssetError::ImportFailure(path.to_path_buf(), "scene has no root node".to_string())
        })?;

        let model_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let data = CachedModelData {
            meshes: flatten(&scene)?,
            materials: scene
                .materials
                .iter()
                .map(|m| create_cached_material(m, model_dir))
                .collect(),
            lights: extract_lights(&scene, root.transform)?,
            texture_paths: collect_texture_paths(&scene, model_dir),
        };

        data.validate()
            .map_err(|reason| AssetError::ImportFailure(path.to_path_buf(), reason))?;
        Ok(data)
    }
}
