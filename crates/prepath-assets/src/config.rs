use serde::{Deserialize, Serialize};

/// Settings for the model cache and the texture side-cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Extension appended to a model path to form its cache path
    /// (`scene.gltf` -> `scene.gltf.modelcache`).
    pub model_cache_extension: String,
    /// Extension appended to a texture path to form its sidecar path.
    pub texture_sidecar_extension: String,
    /// Persist freshly imported models. When off, every load imports.
    pub write_cache: bool,
    /// Decode every texture referenced by a model up front.
    pub preload_textures: bool,
    /// Decode preloaded textures on the rayon thread pool.
    pub parallel_texture_decode: bool,
    /// Flip texture V coordinates on import (`v = 1 - v`).
    pub flip_uvs: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            model_cache_extension: "modelcache".to_string(),
            texture_sidecar_extension: "bin".to_string(),
            write_cache: true,
            preload_textures: true,
            parallel_texture_decode: true,
            flip_uvs: true,
        }
    }
}
