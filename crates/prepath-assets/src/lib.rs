//! Prepath Assets - Offline asset import cache
//!
//! Imports 3D scenes, flattens them into renderer-ready buffers grouped by
//! material, and persists the result in a versioned binary cache keyed to
//! source-file freshness. Decoded textures get their own sidecar cache.

mod cache;
pub mod codec;
mod config;
mod error;
pub mod flatten;
mod freshness;
mod gltf_import;
pub mod lights;
mod model;
pub mod scene;
mod texture;

pub use cache::{LoadOrigin, LoadState, LoadWarning, LoadedModel, ModelCache};
pub use config::CacheConfig;
pub use error::AssetError;
pub use freshness::{is_fresh, modified_time};
pub use gltf_import::{GltfImporter, ImportOptions};
pub use model::{
    CachedLight, CachedMaterial, CachedMeshData, CachedModelData, LightKind,
    DEFAULT_LIGHT_RANGE, MAX_LIGHT_RANGE, MIN_LIGHT_RANGE,
};
pub use scene::{ImportedScene, SceneImporter};
pub use texture::{DecodedImage, LoadedTexture, TextureCache, TexturePreload};
