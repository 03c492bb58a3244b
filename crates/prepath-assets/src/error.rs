use std::path::PathBuf;

/// Errors that can occur during asset import and caching.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load glTF file '{0}': {1}")]
    GltfLoadFailed(PathBuf, String),

    #[error("failed to load image '{0}': {1}")]
    ImageLoadFailed(PathBuf, String),

    #[error("I/O error loading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("corrupt cache data in '{path}': {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("cache '{path}' has format version {found}, expected {expected}")]
    CacheVersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to import '{0}': {1}")]
    ImportFailure(PathBuf, String),

    #[error("failed to write cache '{0}': {1}")]
    CacheWriteFailure(PathBuf, #[source] std::io::Error),

    #[error("scene graph contains a cycle through node {node} ('{name}')")]
    CyclicSceneGraph { node: usize, name: String },

    #[error("invalid scene graph: {0}")]
    InvalidScene(String),
}

impl AssetError {
    /// Whether this error means the cache artifact itself is unusable, in
    /// which case the loader rebuilds from source instead of failing.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            AssetError::CorruptCache { .. }
                | AssetError::CacheVersionMismatch { .. }
                | AssetError::Io(..)
                | AssetError::NotFound(_)
        )
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AssetError::CorruptCache {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
