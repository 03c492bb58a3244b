//! Timestamp-based cache validity.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

/// Last-modified time of `path`, or `None` if it cannot be read.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(time) => Some(time),
        Err(e) => {
            debug!("Cannot stat '{}': {}", path.display(), e);
            None
        }
    }
}

/// Whether the artifact at `cache` may be used in place of rebuilding from
/// `source`.
///
/// True only if the cache exists and was modified no earlier than the
/// source. Equal timestamps count as fresh, since coarse filesystem clocks
/// often put both writes in the same tick. Any error stat-ing either file
/// means "not fresh".
pub fn is_fresh(source: &Path, cache: &Path) -> bool {
    let Some(cache_time) = modified_time(cache) else {
        return false;
    };
    let Some(source_time) = modified_time(source) else {
        return false;
    };
    cache_time >= source_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn missing_cache_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("model.gltf");
        fs::write(&source, b"{}").unwrap();
        assert!(!is_fresh(&source, &dir.path().join("model.gltf.modelcache")));
    }

    #[test]
    fn missing_source_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("model.gltf.modelcache");
        fs::write(&cache, b"cache").unwrap();
        assert!(!is_fresh(&dir.path().join("model.gltf"), &cache));
    }

    #[test]
    fn newer_or_equal_cache_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("model.gltf");
        let cache = dir.path().join("model.gltf.modelcache");
        fs::write(&source, b"{}").unwrap();
        fs::write(&cache, b"cache").unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&source, base);
        set_mtime(&cache, base);
        assert!(is_fresh(&source, &cache));

        set_mtime(&cache, base + Duration::from_secs(5));
        assert!(is_fresh(&source, &cache));
    }

    #[test]
    fn touching_source_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("model.gltf");
        let cache = dir.path().join("model.gltf.modelcache");
        fs::write(&source, b"{}").unwrap();
        fs::write(&cache, b"cache").unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&cache, base);
        set_mtime(&source, base + Duration::from_secs(1));
        assert!(!is_fresh(&source, &cache));
    }
}
