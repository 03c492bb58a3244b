//! Prepath - offline model import cache
//!
//! Loads each model given on the command line through the model cache,
//! importing and caching it on a miss, then assembles it for rendering and
//! prints a summary.
//!
//! ```text
//! prepath [--config FILE] [--save-config] [--invalidate] [--no-write] MODEL...
//! ```

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use prepath_assets::{GltfImporter, LoadOrigin, ModelCache};
use prepath_render::assemble;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use settings::Settings;

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    save_config: bool,
    invalidate: bool,
    no_write: bool,
    models: Vec<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--save-config" => parsed.save_config = true,
                "--invalidate" => parsed.invalidate = true,
                "--no-write" => parsed.no_write = true,
                flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
                model => parsed.models.push(PathBuf::from(model)),
            }
        }
        Ok(parsed)
    }
}

fn load_model(cache: &ModelCache<GltfImporter>, path: &Path, invalidate: bool) -> Result<()> {
    if invalidate {
        cache
            .invalidate(path)
            .with_context(|| format!("Failed to invalidate cache for {}", path.display()))?;
    }

    let loaded = cache
        .load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    for warning in &loaded.warnings {
        warn!("{}: {}", path.display(), warning);
    }

    let model = assemble(&loaded.data, cache.textures());
    let triangles: usize = model.meshes.iter().map(|m| m.triangle_count()).sum();

    println!(
        "{} [{}{}]",
        path.display(),
        match loaded.origin {
            LoadOrigin::Cache => "cache",
            LoadOrigin::Import => "import",
        },
        if loaded.is_clean() { "" } else { ", degraded" }
    );
    println!(
        "  {} meshes, {} triangles, {} materials, {} lights, {} textures ({} fallback)",
        model.meshes.len(),
        triangles,
        model.materials.len(),
        model.lights.len(),
        loaded.data.texture_paths.len(),
        model.fallback_textures.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set subscriber")?;

    let args = Args::parse(std::env::args().skip(1))?;

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if args.save_config {
        match &args.config {
            Some(path) => settings.save_to(path)?,
            None => settings.save()?,
        }
    }
    if args.no_write {
        settings.cache.write_cache = false;
    }

    if args.models.is_empty() {
        bail!("usage: prepath [--config FILE] [--save-config] [--invalidate] [--no-write] MODEL...");
    }

    let importer = GltfImporter::from_config(&settings.cache);
    let cache = ModelCache::new(settings.cache, importer);

    let mut failed = 0;
    for path in &args.models {
        if let Err(e) = load_model(&cache, path, args.invalidate) {
            error!("{:#}", e);
            failed += 1;
        }
    }

    info!("Processed {} models, {} failed", args.models.len(), failed);
    if failed > 0 {
        bail!("{} of {} models failed to load", failed, args.models.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_and_models() {
        let args = parse(&["--config", "my.toml", "--no-write", "a.gltf", "b.glb"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("my.toml")));
        assert!(args.no_write);
        assert!(!args.invalidate);
        assert_eq!(args.models, vec![PathBuf::from("a.gltf"), PathBuf::from("b.glb")]);
    }

    #[test]
    fn rejects_bad_options() {
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }
}
