use std::sync::Arc;

use glam::Vec3;
use prepath_assets::{CachedMaterial, CachedModelData, DecodedImage, TextureCache, TexturePreload};
use tracing::{debug, info};

use crate::light::RenderLight;
use crate::vertex::Vertex;

/// Material with its texture slots bound to decoded images.
#[derive(Debug, Clone)]
pub struct RenderMaterial {
    pub base_color: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub albedo: Option<Arc<DecodedImage>>,
    pub normal: Option<Arc<DecodedImage>>,
    pub metallic_map: Option<Arc<DecodedImage>>,
    pub roughness_map: Option<Arc<DecodedImage>>,
    pub ambient_occlusion: Option<Arc<DecodedImage>>,
    pub emissive: Option<Arc<DecodedImage>>,
}

impl RenderMaterial {
    fn bind(material: &CachedMaterial, textures: &TexturePreload) -> Self {
        let slot = |path: Option<&str>| {
            path.and_then(|p| textures.get(p))
                .map(|t| Arc::clone(&t.image))
        };
        Self {
            base_color: material.diffuse_color,
            metallic: material.metallic,
            roughness: material.roughness,
            albedo: slot(material.albedo()),
            normal: slot(material.normal()),
            metallic_map: slot(material.metallic_map()),
            roughness_map: slot(material.roughness_map()),
            ambient_occlusion: slot(material.ambient_occlusion()),
            emissive: slot(material.emissive()),
        }
    }
}

/// Interleaved vertex buffer plus the material it is drawn with.
#[derive(Debug, Clone)]
pub struct RenderMesh {
    pub vertices: Vec<Vertex>,
    pub material: Option<Arc<RenderMaterial>>,
}

impl RenderMesh {
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// Everything needed to draw one model.
#[derive(Debug, Clone, Default)]
pub struct AssembledModel {
    pub meshes: Vec<RenderMesh>,
    pub materials: Vec<Arc<RenderMaterial>>,
    pub lights: Vec<RenderLight>,
    /// Texture paths that were replaced by the placeholder image.
    pub fallback_textures: Vec<String>,
}

/// Build runtime objects from cached model data, decoding every referenced
/// texture through `textures`.
pub fn assemble(data: &CachedModelData, textures: &TextureCache) -> AssembledModel {
    let preload = textures.preload(&data.texture_paths);

    let materials: Vec<Arc<RenderMaterial>> = data
        .materials
        .iter()
        .map(|m| Arc::new(RenderMaterial::bind(m, &preload)))
        .collect();

    let meshes = data
        .meshes
        .iter()
        .map(|mesh| {
            let material = materials.get(mesh.material_index as usize).cloned();
            if material.is_none() {
                debug!(
                    "Mesh material index {} out of range ({} materials)",
                    mesh.material_index,
                    materials.len()
                );
            }
            RenderMesh {
                vertices: Vertex::interleave(mesh),
                material,
            }
        })
        .collect::<Vec<_>>();

    let lights = data.lights.iter().map(RenderLight::from).collect();
    let fallback_textures = preload
        .fallbacks()
        .into_iter()
        .map(str::to_owned)
        .collect();

    info!(
        "Assembled {} meshes, {} materials, {} textures",
        meshes.len(),
        materials.len(),
        preload.len()
    );

    AssembledModel {
        meshes,
        materials,
        lights,
        fallback_textures,
    }
}
