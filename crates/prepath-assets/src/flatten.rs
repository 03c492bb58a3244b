//! Scene flattening: bake node transforms into vertex data and merge every
//! primitive that shares a material into one triangle soup.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use glam::{Vec2, Vec3};
use prepath_core::NodeTransform;
use tracing::debug;

use crate::error::AssetError;
use crate::model::{CachedMaterial, CachedMeshData};
use crate::scene::{ImportedScene, SceneMaterial, SceneMesh, TextureSlot};

pub const DEFAULT_NORMAL: Vec3 = Vec3::Z;
pub const DEFAULT_TEX_COORD: Vec2 = Vec2::ZERO;
pub const DEFAULT_TANGENT: Vec3 = Vec3::X;
pub const DEFAULT_BITANGENT: Vec3 = Vec3::Y;

/// Flatten the whole node tree into one world-space mesh per material.
///
/// Output meshes are ordered by material index. Materials that end up with
/// no triangles produce no mesh.
pub fn flatten(scene: &ImportedScene) -> Result<Vec<CachedMeshData>, AssetError> {
    let mut buckets: BTreeMap<usize, CachedMeshData> = BTreeMap::new();

    let root_world = match scene.root_node() {
        Some(root) => NodeTransform::new(root.transform),
        None => NodeTransform::IDENTITY,
    };

    scene.walk(root_world, |_, node, world| {
        for &mesh_index in &node.meshes {
            let mesh = scene.meshes.get(mesh_index).ok_or_else(|| {
                AssetError::InvalidScene(format!(
                    "node '{}' references missing mesh {}",
                    node.name, mesh_index
                ))
            })?;
            if mesh.material_index >= scene.materials.len() {
                return Err(AssetError::InvalidScene(format!(
                    "mesh '{}' references missing material {}",
                    mesh.name, mesh.material_index
                )));
            }

            let bucket = buckets
                .entry(mesh.material_index)
                .or_insert_with(|| CachedMeshData::new(mesh.material_index as u32));
            append_mesh(bucket, mesh, world)?;
        }
        Ok(())
    })?;

    Ok(buckets
        .into_values()
        .filter(|mesh| {
            if mesh.is_empty() {
                debug!("Material {} has no triangles, skipping", mesh.material_index);
            }
            !mesh.is_empty()
        })
        .collect())
}

/// Expand every triangle of `mesh` into `out`, transformed by `world`.
fn append_mesh(
    out: &mut CachedMeshData,
    mesh: &SceneMesh,
    world: &NodeTransform,
) -> Result<(), AssetError> {
    let normals = mesh.normals.as_deref();
    let tex_coords = mesh.tex_coords.as_deref();
    let tangents = mesh.tangents.as_deref();
    let bitangents = mesh.bitangents.as_deref();

    let triangles = mesh.faces.iter().filter(|face| face.len() == 3).count();
    if triangles != mesh.faces.len() {
        debug!(
            "Mesh '{}': skipping {} non-triangle faces",
            mesh.name,
            mesh.faces.len() - triangles
        );
    }
    out.positions.reserve(triangles * 3);
    out.normals.reserve(triangles * 3);
    out.tex_coords.reserve(triangles * 3);
    out.tangents.reserve(triangles * 3);
    out.bitangents.reserve(triangles * 3);

    for face in mesh.faces.iter().filter(|face| face.len() == 3) {
        for &index in face {
            let i = index as usize;
            let position = *mesh.positions.get(i).ok_or_else(|| {
                AssetError::InvalidScene(format!(
                    "mesh '{}' face index {} out of range ({} vertices)",
                    mesh.name,
                    i,
                    mesh.positions.len()
                ))
            })?;
            out.positions.push(world.point(position));

            out.normals.push(match channel(normals, i) {
                Some(n) => world.direction(n, DEFAULT_NORMAL),
                None => DEFAULT_NORMAL,
            });

            out.tex_coords
                .push(channel(tex_coords, i).unwrap_or(DEFAULT_TEX_COORD));

            match (channel(tangents, i), channel(bitangents, i)) {
                (Some(t), Some(b)) => {
                    out.tangents.push(world.direction(t, DEFAULT_TANGENT));
                    out.bitangents.push(world.direction(b, DEFAULT_BITANGENT));
                }
                _ => {
                    out.tangents.push(DEFAULT_TANGENT);
                    out.bitangents.push(DEFAULT_BITANGENT);
                }
            }
        }
    }

    Ok(())
}

fn channel<T: Copy>(values: Option<&[T]>, index: usize) -> Option<T> {
    values.and_then(|v| v.get(index)).copied()
}

/// Join a texture path from a material onto the model's directory.
pub fn resolve_texture_path(model_dir: &Path, relative: &str) -> String {
    model_dir.join(relative).to_string_lossy().into_owned()
}

/// Every texture referenced by any material in any recognised slot,
/// resolved against `model_dir`, deduplicated and sorted.
pub fn collect_texture_paths(scene: &ImportedScene, model_dir: &Path) -> Vec<String> {
    let mut paths = BTreeSet::new();
    for material in &scene.materials {
        for slot in TextureSlot::ALL {
            for relative in material.textures(slot) {
                paths.insert(resolve_texture_path(model_dir, relative));
            }
        }
    }
    paths.into_iter().collect()
}

/// Build the cached description of one material.
pub fn create_cached_material(material: &SceneMaterial, model_dir: &Path) -> CachedMaterial {
    let slot = |slot: TextureSlot| {
        material
            .texture(slot)
            .map(|relative| resolve_texture_path(model_dir, relative))
            .unwrap_or_default()
    };

    let defaults = CachedMaterial::default();
    CachedMaterial {
        albedo_path: slot(TextureSlot::Diffuse),
        normal_path: slot(TextureSlot::Normal),
        metallic_path: slot(TextureSlot::Metalness),
        roughness_path: slot(TextureSlot::Roughness),
        emissive_path: slot(TextureSlot::Emissive),
        ao_path: slot(TextureSlot::AmbientOcclusion),
        diffuse_color: material.diffuse_color.unwrap_or(defaults.diffuse_color),
        metallic: material.metallic_factor.unwrap_or(defaults.metallic),
        roughness: material.roughness_factor.unwrap_or(defaults.roughness),
    }
}
