use std::path::Path;

use glam::{Mat4, Vec2, Vec3};
use gltf::khr_lights_punctual::Kind;
use gltf::mesh::Mode;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::AssetError;
use crate::scene::{
    ImportedScene, SceneImporter, SceneLight, SceneLightKind, SceneMaterial, SceneMesh,
    SceneNode, TextureSlot,
};

/// Options applied while converting a glTF document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Flip texture V coordinates (`v = 1 - v`).
    pub flip_uvs: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { flip_uvs: true }
    }
}

/// glTF 2.0 importer (.gltf or .glb), including `KHR_lights_punctual`.
///
/// Only buffers are loaded; images stay on disk and are referenced by URI so
/// the texture side-cache can decode them.
#[derive(Debug, Clone, Default)]
pub struct GltfImporter {
    options: ImportOptions,
}

impl GltfImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(ImportOptions {
            flip_uvs: config.flip_uvs,
        })
    }
}

impl SceneImporter for GltfImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError> {
        if !path.exists() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }

        let failed = |e: gltf::Error| AssetError::GltfLoadFailed(path.to_path_buf(), e.to_string());
        let gltf = gltf::Gltf::open(path).map_err(failed)?;
        let buffers = gltf::import_buffers(&gltf.document, path.parent(), gltf.blob.clone())
            .map_err(failed)?;
        let document = &gltf.document;

        let mut materials: Vec<SceneMaterial> = document.materials().map(convert_material).collect();
        let mut default_material = None;

        // glTF mesh index -> indices of the scene meshes built from its primitives.
        let mut mesh_map: Vec<Vec<usize>> = Vec::with_capacity(document.meshes().len());
        let mut meshes = Vec::new();

        for mesh in document.meshes() {
            let mesh_name = mesh
                .name()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("mesh{}", mesh.index()));
            let mut built = Vec::new();

            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    warn!(
                        "Skipping primitive {} of mesh '{}': mode {:?} is not triangles",
                        primitive.index(),
                        mesh_name,
                        primitive.mode()
                    );
                    continue;
                }

                let material_index = match primitive.material().index() {
                    Some(index) => index,
                    None => *default_material.get_or_insert_with(|| {
                        materials.push(SceneMaterial {
                            name: "default".to_string(),
                            ..Default::default()
                        });
                        materials.len() - 1
                    }),
                };

                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_default();

                let normals: Option<Vec<Vec3>> = reader
                    .read_normals()
                    .map(|iter| iter.map(Vec3::from).collect());

                let tex_coords: Option<Vec<Vec2>> = reader.read_tex_coords(0).map(|tc| {
                    tc.into_f32()
                        .map(|[u, v]| {
                            if self.options.flip_uvs {
                                Vec2::new(u, 1.0 - v)
                            } else {
                                Vec2::new(u, v)
                            }
                        })
                        .collect()
                });

                let raw_tangents: Option<Vec<[f32; 4]>> =
                    reader.read_tangents().map(|iter| iter.collect());
                let (tangents, bitangents) = match (&normals, raw_tangents) {
                    (Some(normals), Some(raw)) => {
                        let tangents: Vec<Vec3> =
                            raw.iter().map(|&[x, y, z, _]| Vec3::new(x, y, z)).collect();
                        let bitangents = normals
                            .iter()
                            .zip(&raw)
                            .map(|(n, &[x, y, z, w])| n.cross(Vec3::new(x, y, z)) * w)
                            .collect();
                        (Some(tangents), Some(bitangents))
                    }
                    _ => (None, None),
                };

                let indices: Vec<u32> = reader
                    .read_indices()
                    .map(|idx| idx.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());
                let faces = indices.chunks_exact(3).map(<[u32]>::to_vec).collect();

                built.push(meshes.len());
                meshes.push(SceneMesh {
                    name: format!("{}.{}", mesh_name, primitive.index()),
                    positions,
                    normals,
                    tex_coords,
                    tangents,
                    bitangents,
                    faces,
                    material_index,
                });
            }

            debug!("Loaded mesh '{}' with {} primitives", mesh_name, built.len());
            mesh_map.push(built);
        }

        // Node 0 is a synthetic identity root; glTF node `i` becomes node `i + 1`.
        let mut nodes = Vec::with_capacity(document.nodes().len() + 1);
        let mut lights = Vec::new();
        let scene = document.default_scene().or_else(|| document.scenes().next());

        let mut root = SceneNode::new(
            scene
                .as_ref()
                .and_then(|s| s.name())
                .unwrap_or("root"),
        );
        if let Some(scene) = &scene {
            root.children = scene.nodes().map(|n| n.index() + 1).collect();
        }
        nodes.push(root);

        for node in document.nodes() {
            let name = node_name(&node);
            let mut scene_node = SceneNode::new(name.clone());
            scene_node.transform = Mat4::from_cols_array_2d(&node.transform().matrix());
            scene_node.children = node.children().map(|c| c.index() + 1).collect();
            if let Some(mesh) = node.mesh() {
                scene_node.meshes = mesh_map[mesh.index()].clone();
            }
            if let Some(light) = node.light() {
                lights.push(convert_light(name, &light));
            }
            nodes.push(scene_node);
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(
            "glTF '{}': {} nodes, {} meshes, {} materials, {} lights",
            path.display(),
            nodes.len(),
            meshes.len(),
            materials.len(),
            lights.len()
        );

        Ok(ImportedScene {
            name,
            root: 0,
            nodes,
            meshes,
            materials,
            lights,
        })
    }
}

fn node_name(node: &gltf::Node<'_>) -> String {
    node.name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("node{}", node.index()))
}

/// URI of a file-backed image. Embedded images (buffer views, data URIs)
/// have no path and are skipped.
fn texture_uri(texture: gltf::Texture<'_>) -> Option<String> {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => Some(uri.to_string()),
        _ => {
            debug!("Skipping embedded texture {}", texture.index());
            None
        }
    }
}

fn convert_material(material: gltf::Material<'_>) -> SceneMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();

    let mut out = SceneMaterial {
        name: material
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default())),
        diffuse_color: Some(Vec3::new(r, g, b)),
        metallic_factor: Some(pbr.metallic_factor()),
        roughness_factor: Some(pbr.roughness_factor()),
        ..Default::default()
    };

    if let Some(uri) = pbr.base_color_texture().and_then(|i| texture_uri(i.texture())) {
        out.add_texture(TextureSlot::Diffuse, uri);
    }
    if let Some(uri) = pbr
        .metallic_roughness_texture()
        .and_then(|i| texture_uri(i.texture()))
    {
        out.add_texture(TextureSlot::Metalness, uri.clone());
        out.add_texture(TextureSlot::Roughness, uri);
    }
    if let Some(uri) = material.normal_texture().and_then(|t| texture_uri(t.texture())) {
        out.add_texture(TextureSlot::Normal, uri);
    }
    if let Some(uri) = material
        .occlusion_texture()
        .and_then(|t| texture_uri(t.texture()))
    {
        out.add_texture(TextureSlot::AmbientOcclusion, uri);
    }
    if let Some(uri) = material.emissive_texture().and_then(|i| texture_uri(i.texture())) {
        out.add_texture(TextureSlot::Emissive, uri);
    }

    out
}

fn convert_light(name: String, light: &gltf::khr_lights_punctual::Light<'_>) -> SceneLight {
    let kind = match light.kind() {
        Kind::Directional => SceneLightKind::Directional,
        Kind::Point => SceneLightKind::Point,
        Kind::Spot { .. } => SceneLightKind::Spot,
    };

    let mut out = SceneLight::new(name, kind);
    out.color_diffuse = Vec3::from(light.color()) * light.intensity();
    out.attenuation_constant = 0.0;
    out.attenuation_linear = 0.0;
    out.attenuation_quadratic = 1.0;
    if let Kind::Spot {
        inner_cone_angle,
        outer_cone_angle,
    } = light.kind()
    {
        out.angle_inner_cone = inner_cone_angle;
        out.angle_outer_cone = outer_cone_angle;
    }
    out
}
