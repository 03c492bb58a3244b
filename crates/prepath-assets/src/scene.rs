//! In-memory scene graph produced by an importer.
//!
//! This is the boundary between a file-format importer and the cache
//! pipeline: nodes form a tree addressed by index, meshes and materials
//! live in flat tables, and lights are matched to nodes by name.

use std::collections::BTreeMap;
use std::path::Path;

use glam::{Mat4, Vec2, Vec3};
use prepath_core::NodeTransform;

use crate::error::AssetError;

/// Anything that can turn a source file into an [`ImportedScene`].
pub trait SceneImporter {
    fn import(&self, path: &Path) -> Result<ImportedScene, AssetError>;
}

/// A fully imported scene.
#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub name: String,
    /// Index of the root node in `nodes`.
    pub root: usize,
    pub nodes: Vec<SceneNode>,
    pub meshes: Vec<SceneMesh>,
    pub materials: Vec<SceneMaterial>,
    pub lights: Vec<SceneLight>,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    /// Local transform relative to the parent node.
    pub transform: Mat4,
    pub children: Vec<usize>,
    /// Indices into [`ImportedScene::meshes`].
    pub meshes: Vec<usize>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            children: Vec::new(),
            meshes: Vec::new(),
        }
    }
}

/// A polygon as a list of vertex indices. The pipeline only consumes
/// triangles; importers are expected to triangulate.
pub type Face = Vec<u32>;

/// Indexed mesh with optional attribute channels.
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub tex_coords: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec3>>,
    pub bitangents: Option<Vec<Vec3>>,
    pub faces: Vec<Face>,
    /// Index into [`ImportedScene::materials`].
    pub material_index: usize,
}

/// Texture slot kinds a material may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Height,
    Specular,
    Shininess,
    Metalness,
    Roughness,
    AmbientOcclusion,
    Emissive,
    Lightmap,
    Reflection,
}

impl TextureSlot {
    /// Every slot scanned when collecting texture paths.
    pub const ALL: [TextureSlot; 11] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Height,
        TextureSlot::Specular,
        TextureSlot::Shininess,
        TextureSlot::Metalness,
        TextureSlot::Roughness,
        TextureSlot::AmbientOcclusion,
        TextureSlot::Emissive,
        TextureSlot::Lightmap,
        TextureSlot::Reflection,
    ];
}

#[derive(Debug, Clone, Default)]
pub struct SceneMaterial {
    pub name: String,
    /// Texture paths per slot, relative to the model's directory.
    pub textures: BTreeMap<TextureSlot, Vec<String>>,
    pub diffuse_color: Option<Vec3>,
    pub metallic_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
}

impl SceneMaterial {
    /// All textures bound to `slot`, in declaration order.
    pub fn textures(&self, slot: TextureSlot) -> &[String] {
        self.textures.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first texture bound to `slot`, if any.
    pub fn texture(&self, slot: TextureSlot) -> Option<&str> {
        self.textures(slot).first().map(String::as_str)
    }

    pub fn add_texture(&mut self, slot: TextureSlot, path: impl Into<String>) {
        self.textures.entry(slot).or_default().push(path.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneLightKind {
    Undefined,
    Directional,
    Point,
    Spot,
    Ambient,
    Area,
}

/// Raw light parameters as the importer reports them, in the local space
/// of the node that shares the light's name.
#[derive(Debug, Clone)]
pub struct SceneLight {
    pub name: String,
    pub kind: SceneLightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color_diffuse: Vec3,
    pub color_specular: Vec3,
    pub color_ambient: Vec3,
    pub attenuation_constant: f32,
    pub attenuation_linear: f32,
    pub attenuation_quadratic: f32,
    /// Radians.
    pub angle_inner_cone: f32,
    /// Radians.
    pub angle_outer_cone: f32,
}

impl SceneLight {
    pub fn new(name: impl Into<String>, kind: SceneLightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            color_diffuse: Vec3::ZERO,
            color_specular: Vec3::ZERO,
            color_ambient: Vec3::ZERO,
            attenuation_constant: 1.0,
            attenuation_linear: 0.0,
            attenuation_quadratic: 0.0,
            angle_inner_cone: std::f32::consts::TAU,
            angle_outer_cone: std::f32::consts::TAU,
        }
    }
}

impl ImportedScene {
    pub fn has_meshes(&self) -> bool {
        !self.meshes.is_empty()
    }

    pub fn root_node(&self) -> Option<&SceneNode> {
        self.nodes.get(self.root)
    }

    /// Depth-first pre-order walk over the node tree using an explicit stack.
    ///
    /// The root node is visited with `root_world` as its world transform;
    /// every other node gets `parent_world * local`. Children are visited in
    /// declaration order. Reaching any node a second time (a cycle, or a
    /// child shared between parents) aborts the walk.
    pub fn walk<F>(&self, root_world: NodeTransform, mut visit: F) -> Result<(), AssetError>
    where
        F: FnMut(usize, &SceneNode, &NodeTransform) -> Result<(), AssetError>,
    {
        if self.root >= self.nodes.len() {
            return Err(AssetError::InvalidScene(format!(
                "root node {} out of range ({} nodes)",
                self.root,
                self.nodes.len()
            )));
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![(self.root, root_world)];

        while let Some((index, world)) = stack.pop() {
            let node = &self.nodes[index];
            if std::mem::replace(&mut visited[index], true) {
                return Err(AssetError::CyclicSceneGraph {
                    node: index,
                    name: node.name.clone(),
                });
            }

            visit(index, node, &world)?;

            for &child in node.children.iter().rev() {
                let child_node = self.nodes.get(child).ok_or_else(|| {
                    AssetError::InvalidScene(format!(
                        "node '{}' references missing child {}",
                        node.name, child
                    ))
                })?;
                stack.push((child, world.then(child_node.transform)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ImportedScene {
        let mut root = SceneNode::new("root");
        root.children = vec![1, 3];
        let mut a = SceneNode::new("a");
        a.transform = Mat4::from_translation(Vec3::X);
        a.children = vec![2];
        let mut b = SceneNode::new("b");
        b.transform = Mat4::from_translation(Vec3::Y);
        let c = SceneNode::new("c");
        ImportedScene {
            name: "chain".into(),
            root: 0,
            nodes: vec![root, a, b, c],
            ..Default::default()
        }
    }

    #[test]
    fn walk_is_preorder_and_accumulates() {
        let scene = chain();
        let mut order = Vec::new();
        scene
            .walk(NodeTransform::IDENTITY, |_, node, world| {
                order.push((node.name.clone(), world.point(Vec3::ZERO)));
                Ok(())
            })
            .unwrap();

        let names: Vec<_> = order.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["root", "a", "b", "c"]);
        assert_eq!(order[2].1, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(order[3].1, Vec3::ZERO);
    }

    #[test]
    fn walk_detects_cycle() {
        let mut scene = chain();
        scene.nodes[2].children.push(1);
        let err = scene
            .walk(NodeTransform::IDENTITY, |_, _, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, AssetError::CyclicSceneGraph { node: 1, .. }));
    }

    #[test]
    fn walk_rejects_missing_child() {
        let mut scene = chain();
        scene.nodes[3].children.push(42);
        let err = scene
            .walk(NodeTransform::IDENTITY, |_, _, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidScene(_)));
    }

    #[test]
    fn material_slot_lookup() {
        let mut material = SceneMaterial::default();
        assert!(material.texture(TextureSlot::Diffuse).is_none());
        material.add_texture(TextureSlot::Diffuse, "a.png");
        material.add_texture(TextureSlot::Diffuse, "b.png");
        assert_eq!(material.texture(TextureSlot::Diffuse), Some("a.png"));
        assert_eq!(material.textures(TextureSlot::Diffuse).len(), 2);
    }
}
