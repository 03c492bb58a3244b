//! Flattened, renderer-ready model data. This is exactly what the model
//! cache file stores.

use glam::{Vec2, Vec3};

/// Root cache artifact for one source model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedModelData {
    pub meshes: Vec<CachedMeshData>,
    pub materials: Vec<CachedMaterial>,
    pub lights: Vec<CachedLight>,
    /// Every texture referenced by any material, deduplicated.
    pub texture_paths: Vec<String>,
}

impl CachedModelData {
    /// Check the structural invariants a decoded or freshly built model must
    /// hold. Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        for (i, mesh) in self.meshes.iter().enumerate() {
            mesh.validate().map_err(|e| format!("mesh {i}: {e}"))?;
            if mesh.material_index as usize >= self.materials.len() {
                return Err(format!(
                    "mesh {i}: material index {} out of range ({} materials)",
                    mesh.material_index,
                    self.materials.len()
                ));
            }
        }
        for (i, light) in self.lights.iter().enumerate() {
            if let LightKind::Spot = light.kind {
                if light.outer_cone <= light.inner_cone {
                    return Err(format!("light {i}: outer cone not wider than inner cone"));
                }
            }
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(CachedMeshData::vertex_count).sum()
    }
}

/// Denormalized triangle soup for every primitive sharing one material.
/// Consecutive triples of vertices form a triangle; there is no index buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedMeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
    pub material_index: u32,
}

impl CachedMeshData {
    pub fn new(material_index: u32) -> Self {
        Self {
            material_index,
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn validate(&self) -> Result<(), String> {
        let n = self.positions.len();
        if self.normals.len() != n
            || self.tex_coords.len() != n
            || self.tangents.len() != n
            || self.bitangents.len() != n
        {
            return Err(format!(
                "attribute lengths differ (positions {n}, normals {}, uvs {}, tangents {}, bitangents {})",
                self.normals.len(),
                self.tex_coords.len(),
                self.tangents.len(),
                self.bitangents.len()
            ));
        }
        if n % 3 != 0 {
            return Err(format!("vertex count {n} is not a multiple of 3"));
        }
        Ok(())
    }
}

/// Material description with texture paths resolved against the model
/// directory. An empty path means the slot is unused.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMaterial {
    pub albedo_path: String,
    pub normal_path: String,
    pub metallic_path: String,
    pub roughness_path: String,
    pub emissive_path: String,
    pub ao_path: String,
    pub diffuse_color: Vec3,
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for CachedMaterial {
    fn default() -> Self {
        Self {
            albedo_path: String::new(),
            normal_path: String::new(),
            metallic_path: String::new(),
            roughness_path: String::new(),
            emissive_path: String::new(),
            ao_path: String::new(),
            diffuse_color: Vec3::ONE,
            metallic: 0.0,
            roughness: 1.0,
        }
    }
}

fn non_empty(path: &str) -> Option<&str> {
    (!path.is_empty()).then_some(path)
}

impl CachedMaterial {
    pub fn albedo(&self) -> Option<&str> {
        non_empty(&self.albedo_path)
    }

    pub fn normal(&self) -> Option<&str> {
        non_empty(&self.normal_path)
    }

    pub fn metallic_map(&self) -> Option<&str> {
        non_empty(&self.metallic_path)
    }

    pub fn roughness_map(&self) -> Option<&str> {
        non_empty(&self.roughness_path)
    }

    pub fn emissive(&self) -> Option<&str> {
        non_empty(&self.emissive_path)
    }

    pub fn ambient_occlusion(&self) -> Option<&str> {
        non_empty(&self.ao_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    /// Wire tag used by the cache format.
    pub fn tag(self) -> u32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(LightKind::Directional),
            1 => Some(LightKind::Point),
            2 => Some(LightKind::Spot),
            _ => None,
        }
    }

    /// Point and spot lights fall off with distance and carry a range.
    pub fn has_range(self) -> bool {
        !matches!(self, LightKind::Directional)
    }
}

/// World-space light ready for shading.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLight {
    pub kind: LightKind,
    pub position: Vec3,
    /// Unit vector.
    pub direction: Vec3,
    /// Unit-scale RGB; magnitude lives in `intensity`.
    pub color: Vec3,
    pub intensity: f32,
    /// Point/spot only, clamped to [`MIN_LIGHT_RANGE`, `MAX_LIGHT_RANGE`].
    pub range: f32,
    /// Spot only, degrees.
    pub inner_cone: f32,
    /// Spot only, degrees. Always wider than `inner_cone`.
    pub outer_cone: f32,
}

pub const DEFAULT_LIGHT_RANGE: f32 = 100.0;
pub const MIN_LIGHT_RANGE: f32 = 0.1;
pub const MAX_LIGHT_RANGE: f32 = 1000.0;

impl CachedLight {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            position: Vec3::new(0.0, 1.0, 0.0),
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::ONE,
            intensity: 1.0,
            range: DEFAULT_LIGHT_RANGE,
            inner_cone: 30.0,
            outer_cone: 45.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(material_index: u32) -> CachedMeshData {
        CachedMeshData {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tex_coords: vec![Vec2::ZERO; 3],
            tangents: vec![Vec3::X; 3],
            bitangents: vec![Vec3::Y; 3],
            material_index,
        }
    }

    #[test]
    fn valid_model_passes() {
        let model = CachedModelData {
            meshes: vec![triangle(0)],
            materials: vec![CachedMaterial::default()],
            ..Default::default()
        };
        assert!(model.validate().is_ok());
        assert_eq!(model.vertex_count(), 3);
        assert_eq!(model.meshes[0].triangle_count(), 1);
    }

    #[test]
    fn dangling_material_index_fails() {
        let model = CachedModelData {
            meshes: vec![triangle(1)],
            materials: vec![CachedMaterial::default()],
            ..Default::default()
        };
        assert!(model.validate().unwrap_err().contains("material index"));
    }

    #[test]
    fn ragged_attributes_fail() {
        let mut mesh = triangle(0);
        mesh.tangents.pop();
        let model = CachedModelData {
            meshes: vec![mesh],
            materials: vec![CachedMaterial::default()],
            ..Default::default()
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn empty_paths_are_absent() {
        let mut material = CachedMaterial::default();
        assert!(material.albedo().is_none());
        material.albedo_path = "textures/wood.png".into();
        assert_eq!(material.albedo(), Some("textures/wood.png"));
    }

    #[test]
    fn light_tags() {
        for kind in [LightKind::Directional, LightKind::Point, LightKind::Spot] {
            assert_eq!(LightKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(LightKind::from_tag(7), None);
        assert!(!LightKind::Directional.has_range());
    }
}
