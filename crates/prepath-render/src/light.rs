//! Packed light records for shader storage buffers

use prepath_assets::{CachedLight, LightKind};

/// One light as the shading pass reads it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderLight {
    pub position: [f32; 4],  // xyz = position, w = kind (0 directional, 1 point, 2 spot)
    pub direction: [f32; 4], // xyz = direction, w = range
    pub color: [f32; 4],     // rgb = color, a = intensity
    pub cone: [f32; 4],      // x = cos(inner), y = cos(outer)
}

impl RenderLight {
    pub fn kind(&self) -> Option<LightKind> {
        LightKind::from_tag(self.position[3] as u32)
    }
}

impl From<&CachedLight> for RenderLight {
    fn from(light: &CachedLight) -> Self {
        let p = light.position;
        let d = light.direction;
        let c = light.color;
        Self {
            position: [p.x, p.y, p.z, light.kind.tag() as f32],
            direction: [d.x, d.y, d.z, light.range],
            color: [c.x, c.y, c.z, light.intensity],
            cone: [
                light.inner_cone.to_radians().cos(),
                light.outer_cone.to_radians().cos(),
                0.0,
                0.0,
            ],
        }
    }
}
