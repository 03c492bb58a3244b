//! Vertex types for 3D rendering

use bytemuck::{Pod, Zeroable};
use prepath_assets::CachedMeshData;

/// Interleaved vertex with everything a normal-mapped PBR pass needs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex {
    /// Size of one vertex in bytes, for buffer strides.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Interleave the parallel attribute arrays of a cached mesh. Stops at
    /// the shortest array.
    pub fn interleave(mesh: &CachedMeshData) -> Vec<Self> {
        mesh.positions
            .iter()
            .zip(&mesh.normals)
            .zip(&mesh.tex_coords)
            .zip(mesh.tangents.iter().zip(&mesh.bitangents))
            .map(|(((p, n), uv), (t, b))| Self {
                position: p.to_array(),
                normal: n.to_array(),
                uv: uv.to_array(),
                tangent: t.to_array(),
                bitangent: b.to_array(),
            })
            .collect()
    }

    /// Raw bytes of a vertex slice, ready for a buffer upload.
    pub fn as_bytes(vertices: &[Self]) -> &[u8] {
        bytemuck::cast_slice(vertices)
    }
}
