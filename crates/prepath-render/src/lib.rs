//! Prepath Render - Runtime model assembly
//!
//! Turns cached model data into GPU-ready vertex buffers, materials with
//! bound textures, and packed light records.

mod assemble;
pub mod light;
pub mod vertex;

pub use assemble::{assemble, AssembledModel, RenderMaterial, RenderMesh};
pub use light::RenderLight;
pub use vertex::Vertex;
