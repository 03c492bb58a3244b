//! Prepath Core - Core math types for the Prepath engine
//!
//! This crate provides the foundational types shared by the asset pipeline
//! and the renderer:
//! - Mathematical primitives (re-exported from glam)
//! - Affine helpers for baking node transforms into vertex data

pub mod transform;

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
pub use transform::{transform_direction, transform_point, NodeTransform};
