//! Light extraction: place importer lights in world space and turn their
//! raw attenuation and color data into renderer-friendly parameters.

use glam::{Mat4, Vec3};
use prepath_core::NodeTransform;
use tracing::{debug, info, warn};

use crate::error::AssetError;
use crate::model::{
    CachedLight, LightKind, DEFAULT_LIGHT_RANGE, MAX_LIGHT_RANGE, MIN_LIGHT_RANGE,
};
use crate::scene::{ImportedScene, SceneLight, SceneLightKind};

/// Fraction of peak brightness at which a light is considered out of range.
const CUTOFF: f32 = 0.01;
/// Coefficients at or below this are treated as absent.
const NEGLIGIBLE: f32 = 0.0001;
/// Lower bound for the constant attenuation term.
const MIN_CONSTANT: f32 = 0.001;
/// Intensities below this are treated as a broken light.
const MIN_INTENSITY: f32 = 0.01;
/// Minimum gap forced between spot inner and outer cones, in degrees.
const CONE_GAP_DEGREES: f32 = 5.0;
/// Upper bound for the inner cone angle, in degrees.
const MAX_CONE_DEGREES: f32 = 180.0;

fn light_kind(kind: SceneLightKind) -> Option<LightKind> {
    match kind {
        SceneLightKind::Directional => Some(LightKind::Directional),
        SceneLightKind::Point => Some(LightKind::Point),
        SceneLightKind::Spot => Some(LightKind::Spot),
        SceneLightKind::Ambient | SceneLightKind::Area | SceneLightKind::Undefined => None,
    }
}

fn is_black(c: Vec3) -> bool {
    !(c.x > 0.0 || c.y > 0.0 || c.z > 0.0)
}

/// Pick a light color and split it into a unit-scale color and an intensity.
///
/// Diffuse is preferred, then specular, then ambient, then white. The
/// intensity is the brightest channel; colors brighter than 1 are scaled
/// down by it, and near-black results fall back to white at intensity 1.
pub fn resolve_color(diffuse: Vec3, specular: Vec3, ambient: Vec3) -> (Vec3, f32) {
    let color = [diffuse, specular, ambient]
        .into_iter()
        .find(|&c| !is_black(c))
        .unwrap_or(Vec3::ONE);

    let intensity = color.max_element();
    if intensity > 1.0 {
        (color / intensity, intensity)
    } else if intensity < MIN_INTENSITY {
        (Vec3::ONE, 1.0)
    } else {
        (color, intensity)
    }
}

/// Distance at which `1 / (constant + linear*d + quadratic*d^2)` scaled by
/// `intensity` drops to 1% of peak, clamped to the supported range.
pub fn derive_range(constant: f32, linear: f32, quadratic: f32, intensity: f32) -> f32 {
    let constant = constant.max(MIN_CONSTANT);
    let target = intensity / CUTOFF;

    let range = if quadratic > NEGLIGIBLE {
        let (a, b, c) = (quadratic, linear, constant - target);
        let discriminant = b * b - 4.0 * a * c;
        if discriminant >= 0.0 {
            (-b + discriminant.sqrt()) / (2.0 * a)
        } else {
            DEFAULT_LIGHT_RANGE
        }
    } else if linear > NEGLIGIBLE {
        (target - constant) / linear
    } else {
        DEFAULT_LIGHT_RANGE
    };

    if range.is_nan() {
        return DEFAULT_LIGHT_RANGE;
    }
    range.clamp(MIN_LIGHT_RANGE, MAX_LIGHT_RANGE)
}

/// Convert cone angles from radians to degrees, keeping outer > inner.
///
/// The inner angle is clamped to [0, 180] degrees (NaN becomes 0) so the
/// forced gap always produces a strictly wider, finite outer cone.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn cone_degrees(inner_radians: f32, outer_radians: f32) -> (f32, f32) {
    let inner = inner_radians.to_degrees();
    let inner = if inner.is_nan() {
        0.0
    } else {
        inner.clamp(0.0, MAX_CONE_DEGREES)
    };
    let mut outer = outer_radians.to_degrees();
    // Negated so a NaN outer angle is replaced too.
    if !(outer > inner) || !outer.is_finite() {
        outer = inner + CONE_GAP_DEGREES;
    }
    (inner, outer)
}

/// Build a light placed by a node's accumulated transform.
fn place_light(source: &SceneLight, kind: LightKind, world: &NodeTransform) -> CachedLight {
    let mut light = CachedLight::new(kind);
    light.position = world.point(source.position);
    light.direction = world.direction(source.direction, light.direction);

    let (color, intensity) =
        resolve_color(source.color_diffuse, source.color_specular, source.color_ambient);
    light.color = color;
    light.intensity = intensity;

    if kind.has_range() {
        light.range = derive_range(
            source.attenuation_constant,
            source.attenuation_linear,
            source.attenuation_quadratic,
            light.intensity,
        );
    }

    if kind == LightKind::Spot {
        (light.inner_cone, light.outer_cone) =
            cone_degrees(source.angle_inner_cone, source.angle_outer_cone);
    }

    light
}

/// Degraded placement used when no light could be matched to a node: only
/// the root transform is applied and intensity/range are left at defaults.
fn place_unmatched_light(source: &SceneLight, kind: LightKind, root: &NodeTransform) -> CachedLight {
    let mut light = CachedLight::new(kind);
    light.position = root.point(source.position);
    light.direction = root.direction(source.direction, light.direction);
    if !is_black(source.color_diffuse) {
        light.color = source.color_diffuse;
    }
    if kind == LightKind::Spot {
        (light.inner_cone, light.outer_cone) =
            cone_degrees(source.angle_inner_cone, source.angle_outer_cone);
    }
    light
}

/// Extract every supported light in the scene.
///
/// Each node is matched against the scene's lights by exact name; the first
/// supported match is placed with the node's accumulated transform, with
/// `root_transform` acting as the root node's world transform. If nothing
/// matches although the scene declares lights, every declared light is
/// emitted using `root_transform` alone.
pub fn extract_lights(
    scene: &ImportedScene,
    root_transform: Mat4,
) -> Result<Vec<CachedLight>, AssetError> {
    let mut lights = Vec::new();
    if scene.root_node().is_none() {
        warn!("Scene has no root node, cannot extract lights");
        return Ok(lights);
    }

    info!("Extracting {} lights from scene", scene.lights.len());
    let root = NodeTransform::new(root_transform);

    scene.walk(root, |_, node, world| {
        let matched = scene
            .lights
            .iter()
            .filter(|l| l.name == node.name)
            .find_map(|l| light_kind(l.kind).map(|kind| (l, kind)));
        let Some((source, kind)) = matched else {
            return Ok(());
        };

        let light = place_light(source, kind, world);
        debug!(
            "Light '{}' at node '{}': pos({:.3}, {:.3}, {:.3}) dir({:.3}, {:.3}, {:.3}) color({:.3}, {:.3}, {:.3}) intensity {:.3}",
            source.name,
            node.name,
            light.position.x,
            light.position.y,
            light.position.z,
            light.direction.x,
            light.direction.y,
            light.direction.z,
            light.color.x,
            light.color.y,
            light.color.z,
            light.intensity,
        );
        lights.push(light);
        Ok(())
    })?;

    if lights.is_empty() && !scene.lights.is_empty() {
        warn!("No lights matched scene nodes, placing them with the root transform only");
        lights.extend(scene.lights.iter().filter_map(|source| {
            light_kind(source.kind).map(|kind| place_unmatched_light(source, kind, &root))
        }));
    }

    info!("Extracted {} lights", lights.len());
    Ok(lights)
}
