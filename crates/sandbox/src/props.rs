//! Typed factory properties.
//!
//! Scripts pass object maps such as `#{ color: 0xff0000, size: 2 }`. Each
//! factory parses its map into one of these structs; absent keys take the
//! documented default, unknown keys are ignored, wrongly typed keys are
//! errors.

use glam::Vec3;
use rhai::{Array, Dynamic, ImmutableString, Map};
use worldspace_kernel::LightKind;

/// Everything a factory needs to know about the mod invoking it.
#[derive(Debug, Clone, Copy)]
pub struct FactoryDefaults {
    /// Where entities appear when no `position` is given.
    pub origin: Vec3,
    pub color: u32,
    pub mass: f32,
    /// Uniform multiplier on default sizes.
    pub scale: f32,
}

/// Fields shared by every solid factory.
#[derive(Debug, Clone, PartialEq)]
pub struct Common {
    /// Absolute world position. Defaults to the mod's target position.
    pub position: Vec3,
    /// XYZ Euler angles in radians. Default zero.
    pub rotation: Vec3,
    pub color: u32,
    /// Default 1.0.
    pub opacity: f32,
    /// Zero makes the body fixed. Defaults to the mod's mass hint or 1.0.
    pub mass: f32,
    /// Build a rigid body. Default `true`.
    pub physics: bool,
    pub label: Option<String>,
}

/// `addCube`: `size` is a number or a vector. Default 1.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeProps {
    pub size: Vec3,
    pub common: Common,
}

/// `addSphere`: default `radius` 0.5.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereProps {
    pub radius: f32,
    pub common: Common,
}

/// `addCylinder`: `radius` sets both ends; `radiusTop` and `radiusBottom`
/// override it. Defaults 0.5 radius, 1.0 height.
#[derive(Debug, Clone, PartialEq)]
pub struct CylinderProps {
    pub radius_top: f32,
    pub radius_bottom: f32,
    pub height: f32,
    pub common: Common,
}

/// `addLight`: never has a body.
#[derive(Debug, Clone, PartialEq)]
pub struct LightProps {
    /// `type`: `point` (default), `directional` or `spot`.
    pub kind: LightKind,
    /// Default white.
    pub color: u32,
    /// Default 1.0.
    pub intensity: f32,
    /// Default 0, unbounded.
    pub distance: f32,
    pub position: Vec3,
    pub label: Option<String>,
}

/// `addGroup`: a transform-only node.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProps {
    pub position: Vec3,
    pub rotation: Vec3,
    pub label: Option<String>,
}

impl Common {
    fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        Ok(Self {
            position: opt_vec(map, "position")?.unwrap_or(defaults.origin),
            rotation: opt_vec(map, "rotation")?.unwrap_or(Vec3::ZERO),
            color: opt_color(map, "color")?.unwrap_or(defaults.color),
            opacity: opt_num(map, "opacity")?.unwrap_or(1.0).clamp(0.0, 1.0),
            mass: opt_num(map, "mass")?.unwrap_or(defaults.mass).max(0.0),
            physics: opt_bool(map, "physics")?.unwrap_or(true),
            label: opt_string(map, "label")?,
        })
    }
}

impl CubeProps {
    pub fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        let size = match map.get("size") {
            None => Vec3::splat(defaults.scale),
            Some(v) => num(v)
                .map(Vec3::splat)
                .or_else(|| to_vec3(v))
                .ok_or("`size` must be a number or a vector")?,
        };
        Ok(Self {
            size: positive(size, "size")?,
            common: Common::parse(map, defaults)?,
        })
    }
}

impl SphereProps {
    pub fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        let radius = opt_num(map, "radius")?.unwrap_or(0.5 * defaults.scale);
        Ok(Self {
            radius: positive(Vec3::splat(radius), "radius")?.x,
            common: Common::parse(map, defaults)?,
        })
    }
}

impl CylinderProps {
    pub fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        let radius = opt_num(map, "radius")?.unwrap_or(0.5 * defaults.scale);
        let top = opt_num(map, "radiusTop")?.unwrap_or(radius);
        let bottom = opt_num(map, "radiusBottom")?.unwrap_or(radius);
        let height = opt_num(map, "height")?.unwrap_or(defaults.scale);
        if top < 0.0 || bottom < 0.0 || top + bottom <= 0.0 {
            return Err("cylinder radii must be non-negative and not both zero".into());
        }
        Ok(Self {
            radius_top: top,
            radius_bottom: bottom,
            height: positive(Vec3::splat(height), "height")?.x,
            common: Common::parse(map, defaults)?,
        })
    }
}

impl LightProps {
    pub fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        let kind = match opt_string(map, "type")?.as_deref() {
            None | Some("point") => LightKind::Point,
            Some("directional") => LightKind::Directional,
            Some("spot") => LightKind::Spot,
            Some(other) => return Err(format!("unknown light type {other:?}")),
        };
        Ok(Self {
            kind,
            color: opt_color(map, "color")?.unwrap_or(0xffffff),
            intensity: opt_num(map, "intensity")?.unwrap_or(1.0).max(0.0),
            distance: opt_num(map, "distance")?.unwrap_or(0.0).max(0.0),
            position: opt_vec(map, "position")?.unwrap_or(defaults.origin),
            label: opt_string(map, "label")?,
        })
    }
}

impl GroupProps {
    pub fn parse(map: &Map, defaults: &FactoryDefaults) -> Result<Self, String> {
        Ok(Self {
            position: opt_vec(map, "position")?.unwrap_or(defaults.origin),
            rotation: opt_vec(map, "rotation")?.unwrap_or(Vec3::ZERO),
            label: opt_string(map, "label")?,
        })
    }
}

fn positive(v: Vec3, what: &str) -> Result<Vec3, String> {
    if v.is_finite() && v.cmpgt(Vec3::ZERO).all() {
        Ok(v)
    } else {
        Err(format!("`{what}` must be positive"))
    }
}

fn opt_num(map: &Map, key: &str) -> Result<Option<f32>, String> {
    map.get(key)
        .map(|v| num(v).ok_or_else(|| format!("`{key}` must be a number")))
        .transpose()
}

fn opt_vec(map: &Map, key: &str) -> Result<Option<Vec3>, String> {
    map.get(key)
        .map(|v| to_vec3(v).ok_or_else(|| format!("`{key}` must be a vector")))
        .transpose()
}

fn opt_color(map: &Map, key: &str) -> Result<Option<u32>, String> {
    map.get(key)
        .map(|v| to_color(v).ok_or_else(|| format!("`{key}` must be a colour")))
        .transpose()
}

fn opt_bool(map: &Map, key: &str) -> Result<Option<bool>, String> {
    map.get(key)
        .map(|v| v.as_bool().map_err(|_| format!("`{key}` must be true or false")))
        .transpose()
}

fn opt_string(map: &Map, key: &str) -> Result<Option<String>, String> {
    map.get(key)
        .map(|v| {
            v.clone()
                .try_cast::<ImmutableString>()
                .map(|s| s.to_string())
                .ok_or_else(|| format!("`{key}` must be a string"))
        })
        .transpose()
}

/// INT or FLOAT as `f32`.
pub fn num(v: &Dynamic) -> Option<f32> {
    v.as_float()
        .map(|f| f as f32)
        .or_else(|_| v.as_int().map(|i| i as f32))
        .ok()
        .filter(|f| f.is_finite())
}

/// A finite `Vec3`, a three-element array or a map with `x`, `y`, `z`
/// (missing components are zero).
pub fn to_vec3(v: &Dynamic) -> Option<Vec3> {
    if let Some(vec) = v.clone().try_cast::<Vec3>() {
        return vec.is_finite().then_some(vec);
    }
    if let Some(arr) = v.clone().try_cast::<Array>() {
        return match arr.as_slice() {
            [x, y, z] => Some(Vec3::new(num(x)?, num(y)?, num(z)?)),
            _ => None,
        };
    }
    let map = v.clone().try_cast::<Map>()?;
    let axis = |k: &str| map.get(k).map_or(Some(0.0), num);
    Some(Vec3::new(axis("x")?, axis("y")?, axis("z")?))
}

/// Packed `0xRRGGBB` integer or a `"#rrggbb"` string.
pub fn to_color(v: &Dynamic) -> Option<u32> {
    if let Ok(i) = v.as_int() {
        return u32::try_from(i).ok().filter(|c| *c <= 0xffffff);
    }
    let s = v.clone().try_cast::<ImmutableString>()?;
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FactoryDefaults {
        FactoryDefaults {
            origin: Vec3::new(0.0, 3.0, 0.0),
            color: 0x44aa88,
            mass: 1.0,
            scale: 1.0,
        }
    }

    fn map(pairs: &[(&str, Dynamic)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| ((*k).into(), v.clone()))
            .collect()
    }

    #[test]
    fn cube_defaults() {
        let props = CubeProps::parse(&Map::new(), &defaults()).unwrap();
        assert_eq!(props.size, Vec3::ONE);
        assert_eq!(props.common.position, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(props.common.color, 0x44aa88);
        assert_eq!(props.common.mass, 1.0);
        assert!(props.common.physics);
    }

    #[test]
    fn cube_accepts_number_or_vector_size() {
        let m = map(&[("size", Dynamic::from(2_i64))]);
        assert_eq!(CubeProps::parse(&m, &defaults()).unwrap().size, Vec3::splat(2.0));
        let arr: Array = vec![Dynamic::from(1.0), Dynamic::from(2_i64), Dynamic::from(3.0)];
        let m = map(&[("size", Dynamic::from(arr))]);
        assert_eq!(CubeProps::parse(&m, &defaults()).unwrap().size, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        assert_eq!(to_vec3(&Dynamic::from(Vec3::ONE)), Some(Vec3::ONE));
        assert_eq!(to_vec3(&Dynamic::from(Vec3::new(f32::INFINITY, 0.0, 0.0))), None);
        assert_eq!(to_vec3(&Dynamic::from(Vec3::new(0.0, f32::NAN, 0.0))), None);
        let arr: Array = vec![Dynamic::from(1e300), Dynamic::from(0.0), Dynamic::from(0.0)];
        assert_eq!(to_vec3(&Dynamic::from(arr)), None);
    }

    #[test]
    fn bad_values_are_errors() {
        let m = map(&[("size", Dynamic::from(-1_i64))]);
        assert!(CubeProps::parse(&m, &defaults()).is_err());
        let m = map(&[("color", Dynamic::from("blue"))]);
        assert!(CubeProps::parse(&m, &defaults()).is_err());
        let m = map(&[("physics", Dynamic::from(1_i64))]);
        assert!(SphereProps::parse(&m, &defaults()).is_err());
    }

    #[test]
    fn colour_forms() {
        assert_eq!(to_color(&Dynamic::from(0xff0000_i64)), Some(0xff0000));
        assert_eq!(to_color(&Dynamic::from("#00ff00")), Some(0x00ff00));
        assert_eq!(to_color(&Dynamic::from(-1_i64)), None);
        assert_eq!(to_color(&Dynamic::from(0x1000000_i64)), None);
    }

    #[test]
    fn vector_forms() {
        let m: Map = map(&[("y", Dynamic::from(2.5))]);
        assert_eq!(to_vec3(&Dynamic::from(m)), Some(Vec3::new(0.0, 2.5, 0.0)));
        assert_eq!(to_vec3(&Dynamic::from(Vec3::X)), Some(Vec3::X));
        let short: Array = vec![Dynamic::from(1_i64)];
        assert_eq!(to_vec3(&Dynamic::from(short)), None);
    }

    #[test]
    fn cylinder_radius_overrides() {
        let m = map(&[("radius", Dynamic::from(1.0)), ("radiusTop", Dynamic::from(0.0))]);
        let props = CylinderProps::parse(&m, &defaults()).unwrap();
        assert_eq!((props.radius_top, props.radius_bottom), (0.0, 1.0));
        assert_eq!(props.height, 1.0);
    }

    #[test]
    fn light_types() {
        let m = map(&[("type", Dynamic::from("spot")), ("intensity", Dynamic::from(3_i64))]);
        let props = LightProps::parse(&m, &defaults()).unwrap();
        assert_eq!(props.kind, LightKind::Spot);
        assert_eq!(props.intensity, 3.0);
        let m = map(&[("type", Dynamic::from("laser"))]);
        assert!(LightProps::parse(&m, &defaults()).is_err());
    }
}
