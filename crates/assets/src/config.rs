//! Declarative config mods.
//!
//! A config payload is a JSON or YAML mapping. Each recognized key becomes
//! one or more [`ConfigEffect`]s; a key that fails to parse is reported in
//! [`ConfigOutcome::errors`] without affecting its siblings.
//!
//! ```yaml
//! lights:
//!   - { type: point, color: "#ffaa00", intensity: 2, position: [0, 4, 0] }
//! ambientLight: { color: 0x202040, intensity: 0.3 }
//! fog: { color: "#000000", near: 5, far: 60 }
//! gravity: [0, -1.62, 0]
//! ```

use glam::Vec3;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config: {0}")]
    Malformed(String),
    #[error("config root must be a mapping")]
    NotAMapping,
    #[error("invalid `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// A light to spawn as a tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LightDecl {
    /// `point`, `directional` or `spot`.
    pub kind: String,
    pub color: u32,
    pub intensity: f32,
    /// Falloff distance; zero means unbounded.
    pub distance: f32,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEffect {
    Light(LightDecl),
    /// Fields left out keep their current value.
    Ambient {
        color: Option<u32>,
        intensity: Option<f32>,
    },
    /// `None` turns fog off.
    Fog(Option<FogDecl>),
    Gravity(Vec3),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogDecl {
    pub color: u32,
    pub near: f32,
    pub far: f32,
}

/// Everything a config payload asked for, plus what it got wrong.
#[derive(Debug, Default)]
pub struct ConfigOutcome {
    pub effects: Vec<ConfigEffect>,
    pub errors: Vec<ConfigError>,
    /// Keys with no meaning here.
    pub ignored: Vec<String>,
}

impl ConfigOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

const LIGHT_KINDS: &[&str] = &["point", "directional", "spot"];

/// Parse a config payload. Only a payload that is not a mapping at all is
/// an `Err`; per-key problems land in the outcome.
pub fn parse_config(text: &str) -> Result<ConfigOutcome, ConfigError> {
    let root: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?,
    };
    let Value::Object(map) = root else {
        return Err(ConfigError::NotAMapping);
    };

    let mut outcome = ConfigOutcome::default();
    for (key, value) in map {
        let parsed = match key.as_str() {
            "light" => parse_light(value).map(|l| vec![ConfigEffect::Light(l)]),
            "lights" => parse_lights(value),
            "ambientLight" | "ambient" => parse_ambient(value).map(|e| vec![e]),
            "fog" => parse_fog(value).map(|f| vec![ConfigEffect::Fog(f)]),
            "gravity" => parse_gravity(value).map(|g| vec![ConfigEffect::Gravity(g)]),
            _ => {
                tracing::debug!(%key, "config key ignored");
                outcome.ignored.push(key);
                continue;
            }
        };
        match parsed {
            Ok(effects) => outcome.effects.extend(effects),
            Err(reason) => {
                tracing::warn!(%key, %reason, "config key rejected");
                outcome.errors.push(ConfigError::InvalidKey { key, reason });
            }
        }
    }
    Ok(outcome)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorValue {
    Packed(u32),
    Text(String),
}

impl ColorValue {
    fn resolve(&self) -> Result<u32, String> {
        match self {
            ColorValue::Packed(c) if *c <= 0xffffff => Ok(*c),
            ColorValue::Packed(c) => Err(format!("colour {c:#x} out of range")),
            ColorValue::Text(s) => {
                let hex = s
                    .trim()
                    .trim_start_matches('#')
                    .trim_start_matches("0x");
                match u32::from_str_radix(hex, 16) {
                    Ok(c) if hex.len() == 6 => Ok(c),
                    _ => Err(format!("bad colour {s:?}")),
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Vec3Value {
    Array([f32; 3]),
    Object {
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
        #[serde(default)]
        z: f32,
    },
}

impl Vec3Value {
    fn resolve(&self) -> Result<Vec3, String> {
        let v = match *self {
            Vec3Value::Array([x, y, z]) => Vec3::new(x, y, z),
            Vec3Value::Object { x, y, z } => Vec3::new(x, y, z),
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err("vector must be finite".into())
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawLight {
    #[serde(rename = "type")]
    kind: String,
    color: Option<ColorValue>,
    intensity: f32,
    distance: f32,
    position: Option<Vec3Value>,
}

impl Default for RawLight {
    fn default() -> Self {
        Self {
            kind: "point".into(),
            color: None,
            intensity: 1.0,
            distance: 0.0,
            position: None,
        }
    }
}

fn parse_light(value: Value) -> Result<LightDecl, String> {
    let raw: RawLight = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let kind = raw.kind.to_ascii_lowercase();
    if !LIGHT_KINDS.contains(&kind.as_str()) {
        return Err(format!("unknown light type {:?}", raw.kind));
    }
    if !(raw.intensity.is_finite() && raw.intensity >= 0.0) {
        return Err("intensity must be non-negative".into());
    }
    Ok(LightDecl {
        kind,
        color: raw.color.as_ref().map_or(Ok(0xffffff), ColorValue::resolve)?,
        intensity: raw.intensity,
        distance: raw.distance.max(0.0),
        position: raw
            .position
            .as_ref()
            .map_or(Ok(Vec3::new(0.0, 5.0, 0.0)), Vec3Value::resolve)?,
    })
}

fn parse_lights(value: Value) -> Result<Vec<ConfigEffect>, String> {
    let Value::Array(items) = value else {
        return Err("expected a list of lights".into());
    };
    items
        .into_iter()
        .map(|v| parse_light(v).map(ConfigEffect::Light))
        .collect()
}

#[derive(Deserialize)]
struct RawAmbient {
    color: Option<ColorValue>,
    intensity: Option<f32>,
}

fn parse_ambient(value: Value) -> Result<ConfigEffect, String> {
    let raw: RawAmbient = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok(ConfigEffect::Ambient {
        color: raw.color.as_ref().map(ColorValue::resolve).transpose()?,
        intensity: raw.intensity.map(|i| i.max(0.0)),
    })
}

#[derive(Deserialize)]
struct RawFog {
    color: Option<ColorValue>,
    #[serde(default = "default_fog_near")]
    near: f32,
    #[serde(default = "default_fog_far")]
    far: f32,
}

fn default_fog_near() -> f32 {
    10.0
}

fn default_fog_far() -> f32 {
    100.0
}

fn parse_fog(value: Value) -> Result<Option<FogDecl>, String> {
    if matches!(value, Value::Null | Value::Bool(false)) {
        return Ok(None);
    }
    let raw: RawFog = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if !(raw.near >= 0.0 && raw.near < raw.far) {
        return Err(format!("fog range {}..{} is empty", raw.near, raw.far));
    }
    Ok(Some(FogDecl {
        color: raw.color.as_ref().map_or(Ok(0xcccccc), ColorValue::resolve)?,
        near: raw.near,
        far: raw.far,
    }))
}

fn parse_gravity(value: Value) -> Result<Vec3, String> {
    let raw: Vec3Value = serde_json::from_value(value).map_err(|e| e.to_string())?;
    raw.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_json_config() {
        let text = r##"{
            "lights": [
                {"type": "point", "color": "#ff8800", "intensity": 2, "position": [1, 4, 0]},
                {"type": "directional"}
            ],
            "ambientLight": {"color": 2105408, "intensity": 0.3},
            "fog": {"color": "0x000000", "near": 5, "far": 60},
            "gravity": [0, -1.62, 0]
        }"##;
        let out = parse_config(text).unwrap();
        assert!(out.is_clean());
        assert_eq!(out.effects.len(), 5);
        assert!(out.effects.contains(&ConfigEffect::Gravity(Vec3::new(0.0, -1.62, 0.0))));
        assert!(out.effects.contains(&ConfigEffect::Ambient {
            color: Some(0x202040),
            intensity: Some(0.3)
        }));
        let lights: Vec<_> = out
            .effects
            .iter()
            .filter_map(|e| match e {
                ConfigEffect::Light(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(lights[0].color, 0xff8800);
        assert_eq!(lights[0].position, Vec3::new(1.0, 4.0, 0.0));
        assert_eq!(lights[1].kind, "directional");
        assert_eq!(lights[1].color, 0xffffff);
    }

    #[test]
    fn effects_follow_document_order() {
        let text = r#"{"lights": [{"type": "spot"}], "gravity": [0, -2, 0], "light": {"type": "point"}, "ambientLight": {"intensity": 0.5}, "ambient": {"intensity": 0.1}}"#;
        let out = parse_config(text).unwrap();
        let kinds: Vec<&str> = out
            .effects
            .iter()
            .map(|e| match e {
                ConfigEffect::Light(l) => l.kind.as_str(),
                ConfigEffect::Gravity(_) => "gravity",
                ConfigEffect::Ambient { .. } => "ambient",
                ConfigEffect::Fog(_) => "fog",
            })
            .collect();
        assert_eq!(kinds, vec!["spot", "gravity", "point", "ambient", "ambient"]);
        assert_eq!(
            out.effects[4],
            ConfigEffect::Ambient {
                color: None,
                intensity: Some(0.1)
            }
        );

        let yaml = parse_config("gravity: [0, -1, 0]
fog: null
").unwrap();
        assert!(matches!(yaml.effects[0], ConfigEffect::Gravity(_)));
    }

    #[test]
    fn yaml_config() {
        let text = "gravity: {y: -3}\nfog: null\n";
        let out = parse_config(text).unwrap();
        assert_eq!(out.effects.len(), 2);
        assert!(out.effects.contains(&ConfigEffect::Fog(None)));
        assert!(out.effects.contains(&ConfigEffect::Gravity(Vec3::new(0.0, -3.0, 0.0))));
    }

    #[test]
    fn bad_key_does_not_poison_others() {
        let text = r#"{"gravity": [0, -5, 0], "light": {"type": "laser"}, "sky": "blue"}"#;
        let out = parse_config(text).unwrap();
        assert_eq!(out.effects, vec![ConfigEffect::Gravity(Vec3::new(0.0, -5.0, 0.0))]);
        assert_eq!(out.errors.len(), 1);
        assert!(matches!(&out.errors[0], ConfigError::InvalidKey { key, .. } if key == "light"));
        assert_eq!(out.ignored, vec!["sky".to_string()]);
    }

    #[test]
    fn empty_fog_range_is_rejected() {
        let out = parse_config(r#"{"fog": {"near": 50, "far": 10}}"#).unwrap();
        assert!(out.effects.is_empty());
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn malformed_payloads() {
        assert!(matches!(parse_config("{ nope: ["), Err(ConfigError::Malformed(_))));
        assert!(matches!(parse_config("[1, 2, 3]"), Err(ConfigError::NotAMapping)));
        assert!(matches!(parse_config("just words"), Err(ConfigError::NotAMapping)));
    }

    #[test]
    fn colour_parsing() {
        assert_eq!(ColorValue::Text("#00ff00".into()).resolve(), Ok(0x00ff00));
        assert_eq!(ColorValue::Text("0x0000ff".into()).resolve(), Ok(0x0000ff));
        assert!(ColorValue::Text("#fff".into()).resolve().is_err());
        assert!(ColorValue::Packed(0x1000000).resolve().is_err());
    }
}
