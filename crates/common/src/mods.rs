use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::ModId;

/// Declared type of a mod. Decides which loader the ingestion pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModKind {
    Script,
    Model,
    Image,
    Config,
    /// Fallback for anything unrecognized.
    #[serde(other)]
    Generic,
}

impl ModKind {
    /// Parse a declared type name. Unknown names map to [`ModKind::Generic`].
    pub fn from_declared(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "script" => Self::Script,
            "model" => Self::Model,
            "image" => Self::Image,
            "config" => Self::Config,
            _ => Self::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Model => "model",
            Self::Image => "image",
            Self::Config => "config",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ModKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw mod content: script/config text or encoded binary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl ModPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }

    /// Payload as text. Binary payloads are decoded lossily.
    pub fn to_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Text(s) => std::borrow::Cow::Borrowed(s),
            Self::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for ModPayload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Free-form hints that travel with a mod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModMetadata {
    /// Preferred colour, packed `0xRRGGBB`.
    pub color: Option<u32>,
    /// Mass for the rigid body the loader builds, if any.
    pub mass: Option<f32>,
    /// Uniform scale applied to loaded assets.
    pub scale: Option<f32>,
    /// Skip the default marker a script mod gets.
    pub suppress_visual: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A unit of user-supplied content. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mod {
    #[serde(default)]
    pub id: ModId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModKind,
    #[serde(default)]
    pub payload: ModPayload,
    #[serde(default)]
    pub metadata: ModMetadata,
    #[serde(default)]
    pub target_position: Vec3,
}

impl Mod {
    pub fn new(name: impl Into<String>, kind: ModKind, payload: ModPayload) -> Self {
        Self {
            id: ModId::new(),
            name: name.into(),
            kind,
            payload,
            metadata: ModMetadata::default(),
            target_position: Vec3::ZERO,
        }
    }

    pub fn script(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(name, ModKind::Script, ModPayload::Text(source.into()))
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.target_position = position;
        self
    }

    pub fn with_metadata(mut self, metadata: ModMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
