use std::path::Path;
use worldspace_common::{Mod, ModKind, ModPayload};

use crate::AssetError;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "rhai", "lua"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const MODEL_EXTENSIONS: &[&str] = &["glb", "gltf", "obj", "fbx"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

/// Declared type of a dropped file, from its extension alone.
/// Case-insensitive; anything unrecognized is [`ModKind::Generic`].
pub fn classify(filename: &str) -> ModKind {
    let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return ModKind::Generic;
    };
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if SCRIPT_EXTENSIONS.contains(&ext) {
        ModKind::Script
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        ModKind::Image
    } else if MODEL_EXTENSIONS.contains(&ext) {
        ModKind::Model
    } else if CONFIG_EXTENSIONS.contains(&ext) {
        ModKind::Config
    } else {
        ModKind::Generic
    }
}

/// Read a file into a mod descriptor named after the file.
///
/// Script and config payloads must be UTF-8 text. Generic files become text
/// when they happen to be valid UTF-8, bytes otherwise.
pub fn read_mod_file(path: impl AsRef<Path>) -> Result<Mod, AssetError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AssetError::BadPath(path.display().to_string()))?
        .to_string();
    let kind = classify(&name);
    let bytes = std::fs::read(path)?;
    let payload = match kind {
        ModKind::Script | ModKind::Config => ModPayload::Text(
            String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        ),
        ModKind::Model | ModKind::Image => ModPayload::Bytes(bytes),
        ModKind::Generic => match String::from_utf8(bytes) {
            Ok(text) => ModPayload::Text(text),
            Err(e) => ModPayload::Bytes(e.into_bytes()),
        },
    };
    tracing::debug!(%name, %kind, "mod file read");
    Ok(Mod::new(name, kind, payload))
}
