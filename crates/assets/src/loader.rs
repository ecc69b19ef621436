use glam::Vec3;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Decode failure for model and image payloads. No entity is created when
/// a load ends in one of these.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("empty payload")]
    Empty,
    #[error("glTF decode failed: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported model format: {0}")]
    Unsupported(String),
}

/// What the runtime needs from a decoded 3D asset: its size and shape count.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: Option<String>,
    pub mesh_count: usize,
    pub primitive_count: usize,
    pub min: Vec3,
    pub max: Vec3,
}

impl ModelInfo {
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn center(&self) -> Vec3 {
        (self.max + self.min) * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Width over height; 1.0 for degenerate images.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Bounds assumed for a model that carries no position data.
const DEFAULT_HALF_EXTENT: f32 = 0.5;

/// Decode a glTF (JSON) or GLB (binary) payload into its bounds.
///
/// Bounds are the union of every primitive's POSITION accessor bounds.
/// Primitives without positions are not counted.
pub async fn decode_model(bytes: Vec<u8>) -> Result<ModelInfo, LoaderError> {
    if bytes.is_empty() {
        return Err(LoaderError::Empty);
    }
    yield_now().await;
    if !looks_like_gltf(&bytes) {
        return Err(LoaderError::Unsupported(
            "only glTF and GLB payloads can be decoded".into(),
        ));
    }

    let gltf = gltf::Gltf::from_slice(&bytes)?;
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    let mut primitive_count = 0;
    for mesh in gltf.meshes() {
        for primitive in mesh.primitives() {
            if primitive.get(&gltf::Semantic::Positions).is_none() {
                continue;
            }
            primitive_count += 1;
            let bounds = primitive.bounding_box();
            min = min.min(Vec3::from_array(bounds.min));
            max = max.max(Vec3::from_array(bounds.max));
        }
    }
    if primitive_count == 0 {
        min = Vec3::splat(-DEFAULT_HALF_EXTENT);
        max = Vec3::splat(DEFAULT_HALF_EXTENT);
    }
    let name = gltf
        .meshes()
        .find_map(|m| m.name().map(str::to_string));
    let info = ModelInfo {
        name,
        mesh_count: gltf.meshes().len(),
        primitive_count,
        min,
        max,
    };
    tracing::debug!(meshes = info.mesh_count, primitives = primitive_count, "model decoded");
    Ok(info)
}

/// Decode any image format the `image` crate recognizes.
pub async fn decode_image(bytes: Vec<u8>) -> Result<ImageInfo, LoaderError> {
    if bytes.is_empty() {
        return Err(LoaderError::Empty);
    }
    yield_now().await;
    let img = image::load_from_memory(&bytes)?;
    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
    };
    tracing::debug!(width = info.width, height = info.height, "image decoded");
    Ok(info)
}

/// GLB magic or a JSON object.
fn looks_like_gltf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"glTF")
        || bytes
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{')
}

/// Suspends once, so a decode always completes on a later poll than the one
/// that started it.
fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
