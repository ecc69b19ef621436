use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use worldspace_common::{EntityId, ModId, Transform};

use crate::physics::{BodyDesc, BodyHandle, PickShape};

/// Kind of light a light entity emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Point,
    Directional,
    Spot,
}

/// Renderable shape of a visual, sized in local units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Box { size: Vec3 },
    Sphere { radius: f32 },
    Cylinder {
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
    },
    /// Flat textured quad in the local XY plane.
    Plane {
        width: f32,
        height: f32,
        texture: Option<TextureInfo>,
    },
    Light {
        kind: LightKind,
        intensity: f32,
        distance: f32,
    },
    /// Transform-only node other visuals can be parented to.
    Group,
    /// Instantiated 3D asset, reduced to its bounds.
    Model {
        name: String,
        mesh_count: usize,
        half_extents: Vec3,
    },
}

impl Shape {
    /// Local-space solid used for picking. Lights and groups have none.
    pub fn pick_shape(&self) -> Option<PickShape> {
        match self {
            Shape::Box { size } => Some(PickShape::Cuboid {
                half_extents: *size * 0.5,
            }),
            Shape::Sphere { radius } => Some(PickShape::Ball { radius: *radius }),
            Shape::Cylinder {
                radius_top,
                radius_bottom,
                height,
            } => Some(PickShape::Frustum {
                half_height: height * 0.5,
                radius_top: *radius_top,
                radius_bottom: *radius_bottom,
            }),
            Shape::Plane { width, height, .. } => Some(PickShape::Cuboid {
                half_extents: Vec3::new(width * 0.5, height * 0.5, 0.01),
            }),
            Shape::Model { half_extents, .. } => Some(PickShape::Cuboid {
                half_extents: *half_extents,
            }),
            Shape::Light { .. } | Shape::Group => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "box",
            Shape::Sphere { .. } => "sphere",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Plane { .. } => "plane",
            Shape::Light { .. } => "light",
            Shape::Group => "group",
            Shape::Model { .. } => "model",
        }
    }
}

/// Decoded image backing a textured plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
}

/// Surface appearance of a visual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Packed `0xRRGGBB`.
    pub color: u32,
    pub opacity: f32,
    /// Emissive strength; glow effects drive this.
    pub emissive: f32,
}

impl Material {
    pub fn colored(color: u32) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: 0xcccccc,
            opacity: 1.0,
            emissive: 0.0,
        }
    }
}

/// The renderable half of an entity. Exclusively owned by its entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub shape: Shape,
    /// Relative to `parent` when set, world space otherwise.
    pub transform: Transform,
    pub material: Material,
    pub visible: bool,
    pub parent: Option<EntityId>,
}

impl Visual {
    pub fn new(shape: Shape, transform: Transform, material: Material) -> Self {
        Self {
            shape,
            transform,
            material,
            visible: true,
            parent: None,
        }
    }
}

/// A registry-tracked world object.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub label: String,
    pub visual: Visual,
    /// Present iff the entity participates in physics.
    pub body: Option<BodyHandle>,
    /// `None` for environment entities.
    pub owner: Option<ModId>,
    pub created_at: SystemTime,
}

impl Entity {
    pub fn is_mod_owned(&self) -> bool {
        self.owner.is_some()
    }
}

/// What a caller hands to [`crate::World::spawn`].
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub label: String,
    pub visual: Visual,
    pub body: Option<BodyDesc>,
    pub owner: Option<ModId>,
}

impl EntitySpec {
    pub fn new(label: impl Into<String>, visual: Visual) -> Self {
        Self {
            label: label.into(),
            visual,
            body: None,
            owner: None,
        }
    }

    pub fn with_body(mut self, body: BodyDesc) -> Self {
        self.body = Some(body);
        self
    }

    pub fn owned_by(mut self, owner: Option<ModId>) -> Self {
        self.owner = owner;
        self
    }
}
