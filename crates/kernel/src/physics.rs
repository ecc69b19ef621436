//! Rigid-body simulation backed by rapier.
//!
//! Everything outside this module talks glam; the nalgebra types rapier uses
//! stay behind the conversion helpers at the bottom of the file.

use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::parry::query::{Ray, RayCast};
use rapier3d::parry::shape::{Ball, ConvexPolyhedron, Cuboid, Cylinder};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

/// Opaque handle to a body owned by a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Dynamic,
    Fixed,
    Kinematic,
}

/// Collision shape, sized in world units (half extents / radii).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
    Cylinder { half_height: f32, radius: f32 },
}

/// Solid a visual is picked against, in the visual's own local units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
    /// Y-aligned cylinder whose caps may differ; a zero radius gives a cone.
    Frustum {
        half_height: f32,
        radius_top: f32,
        radius_bottom: f32,
    },
}

const FRUSTUM_SEGMENTS: usize = 32;

impl PickShape {
    /// Distance from `origin` along the unit vector `dir` to the surface,
    /// zero when `origin` is inside. Both are in the shape's local frame.
    pub fn ray_distance(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<f32> {
        let ray = Ray::new(point![origin.x, origin.y, origin.z], to_vector(dir));
        match *self {
            PickShape::Cuboid { half_extents } => {
                Cuboid::new(to_vector(half_extents)).cast_local_ray(&ray, max_distance, true)
            }
            PickShape::Ball { radius } => Ball::new(radius).cast_local_ray(&ray, max_distance, true),
            PickShape::Frustum {
                half_height,
                radius_top,
                radius_bottom,
            } if radius_top == radius_bottom => {
                Cylinder::new(half_height, radius_top).cast_local_ray(&ray, max_distance, true)
            }
            PickShape::Frustum {
                half_height,
                radius_top,
                radius_bottom,
            } => frustum_hull(half_height, radius_top, radius_bottom)?
                .cast_local_ray(&ray, max_distance, true),
        }
    }
}

fn frustum_hull(half_height: f32, radius_top: f32, radius_bottom: f32) -> Option<ConvexPolyhedron> {
    let mut points = Vec::with_capacity(FRUSTUM_SEGMENTS * 2);
    for (y, radius) in [(half_height, radius_top), (-half_height, radius_bottom)] {
        if radius <= MIN_EXTENT {
            points.push(point![0.0, y, 0.0]);
            continue;
        }
        for i in 0..FRUSTUM_SEGMENTS {
            let angle = i as f32 * std::f32::consts::TAU / FRUSTUM_SEGMENTS as f32;
            points.push(point![radius * angle.cos(), y, radius * angle.sin()]);
        }
    }
    ConvexPolyhedron::from_convex_hull(&points)
}

/// Everything needed to create a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub shape: ColliderShape,
    pub mass: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl BodyDesc {
    pub fn dynamic(shape: ColliderShape, mass: f32) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            shape,
            mass,
            ..Self::fixed(shape)
        }
    }

    pub fn fixed(shape: ColliderShape) -> Self {
        Self {
            kind: BodyKind::Fixed,
            shape,
            mass: 0.0,
            restitution: 0.3,
            friction: 0.6,
        }
    }
}

/// Simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    /// Length of one fixed step, in seconds.
    pub fixed_step: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_step: 1.0 / 60.0,
        }
    }
}

/// Smallest half extent or radius a collider is built with.
const MIN_EXTENT: f32 = 0.01;

/// The physics half of the world.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    steps: u64,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: config.fixed_step,
            ..IntegrationParameters::default()
        };
        Self {
            gravity: to_vector(config.gravity),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            steps: 0,
        }
    }

    /// Create a body with one attached collider at the given pose.
    ///
    /// Degenerate input is sanitized rather than rejected: sizes are clamped
    /// to a small minimum and a dynamic body without positive mass becomes
    /// fixed.
    pub fn add_body(&mut self, desc: &BodyDesc, position: Vec3, rotation: Quat) -> BodyHandle {
        let kind = match desc.kind {
            BodyKind::Dynamic if !(desc.mass.is_finite() && desc.mass > 0.0) => BodyKind::Fixed,
            other => other,
        };
        let builder = match kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let iso = Isometry::from_parts(Translation3::from(to_vector(position)), to_rotation(rotation));
        let handle = self.bodies.insert(builder.pose(iso).build());

        let mut collider = match desc.shape {
            ColliderShape::Cuboid { half_extents } => {
                let h = half_extents.max(Vec3::splat(MIN_EXTENT));
                ColliderBuilder::cuboid(h.x, h.y, h.z)
            }
            ColliderShape::Ball { radius } => ColliderBuilder::ball(radius.max(MIN_EXTENT)),
            ColliderShape::Cylinder {
                half_height,
                radius,
            } => ColliderBuilder::cylinder(half_height.max(MIN_EXTENT), radius.max(MIN_EXTENT)),
        }
        .restitution(desc.restitution)
        .friction(desc.friction);
        if kind == BodyKind::Dynamic {
            collider = collider.mass(desc.mass);
        }
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);

        tracing::debug!(?kind, bodies = self.bodies.len(), "body added");
        BodyHandle(handle)
    }

    /// Release a body and its colliders. Returns whether it existed.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .remove(
                handle.0,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    /// Advance the simulation by exactly one fixed step.
    pub fn step(&mut self) {
        let hooks = ();
        let events = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &hooks,
            &events,
        );
        self.steps += 1;
    }

    /// Current pose of a body.
    pub fn body_pose(&self, handle: BodyHandle) -> Option<(Vec3, Quat)> {
        self.bodies
            .get(handle.0)
            .map(|body| (from_vector(body.translation()), from_rotation(body.rotation())))
    }

    /// Teleport a body, waking it up.
    pub fn set_body_pose(&mut self, handle: BodyHandle, position: Vec3, rotation: Quat) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) => {
                body.set_translation(to_vector(position), true);
                body.set_rotation(to_rotation(rotation), true);
                true
            }
            None => false,
        }
    }

    /// Apply an impulse to a dynamic body. Fixed bodies ignore it.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> bool {
        match self.bodies.get_mut(handle.0) {
            Some(body) if body.is_dynamic() => {
                body.apply_impulse(to_vector(impulse), true);
                true
            }
            _ => false,
        }
    }

    pub fn body_kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        self.bodies.get(handle.0).map(|body| {
            if body.is_dynamic() {
                BodyKind::Dynamic
            } else if body.is_kinematic() {
                BodyKind::Kinematic
            } else {
                BodyKind::Fixed
            }
        })
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle.0)
    }

    pub fn gravity(&self) -> Vec3 {
        from_vector(&self.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = to_vector(gravity);
    }

    pub fn fixed_step(&self) -> f32 {
        self.integration_parameters.dt
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of steps taken since creation.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("gravity", &self.gravity())
            .field("steps", &self.steps)
            .finish()
    }
}

fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

fn from_rotation(r: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(r.i, r.j, r.k, r.w)
}
