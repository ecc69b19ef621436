//! World Kernel: the entity registry, its physics world, and the per-frame
//! pieces that keep both in lockstep.
//!
//! # Invariants
//! - An entity with a body has its visual pose overwritten on every sync.
//! - Entities are only destroyed by explicit removal or a clear; never by
//!   the loop itself.
//! - A failing animation task never affects its siblings.

pub mod effects;
pub mod entity;
pub mod notify;
pub mod physics;
pub mod sync;
pub mod tasks;
pub mod world;

pub use effects::{Effects, ParticleBurst};
pub use entity::{Entity, EntitySpec, LightKind, Material, Shape, TextureInfo, Visual};
pub use notify::Notifier;
pub use physics::{
    BodyDesc, BodyHandle, BodyKind, ColliderShape, PhysicsConfig, PhysicsWorld, PickShape,
};
pub use tasks::{AnimationTaskRegistry, RunSummary, TaskCallback, TaskError, TaskIdSource, TaskInbox};
pub use world::{
    AmbientLight, Environment, EnvironmentChange, Fog, FrameClock, RayHit, World, WorldEvent,
    euler_to_quat, quat_to_euler,
};
