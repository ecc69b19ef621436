use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;
use worldspace_common::{EntityId, ModId, Transform};

use crate::effects::Effects;
use crate::entity::{Entity, EntitySpec};
use crate::physics::{PhysicsConfig, PhysicsWorld};

/// A record produced by every structural mutation to the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    Spawned {
        id: EntityId,
        owner: Option<ModId>,
    },
    Despawned {
        id: EntityId,
        owner: Option<ModId>,
    },
    EnvironmentChanged(EnvironmentChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EnvironmentChange {
    Ambient(AmbientLight),
    Fog(Option<Fog>),
    Gravity(Vec3),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: u32,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: 0x404060,
            intensity: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fog {
    pub color: u32,
    pub near: f32,
    pub far: f32,
}

/// Shared scene parameters that are not entities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    pub ambient: AmbientLight,
    pub fog: Option<Fog>,
}

/// Simulation time as seen by mods.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameClock {
    /// Seconds since the loop started.
    pub elapsed: f64,
    /// Clamped length of the current frame, in seconds.
    pub delta: f64,
    pub frame: u64,
}

/// Closest intersection found by [`World::raycast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub distance: f32,
    pub point: Vec3,
}

/// The entity registry plus the shared scene state around it.
///
/// Entities live in a BTreeMap keyed by monotonically increasing ids, so
/// iteration is insertion order. Removing an entity releases its body from
/// the physics world in the same call.
pub struct World {
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
    pub(crate) physics: PhysicsWorld,
    environment: Environment,
    effects: Effects,
    clock: FrameClock,
    events: Vec<WorldEvent>,
}

impl World {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 0,
            physics: PhysicsWorld::new(config),
            environment: Environment::default(),
            effects: Effects::default(),
            clock: FrameClock::default(),
            events: Vec::new(),
        }
    }

    /// Insert a new entity, building its body first when the spec asks for one.
    pub fn spawn(&mut self, spec: EntitySpec) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        let t = spec.visual.transform;
        let body = spec
            .body
            .map(|desc| self.physics.add_body(&desc, t.position, t.rotation));
        tracing::debug!(%id, label = %spec.label, physics = body.is_some(), "entity spawned");
        self.events.push(WorldEvent::Spawned {
            id,
            owner: spec.owner,
        });
        self.entities.insert(
            id,
            Entity {
                id,
                label: spec.label,
                visual: spec.visual,
                body,
                owner: spec.owner,
                created_at: SystemTime::now(),
            },
        );
        id
    }

    /// Remove an entity and release its resources. Unknown ids are a no-op.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(&id) else {
            return false;
        };
        if let Some(body) = entity.body {
            self.physics.remove_body(body);
        }
        for child in self.entities.values_mut() {
            if child.visual.parent == Some(id) {
                child.visual.parent = None;
            }
        }
        tracing::debug!(%id, "entity removed");
        self.events.push(WorldEvent::Despawned {
            id,
            owner: entity.owner,
        });
        true
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Every entity, in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Snapshot of every entity id, in insertion order.
    pub fn list_all(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Snapshot of every mod-spawned entity id, in insertion order.
    pub fn list_mod_owned(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_mod_owned())
            .map(|e| e.id)
            .collect()
    }

    pub fn owned_by(&self, owner: ModId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.owner == Some(owner))
            .map(|e| e.id)
            .collect()
    }

    /// Remove every mod-owned entity and every mod marker. Environment
    /// entities stay. Returns how many entities were removed.
    pub fn clear_mod_owned(&mut self) -> usize {
        let doomed = self.list_mod_owned();
        for id in &doomed {
            self.remove(*id);
        }
        self.effects.clear_markers();
        tracing::info!(removed = doomed.len(), "mod-owned entities cleared");
        doomed.len()
    }

    /// Remove everything, environment included.
    pub fn clear_all(&mut self) {
        for id in self.list_all() {
            self.remove(id);
        }
        self.effects.clear();
    }

    /// Overwrite an entity's local transform. Physics entities have their
    /// body teleported too, otherwise the next sync would undo the write.
    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.visual.transform = transform;
        if let Some(body) = entity.body {
            self.physics
                .set_body_pose(body, transform.position, transform.rotation);
        }
        true
    }

    pub fn apply_impulse(&mut self, id: EntityId, impulse: Vec3) -> bool {
        match self.entities.get(&id).and_then(|e| e.body) {
            Some(body) => self.physics.apply_impulse(body, impulse),
            None => false,
        }
    }

    /// Parent `child` under `parent`. Refuses self-parenting and cycles.
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> bool {
        if let Some(p) = parent {
            if !self.entities.contains_key(&p) || self.is_ancestor(child, p) {
                return false;
            }
        }
        match self.entities.get_mut(&child) {
            Some(e) => {
                e.visual.parent = parent;
                true
            }
            None => false,
        }
    }

    fn is_ancestor(&self, candidate: EntityId, of: EntityId) -> bool {
        let mut cursor = Some(of);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.entities.get(&id).and_then(|e| e.visual.parent);
        }
        false
    }

    /// World-space transform of an entity, walking the parent chain.
    pub fn world_transform(&self, id: EntityId) -> Option<Transform> {
        let entity = self.entities.get(&id)?;
        let mut t = entity.visual.transform;
        let mut parent = entity.visual.parent;
        while let Some(pid) = parent {
            let Some(p) = self.entities.get(&pid) else {
                break;
            };
            t = p.visual.transform.mul_transform(&t);
            parent = p.visual.parent;
        }
        Some(t)
    }

    /// Closest visible entity hit by a ray, within `max_distance`.
    ///
    /// The ray is taken into each visual's unscaled local frame and tested
    /// against its exact solid, so bodiless entities are pickable too.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let mut best: Option<RayHit> = None;
        for entity in self.entities.values().filter(|e| e.visual.visible) {
            let Some(shape) = entity.visual.shape.pick_shape() else {
                continue;
            };
            let Some(t) = self.world_transform(entity.id) else {
                continue;
            };
            if t.scale.abs().min_element() < 1e-6 {
                continue;
            }
            let inv = t.rotation.inverse();
            let local_origin = (inv * (origin - t.position)) / t.scale;
            let local_dir = (inv * dir) / t.scale;
            // Local lengths are world lengths stretched by this factor.
            let stretch = local_dir.length();
            let Some(local) = shape.ray_distance(local_origin, local_dir / stretch, max_distance * stretch)
            else {
                continue;
            };
            let distance = local / stretch;
            if distance <= max_distance && best.is_none_or(|b| distance < b.distance) {
                best = Some(RayHit {
                    entity: entity.id,
                    distance,
                    point: origin + dir * distance,
                });
            }
        }
        best
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    /// Advance the physics world by one fixed step.
    pub fn step_physics(&mut self) {
        self.physics.step();
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn set_ambient(&mut self, ambient: AmbientLight) {
        self.environment.ambient = ambient;
        self.events
            .push(WorldEvent::EnvironmentChanged(EnvironmentChange::Ambient(ambient)));
    }

    pub fn set_fog(&mut self, fog: Option<Fog>) {
        self.environment.fog = fog;
        self.events
            .push(WorldEvent::EnvironmentChanged(EnvironmentChange::Fog(fog)));
    }

    pub fn gravity(&self) -> Vec3 {
        self.physics.gravity()
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.physics.set_gravity(gravity);
        self.events
            .push(WorldEvent::EnvironmentChanged(EnvironmentChange::Gravity(gravity)));
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut Effects {
        &mut self.effects
    }

    /// Run the decorative, environment-owned animations for one frame.
    pub fn update_effects(&mut self, dt: f32) {
        let glows = self.effects.update(dt, self.clock.elapsed);
        for glow in glows {
            if let Some(e) = self.entities.get_mut(&glow.entity) {
                e.visual.material.emissive = glow.intensity;
            }
        }
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    pub fn set_clock(&mut self, clock: FrameClock) {
        self.clock = clock;
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("physics", &self.physics)
            .field("environment", &self.environment)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Quaternion from XYZ Euler angles in radians, the order scripts use.
pub fn euler_to_quat(euler: Vec3) -> Quat {
    Quat::from_euler(glam::EulerRot::XYZ, euler.x, euler.y, euler.z)
}

pub fn quat_to_euler(q: Quat) -> Vec3 {
    let (x, y, z) = q.to_euler(glam::EulerRot::XYZ);
    Vec3::new(x, y, z)
}
