//! Types scripts hold on to: entity handles, vectors and the `console`,
//! `scene` and `physics` objects.

use glam::Vec3;
use rhai::{Dynamic, Engine, FLOAT, INT};
use std::cell::RefCell;
use std::rc::Rc;
use worldspace_common::{EntityId, Severity, Transform};
use worldspace_kernel::{Notifier, World, euler_to_quat, quat_to_euler};

use crate::props::{num, to_color, to_vec3};

/// Script handle to a registry entity.
///
/// Reads of a removed entity yield defaults and writes are ignored, so a
/// script that outlives its entities (after "clear world") keeps running.
#[derive(Clone)]
pub struct EntityRef {
    pub id: EntityId,
    world: Rc<RefCell<World>>,
}

impl EntityRef {
    pub fn new(id: EntityId, world: Rc<RefCell<World>>) -> Self {
        Self { id, world }
    }

    fn transform(&self) -> Transform {
        self.world
            .borrow()
            .get(self.id)
            .map(|e| e.visual.transform)
            .unwrap_or_default()
    }

    fn update_transform(&self, f: impl FnOnce(&mut Transform)) {
        let mut world = self.world.borrow_mut();
        let Some(mut t) = world.get(self.id).map(|e| e.visual.transform) else {
            return;
        };
        f(&mut t);
        world.set_transform(self.id, t);
    }

    pub fn position(&mut self) -> Vec3 {
        self.transform().position
    }

    pub fn set_position(&mut self, value: Dynamic) {
        if let Some(p) = to_vec3(&value) {
            self.update_transform(|t| t.position = p);
        }
    }

    pub fn rotation(&mut self) -> Vec3 {
        quat_to_euler(self.transform().rotation)
    }

    pub fn set_rotation(&mut self, value: Dynamic) {
        if let Some(r) = to_vec3(&value) {
            self.update_transform(|t| t.rotation = euler_to_quat(r));
        }
    }

    pub fn scale(&mut self) -> Vec3 {
        self.transform().scale
    }

    pub fn set_scale(&mut self, value: Dynamic) {
        let scale = num(&value).map(Vec3::splat).or_else(|| to_vec3(&value));
        if let Some(s) = scale {
            self.update_transform(|t| t.scale = s);
        }
    }

    /// Add XYZ Euler angles to the current rotation.
    pub fn rotate(&mut self, x: Dynamic, y: Dynamic, z: Dynamic) {
        let (Some(x), Some(y), Some(z)) = (num(&x), num(&y), num(&z)) else {
            return;
        };
        self.update_transform(|t| t.rotation = (t.rotation * euler_to_quat(Vec3::new(x, y, z))).normalize());
    }

    pub fn color(&mut self) -> INT {
        self.world
            .borrow()
            .get(self.id)
            .map_or(0, |e| e.visual.material.color as INT)
    }

    pub fn set_color(&mut self, value: Dynamic) {
        if let Some(c) = to_color(&value) {
            if let Some(e) = self.world.borrow_mut().get_mut(self.id) {
                e.visual.material.color = c;
            }
        }
    }

    pub fn visible(&mut self) -> bool {
        self.world
            .borrow()
            .get(self.id)
            .is_some_and(|e| e.visual.visible)
    }

    pub fn set_visible(&mut self, value: bool) {
        if let Some(e) = self.world.borrow_mut().get_mut(self.id) {
            e.visual.visible = value;
        }
    }

    pub fn label(&mut self) -> String {
        self.world
            .borrow()
            .get(self.id)
            .map(|e| e.label.clone())
            .unwrap_or_default()
    }

    pub fn exists(&mut self) -> bool {
        self.world.borrow().contains(self.id)
    }

    /// Push a dynamic body. False for entities without one.
    pub fn impulse(&mut self, x: Dynamic, y: Dynamic, z: Dynamic) -> bool {
        match (num(&x), num(&y), num(&z)) {
            (Some(x), Some(y), Some(z)) => self
                .world
                .borrow_mut()
                .apply_impulse(self.id, Vec3::new(x, y, z)),
            _ => false,
        }
    }

    /// Parent `child` under this entity.
    pub fn add(&mut self, child: EntityRef) -> bool {
        self.world.borrow_mut().set_parent(child.id, Some(self.id))
    }

    pub fn remove(&mut self) -> bool {
        self.world.borrow_mut().remove(self.id)
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.id)
    }
}

/// The `console` binding. Every call also surfaces as a notification
/// prefixed with the mod name.
#[derive(Clone)]
pub struct Console {
    pub mod_name: Rc<str>,
    pub notifier: Notifier,
}

impl Console {
    pub fn emit(&self, severity: Severity, message: impl std::fmt::Display) {
        self.notifier
            .push(format!("[{}] {message}", self.mod_name), severity);
    }
}

/// The `scene` binding: read access to the registry.
#[derive(Clone)]
pub struct SceneRef(pub Rc<RefCell<World>>);

/// The `physics` binding: gravity and body count.
#[derive(Clone)]
pub struct PhysicsRef(pub Rc<RefCell<World>>);

/// Register every handle type with its properties and methods.
pub fn register_handles(engine: &mut Engine) {
    engine
        .register_type_with_name::<Vec3>("Vec3")
        .register_fn("vec3", |x: Dynamic, y: Dynamic, z: Dynamic| {
            Vec3::new(num(&x).unwrap_or(0.0), num(&y).unwrap_or(0.0), num(&z).unwrap_or(0.0))
        })
        .register_get("x", |v: &mut Vec3| v.x as FLOAT)
        .register_set("x", |v: &mut Vec3, n: Dynamic| v.x = num(&n).unwrap_or(v.x))
        .register_get("y", |v: &mut Vec3| v.y as FLOAT)
        .register_set("y", |v: &mut Vec3, n: Dynamic| v.y = num(&n).unwrap_or(v.y))
        .register_get("z", |v: &mut Vec3| v.z as FLOAT)
        .register_set("z", |v: &mut Vec3, n: Dynamic| v.z = num(&n).unwrap_or(v.z))
        .register_fn("+", |a: Vec3, b: Vec3| a + b)
        .register_fn("-", |a: Vec3, b: Vec3| a - b)
        .register_fn("*", |a: Vec3, s: FLOAT| a * s as f32)
        .register_fn("*", |a: Vec3, s: INT| a * s as f32)
        .register_fn("length", |v: Vec3| v.length() as FLOAT)
        .register_fn("normalize", |v: Vec3| v.normalize_or_zero())
        .register_fn("distance", |a: Vec3, b: Vec3| a.distance(b) as FLOAT)
        .register_fn("to_string", |v: &mut Vec3| format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z))
        .register_fn("to_debug", |v: &mut Vec3| format!("{v:?}"));

    engine
        .register_type_with_name::<EntityRef>("Entity")
        .register_get("id", |e: &mut EntityRef| e.id.0 as INT)
        .register_get("label", EntityRef::label)
        .register_get("position", EntityRef::position)
        .register_set("position", EntityRef::set_position)
        .register_get("rotation", EntityRef::rotation)
        .register_set("rotation", EntityRef::set_rotation)
        .register_get("scale", EntityRef::scale)
        .register_set("scale", EntityRef::set_scale)
        .register_get("color", EntityRef::color)
        .register_set("color", EntityRef::set_color)
        .register_get_set("visible", EntityRef::visible, EntityRef::set_visible)
        .register_fn("set_position", |e: &mut EntityRef, x: Dynamic, y: Dynamic, z: Dynamic| {
            let p = Vec3::new(num(&x).unwrap_or(0.0), num(&y).unwrap_or(0.0), num(&z).unwrap_or(0.0));
            e.set_position(Dynamic::from(p));
        })
        .register_fn("rotate", EntityRef::rotate)
        .register_fn("impulse", EntityRef::impulse)
        .register_fn("add", EntityRef::add)
        .register_fn("remove", EntityRef::remove)
        .register_fn("exists", EntityRef::exists)
        .register_fn("to_string", |e: &mut EntityRef| e.id.to_string())
        .register_fn("to_debug", |e: &mut EntityRef| format!("{e:?}"));

    engine
        .register_type_with_name::<Console>("Console")
        .register_fn("log", |c: &mut Console, msg: Dynamic| c.emit(Severity::Info, msg))
        .register_fn("info", |c: &mut Console, msg: Dynamic| c.emit(Severity::Info, msg))
        .register_fn("warn", |c: &mut Console, msg: Dynamic| c.emit(Severity::Warning, msg))
        .register_fn("error", |c: &mut Console, msg: Dynamic| c.emit(Severity::Error, msg));

    engine
        .register_type_with_name::<SceneRef>("Scene")
        .register_get("entityCount", |s: &mut SceneRef| s.0.borrow().entity_count() as INT)
        .register_get("modEntityCount", |s: &mut SceneRef| {
            s.0.borrow().list_mod_owned().len() as INT
        })
        .register_get("ambientIntensity", |s: &mut SceneRef| {
            s.0.borrow().environment().ambient.intensity as FLOAT
        });

    engine
        .register_type_with_name::<PhysicsRef>("Physics")
        .register_get("gravity", |p: &mut PhysicsRef| p.0.borrow().gravity())
        .register_set("gravity", |p: &mut PhysicsRef, g: Dynamic| {
            if let Some(g) = to_vec3(&g) {
                p.0.borrow_mut().set_gravity(g);
            }
        })
        .register_get("bodyCount", |p: &mut PhysicsRef| {
            p.0.borrow().physics().body_count() as INT
        });
}
