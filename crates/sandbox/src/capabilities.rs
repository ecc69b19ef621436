//! The capability set: the only names a mod script can observe beyond the
//! Rhai core language.

use glam::Vec3;
use rand::Rng;
use rhai::{AST, Dynamic, Engine, EvalAltResult, FLOAT, FnPtr, INT, Map, Scope};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use worldspace_common::{ModId, Severity, TaskId, Transform, rgb_to_color};
use worldspace_kernel::{
    BodyDesc, ColliderShape, EntitySpec, Material, Shape, TaskError, TaskInbox, Visual, World,
    euler_to_quat,
};

use crate::handles::{Console, EntityRef, PhysicsRef, SceneRef};
use crate::props::{
    Common, CubeProps, CylinderProps, FactoryDefaults, GroupProps, LightProps, SphereProps, num,
    to_color, to_vec3,
};

/// Every binding a script can reach, variables first, then functions.
pub const BINDINGS: &[&str] = &[
    "console",
    "scene",
    "physics",
    "origin",
    "MOD_NAME",
    "MOD_ID",
    "addCube",
    "addSphere",
    "addCylinder",
    "addLight",
    "addGroup",
    "notify",
    "random",
    "time",
    "delta",
    "animate",
    "stopAnimation",
    "raycast",
    "createParticles",
    "vec3",
    "rgb",
    "lerp",
    "clamp",
    "print",
    "debug",
];

/// Default reach of `raycast` when no distance is given.
const DEFAULT_RAY_DISTANCE: f32 = 1000.0;

/// A compiled mod together with the engine that compiled it. Animation
/// callbacks keep this alive after the initial run returns.
pub(crate) struct Program {
    pub engine: Engine,
    pub ast: AST,
}

/// Per-execution state shared by every capability closure.
pub(crate) struct ModContext {
    pub world: Rc<RefCell<World>>,
    pub tasks: Rc<RefCell<TaskInbox>>,
    pub console: Console,
    pub mod_id: ModId,
    pub defaults: FactoryDefaults,
    /// Set once the script is compiled. Weak, since the engine owning this
    /// context is inside the program.
    pub program: RefCell<Weak<Program>>,
    pub spawned: Cell<usize>,
    pub animations: Cell<usize>,
}

impl ModContext {
    fn spawn(&self, kind: &str, label: Option<String>, visual: Visual, body: Option<BodyDesc>) -> EntityRef {
        let label = label.unwrap_or_else(|| format!("{}:{kind}", self.console.mod_name));
        let mut spec = EntitySpec::new(label, visual).owned_by(Some(self.mod_id));
        spec.body = body;
        let id = self.world.borrow_mut().spawn(spec);
        self.spawned.set(self.spawned.get() + 1);
        EntityRef::new(id, self.world.clone())
    }

    fn solid(&self, kind: &str, shape: Shape, collider: ColliderShape, common: Common) -> EntityRef {
        let transform = Transform {
            position: common.position,
            rotation: euler_to_quat(common.rotation),
            scale: Vec3::ONE,
        };
        let material = Material {
            color: common.color,
            opacity: common.opacity,
            emissive: 0.0,
        };
        let body = common.physics.then(|| {
            if common.mass > 0.0 {
                BodyDesc::dynamic(collider, common.mass)
            } else {
                BodyDesc::fixed(collider)
            }
        });
        self.spawn(kind, common.label, Visual::new(shape, transform, material), body)
    }

    fn add_cube(&self, props: &Map) -> Result<EntityRef, Box<EvalAltResult>> {
        let p = CubeProps::parse(props, &self.defaults).map_err(|e| factory_error("addCube", e))?;
        let collider = ColliderShape::Cuboid {
            half_extents: p.size * 0.5,
        };
        Ok(self.solid("cube", Shape::Box { size: p.size }, collider, p.common))
    }

    fn add_sphere(&self, props: &Map) -> Result<EntityRef, Box<EvalAltResult>> {
        let p = SphereProps::parse(props, &self.defaults).map_err(|e| factory_error("addSphere", e))?;
        let collider = ColliderShape::Ball { radius: p.radius };
        Ok(self.solid("sphere", Shape::Sphere { radius: p.radius }, collider, p.common))
    }

    fn add_cylinder(&self, props: &Map) -> Result<EntityRef, Box<EvalAltResult>> {
        let p = CylinderProps::parse(props, &self.defaults)
            .map_err(|e| factory_error("addCylinder", e))?;
        let collider = ColliderShape::Cylinder {
            half_height: p.height * 0.5,
            radius: p.radius_top.max(p.radius_bottom),
        };
        let shape = Shape::Cylinder {
            radius_top: p.radius_top,
            radius_bottom: p.radius_bottom,
            height: p.height,
        };
        Ok(self.solid("cylinder", shape, collider, p.common))
    }

    fn add_light(&self, props: &Map) -> Result<EntityRef, Box<EvalAltResult>> {
        let p = LightProps::parse(props, &self.defaults).map_err(|e| factory_error("addLight", e))?;
        let shape = Shape::Light {
            kind: p.kind,
            intensity: p.intensity,
            distance: p.distance,
        };
        let visual = Visual::new(shape, Transform::from_position(p.position), Material::colored(p.color));
        Ok(self.spawn("light", p.label, visual, None))
    }

    fn add_group(&self, props: &Map) -> Result<EntityRef, Box<EvalAltResult>> {
        let p = GroupProps::parse(props, &self.defaults).map_err(|e| factory_error("addGroup", e))?;
        let transform = Transform {
            position: p.position,
            rotation: euler_to_quat(p.rotation),
            scale: Vec3::ONE,
        };
        Ok(self.spawn("group", p.label, Visual::new(Shape::Group, transform, Material::default()), None))
    }

    fn animate(&self, callback: FnPtr) -> Result<INT, Box<EvalAltResult>> {
        let program = self
            .program
            .borrow()
            .upgrade()
            .ok_or("animate: mod program is gone")?;
        let console = self.console.clone();
        let id = self.tasks.borrow_mut().register(Box::new(move |elapsed| {
            callback
                .call::<Dynamic>(&program.engine, &program.ast, (elapsed as FLOAT,))
                .map(|_| ())
                .map_err(|err| {
                    console.emit(Severity::Warning, format!("animation stopped: {err}"));
                    TaskError::Failed(err.to_string())
                })
        }));
        self.animations.set(self.animations.get() + 1);
        Ok(id.0 as INT)
    }

    fn raycast(&self, origin: &Dynamic, direction: &Dynamic, max: f32) -> Result<Dynamic, Box<EvalAltResult>> {
        let origin = to_vec3(origin).ok_or("raycast: origin must be a vector")?;
        let direction = to_vec3(direction).ok_or("raycast: direction must be a vector")?;
        let hit = self.world.borrow().raycast(origin, direction, max);
        Ok(match hit {
            Some(hit) => {
                let mut map = Map::new();
                map.insert("entity".into(), Dynamic::from(EntityRef::new(hit.entity, self.world.clone())));
                map.insert("distance".into(), Dynamic::from(hit.distance as FLOAT));
                map.insert("point".into(), Dynamic::from(hit.point));
                Dynamic::from_map(map)
            }
            None => Dynamic::UNIT,
        })
    }

    fn create_particles(&self, count: INT, color: &Dynamic, position: &Dynamic) -> INT {
        let color = to_color(color).unwrap_or(self.defaults.color);
        let position = to_vec3(position).unwrap_or(self.defaults.origin);
        let count = usize::try_from(count).unwrap_or(0);
        self.world
            .borrow_mut()
            .effects_mut()
            .spawn_particles(count, color, position) as INT
    }
}

fn factory_error(factory: &str, reason: String) -> Box<EvalAltResult> {
    format!("{factory}: {reason}").into()
}

fn severity_from(kind: &str) -> Severity {
    match kind {
        "success" => Severity::Success,
        "warning" | "warn" => Severity::Warning,
        "error" => Severity::Error,
        _ => Severity::Info,
    }
}

fn random_between(min: f32, max: f32) -> FLOAT {
    if min < max {
        rand::rng().random_range(min..max) as FLOAT
    } else {
        min as FLOAT
    }
}

/// Register every function binding, each closing over `ctx`.
pub(crate) fn register_capabilities(engine: &mut Engine, ctx: &Rc<ModContext>) {
    macro_rules! factory {
        ($name:literal, $method:ident) => {{
            let c = ctx.clone();
            engine.register_fn($name, move |props: Map| c.$method(&props));
            let c = ctx.clone();
            engine.register_fn($name, move || c.$method(&Map::new()));
        }};
    }
    factory!("addCube", add_cube);
    factory!("addSphere", add_sphere);
    factory!("addCylinder", add_cylinder);
    factory!("addLight", add_light);
    factory!("addGroup", add_group);

    let notifier = ctx.console.notifier.clone();
    engine.register_fn("notify", move |msg: Dynamic| {
        notifier.push(msg.to_string(), Severity::Info);
    });
    let notifier = ctx.console.notifier.clone();
    engine.register_fn("notify", move |msg: Dynamic, kind: &str| {
        notifier.push(msg.to_string(), severity_from(kind));
    });

    engine.register_fn("random", || random_between(0.0, 1.0));
    engine.register_fn("random", |min: Dynamic, max: Dynamic| {
        random_between(num(&min).unwrap_or(0.0), num(&max).unwrap_or(1.0))
    });

    let c = ctx.clone();
    engine.register_fn("time", move || c.world.borrow().clock().elapsed as FLOAT);
    let c = ctx.clone();
    engine.register_fn("delta", move || c.world.borrow().clock().delta as FLOAT);

    let c = ctx.clone();
    engine.register_fn("animate", move |callback: FnPtr| c.animate(callback));
    let c = ctx.clone();
    engine.register_fn("stopAnimation", move |id: INT| {
        u64::try_from(id).is_ok_and(|id| c.tasks.borrow_mut().stop(TaskId(id)))
    });

    let c = ctx.clone();
    engine.register_fn("raycast", move |origin: Dynamic, direction: Dynamic| {
        c.raycast(&origin, &direction, DEFAULT_RAY_DISTANCE)
    });
    let c = ctx.clone();
    engine.register_fn("raycast", move |origin: Dynamic, direction: Dynamic, max: Dynamic| {
        c.raycast(&origin, &direction, num(&max).unwrap_or(DEFAULT_RAY_DISTANCE))
    });

    let c = ctx.clone();
    engine.register_fn("createParticles", move |count: INT| {
        c.create_particles(count, &Dynamic::UNIT, &Dynamic::UNIT)
    });
    let c = ctx.clone();
    engine.register_fn("createParticles", move |count: INT, color: Dynamic| {
        c.create_particles(count, &color, &Dynamic::UNIT)
    });
    let c = ctx.clone();
    engine.register_fn("createParticles", move |count: INT, color: Dynamic, position: Dynamic| {
        c.create_particles(count, &color, &position)
    });

    engine.register_fn("rgb", |r: Dynamic, g: Dynamic, b: Dynamic| {
        let channel = |v: &Dynamic| num(v).unwrap_or(0.0);
        rgb_to_color([channel(&r), channel(&g), channel(&b)]) as INT
    });
    engine.register_fn("lerp", |a: FLOAT, b: FLOAT, t: FLOAT| a + (b - a) * t);
    engine.register_fn("clamp", |v: FLOAT, lo: FLOAT, hi: FLOAT| v.max(lo).min(hi));
}

/// Variable bindings for one execution.
pub(crate) fn build_scope(ctx: &ModContext) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push("console", ctx.console.clone());
    scope.push("scene", SceneRef(ctx.world.clone()));
    scope.push("physics", PhysicsRef(ctx.world.clone()));
    scope.push("origin", ctx.defaults.origin);
    scope.push_constant("MOD_NAME", ctx.console.mod_name.to_string());
    scope.push_constant("MOD_ID", ctx.mod_id.0.to_string());
    scope
}
