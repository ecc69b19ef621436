use glam::Vec3;
use rhai::Engine;
use rhai::module_resolvers::DummyModuleResolver;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use worldspace_common::{Mod, ModId, Severity};
use worldspace_kernel::{Notifier, TaskInbox, World};

use crate::capabilities::{BINDINGS, ModContext, Program, build_scope, register_capabilities};
use crate::handles::{Console, register_handles};
use crate::props::FactoryDefaults;

/// Height of the default marker above a mod's target position.
const MARKER_LIFT: f32 = 1.5;
const MARKER_COLOR: u32 = 0x66ccff;
const DEFAULT_ENTITY_COLOR: u32 = 0x44aa88;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("mod `{name}` failed to compile: {message}")]
    Compile { name: String, message: String },
    #[error("mod `{name}` failed: {message}")]
    Execution { name: String, message: String },
}

/// Resource limits applied to every script run, including each animation
/// callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Zero means unlimited.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 500_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 10_000,
            max_map_size: 1_000,
        }
    }
}

/// What one successful execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub mod_id: ModId,
    pub entities_created: usize,
    pub animations: usize,
    pub marker: bool,
}

/// Every binding a mod script can observe.
pub fn binding_names() -> &'static [&'static str] {
    BINDINGS
}

/// Runs mod scripts against a shared world.
pub struct Sandbox {
    world: Rc<RefCell<World>>,
    tasks: Rc<RefCell<TaskInbox>>,
    notifier: Notifier,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(
        world: Rc<RefCell<World>>,
        tasks: Rc<RefCell<TaskInbox>>,
        notifier: Notifier,
        limits: SandboxLimits,
    ) -> Self {
        Self {
            world,
            tasks,
            notifier,
            limits,
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Execute `source` on behalf of `m`, with entities defaulting to
    /// `target`. Synchronous; animation callbacks it registers run on later
    /// ticks.
    pub fn execute(&self, m: &Mod, source: &str, target: Vec3) -> Result<ExecutionReport, SandboxError> {
        let _span = tracing::info_span!("mod", name = %m.name, id = %m.id).entered();
        let ctx = Rc::new(ModContext {
            world: self.world.clone(),
            tasks: self.tasks.clone(),
            console: Console {
                mod_name: Rc::from(m.name.as_str()),
                notifier: self.notifier.clone(),
            },
            mod_id: m.id,
            defaults: FactoryDefaults {
                origin: target,
                color: m.metadata.color.unwrap_or(DEFAULT_ENTITY_COLOR),
                mass: m.metadata.mass.unwrap_or(1.0),
                scale: m.metadata.scale.filter(|s| *s > 0.0).unwrap_or(1.0),
            },
            program: RefCell::new(Weak::new()),
            spawned: Cell::new(0),
            animations: Cell::new(0),
        });

        let engine = self.build_engine(&ctx);
        let ast = match engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                return Err(self.fail(SandboxError::Compile {
                    name: m.name.clone(),
                    message: err.to_string(),
                }));
            }
        };
        let program = Rc::new(Program { engine, ast });
        *ctx.program.borrow_mut() = Rc::downgrade(&program);

        let mut scope = build_scope(&ctx);
        if let Err(err) = program.engine.run_ast_with_scope(&mut scope, &program.ast) {
            return Err(self.fail(SandboxError::Execution {
                name: m.name.clone(),
                message: err.to_string(),
            }));
        }

        let marker = !m.metadata.suppress_visual;
        if marker {
            let color = m.metadata.color.unwrap_or(MARKER_COLOR);
            self.world
                .borrow_mut()
                .effects_mut()
                .set_marker(m.id, target + Vec3::Y * MARKER_LIFT, color);
        }
        let report = ExecutionReport {
            mod_id: m.id,
            entities_created: ctx.spawned.get(),
            animations: ctx.animations.get(),
            marker,
        };
        tracing::info!(
            entities = report.entities_created,
            animations = report.animations,
            "mod executed"
        );
        self.notifier.success(format!("Mod \"{}\" executed", m.name));
        Ok(report)
    }

    fn fail(&self, err: SandboxError) -> SandboxError {
        tracing::warn!(error = %err, "mod execution failed");
        self.notifier.error(err.to_string());
        err
    }

    fn build_engine(&self, ctx: &Rc<ModContext>) -> Engine {
        let mut engine = Engine::new();
        engine
            .set_module_resolver(DummyModuleResolver::new())
            .disable_symbol("eval")
            .set_max_operations(self.limits.max_operations)
            .set_max_call_levels(self.limits.max_call_levels)
            .set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth)
            .set_max_string_size(self.limits.max_string_size)
            .set_max_array_size(self.limits.max_array_size)
            .set_max_map_size(self.limits.max_map_size);

        let console = ctx.console.clone();
        engine.on_print(move |s| console.emit(Severity::Info, s));
        let console = ctx.console.clone();
        engine.on_debug(move |s, _, _| console.emit(Severity::Info, s));

        register_handles(&mut engine);
        register_capabilities(&mut engine, ctx);
        engine
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldspace_common::{ModMetadata, Notification};
    use worldspace_kernel::{AnimationTaskRegistry, BodyKind, Shape, TaskIdSource};

    struct Harness {
        world: Rc<RefCell<World>>,
        inbox: Rc<RefCell<TaskInbox>>,
        registry: AnimationTaskRegistry,
        notifier: Notifier,
        sandbox: Sandbox,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_limits(SandboxLimits::default())
        }

        fn with_limits(limits: SandboxLimits) -> Self {
            let world = Rc::new(RefCell::new(World::default()));
            let ids = TaskIdSource::default();
            let inbox = Rc::new(RefCell::new(TaskInbox::new(ids.clone())));
            let notifier = Notifier::new();
            let sandbox = Sandbox::new(world.clone(), inbox.clone(), notifier.clone(), limits);
            Self {
                world,
                inbox,
                registry: AnimationTaskRegistry::with_ids(ids),
                notifier,
                sandbox,
            }
        }

        fn run(&self, source: &str) -> (Mod, Result<ExecutionReport, SandboxError>) {
            let m = Mod::script("test-mod", source);
            let result = self.sandbox.execute(&m, source, Vec3::new(0.0, 3.0, 0.0));
            (m, result)
        }

        /// One animation pass, the way the loop drives it.
        fn tick(&mut self, elapsed: f64) {
            self.registry.absorb(&mut self.inbox.borrow_mut());
            self.registry.run_all(elapsed);
            self.registry.absorb(&mut self.inbox.borrow_mut());
        }

        fn messages(&self) -> Vec<Notification> {
            self.notifier.drain()
        }
    }

    #[test]
    fn add_cube_spawns_one_owned_entity() {
        let h = Harness::new();
        let (m, result) = h.run("addCube(#{ color: 0xff0000 });");
        let report = result.unwrap();

        assert_eq!(report.entities_created, 1);
        let world = h.world.borrow();
        let owned = world.owned_by(m.id);
        assert_eq!(owned.len(), 1);
        let cube = world.get(owned[0]).unwrap();
        assert_eq!(cube.visual.material.color, 0xff0000);
        assert_eq!(cube.visual.transform.position, Vec3::new(0.0, 3.0, 0.0));
        let body = cube.body.unwrap();
        assert_eq!(world.physics().body_kind(body), Some(BodyKind::Dynamic));

        let notes = h.messages();
        assert!(notes.iter().any(|n| n.severity == Severity::Success && n.message.contains("executed")));
    }

    #[test]
    fn marker_follows_suppress_flag() {
        let h = Harness::new();
        let (m, _) = h.run("");
        assert!(h.world.borrow().effects().markers().contains_key(&m.id));

        let quiet = Mod::script("quiet", "").with_metadata(ModMetadata {
            suppress_visual: true,
            ..ModMetadata::default()
        });
        let report = h.sandbox.execute(&quiet, "", Vec3::ZERO).unwrap();
        assert!(!report.marker);
        assert!(!h.world.borrow().effects().markers().contains_key(&quiet.id));
        assert_eq!(h.world.borrow().entity_count(), 0);
    }

    #[test]
    fn failure_keeps_partial_entities_and_notifies() {
        let h = Harness::new();
        let (m, result) = h.run("addCube(); throw \"boom\"; addCube();");

        let err = result.unwrap_err();
        assert!(matches!(err, SandboxError::Execution { .. }));
        assert!(err.to_string().contains("boom"));
        assert_eq!(h.world.borrow().owned_by(m.id).len(), 1);
        assert!(h.world.borrow().effects().markers().is_empty());

        let notes = h.messages();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(notes[0].message.contains("test-mod"));
    }

    #[test]
    fn compile_error_creates_nothing() {
        let h = Harness::new();
        let (_, result) = h.run("addCube(;");
        assert!(matches!(result, Err(SandboxError::Compile { .. })));
        assert_eq!(h.world.borrow().entity_count(), 0);
        assert_eq!(h.messages()[0].severity, Severity::Error);
    }

    #[test]
    fn bad_factory_props_fail_the_mod() {
        let h = Harness::new();
        let (_, result) = h.run("addSphere(#{ radius: \"big\" });");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("addSphere"));
    }

    #[test]
    fn console_routes_to_notifications() {
        let h = Harness::new();
        h.run("console.log(\"hello\"); console.warn(42); print(\"printed\");")
            .1
            .unwrap();
        let notes = h.messages();
        assert!(notes.iter().any(|n| n.message == "[test-mod] hello" && n.severity == Severity::Info));
        assert!(notes.iter().any(|n| n.message == "[test-mod] 42" && n.severity == Severity::Warning));
        assert!(notes.iter().any(|n| n.message == "[test-mod] printed"));
    }

    #[test]
    fn notify_uses_requested_severity() {
        let h = Harness::new();
        h.run("notify(\"careful\", \"warning\"); notify(\"plain\");").1.unwrap();
        let notes = h.messages();
        assert_eq!(notes[0], Notification::new("careful", Severity::Warning));
        assert_eq!(notes[1], Notification::new("plain", Severity::Info));
    }

    #[test]
    fn animation_moves_entity_each_tick() {
        let mut h = Harness::new();
        let (m, result) = h.run(
            r#"
            let cube = addCube(#{ physics: false });
            animate(|t| { cube.position.x = t; });
            "#,
        );
        assert_eq!(result.unwrap().animations, 1);
        let id = h.world.borrow().owned_by(m.id)[0];

        h.tick(2.5);
        let x = h.world.borrow().get(id).unwrap().visual.transform.position.x;
        assert_eq!(x, 2.5);
        assert_eq!(h.registry.active_count(), 1);
    }

    #[test]
    fn throwing_callback_is_deactivated_siblings_continue() {
        let mut h = Harness::new();
        h.run(
            r#"
            let n = 0;
            animate(|t| { n += 1; if n == 3 { throw "third"; } });
            let counter = addGroup();
            animate(|t| { counter.position.y = t; });
            "#,
        )
        .1
        .unwrap();

        for frame in 1..=6 {
            h.tick(frame as f64);
        }
        let ids = h.registry.ids();
        assert_eq!(h.registry.is_active(ids[0]), Some(false));
        assert_eq!(h.registry.get(ids[0]).unwrap().invocations(), 3);
        assert_eq!(h.registry.is_active(ids[1]), Some(true));
        assert_eq!(h.registry.get(ids[1]).unwrap().invocations(), 6);
        assert!(h.messages().iter().any(|n| n.message.contains("animation stopped")));
    }

    #[test]
    fn stop_animation_from_script() {
        let mut h = Harness::new();
        h.run("let id = animate(|t| {}); stopAnimation(id);").1.unwrap();
        h.tick(0.0);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn runaway_loop_hits_operation_budget() {
        let h = Harness::with_limits(SandboxLimits {
            max_operations: 10_000,
            ..SandboxLimits::default()
        });
        let (_, result) = h.run("loop { }");
        assert!(matches!(result, Err(SandboxError::Execution { .. })));
    }

    #[test]
    fn eval_and_imports_are_unavailable() {
        let h = Harness::new();
        assert!(h.run("eval(\"addCube()\");").1.is_err());
        assert!(h.run("import \"std\" as s;").1.is_err());
        assert_eq!(h.world.borrow().entity_count(), 0);
    }

    #[test]
    fn raycast_finds_spawned_entity() {
        let h = Harness::new();
        h.run(
            r#"
            addCube(#{ label: "target", physics: false });
            let hit = raycast(vec3(0, 10, 0), vec3(0, -1, 0), 100.0);
            notify(hit.entity.label);
            notify(hit.distance);
            if type_of(raycast(vec3(50, 10, 0), vec3(0, -1, 0))) != "()" { throw "phantom hit"; }
            "#,
        )
        .1
        .unwrap();
        let notes = h.messages();
        assert_eq!(notes[0].message, "target");
        assert_eq!(notes[1].message, "6.5");
    }

    #[test]
    fn raycast_follows_sphere_surface() {
        let h = Harness::new();
        h.run(
            r#"
            addSphere(#{ radius: 1.0, physics: false, position: vec3(0, 0, 0) });
            notify(type_of(raycast(vec3(-10, 0.9, 0.9), vec3(1, 0, 0), 100.0)));
            notify(type_of(raycast(vec3(-10, 0.5, 0.5), vec3(1, 0, 0), 100.0)));
            "#,
        )
        .1
        .unwrap();
        let notes = h.messages();
        assert_eq!(notes[0].message, "()");
        assert_eq!(notes[1].message, "map");
    }

    #[test]
    fn overflowing_vectors_leave_body_and_gravity_alone() {
        let h = Harness::new();
        let (m, result) = h.run(
            r#"
            let c = addCube(#{ position: vec3(1, 2, 3) });
            c.position = vec3(1, 0, 0) * 1e300;
            physics.gravity = vec3(0, -1, 0) * 1e300;
            "#,
        );
        result.unwrap();
        let world = h.world.borrow();
        let e = world.get(world.owned_by(m.id)[0]).unwrap();
        assert_eq!(e.visual.transform.position, Vec3::new(1.0, 2.0, 3.0));
        let (pos, _) = world.physics().body_pose(e.body.unwrap()).unwrap();
        assert_eq!(pos, Vec3::new(1.0, 2.0, 3.0));
        assert!(world.gravity().is_finite());
    }

    #[test]
    fn particles_are_not_entities() {
        let h = Harness::new();
        h.run("let n = createParticles(30, \"#ffffff\", vec3(0, 1, 0)); if n != 30 { throw n; }")
            .1
            .unwrap();
        let world = h.world.borrow();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.effects().particle_count(), 30);
    }

    #[test]
    fn handle_writes_reach_world_and_body() {
        let h = Harness::new();
        let (m, _) = h.run(
            r##"
            let g = addGroup(#{ label: "rig" });
            let c = addCube(#{ mass: 0 });
            g.add(c);
            c.position = vec3(4, 5, 6);
            c.color = "#123456";
            c.visible = false;
            c.scale = 2;
            "##,
        );
        let world = h.world.borrow();
        let owned = world.owned_by(m.id);
        let (group, cube) = (owned[0], owned[1]);
        let e = world.get(cube).unwrap();
        assert_eq!(e.visual.parent, Some(group));
        assert_eq!(e.visual.transform.position, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(e.visual.transform.scale, Vec3::splat(2.0));
        assert_eq!(e.visual.material.color, 0x123456);
        assert!(!e.visual.visible);
        let (pos, _) = world.physics().body_pose(e.body.unwrap()).unwrap();
        assert_eq!(pos, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(world.physics().body_kind(e.body.unwrap()), Some(BodyKind::Fixed));
    }

    #[test]
    fn every_factory_and_helper_is_callable() {
        let h = Harness::new();
        let (m, result) = h.run(
            r#"
            addCube(); addSphere(#{ radius: 0.3 }); addCylinder(#{ height: 2 });
            addLight(#{ type: "directional", intensity: 2 }); addGroup();
            let r = random(1, 2);
            if r < 1.0 || r >= 2.0 { throw "random out of range"; }
            let c = rgb(1.0, 0.0, 0.0);
            if c != 0xff0000 { throw "rgb"; }
            if lerp(0.0, 10.0, 0.5) != 5.0 { throw "lerp"; }
            if clamp(5.0, 0.0, 1.0) != 1.0 { throw "clamp"; }
            let t = time() + delta();
            debug(MOD_NAME);
            print(MOD_ID);
            print(origin);
            if scene.entityCount != 5 { throw "scene"; }
            physics.gravity = vec3(0, -1, 0);
            "#,
        );
        let report = result.unwrap();
        assert_eq!(report.entities_created, 5);
        let world = h.world.borrow();
        assert_eq!(world.gravity(), Vec3::new(0.0, -1.0, 0.0));
        let shapes: Vec<_> = world
            .owned_by(m.id)
            .into_iter()
            .map(|id| world.get(id).unwrap().visual.shape.name())
            .collect();
        assert_eq!(shapes, ["box", "sphere", "cylinder", "light", "group"]);
        let light = world.get(world.owned_by(m.id)[3]).unwrap();
        assert!(light.body.is_none());
        assert!(matches!(light.visual.shape, Shape::Light { intensity, .. } if intensity == 2.0));
    }

    #[test]
    fn binding_list_is_enumerable() {
        let names = binding_names();
        for expected in ["addCube", "animate", "stopAnimation", "raycast", "createParticles", "console"] {
            assert!(names.contains(&expected), "{expected} missing");
        }
    }
}
