use glam::Vec3;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use worldspace_assets::AssetCache;
use worldspace_common::{EntityId, ModId, Notification, Transform};
use worldspace_kernel::{
    AnimationTaskRegistry, BodyDesc, ColliderShape, EntitySpec, FrameClock, Material, Notifier,
    Shape, TaskIdSource, TaskInbox, Visual, World,
};
use worldspace_quality::{FrameTimer, QualityController, QualityTier, TierChange};
use worldspace_sandbox::Sandbox;

use crate::RuntimeError;
use crate::config::RuntimeConfig;
use crate::host::{Host, HostError};
use crate::ingest::{IngestError, LoadTicket, ModRecord, PendingLoad};
use crate::summary::RuntimeSummary;

const GROUND_SIZE: Vec3 = Vec3::new(40.0, 1.0, 40.0);
const GROUND_COLOR: u32 = 0x3a5f3a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    User,
    /// Waiting for [`WorldRuntime::context_restored`].
    ContextLost,
}

/// Lifecycle of the loop: `Uninitialized -> Initializing -> Running <-> Paused`,
/// with `TornDown` terminal. `Failed` is reached when initialization retries
/// run out and is left through [`WorldRuntime::retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Initializing,
    Running,
    Paused(PauseReason),
    Failed(String),
    TornDown,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Uninitialized => f.write_str("uninitialized"),
            LoopState::Initializing => f.write_str("initializing"),
            LoopState::Running => f.write_str("running"),
            LoopState::Paused(PauseReason::User) => f.write_str("paused"),
            LoopState::Paused(PauseReason::ContextLost) => f.write_str("paused (context lost)"),
            LoopState::Failed(reason) => write!(f, "failed: {reason}"),
            LoopState::TornDown => f.write_str("torn down"),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Clamped delta, in seconds.
    pub delta: f64,
    pub elapsed: f64,
    pub synced: usize,
    pub tasks_run: usize,
    pub task_failures: usize,
    pub loads_finished: usize,
    pub tier_change: Option<TierChange>,
}

/// One mounted world: the registries, the sandbox, the quality controller and
/// the loop that drives them, all owned here and handed to each other by
/// reference.
pub struct WorldRuntime<H: Host> {
    pub(crate) host: H,
    pub(crate) config: RuntimeConfig,
    pub(crate) world: Rc<RefCell<World>>,
    pub(crate) tasks: AnimationTaskRegistry,
    pub(crate) inbox: Rc<RefCell<TaskInbox>>,
    pub(crate) sandbox: Sandbox,
    pub(crate) notifier: Notifier,
    pub(crate) assets: AssetCache,
    pub(crate) mods: BTreeMap<ModId, ModRecord>,
    pub(crate) pending: Vec<PendingLoad>,
    pub(crate) finished: BTreeMap<LoadTicket, Result<EntityId, IngestError>>,
    pub(crate) next_ticket: u64,
    quality: QualityController,
    frame_times: FrameTimer,
    state: LoopState,
    initializing: bool,
    attempts: u32,
    last_frame_at: Option<Duration>,
    elapsed: f64,
    frame: u64,
    ground: Option<EntityId>,
}

impl<H: Host> WorldRuntime<H> {
    pub fn new(host: H, config: RuntimeConfig) -> Self {
        let world = Rc::new(RefCell::new(World::new(config.physics)));
        let ids = TaskIdSource::default();
        let inbox = Rc::new(RefCell::new(TaskInbox::new(ids.clone())));
        let notifier = Notifier::new();
        let sandbox = Sandbox::new(world.clone(), inbox.clone(), notifier.clone(), config.sandbox);
        Self {
            host,
            quality: QualityController::new(config.quality),
            frame_times: FrameTimer::new(config.frame_history.max(1)),
            config,
            world,
            tasks: AnimationTaskRegistry::with_ids(ids),
            inbox,
            sandbox,
            notifier,
            assets: AssetCache::new(),
            mods: BTreeMap::new(),
            pending: Vec::new(),
            finished: BTreeMap::new(),
            next_ticket: 0,
            state: LoopState::Uninitialized,
            initializing: false,
            attempts: 0,
            last_frame_at: None,
            elapsed: 0.0,
            frame: 0,
            ground: None,
        }
    }

    /// Start the loop. A call made while an attempt sequence is already in
    /// flight, or once the loop is running, is a no-op.
    pub fn initialize(&mut self) -> Result<(), RuntimeError> {
        match self.state {
            LoopState::TornDown => return Err(RuntimeError::TornDown),
            LoopState::Running | LoopState::Paused(PauseReason::User) => return Ok(()),
            _ => {}
        }
        if self.initializing {
            tracing::debug!("initialize called while already initializing; ignored");
            return Ok(());
        }
        self.initializing = true;
        self.attempts = 0;
        self.state = LoopState::Initializing;
        tracing::info!("initializing world runtime");
        self.attempt()
    }

    /// Continue an attempt sequence after the delay passed to
    /// [`Host::schedule_retry`]. Stale retries are ignored.
    pub fn on_retry(&mut self) -> Result<(), RuntimeError> {
        if !self.initializing {
            return Ok(());
        }
        self.attempt()
    }

    /// Manual retry once automatic retries ran out.
    pub fn retry(&mut self) -> Result<(), RuntimeError> {
        if matches!(self.state, LoopState::Failed(_)) {
            self.state = LoopState::Uninitialized;
        }
        self.initialize()
    }

    fn attempt(&mut self) -> Result<(), RuntimeError> {
        self.attempts += 1;
        match self.try_setup() {
            Ok(()) => {
                self.start();
                Ok(())
            }
            Err(err) if self.attempts < self.config.retry.max_attempts => {
                let delay = self.config.retry.backoff(self.attempts);
                tracing::warn!(attempt = self.attempts, ?delay, error = %err, "initialization attempt failed; retrying");
                self.host.schedule_retry(delay);
                Ok(())
            }
            Err(err) => {
                self.initializing = false;
                tracing::error!(attempts = self.attempts, error = %err, "initialization failed");
                self.notifier
                    .error(format!("World failed to start: {err}. Retry to try again."));
                self.state = LoopState::Failed(err.to_string());
                Err(RuntimeError::InitFailed {
                    attempts: self.attempts,
                    source: err,
                })
            }
        }
    }

    fn try_setup(&mut self) -> Result<(), HostError> {
        let (width, height) = self.host.dimensions();
        if width == 0 || height == 0 {
            return Err(HostError::NotReady { width, height });
        }
        self.host.setup()
    }

    fn start(&mut self) {
        self.initializing = false;
        self.quality.reset();
        self.frame_times.clear();
        let tier = self.quality.tier();
        self.host.apply_quality(tier);
        self.world
            .borrow_mut()
            .effects_mut()
            .set_density(tier.settings().particle_density);
        if self.config.ground && self.ground.is_none() {
            self.ground = Some(self.spawn_ground());
        }
        self.last_frame_at = None;
        self.state = LoopState::Running;
        tracing::info!(attempts = self.attempts, "world runtime running");
        self.host.request_frame();
    }

    fn spawn_ground(&mut self) -> EntityId {
        let visual = Visual::new(
            Shape::Box { size: GROUND_SIZE },
            Transform::from_position(Vec3::new(0.0, -GROUND_SIZE.y * 0.5, 0.0)),
            Material::colored(GROUND_COLOR),
        );
        let spec = EntitySpec::new("ground", visual).with_body(BodyDesc::fixed(ColliderShape::Cuboid {
            half_extents: GROUND_SIZE * 0.5,
        }));
        self.world.borrow_mut().spawn(spec)
    }

    /// One tick. `now` is the host's monotonic frame timestamp. Returns
    /// `None` without doing anything unless the loop is running.
    pub fn on_frame(&mut self, now: Duration) -> Option<FrameReport> {
        if self.state != LoopState::Running {
            return None;
        }
        self.frame += 1;
        let _span = tracing::info_span!("tick", frame = self.frame).entered();

        let loads_finished = self.poll_loads();

        let raw = self
            .last_frame_at
            .map_or(Duration::ZERO, |last| now.saturating_sub(last));
        self.last_frame_at = Some(now);
        let delta = raw.as_secs_f64().min(self.config.max_delta);
        self.elapsed += delta;
        self.frame_times.record(raw);
        self.world.borrow_mut().set_clock(FrameClock {
            elapsed: self.elapsed,
            delta,
            frame: self.frame,
        });

        let tier_change = self.quality.record_frame(now);
        if let Some(change) = tier_change {
            self.apply_tier_change(change);
        }

        let synced = {
            let mut world = self.world.borrow_mut();
            world.step_physics();
            let synced = world.sync_visuals();
            world.update_effects(delta as f32);
            synced
        };

        // Work queued by ingestion since the last tick runs now; work queued
        // by the callbacks themselves waits for the next tick.
        self.tasks.absorb(&mut self.inbox.borrow_mut());
        let run = self.tasks.run_all(self.elapsed);
        self.tasks.absorb(&mut self.inbox.borrow_mut());

        self.host.render(&self.world.borrow());
        self.host.request_frame();

        let events = self.world.borrow_mut().drain_events();
        for event in events {
            tracing::debug!(?event, "world event");
        }

        Some(FrameReport {
            frame: self.frame,
            delta,
            elapsed: self.elapsed,
            synced,
            tasks_run: run.invoked,
            task_failures: run.failed.len(),
            loads_finished,
            tier_change,
        })
    }

    fn apply_tier_change(&mut self, change: TierChange) {
        self.host.apply_quality(change.to);
        self.world
            .borrow_mut()
            .effects_mut()
            .set_density(change.to.settings().particle_density);
        tracing::info!(from = %change.from, to = %change.to, fps = change.fps, "quality tier lowered");
        self.notifier
            .info(format!("Quality lowered to {} ({:.0} fps)", change.to, change.fps));
    }

    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.host.cancel_frame();
        self.state = LoopState::Paused(PauseReason::User);
        tracing::info!("world paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != LoopState::Paused(PauseReason::User) {
            return false;
        }
        self.last_frame_at = None;
        self.quality.restart_window();
        self.state = LoopState::Running;
        tracing::info!("world resumed");
        self.host.request_frame();
        true
    }

    /// The host lost its rendering context. Ticking stops at once.
    pub fn context_lost(&mut self) {
        if !matches!(
            self.state,
            LoopState::Running | LoopState::Paused(PauseReason::User) | LoopState::Initializing
        ) {
            return;
        }
        self.host.cancel_frame();
        self.initializing = false;
        self.state = LoopState::Paused(PauseReason::ContextLost);
        tracing::error!("rendering context lost; loop paused");
        self.notifier
            .warning("Rendering context lost. The world is paused until it is restored.");
    }

    /// The host got its context back. Runs a full initialization, which
    /// also puts quality back to high.
    pub fn context_restored(&mut self) -> Result<(), RuntimeError> {
        if self.state != LoopState::Paused(PauseReason::ContextLost) {
            return Ok(());
        }
        tracing::info!("rendering context restored");
        self.notifier.info("Rendering context restored");
        self.state = LoopState::Uninitialized;
        self.initialize()
    }

    /// Stop for good. Releases host resources and empties both registries.
    pub fn teardown(&mut self) {
        if self.state == LoopState::TornDown {
            return;
        }
        self.host.cancel_frame();
        self.host.release();
        let tasks = self.tasks.clear();
        self.inbox.borrow_mut().clear();
        self.world.borrow_mut().clear_all();
        self.pending.clear();
        self.initializing = false;
        self.ground = None;
        self.state = LoopState::TornDown;
        tracing::info!(tasks, "world runtime torn down");
    }

    /// Remove every mod-owned entity and every animation task, and cancel
    /// loads still in flight. Environment entities survive. Returns how many
    /// entities were removed.
    pub fn clear_world(&mut self) -> usize {
        let removed = self.world.borrow_mut().clear_mod_owned();
        let tasks = self.tasks.clear();
        self.inbox.borrow_mut().clear();
        let loads = self.cancel_loads();
        tracing::info!(removed, tasks, loads, "world cleared");
        self.notifier
            .success(format!("World cleared: {removed} objects removed"));
        removed
    }

    pub fn summary(&self) -> RuntimeSummary {
        let world = self.world.borrow();
        let active = self.tasks.active_count();
        RuntimeSummary {
            state: self.state.clone(),
            frame: self.frame,
            elapsed: self.elapsed,
            entities: world.entity_count(),
            mod_owned: world.list_mod_owned().len(),
            bodies: world.physics().body_count(),
            tasks_active: active,
            tasks_inactive: self.tasks.len() - active,
            particles: world.effects().particle_count(),
            markers: world.effects().markers().len(),
            tier: self.quality.tier(),
            fps: self.quality.fps(),
            avg_frame: self.frame_times.average(),
            max_frame: self.frame_times.max(),
            pending_loads: self.pending.len(),
            mods_loaded: self.mods.values().filter(|m| m.status.is_loaded()).count(),
            mods_failed: self.mods.values().filter(|m| m.status.is_failed()).count(),
            cache_hits: self.assets.hits(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn tier(&self) -> QualityTier {
        self.quality.tier()
    }

    /// Attempts made by the current (or last) initialization sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn world(&self) -> Ref<'_, World> {
        self.world.borrow()
    }

    /// Shared handle to the world, for collaborators that outlive a borrow.
    pub fn world_handle(&self) -> Rc<RefCell<World>> {
        self.world.clone()
    }

    pub fn tasks(&self) -> &AnimationTaskRegistry {
        &self.tasks
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifier.drain()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The environment's ground slab, once initialized.
    pub fn ground(&self) -> Option<EntityId> {
        self.ground
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl<H: Host> std::fmt::Debug for WorldRuntime<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldRuntime")
            .field("state", &self.state)
            .field("frame", &self.frame)
            .field("tier", &self.quality.tier())
            .field("tasks", &self.tasks.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;
    use worldspace_common::{Mod, ModKind, ModPayload, Severity};

    fn runtime() -> WorldRuntime<HeadlessHost> {
        WorldRuntime::new(HeadlessHost::default(), RuntimeConfig::default())
    }

    fn running() -> WorldRuntime<HeadlessHost> {
        let mut rt = runtime();
        rt.initialize().unwrap();
        rt
    }

    fn at(frame: u32, fps: u32) -> Duration {
        Duration::from_secs_f64(frame as f64 / fps as f64)
    }

    fn generic(name: &str) -> Mod {
        Mod::new(name, ModKind::Generic, ModPayload::Text(String::new()))
    }

    #[test]
    fn initialize_starts_loop_with_ground() {
        let rt = running();
        assert!(rt.is_running());
        assert!(rt.host().frame_requested);
        assert_eq!(rt.tier(), QualityTier::High);
        let ground = rt.ground().unwrap();
        let world = rt.world();
        assert_eq!(world.list_all(), vec![ground]);
        assert!(world.list_mod_owned().is_empty());
    }

    #[test]
    fn zero_sized_surface_retries_with_backoff_then_fails() {
        let mut rt = WorldRuntime::new(HeadlessHost::new(0, 0), RuntimeConfig::default());
        rt.initialize().unwrap();
        assert_eq!(*rt.state(), LoopState::Initializing);
        for _ in 0..3 {
            rt.on_retry().unwrap();
        }
        let err = rt.on_retry().unwrap_err();
        assert!(matches!(err, RuntimeError::InitFailed { attempts: 5, .. }));
        assert!(matches!(rt.state(), LoopState::Failed(_)));
        let delays: Vec<u64> = rt.host().retries.iter().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        let notes = rt.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
    }

    #[test]
    fn initialize_while_initializing_is_a_no_op() {
        let mut rt = WorldRuntime::new(HeadlessHost::new(0, 0), RuntimeConfig::default());
        rt.initialize().unwrap();
        rt.initialize().unwrap();
        rt.initialize().unwrap();
        assert_eq!(rt.attempts(), 1);
        assert_eq!(rt.host().retries.len(), 1);
    }

    #[test]
    fn setup_failure_recovers_on_retry() {
        let mut host = HeadlessHost::default();
        host.failing_setups = 2;
        let mut rt = WorldRuntime::new(host, RuntimeConfig::default());
        rt.initialize().unwrap();
        rt.on_retry().unwrap();
        assert!(!rt.is_running());
        rt.on_retry().unwrap();
        assert!(rt.is_running());
        assert_eq!(rt.attempts(), 3);
        rt.on_retry().unwrap();
        assert_eq!(rt.attempts(), 3);
    }

    #[test]
    fn manual_retry_after_exhaustion() {
        let mut config = RuntimeConfig::default();
        config.retry.max_attempts = 1;
        let mut rt = WorldRuntime::new(HeadlessHost::new(0, 0), config);
        assert!(rt.initialize().is_err());
        rt.host_mut().width = 800;
        rt.host_mut().height = 600;
        rt.retry().unwrap();
        assert!(rt.is_running());
    }

    #[test]
    fn frames_are_ignored_until_running() {
        let mut rt = runtime();
        assert!(rt.on_frame(Duration::ZERO).is_none());
        assert_eq!(rt.frame(), 0);
    }

    #[test]
    fn delta_is_clamped_after_a_stall() {
        let mut rt = running();
        let first = rt.on_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(first.delta, 0.0);
        let second = rt.on_frame(Duration::from_secs(6)).unwrap();
        assert_eq!(second.delta, 0.1);
        assert!((rt.elapsed() - 0.1).abs() < 1e-9);
        assert_eq!(rt.world().clock().frame, 2);
    }

    #[test]
    fn physics_entity_visual_matches_body_after_one_tick() {
        let mut rt = running();
        let m = generic("crate").at(Vec3::new(0.0, 5.0, 0.0));
        rt.add_mod(m).unwrap();
        rt.on_frame(at(0, 60)).unwrap();

        let world = rt.world();
        let id = *world.list_mod_owned().first().unwrap();
        let entity = world.get(id).unwrap();
        let (pos, rot) = world.physics().body_pose(entity.body.unwrap()).unwrap();
        assert!((entity.visual.transform.position - pos).length() < 1e-6);
        assert!(entity.visual.transform.rotation.abs_diff_eq(rot, 1e-6));
        assert!(pos.y < 5.0);
    }

    #[test]
    fn script_cube_scenario() {
        let mut rt = running();
        let m = Mod::script("red", "addCube(#{ color: 0xff0000 });").at(Vec3::new(2.0, 3.0, 0.0));
        let owner = m.id;
        rt.add_mod(m).unwrap();

        let notes = rt.drain_notifications();
        assert!(notes.iter().any(|n| n.severity == Severity::Success && n.message.contains("executed")));
        let id = {
            let world = rt.world();
            let owned = world.owned_by(owner);
            assert_eq!(owned.len(), 1);
            let entity = world.get(owned[0]).unwrap();
            assert_eq!(entity.visual.material.color, 0xff0000);
            owned[0]
        };
        let spawn_position = {
            let world = rt.world();
            let body = world.get(id).unwrap().body.unwrap();
            world.physics().body_pose(body).unwrap().0
        };
        assert!((spawn_position - Vec3::new(2.0, 3.0, 0.0)).length() < 1e-6);

        rt.on_frame(at(0, 60)).unwrap();
        let world = rt.world();
        let entity = world.get(id).unwrap();
        let (pos, _) = world.physics().body_pose(entity.body.unwrap()).unwrap();
        assert_eq!(entity.visual.transform.position, pos);
    }

    #[test]
    fn two_generic_mods_then_clear() {
        let mut rt = running();
        rt.add_mod(generic("a")).unwrap();
        rt.add_mod(generic("b")).unwrap();
        rt.add_mod(Mod::script("spin", "let c = addCube(); animate(|t| { c.rotation = vec3(0, t, 0); });"))
            .unwrap();
        rt.on_frame(at(0, 60)).unwrap();
        assert_eq!(rt.tasks().active_count(), 1);
        assert_eq!(rt.world().list_mod_owned().len(), 3);

        assert_eq!(rt.clear_world(), 3);
        assert!(rt.world().list_mod_owned().is_empty());
        assert_eq!(rt.world().list_all(), vec![rt.ground().unwrap()]);
        assert_eq!(rt.tasks().active_count(), 0);
        assert!(rt.tasks().is_empty());
        let report = rt.on_frame(at(1, 60)).unwrap();
        assert_eq!(report.tasks_run, 0);
    }

    #[test]
    fn clear_with_nothing_owned_is_harmless() {
        let mut rt = running();
        assert_eq!(rt.clear_world(), 0);
        assert_eq!(rt.world().entity_count(), 1);
    }

    #[test]
    fn stop_and_register_inside_a_callback_apply_next_tick() {
        let mut rt = running();
        rt.add_mod(Mod::script(
            "relay",
            r#"
                let me = ();
                me = animate(|t| {
                    notify("self");
                    stopAnimation(me);
                    animate(|t| { notify("child"); });
                });
            "#,
        ))
        .unwrap();
        rt.drain_notifications();

        let mut fired = Vec::new();
        for frame in 0..3 {
            let report = rt.on_frame(at(frame, 60)).unwrap();
            assert_eq!(report.tasks_run, 1, "frame {frame}");
            let names: Vec<String> = rt
                .drain_notifications()
                .into_iter()
                .map(|n| n.message)
                .filter(|m| m == "self" || m == "child")
                .collect();
            fired.push(names);
        }
        assert_eq!(fired, vec![vec!["self"], vec!["child"], vec!["child"]]);
        assert_eq!(rt.tasks().len(), 1);
        assert_eq!(rt.tasks().active_count(), 1);
    }

    #[test]
    fn failing_callback_is_deactivated_while_siblings_continue() {
        let mut rt = running();
        rt.add_mod(Mod::script(
            "flaky",
            r#"
                let calls = 0;
                animate(|t| { calls += 1; if calls == 3 { throw "third call"; } });
                let cube = addCube(#{ physics: false });
                animate(|t| { cube.position = vec3(t, 0, 0); });
            "#,
        ))
        .unwrap();
        rt.drain_notifications();

        let mut failures = 0;
        for frame in 0..10 {
            let report = rt.on_frame(at(frame, 60)).unwrap();
            failures += report.task_failures;
            let expected = if frame < 3 { 2 } else { 1 };
            assert_eq!(report.tasks_run, expected, "frame {frame}");
        }
        assert_eq!(failures, 1);
        assert_eq!(rt.tasks().len(), 2);
        assert_eq!(rt.tasks().active_count(), 1);
        let notes = rt.drain_notifications();
        assert_eq!(notes.iter().filter(|n| n.severity == Severity::Warning).count(), 1);
        assert!(rt.is_running());
    }

    #[test]
    fn sustained_low_fps_downgrades_twice() {
        let mut rt = running();
        rt.drain_notifications();
        let mut changes = Vec::new();
        for frame in 0..=(60 * 15) {
            if let Some(change) = rt.on_frame(at(frame, 15)).and_then(|r| r.tier_change) {
                changes.push(change);
            }
        }
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].to, QualityTier::Medium);
        assert_eq!(changes[1].to, QualityTier::Low);
        assert_eq!(rt.tier(), QualityTier::Low);
        assert_eq!(rt.host().tier, Some(QualityTier::Low));
        assert_eq!(rt.world().effects().density(), 0.25);
        let quality_notes = rt
            .drain_notifications()
            .into_iter()
            .filter(|n| n.message.starts_with("Quality"))
            .count();
        assert_eq!(quality_notes, 2);
    }

    #[test]
    fn pause_skips_ticks_and_resume_continues() {
        let mut rt = running();
        rt.on_frame(at(0, 60)).unwrap();
        assert!(rt.pause());
        assert!(!rt.host().frame_requested);
        assert!(rt.on_frame(at(1, 60)).is_none());
        assert!(rt.resume());
        let report = rt.on_frame(Duration::from_secs(100)).unwrap();
        assert_eq!(report.delta, 0.0);
        assert_eq!(report.frame, 2);
    }

    #[test]
    fn context_loss_pauses_and_restore_reinitializes() {
        let mut rt = running();
        for frame in 0..=(60 * 15) {
            rt.on_frame(at(frame, 15));
        }
        assert_eq!(rt.tier(), QualityTier::Low);
        let ground = rt.ground();

        rt.context_lost();
        assert_eq!(*rt.state(), LoopState::Paused(PauseReason::ContextLost));
        assert!(rt.on_frame(Duration::from_secs(70)).is_none());
        assert!(!rt.resume());

        rt.context_restored().unwrap();
        assert!(rt.is_running());
        assert_eq!(rt.tier(), QualityTier::High);
        assert_eq!(rt.ground(), ground);
        assert_eq!(rt.world().entity_count(), 1);
        let notes = rt.drain_notifications();
        assert!(notes.iter().any(|n| n.message.contains("context lost")));
        assert!(notes.iter().any(|n| n.message.contains("restored")));
    }

    #[test]
    fn teardown_releases_everything() {
        let mut rt = running();
        rt.add_mod(Mod::script("s", "addSphere(); animate(|t| {});")).unwrap();
        rt.on_frame(at(0, 60)).unwrap();
        rt.teardown();
        assert_eq!(*rt.state(), LoopState::TornDown);
        assert!(rt.host().released);
        assert!(!rt.host().frame_requested);
        assert_eq!(rt.world().entity_count(), 0);
        assert!(rt.tasks().is_empty());
        assert!(rt.on_frame(at(1, 60)).is_none());
        assert!(matches!(rt.initialize(), Err(RuntimeError::TornDown)));
    }

    #[test]
    fn summary_counts_what_exists() {
        let mut rt = running();
        rt.add_mod(Mod::script("s", "addCube(); addCube(); animate(|t| {});")).unwrap();
        rt.on_frame(at(0, 60)).unwrap();
        let summary = rt.summary();
        assert_eq!(summary.entities, 3);
        assert_eq!(summary.mod_owned, 2);
        assert_eq!(summary.tasks_active, 1);
        assert_eq!(summary.mods_loaded, 1);
        assert_eq!(summary.state, LoopState::Running);
        assert!(summary.to_string().contains("running"));
    }
}
