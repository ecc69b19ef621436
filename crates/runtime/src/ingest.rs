//! Mod Ingestion Pipeline.
//!
//! Dispatch is total over [`ModKind`]: scripts go to the sandbox, models and
//! images become pending loads that finish on a later tick, configs mutate
//! the environment, and anything else becomes a plain physics cube.

use glam::Vec3;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use worldspace_assets::{
    ConfigEffect, ContentHash, ImageInfo, LoaderError, ModelInfo, decode_image, decode_model,
    parse_config,
};
use worldspace_common::{EntityId, Mod, ModId, ModKind, Transform};
use worldspace_kernel::{
    AmbientLight, BodyDesc, ColliderShape, EntitySpec, Fog, LightKind, Material, Shape,
    TextureInfo, Visual,
};
use worldspace_sandbox::SandboxError;

use crate::host::Host;
use crate::runtime::{LoopState, WorldRuntime};

const GENERIC_SIZE: f32 = 1.0;
const GENERIC_COLOR: u32 = 0x8888ff;
const MODEL_COLOR: u32 = 0xdddddd;
/// Emissive strength of the highlight a freshly loaded model gets.
const MODEL_GLOW: f32 = 1.0;
/// World-space height of an image plane before scaling.
const IMAGE_HEIGHT: f32 = 2.0;
const IMAGE_HALF_DEPTH: f32 = 0.05;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("failed to load `{name}`: {source}")]
    Loader {
        name: String,
        #[source]
        source: LoaderError,
    },
    #[error("load of `{name}` cancelled by a world clear")]
    Cancelled { name: String },
    #[error("runtime has been torn down")]
    TornDown,
}

/// Handle to a model or image load still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(pub u64);

impl std::fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModStatus {
    Pending,
    Loaded,
    Failed(String),
}

impl ModStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModStatus::Loaded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ModStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRecord {
    pub name: String,
    pub kind: ModKind,
    pub status: ModStatus,
}

/// Result of handing a mod to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Finished synchronously, having spawned `entities` tracked entities.
    Done { entities: usize },
    /// Decoding continues across ticks.
    Pending(LoadTicket),
}

enum Decoded {
    Model { info: ModelInfo, hash: ContentHash },
    Image(ImageInfo),
}

type LoadFuture = Pin<Box<dyn Future<Output = Result<Decoded, LoaderError>>>>;

pub(crate) struct PendingLoad {
    ticket: LoadTicket,
    descriptor: Mod,
    target: Vec3,
    future: LoadFuture,
}

impl<H: Host> WorldRuntime<H> {
    /// Route a mod to the loader for its declared type, at its own target
    /// position. Script failures come back as `Err` after being reported.
    pub fn add_mod(&mut self, m: Mod) -> Result<Ingested, IngestError> {
        self.ensure_alive()?;
        tracing::info!(name = %m.name, kind = %m.kind, id = %m.id, "ingesting mod");
        let target = m.target_position;
        match m.kind {
            ModKind::Script => {
                let source = m.payload.to_text().into_owned();
                self.run_script(&m, &source, target)
            }
            ModKind::Model => Ok(self.start_model_load(m, target)),
            ModKind::Image => Ok(self.start_image_load(m, target)),
            ModKind::Config => Ok(self.apply_config(&m)),
            ModKind::Generic => Ok(self.spawn_generic(&m, target)),
        }
    }

    /// Execute a mod as a script regardless of its declared type, optionally
    /// with replacement source text and target position.
    pub fn execute_mod_script(
        &mut self,
        m: Mod,
        script: Option<String>,
        position: Option<Vec3>,
    ) -> Result<Ingested, IngestError> {
        self.ensure_alive()?;
        let target = position.unwrap_or(m.target_position);
        let source = script.unwrap_or_else(|| m.payload.to_text().into_owned());
        self.run_script(&m, &source, target)
    }

    fn ensure_alive(&self) -> Result<(), IngestError> {
        if *self.state() == LoopState::TornDown {
            return Err(IngestError::TornDown);
        }
        Ok(())
    }

    fn record(&mut self, m: &Mod, status: ModStatus) {
        self.mods.insert(
            m.id,
            ModRecord {
                name: m.name.clone(),
                kind: m.kind,
                status,
            },
        );
    }

    fn run_script(&mut self, m: &Mod, source: &str, target: Vec3) -> Result<Ingested, IngestError> {
        match self.sandbox.execute(m, source, target) {
            Ok(report) => {
                self.record(m, ModStatus::Loaded);
                Ok(Ingested::Done {
                    entities: report.entities_created,
                })
            }
            Err(err) => {
                self.record(m, ModStatus::Failed(err.to_string()));
                Err(err.into())
            }
        }
    }

    fn start_model_load(&mut self, m: Mod, target: Vec3) -> Ingested {
        let bytes = m.payload.as_bytes().to_vec();
        let hash = ContentHash::of(&bytes);
        let future: LoadFuture = match self.assets.model(&hash) {
            Some(info) => {
                tracing::debug!(%hash, "model cache hit");
                Box::pin(std::future::ready(Ok(Decoded::Model { info, hash })))
            }
            None => Box::pin(async move {
                decode_model(bytes)
                    .await
                    .map(|info| Decoded::Model { info, hash })
            }),
        };
        self.queue_load(m, target, future)
    }

    fn start_image_load(&mut self, m: Mod, target: Vec3) -> Ingested {
        let bytes = m.payload.as_bytes().to_vec();
        let future: LoadFuture = Box::pin(async move { decode_image(bytes).await.map(Decoded::Image) });
        self.queue_load(m, target, future)
    }

    fn queue_load(&mut self, m: Mod, target: Vec3, future: LoadFuture) -> Ingested {
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.record(&m, ModStatus::Pending);
        tracing::debug!(%ticket, name = %m.name, "load queued");
        self.pending.push(PendingLoad {
            ticket,
            descriptor: m,
            target,
            future,
        });
        Ingested::Pending(ticket)
    }

    /// Drive every pending load once. The loop calls this at the start of
    /// each tick; hosts may call it between ticks too. Returns how many
    /// loads finished.
    pub fn poll_loads(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut cx = Context::from_waker(Waker::noop());
        let mut finished = 0;
        for mut load in std::mem::take(&mut self.pending) {
            let poll = load.future.as_mut().poll(&mut cx);
            match poll {
                Poll::Pending => self.pending.push(load),
                Poll::Ready(result) => {
                    finished += 1;
                    self.finish_load(load.ticket, &load.descriptor, load.target, result);
                }
            }
        }
        finished
    }

    /// Drop every load still in flight so nothing spawns after a clear.
    /// Each ticket resolves to [`IngestError::Cancelled`].
    pub(crate) fn cancel_loads(&mut self) -> usize {
        let loads = std::mem::take(&mut self.pending);
        let cancelled = loads.len();
        for load in loads {
            let err = IngestError::Cancelled {
                name: load.descriptor.name.clone(),
            };
            tracing::debug!(ticket = %load.ticket, name = %load.descriptor.name, "load cancelled");
            self.record(&load.descriptor, ModStatus::Failed(err.to_string()));
            self.finished.insert(load.ticket, Err(err));
        }
        cancelled
    }

    fn finish_load(
        &mut self,
        ticket: LoadTicket,
        m: &Mod,
        target: Vec3,
        result: Result<Decoded, LoaderError>,
    ) {
        let outcome = match result {
            Ok(Decoded::Model { info, hash }) => {
                let id = self.spawn_model(m, target, &info);
                self.assets.insert_model(hash, info);
                Ok(id)
            }
            Ok(Decoded::Image(info)) => Ok(self.spawn_image(m, target, info)),
            Err(source) => Err(IngestError::Loader {
                name: m.name.clone(),
                source,
            }),
        };
        match &outcome {
            Ok(id) => {
                tracing::info!(%ticket, %id, name = %m.name, "load finished");
                self.record(m, ModStatus::Loaded);
                self.notifier
                    .success(format!("{} \"{}\" loaded", kind_title(m.kind), m.name));
            }
            Err(err) => {
                tracing::warn!(%ticket, error = %err, "load failed");
                self.record(m, ModStatus::Failed(err.to_string()));
                self.notifier.error(err.to_string());
            }
        }
        self.finished.insert(ticket, outcome);
    }

    fn spawn_model(&mut self, m: &Mod, target: Vec3, info: &ModelInfo) -> EntityId {
        let half = info.half_extents() * asset_scale(m);
        let visual = Visual::new(
            Shape::Model {
                name: info.name.clone().unwrap_or_else(|| m.name.clone()),
                mesh_count: info.mesh_count,
                half_extents: half,
            },
            Transform::from_position(target + Vec3::Y * half.y),
            Material::colored(m.metadata.color.unwrap_or(MODEL_COLOR)),
        );
        let body = BodyDesc::dynamic(
            ColliderShape::Cuboid { half_extents: half },
            m.metadata.mass.unwrap_or(1.0),
        );
        let mut world = self.world.borrow_mut();
        let id = world.spawn(
            EntitySpec::new(m.name.as_str(), visual)
                .with_body(body)
                .owned_by(Some(m.id)),
        );
        world.effects_mut().add_glow(id, MODEL_GLOW);
        id
    }

    fn spawn_image(&mut self, m: &Mod, target: Vec3, info: ImageInfo) -> EntityId {
        let height = IMAGE_HEIGHT * asset_scale(m);
        let width = height * info.aspect();
        let visual = Visual::new(
            Shape::Plane {
                width,
                height,
                texture: Some(TextureInfo {
                    width: info.width,
                    height: info.height,
                }),
            },
            Transform::from_position(target + Vec3::Y * (height * 0.5)),
            Material::colored(m.metadata.color.unwrap_or(0xffffff)),
        );
        let shape = ColliderShape::Cuboid {
            half_extents: Vec3::new(width * 0.5, height * 0.5, IMAGE_HALF_DEPTH),
        };
        let body = match m.metadata.mass {
            Some(mass) if mass > 0.0 => BodyDesc::dynamic(shape, mass),
            _ => BodyDesc::fixed(shape),
        };
        self.world.borrow_mut().spawn(
            EntitySpec::new(m.name.as_str(), visual)
                .with_body(body)
                .owned_by(Some(m.id)),
        )
    }

    /// Effects apply in document order; a bad key is reported and skipped
    /// without undoing the ones before it.
    fn apply_config(&mut self, m: &Mod) -> Ingested {
        let outcome = match parse_config(&m.payload.to_text()) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(name = %m.name, error = %err, "config rejected");
                self.record(m, ModStatus::Failed(err.to_string()));
                self.notifier
                    .error(format!("Config \"{}\" rejected: {err}", m.name));
                return Ingested::Done { entities: 0 };
            }
        };

        let mut lights = 0;
        for effect in outcome.effects {
            if self.apply_effect(m.id, effect) {
                lights += 1;
            }
        }
        for err in &outcome.errors {
            self.notifier
                .warning(format!("Config \"{}\": {err}", m.name));
        }
        for key in &outcome.ignored {
            tracing::debug!(key = %key, "config key ignored");
        }
        self.record(m, ModStatus::Loaded);
        self.notifier
            .success(format!("Config \"{}\" applied", m.name));
        Ingested::Done { entities: lights }
    }

    /// Returns whether the effect spawned a tracked entity.
    fn apply_effect(&mut self, owner: ModId, effect: ConfigEffect) -> bool {
        let mut world = self.world.borrow_mut();
        match effect {
            ConfigEffect::Light(decl) => {
                let kind = match decl.kind.as_str() {
                    "directional" => LightKind::Directional,
                    "spot" => LightKind::Spot,
                    _ => LightKind::Point,
                };
                let visual = Visual::new(
                    Shape::Light {
                        kind,
                        intensity: decl.intensity,
                        distance: decl.distance,
                    },
                    Transform::from_position(decl.position),
                    Material::colored(decl.color),
                );
                world.spawn(EntitySpec::new(format!("{} light", decl.kind), visual).owned_by(Some(owner)));
                true
            }
            ConfigEffect::Ambient { color, intensity } => {
                let current = world.environment().ambient;
                world.set_ambient(AmbientLight {
                    color: color.unwrap_or(current.color),
                    intensity: intensity.unwrap_or(current.intensity),
                });
                false
            }
            ConfigEffect::Fog(fog) => {
                world.set_fog(fog.map(|f| Fog {
                    color: f.color,
                    near: f.near,
                    far: f.far,
                }));
                false
            }
            ConfigEffect::Gravity(gravity) => {
                world.set_gravity(gravity);
                false
            }
        }
    }

    fn spawn_generic(&mut self, m: &Mod, target: Vec3) -> Ingested {
        let size = Vec3::splat(GENERIC_SIZE * asset_scale(m));
        let visual = Visual::new(
            Shape::Box { size },
            Transform::from_position(target),
            Material::colored(m.metadata.color.unwrap_or(GENERIC_COLOR)),
        );
        let body = BodyDesc::dynamic(
            ColliderShape::Cuboid {
                half_extents: size * 0.5,
            },
            m.metadata.mass.unwrap_or(1.0),
        );
        self.world.borrow_mut().spawn(
            EntitySpec::new(m.name.as_str(), visual)
                .with_body(body)
                .owned_by(Some(m.id)),
        );
        self.record(m, ModStatus::Loaded);
        self.notifier.success(format!("Added \"{}\"", m.name));
        Ingested::Done { entities: 1 }
    }

    /// Outcome of a finished load, handed out once. `None` while the load is
    /// still pending or the ticket is unknown.
    pub fn take_load_result(&mut self, ticket: LoadTicket) -> Option<Result<EntityId, IngestError>> {
        self.finished.remove(&ticket)
    }

    pub fn is_pending(&self, ticket: LoadTicket) -> bool {
        self.pending.iter().any(|load| load.ticket == ticket)
    }

    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    pub fn mod_status(&self, id: ModId) -> Option<&ModStatus> {
        self.mods.get(&id).map(|record| &record.status)
    }

    /// Every mod seen so far.
    pub fn mods(&self) -> impl Iterator<Item = (&ModId, &ModRecord)> {
        self.mods.iter()
    }
}

fn asset_scale(m: &Mod) -> f32 {
    m.metadata.scale.filter(|s| *s > 0.0).unwrap_or(1.0)
}

fn kind_title(kind: ModKind) -> &'static str {
    match kind {
        ModKind::Model => "Model",
        ModKind::Image => "Image",
        _ => "Mod",
    }
}
