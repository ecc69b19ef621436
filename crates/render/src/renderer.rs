use glam::Vec3;
use std::fmt::Write;
use worldspace_kernel::{Shape, World};

/// Camera/view configuration for rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    /// Camera position in world space.
    pub eye: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Field of view in degrees.
    pub fov_degrees: f32,
    /// Device pixel ratio; lowered by quality downgrades.
    pub pixel_ratio: f32,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 10.0, 20.0),
            target: Vec3::ZERO,
            fov_degrees: 75.0,
            pixel_ratio: 2.0,
        }
    }
}

/// Renderer-agnostic interface. All renderers implement this trait.
///
/// The renderer reads world state and a view configuration, then produces
/// output. It never mutates the world.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Render one frame from the given world state and view.
    fn render(&self, world: &World, view: &RenderView) -> Self::Output;
}

/// Produces a human-readable dump of the scene. Used by the CLI, logs and
/// tests.
#[derive(Debug, Default)]
pub struct DebugTextRenderer {
    /// Include one line per entity.
    pub list_entities: bool,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self {
            list_entities: true,
        }
    }

    /// Header only.
    pub fn compact() -> Self {
        Self {
            list_entities: false,
        }
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, world: &World, view: &RenderView) -> String {
        let clock = world.clock();
        let env = world.environment();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== World (frame={}, t={:.2}s) ===",
            clock.frame, clock.elapsed
        );
        let _ = writeln!(
            out,
            "Entities: {} ({} mod-owned), particles: {}, markers: {}",
            world.entity_count(),
            world.list_mod_owned().len(),
            world.effects().particle_count(),
            world.effects().markers().len()
        );
        let g = world.gravity();
        let _ = writeln!(
            out,
            "Ambient: #{:06x} x{:.2}, fog: {}, gravity=({:.2}, {:.2}, {:.2})",
            env.ambient.color,
            env.ambient.intensity,
            env.fog
                .map(|f| format!("#{:06x} {:.0}..{:.0}", f.color, f.near, f.far))
                .unwrap_or_else(|| "off".into()),
            g.x,
            g.y,
            g.z
        );
        let _ = writeln!(
            out,
            "Camera: eye=({:.1}, {:.1}, {:.1}) target=({:.1}, {:.1}, {:.1}) fov={:.0} dpr={:.1}",
            view.eye.x,
            view.eye.y,
            view.eye.z,
            view.target.x,
            view.target.y,
            view.target.z,
            view.fov_degrees,
            view.pixel_ratio
        );

        if self.list_entities {
            for entity in world.entities().filter(|e| e.visual.visible) {
                let p = world
                    .world_transform(entity.id)
                    .map(|t| t.position)
                    .unwrap_or(entity.visual.transform.position);
                let owner = entity
                    .owner
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "env".into());
                let extra = match &entity.visual.shape {
                    Shape::Model { name, mesh_count, .. } => format!(" {name} meshes={mesh_count}"),
                    Shape::Plane {
                        texture: Some(tex), ..
                    } => format!(" {}x{}", tex.width, tex.height),
                    _ => String::new(),
                };
                let _ = writeln!(
                    out,
                    "  [{}] {} {}{} #{:06x} pos=({:.2}, {:.2}, {:.2}) owner={}{}",
                    entity.id,
                    entity.label,
                    entity.visual.shape.name(),
                    extra,
                    entity.visual.material.color,
                    p.x,
                    p.y,
                    p.z,
                    owner,
                    if entity.body.is_some() { " body" } else { "" }
                );
            }
        }

        out
    }
}
