//! Decorative, self-expiring effects. None of these are registry entities.

use glam::Vec3;
use rand::Rng;
use std::collections::BTreeMap;
use worldspace_common::{EntityId, ModId};

/// Opacity lost per second by a particle burst.
const PARTICLE_FADE_PER_SEC: f32 = 1.2;
/// Emissive strength lost per second by a glow.
const GLOW_FADE_PER_SEC: f32 = 0.5;
/// Downward pull on particles, a fraction of real gravity.
const PARTICLE_GRAVITY: f32 = 2.0;
/// Upper bound on particles in one burst.
pub const MAX_PARTICLES_PER_BURST: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// A fire-and-forget burst. Lives until its opacity reaches zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleBurst {
    pub color: u32,
    pub opacity: f32,
    pub particles: Vec<Particle>,
}

/// Transient emissive highlight on an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub entity: EntityId,
    pub intensity: f32,
}

/// Default marker shown for a script mod that did not suppress it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModMarker {
    pub anchor: Vec3,
    pub position: Vec3,
    pub color: u32,
}

#[derive(Debug)]
pub struct Effects {
    bursts: Vec<ParticleBurst>,
    glows: Vec<Glow>,
    markers: BTreeMap<ModId, ModMarker>,
    /// Fraction of requested particles actually spawned.
    density: f32,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            bursts: Vec::new(),
            glows: Vec::new(),
            markers: BTreeMap::new(),
            density: 1.0,
        }
    }
}

impl Effects {
    /// Spawn a burst of `count` particles flying out from `origin`.
    /// Returns how many particles were actually created.
    pub fn spawn_particles(&mut self, count: usize, color: u32, origin: Vec3) -> usize {
        let n = ((count.min(MAX_PARTICLES_PER_BURST) as f32) * self.density).round() as usize;
        if n == 0 {
            return 0;
        }
        let mut rng = rand::rng();
        let particles = (0..n)
            .map(|_| Particle {
                position: origin,
                velocity: Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(0.5..2.5),
                    rng.random_range(-1.0..1.0),
                ),
            })
            .collect();
        self.bursts.push(ParticleBurst {
            color,
            opacity: 1.0,
            particles,
        });
        n
    }

    pub fn add_glow(&mut self, entity: EntityId, intensity: f32) {
        self.glows.push(Glow { entity, intensity });
    }

    pub fn set_marker(&mut self, owner: ModId, position: Vec3, color: u32) {
        self.markers.insert(
            owner,
            ModMarker {
                anchor: position,
                position,
                color,
            },
        );
    }

    pub fn remove_marker(&mut self, owner: ModId) -> bool {
        self.markers.remove(&owner).is_some()
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Scale future bursts, e.g. when the quality tier drops.
    pub fn set_density(&mut self, density: f32) {
        self.density = density.clamp(0.0, 1.0);
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    /// Advance every effect. Glows are returned so the caller can apply them
    /// to entity materials; expired ones are dropped here.
    pub fn update(&mut self, dt: f32, elapsed: f64) -> Vec<Glow> {
        for burst in &mut self.bursts {
            burst.opacity -= PARTICLE_FADE_PER_SEC * dt;
            for p in &mut burst.particles {
                p.velocity.y -= PARTICLE_GRAVITY * dt;
                p.position += p.velocity * dt;
            }
        }
        self.bursts.retain(|b| b.opacity > 0.0);

        for glow in &mut self.glows {
            glow.intensity = (glow.intensity - GLOW_FADE_PER_SEC * dt).max(0.0);
        }
        let current = self.glows.clone();
        self.glows.retain(|g| g.intensity > 0.0);

        for (i, marker) in self.markers.values_mut().enumerate() {
            let bob = ((elapsed as f32) * 2.0 + i as f32).sin() * 0.2;
            marker.position = marker.anchor + Vec3::Y * bob;
        }
        current
    }

    pub fn bursts(&self) -> &[ParticleBurst] {
        &self.bursts
    }

    pub fn particle_count(&self) -> usize {
        self.bursts.iter().map(|b| b.particles.len()).sum()
    }

    pub fn markers(&self) -> &BTreeMap<ModId, ModMarker> {
        &self.markers
    }

    pub fn glows(&self) -> &[Glow] {
        &self.glows
    }

    /// Drop everything (teardown).
    pub fn clear(&mut self) {
        self.bursts.clear();
        self.glows.clear();
        self.markers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_expire_by_fading() {
        let mut fx = Effects::default();
        assert_eq!(fx.spawn_particles(20, 0xffffff, Vec3::ZERO), 20);
        assert_eq!(fx.particle_count(), 20);
        for _ in 0..120 {
            fx.update(1.0 / 60.0, 0.0);
        }
        assert!(fx.bursts().is_empty());
    }

    #[test]
    fn density_scales_burst_size() {
        let mut fx = Effects::default();
        fx.set_density(0.5);
        assert_eq!(fx.spawn_particles(10, 0, Vec3::ZERO), 5);
        fx.set_density(0.0);
        assert_eq!(fx.spawn_particles(10, 0, Vec3::ZERO), 0);
        assert_eq!(fx.bursts().len(), 1);
    }

    #[test]
    fn burst_size_is_capped() {
        let mut fx = Effects::default();
        assert_eq!(fx.spawn_particles(100_000, 0, Vec3::ZERO), MAX_PARTICLES_PER_BURST);
    }

    #[test]
    fn glow_fades_out() {
        let mut fx = Effects::default();
        fx.add_glow(EntityId(1), 1.0);
        let first = fx.update(1.0, 0.0);
        assert_eq!(first.len(), 1);
        assert!((first[0].intensity - 0.5).abs() < 1e-6);
        fx.update(1.0, 0.0);
        assert!(fx.glows().is_empty());
    }

    #[test]
    fn markers_bob_around_anchor() {
        let mut fx = Effects::default();
        let owner = ModId::new();
        fx.set_marker(owner, Vec3::new(0.0, 1.0, 0.0), 0x00ff00);
        fx.update(0.016, 0.4);
        let m = fx.markers()[&owner];
        assert!((m.position.y - 1.0).abs() <= 0.2 + 1e-6);
        assert!(fx.remove_marker(owner));
        assert!(!fx.remove_marker(owner));
    }
}
