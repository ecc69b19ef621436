//! Physics-Visual Synchronizer.
//!
//! Copies body poses onto their paired visuals once per frame, after the
//! physics step and before rendering. Entities without a body are never
//! touched, so mods are free to animate them directly.

use crate::world::World;

impl World {
    /// Overwrite the position and orientation of every physics-backed visual
    /// with its body's pose. Scale is left alone. Returns how many visuals
    /// were written.
    pub fn sync_visuals(&mut self) -> usize {
        let mut synced = 0;
        for entity in self.entities.values_mut() {
            let Some(body) = entity.body else {
                continue;
            };
            if let Some((position, rotation)) = self.physics.body_pose(body) {
                entity.visual.transform.position = position;
                entity.visual.transform.rotation = rotation;
                synced += 1;
            }
        }
        synced
    }
}

#[cfg(test)]
mod tests {
    use crate::entity::{EntitySpec, Material, Shape, Visual};
    use crate::physics::{BodyDesc, ColliderShape};
    use crate::world::World;
    use glam::{Quat, Vec3};
    use worldspace_common::Transform;

    fn cube(pos: Vec3) -> Visual {
        Visual::new(
            Shape::Box { size: Vec3::ONE },
            Transform::from_position(pos),
            Material::default(),
        )
    }

    #[test]
    fn physics_entities_follow_their_bodies_exactly() {
        let mut w = World::default();
        let id = w.spawn(EntitySpec::new("falling", cube(Vec3::new(0.0, 10.0, 0.0))).with_body(
            BodyDesc::dynamic(
                ColliderShape::Cuboid {
                    half_extents: Vec3::splat(0.5),
                },
                1.0,
            ),
        ));
        for _ in 0..5 {
            w.step_physics();
        }
        assert_eq!(w.sync_visuals(), 1);

        let entity = w.get(id).unwrap();
        let (pos, rot) = w.physics().body_pose(entity.body.unwrap()).unwrap();
        assert_eq!(entity.visual.transform.position, pos);
        assert_eq!(entity.visual.transform.rotation, rot);
        assert!(pos.y < 10.0);
    }

    #[test]
    fn entities_without_bodies_are_untouched() {
        let mut w = World::default();
        let start = Vec3::new(1.0, 2.0, 3.0);
        let id = w.spawn(EntitySpec::new("static", cube(start)));
        w.get_mut(id).unwrap().visual.transform.rotation = Quat::from_rotation_z(1.0);
        w.step_physics();
        assert_eq!(w.sync_visuals(), 0);
        let t = w.get(id).unwrap().visual.transform;
        assert_eq!(t.position, start);
        assert_eq!(t.rotation, Quat::from_rotation_z(1.0));
    }

    #[test]
    fn sync_keeps_visual_scale() {
        let mut w = World::default();
        let mut visual = cube(Vec3::ZERO);
        visual.transform.scale = Vec3::splat(3.0);
        let id = w.spawn(EntitySpec::new("big", visual).with_body(BodyDesc::fixed(
            ColliderShape::Ball { radius: 1.5 },
        )));
        w.step_physics();
        w.sync_visuals();
        assert_eq!(w.get(id).unwrap().visual.transform.scale, Vec3::splat(3.0));
    }
}
