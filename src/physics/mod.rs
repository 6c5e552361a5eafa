//! Collision shapes used for pointer picking.
//!
//! Nothing here is simulated: colliders are static boxes positioned directly and
//! queried with ray casts. Each collider carries the bits of the hecs entity it
//! stands for in `user_data`.

use glam::Vec3;
use rapier3d::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub collider: ColliderHandle,
    pub user_data: u128,
    /// Distance along the (unit) ray
    pub toi: f32,
    pub point: Vec3,
}

pub struct PickingWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub query_pipeline: QueryPipeline,
}

impl PickingWorld {
    pub fn new() -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn add_box_collider(&mut self, center: Vec3, half_extents: Vec3, user_data: u128) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .translation(vector![center.x, center.y, center.z])
            .user_data(user_data)
            .build();
        let handle = self.collider_set.insert(collider);
        self.refresh();
        handle
    }

    /// Move a collider. Takes effect for queries after the next `refresh`.
    pub fn set_collider_translation(&mut self, handle: ColliderHandle, center: Vec3) {
        if let Some(collider) = self.collider_set.get_mut(handle) {
            collider.set_translation(vector![center.x, center.y, center.z]);
        }
    }

    /// Turn a collider about the vertical axis. Takes effect after the next `refresh`.
    pub fn set_collider_yaw(&mut self, handle: ColliderHandle, yaw: f32) {
        if let Some(collider) = self.collider_set.get_mut(handle) {
            collider.set_rotation(Rotation::new(vector![0.0, yaw, 0.0]));
        }
    }

    pub fn collider_translation(&self, handle: ColliderHandle) -> Option<Vec3> {
        self.collider_set.get(handle).map(|c| {
            let t = c.translation();
            Vec3::new(t.x, t.y, t.z)
        })
    }

    pub fn refresh(&mut self) {
        self.query_pipeline.update(&self.rigid_body_set, &self.collider_set);
    }

    /// Nearest solid hit along the ray within `max_toi`
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, max_toi: f32) -> Option<PickHit> {
        let ray = Ray::new(
            point![origin.x, origin.y, origin.z],
            vector![direction.x, direction.y, direction.z],
        );
        let (collider, toi) = self.query_pipeline.cast_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_toi,
            true,
            QueryFilter::default(),
        )?;
        let user_data = self.collider_set.get(collider)?.user_data;
        Some(PickHit {
            collider,
            user_data,
            toi,
            point: origin + direction * toi,
        })
    }
}

impl Default for PickingWorld {
    fn default() -> Self {
        Self::new()
    }
}
