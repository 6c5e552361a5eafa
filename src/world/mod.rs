pub mod animation;
pub mod camera;
pub mod character;
pub mod gltf_loader;
pub mod rig;
pub mod skeleton;

use crate::config::SceneConfig;
use crate::physics::{PickHit, PickingWorld};
use camera::Ray;
use glam::{Quat, Vec3};
use hecs::{Entity, EntityBuilder, World};
use log::debug;
use rapier3d::prelude::ColliderHandle;

/// Name of the walkable plane
pub const GROUND_NAME: &str = "ground";
/// Name of the character's root node
pub const CHARACTER_NAME: &str = "robot";

const GROUND_THICKNESS: f32 = 0.1;
const MAX_PICK_DISTANCE: f32 = 1000.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position_yaw(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            rotation: Quat::from_rotation_y(yaw),
            scale: Vec3::ONE,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Scene-graph node name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parent(pub Entity);

/// Collider standing in for an entity during picking
#[derive(Clone, Copy, Debug)]
pub struct PickCollider(pub ColliderHandle);

/// What a pointer ray landed on
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitKind {
    Ground { point: Vec3 },
    Character { point: Vec3 },
}

/// Scene graph for the stage plus the colliders used to pick it
pub struct StageWorld {
    pub ecs: World,
    pub picking: PickingWorld,
    pub ground: Entity,
    pub character: Entity,
    character_body: Entity,
    body_offset: Vec3,
}

impl StageWorld {
    pub fn new(scene: &SceneConfig) -> Self {
        let mut world = Self {
            ecs: World::new(),
            picking: PickingWorld::new(),
            ground: Entity::DANGLING,
            character: Entity::DANGLING,
            character_body: Entity::DANGLING,
            body_offset: Vec3::ZERO,
        };

        let half = scene.ground_size * 0.5;
        world.ground = world.add_pickable(
            Some(GROUND_NAME),
            None,
            Vec3::new(0.0, -GROUND_THICKNESS * 0.5, 0.0),
            Vec3::new(half, GROUND_THICKNESS * 0.5, half),
        );

        let home = Vec3::from_array(scene.character_home);
        world.character = world.ecs.spawn((
            Name(CHARACTER_NAME.to_string()),
            Transform::from_position_yaw(home, scene.character_home_yaw_degrees.to_radians()),
        ));

        let half_extents = Vec3::from_array(scene.character_pick_half_extents);
        world.body_offset = Vec3::new(0.0, half_extents.y, 0.0);
        world.character_body = world.add_pickable(
            Some("robot_body"),
            Some(world.character),
            home + world.body_offset,
            half_extents,
        );
        world.sync_character(home, scene.character_home_yaw_degrees.to_radians());

        debug!(
            "Stage world: ground {}x{}, character at {:?}",
            scene.ground_size, scene.ground_size, home
        );
        world
    }

    /// Spawn an entity with a box collider. `center` is in world space.
    pub fn add_pickable(
        &mut self,
        name: Option<&str>,
        parent: Option<Entity>,
        center: Vec3,
        half_extents: Vec3,
    ) -> Entity {
        let entity = self.ecs.reserve_entity();
        let collider = self
            .picking
            .add_box_collider(center, half_extents, entity.to_bits().get() as u128);

        let mut builder = EntityBuilder::new();
        builder.add(Transform {
            position: center,
            ..Default::default()
        });
        builder.add(PickCollider(collider));
        if let Some(name) = name {
            builder.add(Name(name.to_string()));
        }
        if let Some(parent) = parent {
            builder.add(Parent(parent));
        }
        self.ecs.spawn_at(entity, builder.build());
        entity
    }

    /// Move and turn the character root together with its pick collider
    pub fn sync_character(&mut self, position: Vec3, yaw: f32) {
        if let Ok(mut transform) = self.ecs.get::<&mut Transform>(self.character) {
            *transform = Transform::from_position_yaw(position, yaw);
        }
        let center = position + self.body_offset;
        if let Ok(mut transform) = self.ecs.get::<&mut Transform>(self.character_body) {
            transform.position = center;
            transform.rotation = Quat::from_rotation_y(yaw);
        }
        if let Ok(collider) = self.ecs.get::<&PickCollider>(self.character_body) {
            self.picking.set_collider_translation(collider.0, center);
            self.picking.set_collider_yaw(collider.0, yaw);
        }
        self.picking.refresh();
    }

    pub fn character_transform(&self) -> Option<Transform> {
        self.ecs.get::<&Transform>(self.character).ok().map(|t| (*t).clone())
    }

    /// Cast the ray and classify the nearest hit
    pub fn pick(&self, ray: &Ray) -> Option<HitKind> {
        let hit = self.picking.cast_ray(ray.origin, ray.direction, MAX_PICK_DISTANCE)?;
        self.classify_hit(&hit)
    }

    fn classify_hit(&self, hit: &PickHit) -> Option<HitKind> {
        let entity = u64::try_from(hit.user_data).ok().and_then(Entity::from_bits)?;
        self.classify(entity, hit.point)
    }

    /// Ground if the entity or its nearest named ancestor is the ground plane;
    /// character if the entity or any ancestor is the character root.
    pub fn classify(&self, entity: Entity, point: Vec3) -> Option<HitKind> {
        let chain = self.ancestry(entity);

        let nearest_name = chain
            .iter()
            .find_map(|&e| self.ecs.get::<&Name>(e).ok().map(|n| n.0.clone()));
        if nearest_name.as_deref() == Some(GROUND_NAME) {
            return Some(HitKind::Ground { point });
        }

        let is_character = chain.iter().any(|&e| {
            self.ecs
                .get::<&Name>(e)
                .map(|n| n.0 == CHARACTER_NAME)
                .unwrap_or(false)
        });
        if is_character {
            return Some(HitKind::Character { point });
        }

        debug!("Pick hit unclassified entity {:?}", entity);
        None
    }

    /// The entity followed by its ancestors, nearest first
    fn ancestry(&self, entity: Entity) -> Vec<Entity> {
        let mut chain = vec![entity];
        let mut current = entity;
        while let Ok(parent) = self.ecs.get::<&Parent>(current) {
            let next = parent.0;
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::camera::{Camera, CanvasRect, Viewport, pointer_to_ndc};

    fn stage_world() -> StageWorld {
        StageWorld::new(&SceneConfig::default())
    }

    fn ray_down(x: f32, z: f32) -> Ray {
        Ray {
            origin: Vec3::new(x, 10.0, z),
            direction: Vec3::NEG_Y,
        }
    }

    #[test]
    fn test_ground_hit_point() {
        let world = stage_world();
        match world.pick(&ray_down(4.0, -3.0)) {
            Some(HitKind::Ground { point }) => {
                assert!(point.abs_diff_eq(Vec3::new(4.0, 0.0, -3.0), 1e-4));
            }
            other => panic!("expected ground hit, got {:?}", other),
        }
    }

    #[test]
    fn test_character_hit_and_follow() {
        let mut world = stage_world();
        assert!(matches!(world.pick(&ray_down(0.0, 0.0)), Some(HitKind::Character { .. })));

        world.sync_character(Vec3::new(5.0, 0.1, 5.0), 0.0);
        assert!(matches!(world.pick(&ray_down(0.0, 0.0)), Some(HitKind::Ground { .. })));
        assert!(matches!(world.pick(&ray_down(5.0, 5.0)), Some(HitKind::Character { .. })));
        let transform = world.character_transform().unwrap();
        assert_eq!(transform.position, Vec3::new(5.0, 0.1, 5.0));
    }

    #[test]
    fn test_miss_outside_ground() {
        let world = stage_world();
        assert_eq!(world.pick(&ray_down(30.0, 0.0)), None);
    }

    #[test]
    fn test_classify_through_ancestors() {
        let mut world = stage_world();
        // Unnamed part nested under the character
        let arm = world.add_pickable(None, Some(world.character), Vec3::new(0.0, 20.0, 0.0), Vec3::splat(0.1));
        assert!(matches!(world.classify(arm, Vec3::ZERO), Some(HitKind::Character { .. })));

        // Unnamed tile whose nearest named ancestor is the ground
        let tile = world.add_pickable(None, Some(world.ground), Vec3::new(0.0, 30.0, 0.0), Vec3::splat(0.1));
        assert!(matches!(world.classify(tile, Vec3::ZERO), Some(HitKind::Ground { .. })));

        // A named prop under the ground is neither
        let rock = world.add_pickable(Some("rock"), Some(world.ground), Vec3::new(0.0, 40.0, 0.0), Vec3::splat(0.1));
        assert_eq!(world.classify(rock, Vec3::ZERO), None);
    }

    #[test]
    fn test_canvas_center_hits_character() {
        let world = stage_world();
        let viewport = Viewport::new(800.0, 600.0);
        let camera = Camera::from_config(&SceneConfig::default(), viewport);
        let canvas = CanvasRect::full(viewport);
        let ray = camera.ray_from_ndc(pointer_to_ndc(glam::Vec2::new(400.0, 300.0), &canvas));
        assert!(matches!(world.pick(&ray), Some(HitKind::Character { .. })));
    }

    #[test]
    fn test_pickable_spawns_with_all_components() {
        let mut world = stage_world();
        let prop = world.add_pickable(Some("crate"), Some(world.ground), Vec3::new(2.0, 0.5, 2.0), Vec3::splat(0.5));
        assert_eq!(world.ecs.get::<&Name>(prop).unwrap().0, "crate");
        assert_eq!(world.ecs.get::<&Parent>(prop).unwrap().0, world.ground);
        assert_eq!(world.ecs.get::<&Transform>(prop).unwrap().position, Vec3::new(2.0, 0.5, 2.0));
        let collider = world.ecs.get::<&PickCollider>(prop).unwrap().0;
        let hit = world.picking.cast_ray(Vec3::new(2.0, 10.0, 2.0), Vec3::NEG_Y, 100.0).unwrap();
        assert_eq!(hit.collider, collider);
        assert_eq!(Entity::from_bits(hit.user_data as u64), Some(prop));
    }

    #[test]
    fn test_character_collider_follows_yaw() {
        let scene = SceneConfig {
            character_pick_half_extents: [2.0, 1.0, 0.2],
            ..SceneConfig::default()
        };
        let mut world = StageWorld::new(&scene);
        let home = Vec3::from_array(scene.character_home);

        world.sync_character(home, 0.0);
        assert!(matches!(world.pick(&ray_down(1.5, 0.0)), Some(HitKind::Character { .. })));
        assert!(matches!(world.pick(&ray_down(0.0, 1.5)), Some(HitKind::Ground { .. })));

        world.sync_character(home, std::f32::consts::FRAC_PI_2);
        assert!(matches!(world.pick(&ray_down(0.0, 1.5)), Some(HitKind::Character { .. })));
        assert!(matches!(world.pick(&ray_down(1.5, 0.0)), Some(HitKind::Ground { .. })));
    }
}
