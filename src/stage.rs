//! Stage host: owns the scene context and wires input, the per-frame update,
//! presentation and diagnostics around the interaction controller.

use crate::clock::Clock;
use crate::config::RobotConfig;
use crate::diagnostics::{ErrorLog, Severity};
use crate::interaction::{InteractionController, InteractionState, StageEvent};
use crate::shell::{NotificationKind, StatusBoard};
use crate::world::animation::{compute_skinning_matrices, ClipId, SkinningPalette};
use crate::world::camera::{Camera, CanvasRect, Viewport};
use crate::world::character::Character;
use crate::world::gltf_loader::{create_test_robot, load_character_file, CharacterAsset};
use crate::world::StageWorld;
use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use log::info;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Everything the interaction controller reads or mutates
pub struct StageContext {
    pub config: RobotConfig,
    pub world: StageWorld,
    pub camera: Camera,
    pub viewport: Viewport,
    pub canvas: CanvasRect,
    pub character: Character,
}

impl StageContext {
    pub fn new(asset: CharacterAsset, config: RobotConfig, viewport: Viewport) -> Result<Self> {
        config.validate()?;
        let character = Character::from_asset(asset, &config)?;
        let world = StageWorld::new(&config.scene);
        let camera = Camera::from_config(&config.scene, viewport);
        Ok(Self {
            config,
            world,
            camera,
            viewport,
            canvas: CanvasRect::full(viewport),
            character,
        })
    }

    /// Push the character pose into the scene graph and pick collider
    pub fn sync_world(&mut self) {
        let pose = &self.character.pose;
        self.world.sync_character(pose.position, pose.yaw);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageSnapshot {
    pub state: InteractionState,
    pub position: Vec3,
    pub yaw: f32,
    pub walk_target: Option<Vec3>,
    pub head_bone: Option<String>,
    pub head_tracking: bool,
    pub head_rotation: Option<Vec3>,
    pub clip_count: usize,
    pub active_clips: Vec<String>,
}

pub struct Stage {
    ctx: StageContext,
    controller: InteractionController,
    shell: StatusBoard,
    errors: ErrorLog,
    palette: SkinningPalette,
    clock: Arc<dyn Clock>,
}

impl Stage {
    /// `seed` makes gesture selection reproducible
    pub fn new(
        asset: CharacterAsset,
        config: RobotConfig,
        viewport: Viewport,
        clock: Arc<dyn Clock>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let mut ctx = StageContext::new(asset, config, viewport)?;
        let mut controller = match seed {
            Some(seed) => InteractionController::with_seed(clock.clone(), seed),
            None => InteractionController::new(clock.clone()),
        };
        controller.start(&mut ctx);
        ctx.sync_world();

        let palette = SkinningPalette::new(ctx.character.skeleton.len());
        let mut shell = StatusBoard::new();
        shell.set_ready(controller.state());
        shell.notify(
            NotificationKind::Success,
            format!("Loaded '{}'", ctx.character.name),
            clock.now(),
        );
        controller.drain_events();

        info!(
            "Stage ready: '{}' at {:?}, viewport {}x{}",
            ctx.character.name, ctx.character.pose.position, viewport.width, viewport.height
        );

        Ok(Self {
            ctx,
            controller,
            shell,
            errors: ErrorLog::new(clock.clone()),
            palette,
            clock,
        })
    }

    /// Load a model file, or the built-in robot when `model` is `None`
    pub fn load(
        model: Option<&Path>,
        config: RobotConfig,
        viewport: Viewport,
        clock: Arc<dyn Clock>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let asset = match model {
            Some(path) => load_character_file(path)
                .with_context(|| format!("Failed to load character model: {}", path.display()))?,
            None => create_test_robot(),
        };
        Self::new(asset, config, viewport, clock, seed)
    }

    // ========================================================================
    // Input
    // ========================================================================

    pub fn on_click(&mut self, client: Vec2) {
        self.controller.on_click(&mut self.ctx, client);
    }

    pub fn on_touch_start(&mut self, touches: &[Vec2]) {
        self.controller.on_touch_start(&mut self.ctx, touches);
    }

    pub fn on_pointer_move(&mut self, client: Vec2) {
        self.controller.on_global_pointer_move(&mut self.ctx, client);
    }

    /// Only the camera and canvas change
    pub fn on_resize(&mut self, width: f32, height: f32) {
        let viewport = Viewport::new(width, height);
        self.ctx.viewport = viewport;
        self.ctx.canvas = CanvasRect::full(viewport);
        self.ctx.camera.resize(viewport);
    }

    /// Place the canvas inside a larger window
    pub fn set_canvas_rect(&mut self, canvas: CanvasRect) {
        self.ctx.canvas = canvas;
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn walk_to(&mut self, target: Vec3) {
        self.controller.walk_to(&mut self.ctx, target);
    }

    pub fn play_random_gesture(&mut self) -> Option<ClipId> {
        self.controller.play_random_gesture(&mut self.ctx)
    }

    pub fn set_head_tracking_enabled(&mut self, enabled: bool) {
        self.controller.set_head_tracking_enabled(&mut self.ctx, enabled);
    }

    pub fn reset(&mut self) {
        self.controller.reset(&mut self.ctx);
    }

    /// Record a failure from outside the stage (renderer, host I/O)
    pub fn report_error(&mut self, severity: Severity, category: &str, message: &str) {
        self.errors.record(severity, category, message);
        if severity == Severity::Critical {
            self.shell.show_error(message, self.clock.now());
        }
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Advance one frame by `dt` seconds and return the events it produced
    pub fn frame(&mut self, dt: f32) -> Vec<StageEvent> {
        self.controller.poll_timers(&mut self.ctx);
        self.controller.frame(&mut self.ctx, dt);
        self.ctx.sync_world();

        let local = self
            .ctx
            .character
            .local_pose(self.controller.is_head_tracking());
        self.palette
            .update_from(compute_skinning_matrices(&self.ctx.character.skeleton, &local));

        let now = self.clock.now();
        let events = self.controller.drain_events();
        for event in &events {
            self.shell.apply(event, now);
        }
        self.shell.prune(now);
        events
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> InteractionState {
        self.controller.state()
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn shell(&self) -> &StatusBoard {
        &self.shell
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorLog {
        &mut self.errors
    }

    pub fn palette(&self) -> &SkinningPalette {
        &self.palette
    }

    pub fn palette_mut(&mut self) -> &mut SkinningPalette {
        &mut self.palette
    }

    pub fn snapshot(&self) -> StageSnapshot {
        let character = &self.ctx.character;
        StageSnapshot {
            state: self.controller.state(),
            position: character.pose.position,
            yaw: character.pose.yaw,
            walk_target: self.controller.walk_target(),
            head_bone: character.head_bone_name().map(str::to_string),
            head_tracking: self.controller.is_head_tracking(),
            head_rotation: character.head.as_ref().map(|h| h.rotation),
            clip_count: character.clips.len(),
            active_clips: character
                .mixer
                .active_clips()
                .into_iter()
                .filter_map(|id| character.clips.name(id).map(str::to_string))
                .collect(),
        }
    }
}
