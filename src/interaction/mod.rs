//! Character interaction state machine.
//!
//! Input handlers and the per-frame update all take the `StageContext` explicitly;
//! the controller itself only holds interaction state (activity, head-tracking
//! flags, pointer timing, pending deferred tasks) and an outgoing event queue that
//! the presentation layer drains.
//!
//! Frame order: mixer advance, head relaxation, walking integration.

pub mod motion;
pub mod timer;

use crate::clock::Clock;
use crate::stage::StageContext;
use crate::world::animation::{ClipId, ClipRole, PlayOptions};
use crate::world::camera::{pointer_to_ndc, window_to_normalized};
use crate::world::HitKind;
use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use timer::{TaskScheduler, TimerToken};

/// Upper bound on how long a gesture holds off the idle return
pub const MAX_GESTURE_DELAY: Duration = Duration::from_secs(600);

/// Externally visible state. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum InteractionState {
    Idle,
    HeadTracking,
    Walking,
    PlayingGesture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GestureIgnoreReason {
    Walking,
    GestureActive,
    NoCandidates,
}

/// Notifications for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum StageEvent {
    StateChanged {
        from: InteractionState,
        to: InteractionState,
    },
    WalkStarted {
        target: Vec3,
    },
    WalkRetargeted {
        target: Vec3,
    },
    Arrived {
        position: Vec3,
    },
    ClipStarted {
        clip: ClipId,
        name: String,
    },
    GestureStarted {
        clip: ClipId,
        name: String,
        duration: f32,
    },
    GestureIgnored {
        reason: GestureIgnoreReason,
    },
    IdleResumed,
    StaleTimerIgnored {
        token: TimerToken,
    },
    HeadTrackingChanged {
        enabled: bool,
    },
    Reset,
}

/// Work deferred to a later time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeferredTask {
    ReturnToIdle,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Activity {
    Idle,
    Walking { target: Vec3 },
    Gesture { clip: ClipId, token: TimerToken },
}

pub struct InteractionController {
    activity: Activity,
    /// User toggle
    head_tracking_enabled: bool,
    /// Cleared while walking
    head_tracking_active: bool,
    head_available: bool,
    /// Last normalized pointer position
    head_target: Vec2,
    /// `None` means the pointer counts as idle
    last_pointer_move: Option<Instant>,
    scheduler: TaskScheduler<DeferredTask>,
    rng: StdRng,
    clock: Arc<dyn Clock>,
    events: VecDeque<StageEvent>,
}

impl InteractionController {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(clock, StdRng::from_entropy())
    }

    /// Deterministic gesture selection
    pub fn with_seed(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            activity: Activity::Idle,
            head_tracking_enabled: true,
            head_tracking_active: true,
            head_available: false,
            head_target: Vec2::ZERO,
            last_pointer_move: None,
            scheduler: TaskScheduler::new(),
            rng,
            clock,
            events: VecDeque::new(),
        }
    }

    /// Enter the initial idle state and start the idle clip
    pub fn start(&mut self, ctx: &mut StageContext) {
        let before = self.state();
        self.head_available = ctx.character.head.is_some();
        self.activity = Activity::Idle;
        self.head_tracking_active = true;
        self.play_idle(ctx);
        info!("Interaction started in {:?}", self.state());
        self.push_state_change(before);
    }

    pub fn state(&self) -> InteractionState {
        match self.activity {
            Activity::Walking { .. } => InteractionState::Walking,
            Activity::Gesture { .. } => InteractionState::PlayingGesture,
            Activity::Idle if self.is_head_tracking() => InteractionState::HeadTracking,
            Activity::Idle => InteractionState::Idle,
        }
    }

    /// Present only while walking
    pub fn walk_target(&self) -> Option<Vec3> {
        match self.activity {
            Activity::Walking { target } => Some(target),
            _ => None,
        }
    }

    /// Whether pointer movement currently drives the head joint
    pub fn is_head_tracking(&self) -> bool {
        self.head_available
            && self.head_tracking_enabled
            && self.head_tracking_active
            && !matches!(self.activity, Activity::Walking { .. })
    }

    pub fn head_tracking_enabled(&self) -> bool {
        self.head_tracking_enabled
    }

    pub fn head_target(&self) -> Vec2 {
        self.head_target
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// True when no pointer movement was seen within the idle timeout
    pub fn pointer_idle(&self, timeout: Duration) -> bool {
        match self.last_pointer_move {
            None => true,
            Some(at) => self.clock.now().saturating_duration_since(at) > timeout,
        }
    }

    pub fn drain_events(&mut self) -> Vec<StageEvent> {
        self.events.drain(..).collect()
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Click or tap at a window position
    pub fn on_click(&mut self, ctx: &mut StageContext, client: Vec2) {
        let ndc = pointer_to_ndc(client, &ctx.canvas);
        let ray = ctx.camera.ray_from_ndc(ndc);
        match ctx.world.pick(&ray) {
            Some(HitKind::Ground { point }) => {
                let limit = ctx.config.interaction.ground_half_extent;
                if point.x.abs() > limit || point.z.abs() > limit {
                    debug!("Ground hit {:?} outside walkable area", point);
                    return;
                }
                let target = Vec3::new(point.x, ctx.config.physics.ground_offset, point.z);
                self.walk_to(ctx, target);
            }
            Some(HitKind::Character { .. }) => {
                self.play_random_gesture(ctx);
            }
            None => debug!("Click at {:?} hit nothing", client),
        }
    }

    /// Only single-finger touches act as a click
    pub fn on_touch_start(&mut self, ctx: &mut StageContext, touches: &[Vec2]) {
        if let [touch] = touches {
            self.on_click(ctx, *touch);
        }
    }

    /// Document-wide pointer movement, in window pixels
    pub fn on_global_pointer_move(&mut self, ctx: &mut StageContext, client: Vec2) {
        if !self.is_head_tracking() {
            return;
        }
        let Some(head) = ctx.character.head.as_mut() else {
            return;
        };
        self.last_pointer_move = Some(self.clock.now());
        self.head_target = window_to_normalized(client, &ctx.viewport);
        head.rotation = motion::aim_head(
            head.rotation,
            self.head_target,
            &ctx.config.movement.head.tracking,
        );
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Walk to `target`. While already walking only the destination changes.
    pub fn walk_to(&mut self, ctx: &mut StageContext, target: Vec3) {
        if let Activity::Walking { target: current } = &mut self.activity {
            *current = target;
            debug!("Walk retargeted to {:?}", target);
            self.events.push_back(StageEvent::WalkRetargeted { target });
            return;
        }

        let before = self.state();
        self.activity = Activity::Walking { target };
        self.head_tracking_active = false;

        let character = &mut ctx.character;
        character.mixer.stop_all();
        if let Some(walk) = character.clips.role(ClipRole::Walking) {
            let scale = ctx.config.animation.time_scale.walking;
            character
                .mixer
                .play(walk, PlayOptions::looping().with_time_scale(scale));
            self.push_clip_started(ctx, walk);
        }
        debug!("Walking to {:?}", target);
        self.events.push_back(StageEvent::WalkStarted { target });
        self.push_state_change(before);
    }

    /// Play a random gesture once. Ignored while walking or while another gesture
    /// is still pending; a no-op when there is nothing to choose from.
    pub fn play_random_gesture(&mut self, ctx: &mut StageContext) -> Option<ClipId> {
        let blocked = match self.activity {
            Activity::Walking { .. } => Some(GestureIgnoreReason::Walking),
            Activity::Gesture { .. } => Some(GestureIgnoreReason::GestureActive),
            Activity::Idle => None,
        };
        if let Some(reason) = blocked {
            debug!("Gesture ignored: {:?}", reason);
            self.events.push_back(StageEvent::GestureIgnored { reason });
            return None;
        }

        let candidates = ctx
            .character
            .clips
            .gesture_candidates(&ctx.config.animation.exclude_from_random);
        let Some(&clip) = candidates.choose(&mut self.rng) else {
            debug!("Gesture ignored: no candidate clips");
            self.events.push_back(StageEvent::GestureIgnored {
                reason: GestureIgnoreReason::NoCandidates,
            });
            return None;
        };
        self.start_gesture(ctx, clip);
        Some(clip)
    }

    fn start_gesture(&mut self, ctx: &mut StageContext, clip: ClipId) {
        let before = self.state();
        let scale = ctx.config.animation.time_scale.default;
        let duration = ctx.character.mixer.duration(clip).unwrap_or(0.0);

        ctx.character.mixer.stop_all();
        ctx.character
            .mixer
            .play(clip, PlayOptions::once_clamped().with_time_scale(scale));

        let delay = match Duration::try_from_secs_f32((duration / scale).max(0.0)) {
            Ok(delay) if delay <= MAX_GESTURE_DELAY => delay,
            _ => {
                warn!(
                    "Gesture duration {}s at scale {} is out of range, capping at {:?}",
                    duration, scale, MAX_GESTURE_DELAY
                );
                MAX_GESTURE_DELAY
            }
        };
        let now = self.clock.now();
        let due = now.checked_add(delay).unwrap_or(now);
        let token = self.scheduler.schedule(due, DeferredTask::ReturnToIdle);
        self.activity = Activity::Gesture { clip, token };

        let name = ctx.character.clips.name(clip).unwrap_or_default().to_string();
        debug!("Gesture '{}' for {:.2}s (token {:?})", name, delay.as_secs_f32(), token);
        self.events.push_back(StageEvent::GestureStarted {
            clip,
            name,
            duration,
        });
        self.push_state_change(before);
    }

    /// Fire due deferred tasks; stale ones are ignored
    pub fn poll_timers(&mut self, ctx: &mut StageContext) {
        let now = self.clock.now();
        for (token, task) in self.scheduler.take_due(now) {
            match task {
                DeferredTask::ReturnToIdle => {
                    let current = matches!(
                        self.activity,
                        Activity::Gesture { token: active, .. } if active == token
                    );
                    if !current {
                        debug!("Ignoring stale idle-return timer {:?}", token);
                        self.events.push_back(StageEvent::StaleTimerIgnored { token });
                        continue;
                    }
                    let before = self.state();
                    self.activity = Activity::Idle;
                    self.play_idle(ctx);
                    self.events.push_back(StageEvent::IdleResumed);
                    self.push_state_change(before);
                }
            }
        }
    }

    /// Per-frame update with the elapsed time in seconds
    pub fn frame(&mut self, ctx: &mut StageContext, dt: f32) {
        let dt = dt.max(0.0);
        ctx.character.mixer.advance(dt);
        self.relax_head(ctx);
        self.integrate_walk(ctx, dt);
    }

    fn relax_head(&mut self, ctx: &mut StageContext) {
        if !self.is_head_tracking() {
            return;
        }
        let timeout = Duration::from_millis(ctx.config.interaction.pointer_idle_timeout_ms);
        if !self.pointer_idle(timeout) {
            return;
        }
        if let Some(head) = ctx.character.head.as_mut() {
            head.rotation = motion::relax_head(head.rotation, &ctx.config.movement.head.rest);
        }
    }

    fn integrate_walk(&mut self, ctx: &mut StageContext, dt: f32) {
        let Activity::Walking { target } = self.activity else {
            return;
        };
        let walking = &ctx.config.movement.walking;
        let pose = &mut ctx.character.pose;

        if pose.position.distance(target) <= walking.min_distance {
            self.arrive(ctx, target);
            return;
        }

        let direction = (target - pose.position).normalize_or_zero();
        if direction != Vec3::ZERO {
            let desired = motion::yaw_towards(direction);
            pose.yaw = motion::step_yaw(pose.yaw, desired, walking.turn_rate * dt);
        }
        pose.position = motion::step_position(pose.position, target, walking.speed * dt);

        if pose.position.distance(target) <= walking.min_distance {
            self.arrive(ctx, target);
        }
    }

    fn arrive(&mut self, ctx: &mut StageContext, target: Vec3) {
        let before = self.state();
        let pose = &mut ctx.character.pose;
        pose.position = target;
        pose.restore_home_rotation();

        self.activity = Activity::Idle;
        self.head_tracking_active = true;
        self.last_pointer_move = None;
        self.play_idle(ctx);

        info!("Arrived at {:?}", target);
        self.events.push_back(StageEvent::Arrived { position: target });
        self.push_state_change(before);
    }

    pub fn set_head_tracking_enabled(&mut self, ctx: &mut StageContext, enabled: bool) {
        if self.head_tracking_enabled == enabled {
            return;
        }
        let before = self.state();
        self.head_tracking_enabled = enabled;
        if !enabled {
            if let Some(head) = ctx.character.head.as_mut() {
                head.reset();
            }
        }
        debug!("Head tracking {}", if enabled { "enabled" } else { "disabled" });
        self.events.push_back(StageEvent::HeadTrackingChanged { enabled });
        self.push_state_change(before);
    }

    /// Back to the home pose in idle, dropping any walk or pending gesture
    pub fn reset(&mut self, ctx: &mut StageContext) {
        let before = self.state();
        self.scheduler.clear();
        self.activity = Activity::Idle;
        self.head_tracking_active = true;
        self.last_pointer_move = None;
        self.head_target = Vec2::ZERO;

        ctx.character.pose.restore_home();
        if let Some(head) = ctx.character.head.as_mut() {
            head.reset();
        }
        self.play_idle(ctx);

        info!("Stage reset to home pose");
        self.events.push_back(StageEvent::Reset);
        self.push_state_change(before);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn play_idle(&mut self, ctx: &mut StageContext) {
        let character = &mut ctx.character;
        character.mixer.stop_all();
        match character.clips.role(ClipRole::Idle) {
            Some(idle) => {
                let scale = ctx.config.animation.time_scale.idle;
                character
                    .mixer
                    .play(idle, PlayOptions::looping().with_time_scale(scale));
                self.push_clip_started(ctx, idle);
            }
            None => debug!("No idle clip, holding bind pose"),
        }
    }

    fn push_clip_started(&mut self, ctx: &StageContext, clip: ClipId) {
        let name = ctx.character.clips.name(clip).unwrap_or_default().to_string();
        self.events.push_back(StageEvent::ClipStarted { clip, name });
    }

    fn push_state_change(&mut self, before: InteractionState) {
        let after = self.state();
        if before != after {
            debug!("State {:?} -> {:?}", before, after);
            self.events.push_back(StageEvent::StateChanged {
                from: before,
                to: after,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RobotConfig;
    use crate::world::camera::Viewport;
    use crate::world::gltf_loader::create_test_robot;
    use crate::world::skeleton::AnimationClip;

    struct Harness {
        clock: Arc<ManualClock>,
        ctx: StageContext,
        controller: InteractionController,
    }

    fn harness_with(asset: crate::world::gltf_loader::CharacterAsset, config: RobotConfig) -> Harness {
        let clock = Arc::new(ManualClock::new());
        let mut ctx = StageContext::new(asset, config, Viewport::new(800.0, 600.0)).unwrap();
        let mut controller = InteractionController::with_seed(clock.clone(), 7);
        controller.start(&mut ctx);
        controller.drain_events();
        Harness {
            clock,
            ctx,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(create_test_robot(), RobotConfig::default())
    }

    impl Harness {
        fn run(&mut self, seconds: f32, dt: f32) {
            let steps = (seconds / dt).round() as usize;
            for _ in 0..steps {
                self.clock.advance_secs(dt);
                self.controller.poll_timers(&mut self.ctx);
                self.controller.frame(&mut self.ctx, dt);
            }
        }

        fn head_rotation(&self) -> Vec3 {
            self.ctx.character.head.as_ref().unwrap().rotation
        }
    }

    #[test]
    fn test_starts_head_tracking_with_idle_clip() {
        let h = harness();
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        let idle = h.ctx.character.clips.role(ClipRole::Idle).unwrap();
        assert!(h.ctx.character.mixer.is_playing(idle));
        assert_eq!(h.controller.walk_target(), None);
    }

    #[test]
    fn test_headless_character_is_plain_idle() {
        let mut asset = create_test_robot();
        for bone in &mut asset.skeleton.bones {
            bone.name = bone.name.replace("Head", "Crown").replace("Neck", "Collar");
        }
        asset.skeleton.bone_names = asset
            .skeleton
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
        let mut h = harness_with(asset, RobotConfig::default());
        assert_eq!(h.controller.state(), InteractionState::Idle);
        // Pointer moves are ignored without a head joint
        h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(10.0, 10.0));
        assert_eq!(h.controller.head_target(), Vec2::ZERO);
    }

    #[test]
    fn test_walk_suppresses_head_tracking_and_arrives_exactly() {
        let mut h = harness();
        let target = Vec3::new(2.0, 0.1, -1.0);
        h.controller.walk_to(&mut h.ctx, target);
        assert_eq!(h.controller.state(), InteractionState::Walking);
        assert_eq!(h.controller.walk_target(), Some(target));
        assert!(!h.controller.is_head_tracking());

        let walk = h.ctx.character.clips.role(ClipRole::Walking).unwrap();
        assert_eq!(h.ctx.character.mixer.active_clips(), vec![walk]);

        h.run(3.0, 1.0 / 60.0);
        assert_eq!(h.ctx.character.pose.position, target);
        assert_eq!(h.ctx.character.pose.yaw, h.ctx.character.pose.home_yaw);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        assert_eq!(h.controller.walk_target(), None);

        let events = h.controller.drain_events();
        assert!(events.contains(&StageEvent::Arrived { position: target }));
    }

    #[test]
    fn test_retarget_while_walking() {
        let mut h = harness();
        h.controller.walk_to(&mut h.ctx, Vec3::new(5.0, 0.1, 0.0));
        h.run(0.5, 0.1);
        h.controller.drain_events();

        let second = Vec3::new(-3.0, 0.1, 2.0);
        h.controller.walk_to(&mut h.ctx, second);
        assert_eq!(h.controller.walk_target(), Some(second));
        assert_eq!(
            h.controller.drain_events(),
            vec![StageEvent::WalkRetargeted { target: second }]
        );
    }

    #[test]
    fn test_movement_never_overshoots() {
        let mut h = harness();
        let target = Vec3::new(-4.0, 0.1, 3.0);
        h.controller.walk_to(&mut h.ctx, target);
        let mut previous = h.ctx.character.pose.position;
        // Irregular frame times
        for dt in [0.016, 0.5, 0.033, 0.25, 1.0, 0.016, 2.0, 0.1].iter().cycle().take(40) {
            h.clock.advance_secs(*dt);
            h.controller.frame(&mut h.ctx, *dt);
            let now = h.ctx.character.pose.position;
            assert!(now.distance(target) <= previous.distance(target) + 1e-5);
            let along = (now - previous).length() + now.distance(target);
            assert!((along - previous.distance(target)).abs() < 1e-3);
            previous = now;
        }
        assert_eq!(previous, target);
    }

    #[test]
    fn test_yaw_turn_is_rate_limited() {
        let mut h = harness();
        let start_yaw = h.ctx.character.pose.yaw;
        h.controller.walk_to(&mut h.ctx, Vec3::new(-5.0, 0.1, -5.0));
        let dt = 0.02;
        h.controller.frame(&mut h.ctx, dt);
        let turned = motion::shortest_angle(start_yaw, h.ctx.character.pose.yaw).abs();
        assert!(turned <= 8.0 * dt + 1e-5);
        assert!(turned > 0.0);
    }

    #[test]
    fn test_gesture_returns_to_idle_after_duration() {
        let mut h = harness();
        let clip = h.controller.play_random_gesture(&mut h.ctx).unwrap();
        assert_eq!(h.controller.state(), InteractionState::PlayingGesture);
        let duration = h.ctx.character.mixer.duration(clip).unwrap();
        assert!(h.ctx.character.mixer.is_playing(clip));

        h.run(duration - 0.1, 0.05);
        assert_eq!(h.controller.state(), InteractionState::PlayingGesture);
        h.run(0.2, 0.05);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        let idle = h.ctx.character.clips.role(ClipRole::Idle).unwrap();
        assert_eq!(h.ctx.character.mixer.active_clips(), vec![idle]);
        assert!(h.controller.drain_events().contains(&StageEvent::IdleResumed));
    }

    #[test]
    fn test_gesture_never_idle_or_walking() {
        let mut h = harness();
        let idle = h.ctx.character.clips.role(ClipRole::Idle).unwrap();
        let walk = h.ctx.character.clips.role(ClipRole::Walking).unwrap();
        for _ in 0..30 {
            let clip = h.controller.play_random_gesture(&mut h.ctx).unwrap();
            assert_ne!(clip, idle);
            assert_ne!(clip, walk);
            h.controller.reset(&mut h.ctx);
        }
    }

    #[test]
    fn test_walk_during_gesture_makes_timer_stale() {
        let mut h = harness();
        let clip = h.controller.play_random_gesture(&mut h.ctx).unwrap();
        let duration = h.ctx.character.mixer.duration(clip).unwrap();

        // Long walk so it is still in progress when the timer fires
        h.controller.walk_to(&mut h.ctx, Vec3::new(9.0, 0.1, 9.0));
        h.run(duration + 0.2, 0.05);

        assert_eq!(h.controller.state(), InteractionState::Walking);
        let idle = h.ctx.character.clips.role(ClipRole::Idle).unwrap();
        assert!(!h.ctx.character.mixer.is_playing(idle));
        let events = h.controller.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, StageEvent::StaleTimerIgnored { .. })));
        assert!(!events.contains(&StageEvent::IdleResumed));
    }

    #[test]
    fn test_gesture_ignored_while_walking_or_active() {
        let mut h = harness();
        h.controller.play_random_gesture(&mut h.ctx).unwrap();
        assert_eq!(h.controller.play_random_gesture(&mut h.ctx), None);
        assert!(h.controller.drain_events().contains(&StageEvent::GestureIgnored {
            reason: GestureIgnoreReason::GestureActive
        }));

        h.controller.reset(&mut h.ctx);
        h.controller.walk_to(&mut h.ctx, Vec3::new(3.0, 0.1, 3.0));
        h.controller.drain_events();
        assert_eq!(h.controller.play_random_gesture(&mut h.ctx), None);
        assert_eq!(h.controller.state(), InteractionState::Walking);
        assert_eq!(
            h.controller.drain_events(),
            vec![StageEvent::GestureIgnored {
                reason: GestureIgnoreReason::Walking
            }]
        );
    }

    #[test]
    fn test_empty_gesture_pool_is_noop() {
        let mut asset = create_test_robot();
        asset.clips.retain(|c| c.name == "Idle" || c.name == "Walking");
        let mut h = harness_with(asset, RobotConfig::default());
        let before = h.ctx.character.mixer.active_clips();

        assert_eq!(h.controller.play_random_gesture(&mut h.ctx), None);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        assert_eq!(h.ctx.character.mixer.active_clips(), before);
        assert_eq!(h.controller.pending_tasks(), 0);
    }

    #[test]
    fn test_single_candidate_always_chosen() {
        let mut config = RobotConfig::default();
        config.animation.exclude_from_random = vec!["Wave".into(), "Jump".into()];
        let mut h = harness_with(create_test_robot(), config);
        let thumbs = h.ctx.character.clips.id("ThumbsUp").unwrap();
        for _ in 0..10 {
            assert_eq!(h.controller.play_random_gesture(&mut h.ctx), Some(thumbs));
            h.controller.reset(&mut h.ctx);
        }
    }

    #[test]
    fn test_gesture_without_idle_clip() {
        let mut asset = create_test_robot();
        asset.clips.retain(|c| c.name == "Wave");
        let mut h = harness_with(asset, RobotConfig::default());
        assert!(h.ctx.character.mixer.active_clips().is_empty());

        h.controller.play_random_gesture(&mut h.ctx).unwrap();
        h.run(2.0, 0.1);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        assert!(h.ctx.character.mixer.active_clips().is_empty());
    }

    #[test]
    fn test_pointer_move_aims_head() {
        let mut h = harness();
        // Right edge, vertical center of an 800x600 window
        h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(800.0, 300.0));
        let r = h.head_rotation();
        assert!((h.controller.head_target() - Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert!((r.y - 0.24).abs() < 1e-5);
        assert!(r.x.abs() < 1e-6);

        // Repeated moves converge toward the sensitivity-scaled target
        for _ in 0..100 {
            h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(800.0, 300.0));
        }
        assert!((h.head_rotation().y - 1.2).abs() < 1e-3);
    }

    #[test]
    fn test_head_relaxes_after_pointer_idle() {
        let mut h = harness();
        for _ in 0..50 {
            h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(0.0, 0.0));
        }
        let aimed = h.head_rotation();
        assert!(aimed.y < -1.0);

        // Inside the timeout nothing changes
        h.run(1.0, 0.1);
        assert_eq!(h.head_rotation(), aimed);

        // Past it, the head heads back to neutral instead of the pointer
        h.run(1.5, 0.1);
        let relaxed = h.head_rotation();
        assert!(relaxed.y.abs() < aimed.y.abs());
        assert!(relaxed.x.abs() < aimed.x.abs());
        h.run(10.0, 0.1);
        assert!(h.head_rotation().length() < 1e-3);
    }

    #[test]
    fn test_pointer_ignored_while_walking() {
        let mut h = harness();
        h.controller.walk_to(&mut h.ctx, Vec3::new(4.0, 0.1, 4.0));
        let before = h.head_rotation();
        h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(800.0, 0.0));
        assert_eq!(h.head_rotation(), before);
    }

    #[test]
    fn test_toggle_head_tracking() {
        let mut h = harness();
        h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(800.0, 0.0));
        h.controller.set_head_tracking_enabled(&mut h.ctx, false);
        assert_eq!(h.head_rotation(), Vec3::ZERO);
        assert_eq!(h.controller.state(), InteractionState::Idle);
        h.controller.on_global_pointer_move(&mut h.ctx, Vec2::new(800.0, 0.0));
        assert_eq!(h.head_rotation(), Vec3::ZERO);

        h.controller.set_head_tracking_enabled(&mut h.ctx, true);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        let events = h.controller.drain_events();
        assert!(events.contains(&StageEvent::HeadTrackingChanged { enabled: true }));
    }

    #[test]
    fn test_reset_restores_home_and_cancels_gesture() {
        let mut h = harness();
        h.controller.play_random_gesture(&mut h.ctx).unwrap();
        h.controller.reset(&mut h.ctx);
        assert_eq!(h.controller.pending_tasks(), 0);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);

        h.controller.walk_to(&mut h.ctx, Vec3::new(3.0, 0.1, 0.0));
        h.run(0.5, 0.1);
        h.controller.reset(&mut h.ctx);
        let pose = h.ctx.character.pose;
        assert_eq!(pose.position, pose.home_position);
        assert_eq!(pose.yaw, pose.home_yaw);
        assert_eq!(h.controller.walk_target(), None);
    }

    #[test]
    fn test_touch_requires_single_point() {
        let mut h = harness();
        let center = Vec2::new(400.0, 300.0);
        h.controller.on_touch_start(&mut h.ctx, &[center, center]);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        h.controller.on_touch_start(&mut h.ctx, &[center]);
        assert_eq!(h.controller.state(), InteractionState::PlayingGesture);
    }

    #[test]
    fn test_click_ground_walks_to_offset_target() {
        let mut h = harness();
        let point = Vec3::new(-4.0, 0.0, 0.0);
        let pixel = h.ctx.camera.world_to_canvas(point, &h.ctx.canvas).unwrap();
        h.controller.on_click(&mut h.ctx, pixel);
        let target = h.controller.walk_target().unwrap();
        assert!((target - Vec3::new(-4.0, 0.1, 0.0)).length() < 1e-2);
        assert_eq!(target.y, 0.1);
    }

    #[test]
    fn test_click_outside_walkable_area_ignored() {
        let mut config = RobotConfig::default();
        config.interaction.ground_half_extent = 2.0;
        let mut h = harness_with(create_test_robot(), config);
        let pixel = h
            .ctx
            .camera
            .world_to_canvas(Vec3::new(-4.0, 0.0, 0.0), &h.ctx.canvas)
            .unwrap();
        h.controller.on_click(&mut h.ctx, pixel);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
    }

    #[test]
    fn test_zero_length_gesture_returns_immediately() {
        let mut asset = create_test_robot();
        asset.clips.retain(|c| c.name == "Idle");
        asset.clips.push(AnimationClip::new("Blink", 0.0));
        let mut h = harness_with(asset, RobotConfig::default());
        h.controller.play_random_gesture(&mut h.ctx).unwrap();
        h.controller.poll_timers(&mut h.ctx);
        assert_eq!(h.controller.state(), InteractionState::HeadTracking);
    }

    #[test]
    fn test_unbounded_gesture_duration_is_capped() {
        for duration in [f32::INFINITY, 1e20] {
            let mut asset = create_test_robot();
            asset.clips.retain(|c| c.name == "Idle");
            asset.clips.push(AnimationClip::new("Huge", duration));
            let mut h = harness_with(asset, RobotConfig::default());

            h.controller.play_random_gesture(&mut h.ctx).unwrap();
            assert_eq!(h.controller.state(), InteractionState::PlayingGesture);
            assert_eq!(h.controller.pending_tasks(), 1);

            h.clock.advance(MAX_GESTURE_DELAY - Duration::from_secs(1));
            h.controller.poll_timers(&mut h.ctx);
            assert_eq!(h.controller.state(), InteractionState::PlayingGesture);

            h.clock.advance(Duration::from_secs(1));
            h.controller.poll_timers(&mut h.ctx);
            assert_eq!(h.controller.state(), InteractionState::HeadTracking);
        }
    }
}
