//! Headless presentation model: status badge, canvas state, loading indicator and
//! timed notifications. It only reacts to `StageEvent`s and never drives the
//! interaction controller.

use crate::interaction::{InteractionState, StageEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MAX_NOTIFICATIONS: usize = 5;
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(3000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotStatus {
    Loading,
    Idle,
    Walking,
    Performing,
    Error,
}

impl RobotStatus {
    pub fn text(self) -> &'static str {
        match self {
            RobotStatus::Loading => "Loading",
            RobotStatus::Idle => "Idle",
            RobotStatus::Walking => "Walking",
            RobotStatus::Performing => "Performing",
            RobotStatus::Error => "Error",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            RobotStatus::Loading => "#3498db",
            RobotStatus::Idle => "#95a5a6",
            RobotStatus::Walking => "#2ecc71",
            RobotStatus::Performing => "#9b59b6",
            RobotStatus::Error => "#e74c3c",
        }
    }

    pub fn from_state(state: InteractionState) -> Self {
        match state {
            InteractionState::Idle | InteractionState::HeadTracking => RobotStatus::Idle,
            InteractionState::Walking => RobotStatus::Walking,
            InteractionState::PlayingGesture => RobotStatus::Performing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasState {
    Loading,
    Ready,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn color(self) -> &'static str {
        match self {
            NotificationKind::Info => "#3498db",
            NotificationKind::Success => "#2ecc71",
            NotificationKind::Warning => "#f39c12",
            NotificationKind::Error => "#e74c3c",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub created: Instant,
    /// `None` stays until dismissed
    pub duration: Option<Duration>,
}

impl Notification {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.duration
            .map(|d| now.saturating_duration_since(self.created) >= d)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LoadingProgress {
    pub visible: bool,
    pub message: String,
    pub percent: u8,
}

impl LoadingProgress {
    pub fn show(&mut self, message: impl Into<String>) {
        self.visible = true;
        self.message = message.into();
        self.percent = 0;
    }

    /// `fraction` is clamped to [0, 1]
    pub fn set_fraction(&mut self, fraction: f32) {
        self.percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}

pub struct StatusBoard {
    status: RobotStatus,
    canvas: CanvasState,
    pub loading: LoadingProgress,
    notifications: VecDeque<Notification>,
    next_id: u64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            status: RobotStatus::Loading,
            canvas: CanvasState::Loading,
            loading: LoadingProgress::default(),
            notifications: VecDeque::new(),
            next_id: 1,
        }
    }

    pub fn status(&self) -> RobotStatus {
        self.status
    }

    pub fn canvas(&self) -> CanvasState {
        self.canvas
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn set_ready(&mut self, state: InteractionState) {
        self.loading.set_fraction(1.0);
        self.loading.hide();
        self.canvas = CanvasState::Ready;
        self.status = RobotStatus::from_state(state);
    }

    pub fn show_error(&mut self, message: impl Into<String>, now: Instant) {
        self.loading.hide();
        self.canvas = CanvasState::Error;
        self.status = RobotStatus::Error;
        self.notify(NotificationKind::Error, message, now);
    }

    /// Queue a notification with the default duration; the oldest is dropped
    /// when the queue is full.
    pub fn notify(&mut self, kind: NotificationKind, message: impl Into<String>, now: Instant) -> u64 {
        self.notify_for(kind, message, Some(DEFAULT_NOTIFICATION_DURATION), now)
    }

    pub fn notify_for(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        duration: Option<Duration>,
        now: Instant,
    ) -> u64 {
        if self.notifications.len() >= MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        let id = self.next_id;
        self.next_id += 1;
        self.notifications.push_back(Notification {
            id,
            kind,
            message: message.into(),
            created: now,
            duration,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    /// Drop expired notifications
    pub fn prune(&mut self, now: Instant) {
        self.notifications.retain(|n| !n.is_expired(now));
    }

    pub fn apply(&mut self, event: &StageEvent, now: Instant) {
        match event {
            StageEvent::StateChanged { to, .. } => {
                if self.status != RobotStatus::Error {
                    self.status = RobotStatus::from_state(*to);
                }
            }
            StageEvent::GestureStarted { name, .. } => {
                self.notify(NotificationKind::Info, format!("Playing '{}'", name), now);
            }
            StageEvent::Reset => {
                self.notify(NotificationKind::Success, "Robot returned home", now);
            }
            _ => {}
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
