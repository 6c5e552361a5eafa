//! Interactive character stage: a rigged robot that walks to clicked ground points,
//! tracks the pointer with its head and plays random gestures when clicked.

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod interaction;
pub mod physics;
pub mod shell;
pub mod stage;
pub mod world;

pub use config::RobotConfig;
pub use interaction::{InteractionState, StageEvent};
pub use stage::{Stage, StageContext, StageSnapshot};
