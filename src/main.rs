use anyhow::{Context, Result};
use clap::Parser;
use glam::{Vec2, Vec3};
use log::{error, info};
use robot_stage::clock::{Clock, ManualClock};
use robot_stage::diagnostics::{ErrorLog, Severity};
use robot_stage::shell::StatusBoard;
use robot_stage::world::camera::Viewport;
use robot_stage::{RobotConfig, Stage, StageEvent};
use std::path::PathBuf;
use std::sync::Arc;

/// Replay a scripted pointer session against the robot stage in simulated time
#[derive(Parser, Debug)]
#[command(name = "robot-stage", version)]
struct Args {
    /// glTF/GLB character model (defaults to the built-in robot)
    #[arg(long)]
    model: Option<PathBuf>,

    /// JSON file overriding any subset of the default configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 12.0)]
    seconds: f32,

    /// Simulated frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Seed for gesture selection
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 800.0)]
    width: f32,

    #[arg(long, default_value_t = 600.0)]
    height: f32,

    /// Append serious errors to this JSON file
    #[arg(long)]
    error_report: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug)]
enum ScriptAction {
    PointerMove(Vec2),
    /// Click at the canvas position of a world point
    ClickWorld(Vec3),
    ClickCenter,
    Touch(Vec2),
    Resize(f32, f32),
}

fn script(viewport: Viewport) -> Vec<(f32, ScriptAction)> {
    let center = Vec2::new(viewport.width * 0.5, viewport.height * 0.5);
    vec![
        (0.5, ScriptAction::PointerMove(Vec2::new(viewport.width * 0.75, viewport.height * 0.25))),
        (1.0, ScriptAction::ClickCenter),
        (3.0, ScriptAction::ClickWorld(Vec3::new(-4.0, 0.0, 0.0))),
        (3.5, ScriptAction::ClickCenter),
        (4.0, ScriptAction::ClickWorld(Vec3::new(3.0, 0.0, -3.0))),
        (9.0, ScriptAction::Resize(viewport.width * 1.5, viewport.height)),
        (9.5, ScriptAction::Touch(center)),
    ]
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("robot-stage {}", env!("CARGO_PKG_VERSION"));

    let clock = Arc::new(ManualClock::new());
    let config = match &args.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let viewport = Viewport::new(args.width, args.height);

    let mut stage = match Stage::load(
        args.model.as_deref(),
        config,
        viewport,
        clock.clone(),
        args.seed,
    ) {
        Ok(stage) => stage,
        Err(e) => {
            let mut errors = ErrorLog::new(clock.clone());
            if let Some(path) = &args.error_report {
                errors = errors.with_report_file(path);
            }
            errors.record_error(Severity::Critical, "loading", &e);
            let mut shell = StatusBoard::new();
            shell.show_error(format!("{:#}", e), clock.now());
            error!("Stage status: {}", shell.status().text());
            return Err(e);
        }
    };
    if let Some(path) = &args.error_report {
        stage.errors_mut().set_report_file(path);
    }

    let fps = args.fps.max(1);
    let dt = 1.0 / fps as f32;
    let frames = (args.seconds.max(0.0) * fps as f32).round() as u64;
    let mut pending = script(viewport).into_iter().peekable();
    let mut elapsed = 0.0f32;

    for _ in 0..frames {
        while let Some((_, action)) = pending.next_if(|(at, _)| *at <= elapsed) {
            apply(&mut stage, action);
        }
        clock.advance_secs(dt);
        elapsed += dt;
        for event in stage.frame(dt) {
            log_event(&event);
        }
    }

    let snapshot = serde_json::to_string_pretty(&stage.snapshot())
        .context("Failed to serialize stage snapshot")?;
    println!("{}", snapshot);
    info!(
        "Finished {:.2}s in state {:?} ({} recorded errors)",
        elapsed,
        stage.state(),
        stage.errors().len()
    );
    Ok(())
}

fn apply(stage: &mut Stage, action: ScriptAction) {
    info!("Input: {:?}", action);
    match action {
        ScriptAction::PointerMove(p) => stage.on_pointer_move(p),
        ScriptAction::ClickCenter => {
            let canvas = stage.context().canvas;
            stage.on_click(Vec2::new(
                canvas.left + canvas.width * 0.5,
                canvas.top + canvas.height * 0.5,
            ));
        }
        ScriptAction::ClickWorld(point) => {
            let pixel = {
                let ctx = stage.context();
                ctx.camera.world_to_canvas(point, &ctx.canvas)
            };
            match pixel {
                Some(pixel) => stage.on_click(pixel),
                None => stage.report_error(
                    Severity::Low,
                    "input",
                    &format!("Scripted point {:?} is off screen", point),
                ),
            }
        }
        ScriptAction::Touch(p) => stage.on_touch_start(&[p]),
        ScriptAction::Resize(w, h) => stage.on_resize(w, h),
    }
}

fn log_event(event: &StageEvent) {
    match event {
        StageEvent::StateChanged { from, to } => info!("State {:?} -> {:?}", from, to),
        StageEvent::GestureStarted { name, duration, .. } => {
            info!("Gesture '{}' ({:.2}s)", name, duration)
        }
        StageEvent::Arrived { position } => info!("Arrived at {:?}", position),
        other => log::debug!("{:?}", other),
    }
}
