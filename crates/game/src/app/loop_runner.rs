use std::process::ExitCode;

use pixelstage::{EntityId, GameContext, RenderReport};
use tracing::{debug, info, warn};

use super::bootstrap::AppWiring;
use super::config::GameConfig;
use super::gameplay::{PROJECTILE_TAG, SHOTS_FIRED_KEY};
use super::render::RecordingCanvas;

const SPRITE_KEYS: [&str; 3] = ["player", "projectile", "spinner"];
const SUMMARY_INTERVAL_TICKS: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) collisions: usize,
    pub(crate) spawned: usize,
    pub(crate) despawned: usize,
    pub(crate) render_failures: usize,
    pub(crate) quit_early: bool,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        mut game,
        player,
    } = app;
    let summary = run_headless(&config, &mut game);
    let shots = shots_fired(&game, player);
    info!(
        ticks = summary.ticks,
        collisions = summary.collisions,
        spawned = summary.spawned,
        despawned = summary.despawned,
        render_failures = summary.render_failures,
        quit_early = summary.quit_early,
        shots_fired = shots,
        "run_complete"
    );

    for line in &config.console_commands {
        match game.run_console(line) {
            Some(output) => {
                info!(command = %line, "console");
                for out in output {
                    info!("  {out}");
                }
            }
            None => {
                warn!(command = %line, "console_unavailable_without_debug_tracking");
                break;
            }
        }
    }
    info!("shutdown");
    ExitCode::SUCCESS
}

/// Drives `config.ticks` fixed ticks with the scripted input, rendering after
/// each one.
pub(crate) fn run_headless(config: &GameConfig, game: &mut GameContext) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut canvas = RecordingCanvas::new(SPRITE_KEYS);
    let frame_dt = game.clock().fixed_dt();

    for tick in 0..config.ticks {
        let input = config.input_for_tick(tick);
        let report = game.frame(frame_dt, &input);
        summary.ticks += u64::from(report.ticks);
        summary.collisions += report.collisions;
        summary.spawned += report.spawned;
        summary.despawned += report.despawned;

        canvas.begin_frame();
        let RenderReport { failed, .. } = game.render(&mut canvas);
        summary.render_failures += failed;

        if report.quit_requested {
            info!(tick, reason = "quit_action", "shutdown_requested");
            summary.quit_early = true;
            break;
        }
        if tick > 0 && tick % SUMMARY_INTERVAL_TICKS == 0 {
            debug!(
                tick,
                entity_count = game.scene().entity_count(),
                projectiles = game.scene().entities_with_tag(PROJECTILE_TAG).count(),
                draw_calls = canvas.calls().len(),
                "loop_progress"
            );
        }
    }
    summary
}

fn shots_fired(game: &GameContext, player: EntityId) -> u64 {
    game.scene()
        .entity(player)
        .and_then(|entity| entity.state.data(SHOTS_FIRED_KEY))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}
