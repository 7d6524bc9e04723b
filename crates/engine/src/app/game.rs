use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::entity::{EntityDesc, EntityId};
use super::input::InputSnapshot;
use super::render::{RenderContext, RenderReport};
use super::scene::Scene;
use super::tools::{DebugConsole, ObjectRef};
use crate::behavior::{BehaviorRegistry, ModuleLoader};
use crate::collision::CollisionGrid;
use crate::error::LoadError;

const DEFAULT_TARGET_TPS: u32 = 60;
const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);
const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub debug_tracking: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_tps: DEFAULT_TARGET_TPS,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            max_ticks_per_frame: DEFAULT_MAX_TICKS_PER_FRAME,
            debug_tracking: false,
        }
    }
}

impl EngineConfig {
    /// Replaces zero values with the defaults.
    pub fn normalized(mut self) -> Self {
        if self.target_tps == 0 {
            self.target_tps = DEFAULT_TARGET_TPS;
        }
        if self.max_frame_delta.is_zero() {
            self.max_frame_delta = DEFAULT_MAX_FRAME_DELTA;
        }
        if self.max_ticks_per_frame == 0 {
            self.max_ticks_per_frame = DEFAULT_MAX_TICKS_PER_FRAME;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

/// Converts variable frame deltas into a whole number of fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(config: &EngineConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            fixed_dt: Duration::from_nanos(1_000_000_000 / u64::from(config.target_tps)),
            max_frame_delta: config.max_frame_delta,
            max_ticks_per_frame: config.max_ticks_per_frame,
            accumulator: Duration::ZERO,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt.as_secs_f32()
    }

    /// Adds a frame delta (clamped to `max_frame_delta`) and plans the ticks it
    /// buys. Backlog beyond `max_ticks_per_frame` is dropped.
    pub fn advance(&mut self, frame_dt: Duration) -> StepPlan {
        let clamped = frame_dt.min(self.max_frame_delta);
        let plan = plan_sim_steps(
            self.accumulator.saturating_add(clamped),
            self.fixed_dt,
            self.max_ticks_per_frame,
        );
        self.accumulator = plan.remaining_accumulator;
        plan
    }
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub ticks: u32,
    pub collisions: usize,
    pub spawned: usize,
    pub despawned: usize,
    pub dropped_backlog: Duration,
    pub quit_requested: bool,
}

/// Everything one running game owns: configuration, the behavior registry,
/// the scene, the fixed-step clock and the player handle.
pub struct GameContext {
    config: EngineConfig,
    registry: BehaviorRegistry,
    scene: Scene,
    clock: FixedStepClock,
    console: Option<DebugConsole>,
    player: Option<EntityId>,
    frames: u64,
}

impl std::fmt::Debug for GameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("scene", &self.scene)
            .field("player", &self.player)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl GameContext {
    pub fn new(config: EngineConfig, loader: impl ModuleLoader + 'static) -> Self {
        let config = config.normalized();
        let mut scene = Scene::new();
        let mut console = None;
        if config.debug_tracking {
            scene = scene.with_tracking();
            scene.track_object("scene", ObjectRef::Scene);
            console = Some(DebugConsole::new());
        }
        info!(
            target_tps = config.target_tps,
            max_frame_delta_ms = config.max_frame_delta.as_millis() as u64,
            max_ticks_per_frame = config.max_ticks_per_frame,
            debug_tracking = config.debug_tracking,
            "engine_config"
        );
        Self {
            clock: FixedStepClock::new(&config),
            config,
            registry: BehaviorRegistry::new(loader),
            scene,
            console,
            player: None,
            frames: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn registry_mut(&mut self) -> &mut BehaviorRegistry {
        &mut self.registry
    }

    pub fn clock(&self) -> &FixedStepClock {
        &self.clock
    }

    pub fn player(&self) -> Option<EntityId> {
        self.player
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Loads the map pair, or falls back to an open field of `fallback_size`
    /// so the viewport edge still blocks movement.
    pub fn load_map_or_open_field(
        &mut self,
        visual: &Path,
        collision: &Path,
        fallback_size: (u32, u32),
    ) -> Result<(), LoadError> {
        match self.scene.load_map(visual, collision) {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(error = %error, width = fallback_size.0, height = fallback_size.1, "map_fallback_open_field");
                self.scene
                    .set_collision_grid(CollisionGrid::open_field(fallback_size.0, fallback_size.1));
                Err(error)
            }
        }
    }

    /// Spawns the player and makes it available as `player()`. Replaces any
    /// previous player handle without despawning it.
    pub fn spawn_player(&mut self, desc: EntityDesc) -> EntityId {
        let id = self.scene.spawn(desc);
        self.scene.apply_pending(&mut self.registry);
        self.scene.track_object("player", ObjectRef::Entity(id));
        self.player = Some(id);
        id
    }

    pub fn spawn(&mut self, desc: EntityDesc) -> EntityId {
        let id = self.scene.spawn(desc);
        self.scene.apply_pending(&mut self.registry);
        id
    }

    pub fn attach_behavior(&mut self, id: EntityId, name: &str) -> bool {
        self.scene.attach_behavior(id, name, &mut self.registry)
    }

    pub fn detach_behavior(&mut self, id: EntityId, name: &str) -> bool {
        self.scene.detach_behavior(id, name)
    }

    pub fn unload_behavior(&mut self, name: &str) -> bool {
        self.registry.unload(name, &mut self.scene)
    }

    /// Runs the fixed ticks that `frame_dt` buys, all with the same input.
    pub fn frame(&mut self, frame_dt: Duration, input: &InputSnapshot) -> FrameReport {
        self.frames = self.frames.saturating_add(1);
        let plan = self.clock.advance(frame_dt);
        let dt = self.clock.fixed_dt_seconds();
        let mut report = FrameReport {
            ticks: plan.ticks_to_run,
            dropped_backlog: plan.dropped_backlog,
            quit_requested: input.quit_requested(),
            ..FrameReport::default()
        };

        for _ in 0..plan.ticks_to_run {
            let tick = self.scene.update(dt, input, &mut self.registry);
            report.collisions += tick.collisions;
            report.spawned += tick.spawned;
            report.despawned += tick.despawned;
        }

        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = self.config.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }
        report
    }

    pub fn render(&self, ctx: &mut dyn RenderContext) -> RenderReport {
        self.scene.render(ctx)
    }

    /// Runs a console line and returns the console's output after it. `None`
    /// when debug tracking is off.
    pub fn run_console(&mut self, line: &str) -> Option<Vec<String>> {
        let console = self.console.as_mut()?;
        console.clear_output_lines();
        console.submit(line, &mut self.scene);
        Some(console.output_lines().map(str::to_string).collect())
    }
}
