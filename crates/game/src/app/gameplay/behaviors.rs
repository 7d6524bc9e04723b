use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::task::Poll;

use pixelstage::{
    Behavior, BehaviorContext, EntityDesc, EntityId, EntityState, InputAction, MovementPolicy,
    RenderContext, RenderError, Vec2,
};
use serde_json::{json, Value};
use tracing::debug;

pub(crate) const PLAYER_CONTROL: &str = "player_control";
pub(crate) const SHOOTER: &str = "shooter";
pub(crate) const SHOT_COUNTER: &str = "shot_counter";
pub(crate) const SPINNER: &str = "spinner";
pub(crate) const PROJECTILE: &str = "projectile";

pub(crate) const SHOOT_METHOD: &str = "shoot";
pub(crate) const PROJECTILE_TAG: &str = "projectile";
pub(crate) const SHOTS_FIRED_KEY: &str = "shots_fired";

const SHOT_COOLDOWN_SECONDS: f32 = 0.25;
const PROJECTILE_LIFETIME_SECONDS: f32 = 2.0;
const PROJECTILE_SIZE: f32 = 2.0;
const MUZZLE_RGBA: [u8; 4] = [255, 220, 80, 255];

/// Turns directional input into velocity and remembers the last facing.
pub(crate) struct PlayerControl {
    speed: f32,
    facing: Vec2,
}

impl PlayerControl {
    pub(crate) fn new(speed: f32) -> Self {
        Self {
            speed,
            facing: Vec2::new(1.0, 0.0),
        }
    }
}

impl Behavior for PlayerControl {
    fn init(&mut self, ctx: &mut BehaviorContext<'_>) -> Poll<()> {
        ctx.state.movement = MovementPolicy::AxisSeparated;
        ctx.state.solid = true;
        Poll::Ready(())
    }

    fn update(&mut self, ctx: &mut BehaviorContext<'_>, _dt: f32) {
        let axis = ctx.input().move_axis();
        let length = axis.length();
        if length > 0.0 {
            self.facing = axis.scaled(1.0 / length);
            ctx.state.transform.rotation_radians = self.facing.y.atan2(self.facing.x);
        }
        ctx.state.transform.velocity = if length > 0.0 {
            axis.scaled(self.speed / length)
        } else {
            Vec2::default()
        };
        ctx.state
            .set_data("facing", json!([self.facing.x, self.facing.y]));
    }

    fn inspect(&self) -> Value {
        json!({ "speed": self.speed, "facing": [self.facing.x, self.facing.y] })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Calls the entity's `shoot` method while fire is held, rate limited.
#[derive(Default)]
pub(crate) struct Shooter {
    cooldown: f32,
    shots: u32,
}

impl Behavior for Shooter {
    fn update(&mut self, ctx: &mut BehaviorContext<'_>, dt: f32) {
        self.cooldown = (self.cooldown - dt).max(0.0);
        if !ctx.input().is_down(InputAction::Fire) || self.cooldown > 0.0 {
            return;
        }
        if ctx.call_method(SHOOT_METHOD, &[]).is_some() {
            self.shots += 1;
            self.cooldown = SHOT_COOLDOWN_SECONDS;
        }
    }

    fn render(
        &self,
        _entity: EntityId,
        state: &EntityState,
        ctx: &mut dyn RenderContext,
    ) -> Result<(), RenderError> {
        if self.cooldown > 0.0 {
            let mut muzzle = state.world_rect();
            muzzle.width = PROJECTILE_SIZE;
            muzzle.height = PROJECTILE_SIZE;
            ctx.draw_rect(muzzle, MUZZLE_RGBA)?;
        }
        Ok(())
    }

    fn inspect(&self) -> Value {
        json!({ "cooldown": self.cooldown, "shots": self.shots })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Wraps `shoot` so every successful call bumps `shots_fired` on the entity.
/// The wrapper goes away with the behavior.
pub(crate) struct ShotCounter {
    counted: Rc<Cell<u64>>,
}

impl ShotCounter {
    pub(crate) fn new() -> Self {
        Self {
            counted: Rc::new(Cell::new(0)),
        }
    }
}

impl Behavior for ShotCounter {
    fn init(&mut self, ctx: &mut BehaviorContext<'_>) -> Poll<()> {
        let counted = Rc::clone(&self.counted);
        let installed = ctx
            .overrides()
            .after(SHOOT_METHOD, move |state: &mut EntityState, _args: &[Value]| {
                counted.set(counted.get() + 1);
                state.set_data(SHOTS_FIRED_KEY, json!(counted.get()));
            });
        if !installed {
            debug!(entity = ctx.entity().0, "shot_counter_without_shoot_method");
        }
        Poll::Ready(())
    }

    fn inspect(&self) -> Value {
        json!({ "counted": self.counted.get() })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Spins the entity at a fixed rate. Configured in degrees per second.
pub(crate) struct Spinner {
    degrees_per_second: f32,
}

impl Spinner {
    pub(crate) fn new(degrees_per_second: f32) -> Self {
        Self { degrees_per_second }
    }
}

impl Behavior for Spinner {
    fn update(&mut self, ctx: &mut BehaviorContext<'_>, dt: f32) {
        let transform = &mut ctx.state.transform;
        let degrees = transform.rotation_degrees() + self.degrees_per_second * dt;
        transform.set_rotation_degrees(degrees.rem_euclid(360.0));
    }

    fn inspect(&self) -> Value {
        json!({ "degrees_per_second": self.degrees_per_second })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Despawns the projectile once its lifetime runs out.
pub(crate) struct Projectile {
    remaining: f32,
}

impl Default for Projectile {
    fn default() -> Self {
        Self {
            remaining: PROJECTILE_LIFETIME_SECONDS,
        }
    }
}

impl Behavior for Projectile {
    fn update(&mut self, ctx: &mut BehaviorContext<'_>, dt: f32) {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            ctx.state.despawn_self();
        }
    }

    fn inspect(&self) -> Value {
        json!({ "remaining": self.remaining })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Base `shoot` method: queues a projectile moving along the stored facing.
/// Returns the spawn position.
pub(crate) fn shoot_method(
    projectile_speed: f32,
) -> impl FnMut(&mut EntityState, &[Value]) -> Value {
    move |state: &mut EntityState, _args: &[Value]| {
        let facing = facing_of(state);
        let center = state.world_rect();
        let origin = Vec2::new(
            center.x + center.width / 2.0 - PROJECTILE_SIZE / 2.0,
            center.y + center.height / 2.0 - PROJECTILE_SIZE / 2.0,
        );
        let velocity = facing.scaled(projectile_speed);
        state.spawn(projectile_desc(origin, velocity));
        json!({ "x": origin.x, "y": origin.y })
    }
}

pub(crate) fn projectile_desc(origin: Vec2, velocity: Vec2) -> EntityDesc {
    EntityDesc::new("projectile")
        .at(origin.x, origin.y)
        .with_velocity(velocity.x, velocity.y)
        .with_rotation_radians(velocity.y.atan2(velocity.x))
        .with_bounds(PROJECTILE_SIZE, PROJECTILE_SIZE, Vec2::default())
        .solid(true)
        .with_render_order(-1)
        .with_tag(PROJECTILE_TAG)
        .with_method(
            pixelstage::ON_COLLISION_METHOD,
            |state: &mut EntityState, _args: &[Value]| {
                state.despawn_self();
                Value::Null
            },
        )
        .with_behavior(PROJECTILE)
}

fn facing_of(state: &EntityState) -> Vec2 {
    let facing = state.data("facing").and_then(Value::as_array).and_then(|pair| {
        let x = pair.first()?.as_f64()?;
        let y = pair.get(1)?.as_f64()?;
        Some(Vec2::new(x as f32, y as f32))
    });
    match facing {
        Some(direction) if direction.length() > 0.0 => direction,
        _ => Vec2::new(
            state.transform.rotation_radians.cos(),
            state.transform.rotation_radians.sin(),
        ),
    }
}
