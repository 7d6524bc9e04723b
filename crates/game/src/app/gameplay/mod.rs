mod behaviors;

use pixelstage::{EntityDesc, ModuleCatalog, Vec2};
use tracing::warn;

use super::config::GameConfig;

pub(crate) use behaviors::{
    PlayerControl, Projectile, ShotCounter, Shooter, Spinner, PLAYER_CONTROL, PROJECTILE,
    PROJECTILE_TAG, SHOOTER, SHOOT_METHOD, SHOTS_FIRED_KEY, SHOT_COUNTER, SPINNER,
};

const PLAYER_RENDER_ORDER: i32 = 0;
const SPINNER_RENDER_ORDER: i32 = 10;
const SPINNER_SIZE: f32 = 8.0;

/// Every behavior the demo can attach, keyed by name.
pub(crate) fn build_catalog(config: &GameConfig) -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    let player_speed = config.player.speed;
    let spin_rate = config.spinner_degrees_per_second;

    let registrations: [(&str, Result<(), String>); 5] = [
        (
            PLAYER_CONTROL,
            catalog.register(PLAYER_CONTROL, move |_| Box::new(PlayerControl::new(player_speed))),
        ),
        (
            SHOOTER,
            catalog.register(SHOOTER, |_| Box::<Shooter>::default()),
        ),
        (
            SHOT_COUNTER,
            catalog.register(SHOT_COUNTER, |_| Box::new(ShotCounter::new())),
        ),
        (
            SPINNER,
            catalog.register(SPINNER, move |_| Box::new(Spinner::new(spin_rate))),
        ),
        (
            PROJECTILE,
            catalog.register(PROJECTILE, |_| Box::<Projectile>::default()),
        ),
    ];
    for (name, result) in registrations {
        if let Err(error) = result {
            warn!(behavior = name, error = %error, "behavior_registration_failed");
        }
    }
    catalog
}

pub(crate) fn player_desc(config: &GameConfig) -> EntityDesc {
    let [x, y] = config.player.spawn;
    let [width, height] = config.player.bounds;
    EntityDesc::new("player")
        .at(x, y)
        .with_bounds(width, height, Vec2::default())
        .with_render_order(PLAYER_RENDER_ORDER)
        .with_tag("player")
        .with_method(SHOOT_METHOD, behaviors::shoot_method(config.projectile_speed))
        .with_behavior(PLAYER_CONTROL)
        .with_behavior(SHOOTER)
        .with_behavior(SHOT_COUNTER)
}

/// Decorative prop in the middle of the viewport; passes through walls.
pub(crate) fn spinner_desc(config: &GameConfig) -> EntityDesc {
    let [width, height] = config.fallback_viewport;
    EntityDesc::new("spinner")
        .at(width as f32 / 2.0, height as f32 / 2.0)
        .with_bounds(
            SPINNER_SIZE,
            SPINNER_SIZE,
            Vec2::new(-SPINNER_SIZE / 2.0, -SPINNER_SIZE / 2.0),
        )
        .with_render_order(SPINNER_RENDER_ORDER)
        .with_tag("prop")
        .with_behavior(SPINNER)
}

#[cfg(test)]
mod tests;
