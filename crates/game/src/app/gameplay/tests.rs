use std::time::Duration;

use pixelstage::{
    CollisionGrid, EngineConfig, FrameReport, GameContext, InputAction, InputSnapshot,
    MovementPolicy, Vec2,
};
use serde_json::json;

use super::*;

fn config() -> GameConfig {
    GameConfig {
        fallback_viewport: [64, 48],
        ..GameConfig::default()
    }
}

fn game_with_open_field(config: &GameConfig) -> GameContext {
    let mut game = GameContext::new(EngineConfig::default(), build_catalog(config));
    let [width, height] = config.fallback_viewport;
    game.scene_mut()
        .set_collision_grid(CollisionGrid::open_field(width, height));
    game
}

fn tick(game: &mut GameContext, input: &InputSnapshot) -> FrameReport {
    let dt = game.clock().fixed_dt();
    game.frame(dt, input)
}

#[test]
fn player_gets_axis_separated_movement_and_shoot_wrapper() {
    let config = config();
    let mut game = game_with_open_field(&config);
    let id = game.spawn_player(player_desc(&config));

    let player = game.scene().entity(id).expect("player");
    assert_eq!(player.state.movement, MovementPolicy::AxisSeparated);
    assert!(player.state.solid);
    assert_eq!(
        player
            .methods()
            .interceptors(SHOOT_METHOD)
            .iter()
            .map(|info| info.owner.as_str())
            .collect::<Vec<_>>(),
        vec![SHOT_COUNTER]
    );
}

#[test]
fn player_stops_at_viewport_edge() {
    let config = config();
    let mut game = game_with_open_field(&config);
    let id = game.spawn_player(player_desc(&config));
    let left = InputSnapshot::from_actions(&[InputAction::MoveLeft]);

    let mut collided = false;
    for _ in 0..120 {
        collided |= tick(&mut game, &left).collisions > 0;
    }
    let state = &game.scene().entity(id).expect("player").state;
    assert!(collided);
    assert!(state.transform.position.x >= 0.0);
    assert!(state.transform.position.x < 1.0);
    assert_eq!(state.transform.position.y, config.player.spawn[1]);
}

#[test]
fn firing_spawns_projectiles_next_tick_and_counts_shots() {
    let config = config();
    let mut game = game_with_open_field(&config);
    let id = game.spawn_player(player_desc(&config));
    let fire = InputSnapshot::from_actions(&[InputAction::Fire]);

    let report = tick(&mut game, &fire);
    assert_eq!(report.spawned, 1);
    let projectile = game
        .scene()
        .entities_with_tag(PROJECTILE_TAG)
        .next()
        .expect("projectile");
    assert!(projectile.has_behavior(PROJECTILE));
    let spawned_at = projectile.state.transform.position;
    assert_eq!(spawned_at, Vec2::new(18.0, 18.0));

    // cooldown holds the second shot back
    tick(&mut game, &fire);
    assert_eq!(game.scene().entities_with_tag(PROJECTILE_TAG).count(), 1);
    let moved = game
        .scene()
        .entities_with_tag(PROJECTILE_TAG)
        .next()
        .expect("projectile")
        .state
        .transform
        .position;
    assert!(moved.x > spawned_at.x);
    assert_eq!(moved.y, spawned_at.y);

    let player = &game.scene().entity(id).expect("player").state;
    assert_eq!(player.data(SHOTS_FIRED_KEY), Some(&json!(1)));
}

#[test]
fn projectiles_despawn_when_they_hit_the_edge() {
    let config = config();
    let mut game = game_with_open_field(&config);
    game.spawn_player(player_desc(&config));
    let fire = InputSnapshot::from_actions(&[InputAction::Fire]);
    tick(&mut game, &fire);

    let idle = InputSnapshot::empty();
    let mut despawned = 0;
    for _ in 0..60 {
        despawned += tick(&mut game, &idle).despawned;
    }
    assert_eq!(despawned, 1);
    assert_eq!(game.scene().entities_with_tag(PROJECTILE_TAG).count(), 0);
}

#[test]
fn detaching_shot_counter_removes_its_wrapper() {
    let config = config();
    let mut game = game_with_open_field(&config);
    let id = game.spawn_player(player_desc(&config));
    assert!(game.detach_behavior(id, SHOT_COUNTER));

    let fire = InputSnapshot::from_actions(&[InputAction::Fire]);
    tick(&mut game, &fire);
    let player = game.scene().entity(id).expect("player");
    assert!(player.methods().interceptors(SHOOT_METHOD).is_empty());
    assert_eq!(player.state.data(SHOTS_FIRED_KEY), None);
    assert_eq!(game.scene().entities_with_tag(PROJECTILE_TAG).count(), 1);
}

#[test]
fn spinner_wraps_rotation_in_radians() {
    let config = GameConfig {
        spinner_degrees_per_second: 270.0,
        ..config()
    };
    let mut game = GameContext::new(
        EngineConfig {
            target_tps: 1,
            max_frame_delta: Duration::from_secs(2),
            max_ticks_per_frame: 1,
            debug_tracking: false,
        },
        build_catalog(&config),
    );
    let id = game.spawn(spinner_desc(&config));

    let idle = InputSnapshot::empty();
    game.frame(Duration::from_secs(1), &idle);
    game.frame(Duration::from_secs(1), &idle);
    let radians = game
        .scene()
        .entity(id)
        .expect("spinner")
        .state
        .transform
        .rotation_radians;
    assert!((radians - 180f32.to_radians()).abs() < 1e-4, "radians={radians}");
}
