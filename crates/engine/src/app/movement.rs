use serde_json::json;

use super::entity::{Entity, EntityState, MovementPolicy};
use crate::behavior::TickEnv;

pub const ON_COLLISION_METHOD: &str = "on_collision";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisHits {
    pub x: bool,
    pub y: bool,
}

impl AxisHits {
    pub fn any(self) -> bool {
        self.x || self.y
    }
}

/// Moves along X alone, then Y alone. A blocked axis is rolled back and its
/// velocity zeroed, so movement slides along walls aligned with the free axis.
pub fn move_axis_separated(state: &mut EntityState, env: &TickEnv<'_>, dt: f32) -> AxisHits {
    let mut hits = AxisHits::default();

    let start_x = state.transform.position.x;
    state.transform.position.x += state.transform.velocity.x * dt;
    if env.blocked(state.world_rect()) {
        state.transform.position.x = start_x;
        state.transform.velocity.x = 0.0;
        hits.x = true;
    }

    let start_y = state.transform.position.y;
    state.transform.position.y += state.transform.velocity.y * dt;
    if env.blocked(state.world_rect()) {
        state.transform.position.y = start_y;
        state.transform.velocity.y = 0.0;
        hits.y = true;
    }

    hits
}

/// One entity's share of a scene tick. Returns true if it collided.
///
/// Inactive entities are skipped. Non-solid entities update without any
/// collision test. Solid entities resolve collisions according to their
/// movement policy and then get `on_collision` called if they define it.
pub(crate) fn step_entity(entity: &mut Entity, dt: f32, env: &TickEnv<'_>) -> bool {
    if !entity.state.active {
        return false;
    }
    if !entity.state.solid {
        entity.update(dt, env);
        return false;
    }

    let before = entity.state.transform.position;
    let collided = match entity.state.movement {
        MovementPolicy::RevertOnHit => {
            entity.update(dt, env);
            if env.blocked(entity.state.world_rect()) {
                entity.state.transform.position = before;
                true
            } else {
                false
            }
        }
        MovementPolicy::AxisSeparated => {
            entity.run_behaviors(dt, env);
            move_axis_separated(&mut entity.state, env, dt).any()
        }
    };

    if collided {
        let position = entity.state.transform.position;
        entity.call_method(
            ON_COLLISION_METHOD,
            &[json!({ "x": position.x, "y": position.y })],
        );
    }
    collided
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{EntityDesc, EntityId, InputSnapshot, Vec2};
    use crate::collision::CollisionGrid;
    use crate::intercept::MethodTable;

    fn grid_with_solid(width: u32, height: u32, solid: &[(u32, u32)]) -> CollisionGrid {
        let mut occupancy = vec![0u8; (width * height) as usize];
        for (x, y) in solid {
            occupancy[(y * width + x) as usize] = 1;
        }
        CollisionGrid::from_occupancy(width, height, occupancy).expect("grid")
    }

    fn entity_from(desc: EntityDesc) -> Entity {
        Entity::new(EntityId(1), desc.state, desc.methods)
    }

    #[test]
    fn axis_separation_slides_along_l_shaped_wall() {
        // vertical arm at x=5 (y 0..=6), horizontal arm at y=7 (x 5..=9)
        let mut solid: Vec<(u32, u32)> = (0..=6).map(|y| (5, y)).collect();
        solid.extend((5..=9).map(|x| (x, 7)));
        let grid = grid_with_solid(10, 10, &solid);
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, Some(&grid), 1);

        let mut state = EntityDesc::new("player")
            .at(4.0, 2.0)
            .with_velocity(1.0, 1.0)
            .state;
        let hits = move_axis_separated(&mut state, &env, 1.0);

        assert_eq!(hits, AxisHits { x: true, y: false });
        assert_eq!(state.transform.position, Vec2::new(4.0, 3.0));
        assert_eq!(state.transform.velocity, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn axis_separation_checks_x_before_y() {
        // only the diagonal cell is solid: X alone is clear, so X wins
        let grid = grid_with_solid(10, 10, &[(5, 5)]);
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, Some(&grid), 1);

        let mut state = EntityDesc::new("p").at(4.0, 4.0).with_velocity(1.0, 1.0).state;
        let hits = move_axis_separated(&mut state, &env, 1.0);

        assert_eq!(hits, AxisHits { x: false, y: true });
        assert_eq!(state.transform.position, Vec2::new(5.0, 4.0));
        assert_eq!(state.transform.velocity, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn no_grid_never_blocks() {
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, None, 1);
        let mut entity = entity_from(
            EntityDesc::new("e")
                .at(-5.0, -5.0)
                .with_velocity(-1.0, 0.0)
                .solid(true),
        );
        assert!(!step_entity(&mut entity, 1.0, &env));
        assert_eq!(entity.state.transform.position, Vec2::new(-6.0, -5.0));
    }

    #[test]
    fn revert_policy_restores_pre_tick_position_and_calls_hook() {
        let grid = grid_with_solid(10, 10, &[(3, 0)]);
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, Some(&grid), 1);
        let mut entity = entity_from(
            EntityDesc::new("e")
                .at(2.0, 0.0)
                .with_velocity(1.0, 0.0)
                .solid(true)
                .with_method(ON_COLLISION_METHOD, |state: &mut EntityState, args| {
                    state.set_data("hit", args[0].clone());
                    serde_json::Value::Null
                }),
        );

        assert!(step_entity(&mut entity, 1.0, &env));
        assert_eq!(entity.state.transform.position, Vec2::new(2.0, 0.0));
        assert_eq!(entity.state.transform.velocity, Vec2::new(1.0, 0.0));
        let hit = entity.state.data("hit").expect("hook ran");
        assert_eq!(hit, &json!({ "x": 2.0, "y": 0.0 }));
    }

    #[test]
    fn non_solid_entities_pass_through_walls() {
        let grid = grid_with_solid(10, 10, &[(3, 0)]);
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, Some(&grid), 1);
        let mut entity = entity_from(EntityDesc::new("ghost").at(2.0, 0.0).with_velocity(1.0, 0.0));
        assert!(!step_entity(&mut entity, 1.0, &env));
        assert_eq!(entity.state.transform.position.x, 3.0);
    }

    #[test]
    fn inactive_entities_are_skipped() {
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, None, 1);
        let mut entity = Entity::new(
            EntityId(2),
            EntityDesc::new("idle")
                .with_velocity(1.0, 0.0)
                .active(false)
                .solid(true)
                .state,
            MethodTable::new(),
        );
        assert!(!step_entity(&mut entity, 1.0, &env));
        assert_eq!(entity.state.transform.position, Vec2::default());
    }
}
