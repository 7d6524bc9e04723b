mod entity;
mod game;
mod input;
mod movement;
mod render;
mod scene;
pub mod tools;

pub use entity::{
    BehaviorPhase, CollisionBounds, Entity, EntityDesc, EntityId, EntityIdAllocator, EntityState,
    MovementPolicy, Rect, SceneRequest, Transform, Vec2,
};
pub use game::{EngineConfig, FixedStepClock, FrameReport, GameContext, StepPlan};
pub use input::{InputAction, InputSnapshot};
pub use movement::{move_axis_separated, AxisHits, ON_COLLISION_METHOD};
pub use render::{RenderContext, RenderError, RenderReport};
pub use scene::{MapInfo, Scene, TickReport};
