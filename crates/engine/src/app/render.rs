use thiserror::Error;

use super::entity::{EntityId, EntityState, Rect};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("sprite '{key}' is not available")]
    MissingSprite { key: String },
    #[error("render backend failed: {0}")]
    Backend(String),
}

/// Drawing surface supplied by the renderer. The engine only decides what to
/// draw and in which order.
pub trait RenderContext {
    fn draw_entity(&mut self, id: EntityId, state: &EntityState) -> Result<(), RenderError>;

    fn draw_rect(&mut self, rect: Rect, rgba: [u8; 4]) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub drawn: usize,
    pub failed: usize,
}
