use std::collections::BTreeSet;

use pixelstage::{EntityId, EntityState, Rect, RenderContext, RenderError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DrawCall {
    Sprite {
        entity: EntityId,
        key: String,
        rect: Rect,
        rotation_radians: f32,
    },
    Fill {
        rect: Rect,
        rgba: [u8; 4],
    },
}

/// Headless render target: records draw calls for one frame. Entities draw as
/// the sprite named after them; unknown names fail like a missing texture.
#[derive(Debug)]
pub(crate) struct RecordingCanvas {
    sprites: BTreeSet<String>,
    calls: Vec<DrawCall>,
}

impl RecordingCanvas {
    pub(crate) fn new<'a>(sprites: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            sprites: sprites.into_iter().map(str::to_string).collect(),
            calls: Vec::new(),
        }
    }

    pub(crate) fn begin_frame(&mut self) {
        self.calls.clear();
    }

    pub(crate) fn calls(&self) -> &[DrawCall] {
        &self.calls
    }
}

impl RenderContext for RecordingCanvas {
    fn draw_entity(&mut self, id: EntityId, state: &EntityState) -> Result<(), RenderError> {
        if !self.sprites.contains(&state.name) {
            return Err(RenderError::MissingSprite {
                key: state.name.clone(),
            });
        }
        self.calls.push(DrawCall::Sprite {
            entity: id,
            key: state.name.clone(),
            rect: state.world_rect(),
            rotation_radians: state.transform.rotation_radians,
        });
        Ok(())
    }

    fn draw_rect(&mut self, rect: Rect, rgba: [u8; 4]) -> Result<(), RenderError> {
        self.calls.push(DrawCall::Fill { rect, rgba });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pixelstage::{BehaviorRegistry, EntityDesc, ModuleCatalog, RenderReport, Scene};

    use super::*;

    #[test]
    fn unknown_sprites_fail_without_stopping_the_frame() {
        let mut registry = BehaviorRegistry::new(ModuleCatalog::new());
        let mut scene = Scene::new();
        scene.spawn(EntityDesc::new("player").with_render_order(0));
        scene.spawn(EntityDesc::new("mystery").with_render_order(5));
        scene.spawn(EntityDesc::new("spinner").with_render_order(10));
        scene.apply_pending(&mut registry);

        let mut canvas = RecordingCanvas::new(["player", "spinner"]);
        canvas.begin_frame();
        let report = scene.render(&mut canvas);

        assert_eq!(report, RenderReport { drawn: 2, failed: 1 });
        let keys: Vec<&str> = canvas
            .calls()
            .iter()
            .filter_map(|call| match call {
                DrawCall::Sprite { key, .. } => Some(key.as_str()),
                DrawCall::Fill { .. } => None,
            })
            .collect();
        assert_eq!(keys, vec!["spinner", "player"]);
    }
}
