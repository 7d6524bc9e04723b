use super::entity::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Fire,
    Quit,
}

const ACTION_COUNT: usize = 6;

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::MoveUp,
        InputAction::MoveDown,
        InputAction::MoveLeft,
        InputAction::MoveRight,
        InputAction::Fire,
        InputAction::Quit,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::Fire => 4,
            InputAction::Quit => 5,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "up" | "move_up" => Some(InputAction::MoveUp),
            "down" | "move_down" => Some(InputAction::MoveDown),
            "left" | "move_left" => Some(InputAction::MoveLeft),
            "right" | "move_right" => Some(InputAction::MoveRight),
            "fire" => Some(InputAction::Fire),
            "quit" => Some(InputAction::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActionStates {
    down: [bool; ACTION_COUNT],
}

/// Per-tick record of held actions. Produced by the input collaborator;
/// entities and behaviors only read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    actions: ActionStates,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: &[InputAction]) -> Self {
        actions
            .iter()
            .fold(Self::empty(), |snapshot, action| {
                snapshot.with_action_down(*action, true)
            })
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.down[action.index()]
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.down[action.index()] = is_down;
        self
    }

    pub fn quit_requested(&self) -> bool {
        self.is_down(InputAction::Quit)
    }

    /// Directional input as a unit-free axis, +x right and +y down (screen space).
    pub fn move_axis(&self) -> Vec2 {
        let mut axis = Vec2::default();
        if self.is_down(InputAction::MoveLeft) {
            axis.x -= 1.0;
        }
        if self.is_down(InputAction::MoveRight) {
            axis.x += 1.0;
        }
        if self.is_down(InputAction::MoveUp) {
            axis.y -= 1.0;
        }
        if self.is_down(InputAction::MoveDown) {
            axis.y += 1.0;
        }
        axis
    }
}
