mod console;
mod tracker;

pub use console::{
    CommandParseError, ConsoleAction, ConsoleCommandRegistry, DebugConsole, MAX_HISTORY_LINES,
    MAX_OUTPUT_LINES,
};
pub use tracker::{ObjectRef, ObjectTracker};
