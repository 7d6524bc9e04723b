use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::app::{Entity, Scene};

pub const MAX_HISTORY_LINES: usize = 64;
pub const MAX_OUTPUT_LINES: usize = 256;
const MAX_LISTED_PIXELS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    Help,
    Clear,
    Echo { text: String },
    Objects,
    Inspect { name: String },
    Entities,
    Scene,
    Pause,
    Resume,
    Pixels { x: f32, y: f32, w: f32, h: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandParseError {
    reason: String,
    usage: String,
}

impl CommandParseError {
    pub fn new(reason: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            usage: usage.into(),
        }
    }
}

type ParseFn = dyn Fn(&[String]) -> Result<ConsoleAction, CommandParseError>;
type BuiltinParse = fn(&[String]) -> Result<ConsoleAction, CommandParseError>;

struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

pub struct ConsoleCommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl Default for ConsoleCommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleCommandRegistry {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let builtins: [(&str, &str, &str, BuiltinParse); 10] = [
            ("help", "List commands", "", parse_help_command),
            ("clear", "Clear console output", "", parse_clear_command),
            (
                "echo",
                "Print text to console",
                "<text...>",
                parse_echo_command,
            ),
            ("objects", "List tracked objects", "", parse_objects_command),
            (
                "inspect",
                "Dump a tracked object",
                "<name:string>",
                parse_inspect_command,
            ),
            ("entities", "List scene entities", "", parse_entities_command),
            ("scene", "Dump scene state", "", parse_scene_command),
            ("pause", "Pause scene updates", "", parse_pause_command),
            ("resume", "Resume scene updates", "", parse_resume_command),
            (
                "pixels",
                "List solid pixels in an area",
                "<x:f32> <y:f32> <w:f32> <h:f32>",
                parse_pixels_command,
            ),
        ];

        let mut registry = Self::new();
        for (name, help, arg_schema, parse) in builtins {
            if let Err(error) = registry.register(name, help, arg_schema, parse) {
                warn!(command = name, error = %error, "console_builtin_rejected");
            }
        }
        registry
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<ConsoleAction, CommandParseError> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        let lower = name.to_ascii_lowercase();
        if self.lookup_by_lower_name.contains_key(&lower) {
            return Err(format!("duplicate command registration: {name}"));
        }

        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
        self.lookup_by_lower_name
            .insert(lower, self.specs.len() - 1);
        Ok(())
    }

    fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let lower = input_name.to_ascii_lowercase();
        let index = self.lookup_by_lower_name.get(&lower)?;
        self.specs.get(*index)
    }

    /// Help output order is registration order.
    pub fn iter_specs_in_order(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.specs.iter().map(|spec| {
            (
                spec.name.as_str(),
                spec.help.as_str(),
                spec.arg_schema.as_str(),
            )
        })
    }
}

/// Text console over a scene: parses one line at a time and writes results to
/// a bounded output buffer.
pub struct DebugConsole {
    registry: ConsoleCommandRegistry,
    history: VecDeque<String>,
    output_lines: VecDeque<String>,
}

impl Default for DebugConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugConsole {
    pub fn new() -> Self {
        Self {
            registry: ConsoleCommandRegistry::with_builtins(),
            history: VecDeque::new(),
            output_lines: VecDeque::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut ConsoleCommandRegistry {
        &mut self.registry
    }

    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.output_lines.iter().map(String::as_str)
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn clear_output_lines(&mut self) {
        self.output_lines.clear();
    }

    pub fn append_output_line(&mut self, line: impl Into<String>) {
        push_bounded(&mut self.output_lines, line.into(), MAX_OUTPUT_LINES);
    }

    /// Runs one command line against `scene`.
    pub fn submit(&mut self, raw_line: &str, scene: &mut Scene) {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            return;
        }
        push_bounded(&mut self.history, trimmed.to_string(), MAX_HISTORY_LINES);

        let tokens = match tokenize_line(trimmed) {
            Ok(tokens) => tokens,
            Err(reason) => {
                self.append_output_line(format!("error: {reason}. usage: help"));
                return;
            }
        };
        let Some((command_name, args)) = tokens.split_first() else {
            return;
        };
        let Some(spec) = self.registry.lookup(command_name) else {
            self.append_output_line(format!(
                "error: unknown command '{command_name}'. try: help"
            ));
            return;
        };

        match (spec.parse)(args) {
            Ok(action) => self.apply_action(action, scene),
            Err(error) => {
                self.append_output_line(format!("error: {}. usage: {}", error.reason, error.usage));
            }
        }
    }

    fn apply_action(&mut self, action: ConsoleAction, scene: &mut Scene) {
        match action {
            ConsoleAction::Help => {
                let lines: Vec<String> = self
                    .registry
                    .iter_specs_in_order()
                    .map(|(name, help, arg_schema)| {
                        if arg_schema.is_empty() {
                            format!("{name} - {help}")
                        } else {
                            format!("{name} {arg_schema} - {help}")
                        }
                    })
                    .collect();
                for line in lines {
                    self.append_output_line(line);
                }
            }
            ConsoleAction::Clear => self.clear_output_lines(),
            ConsoleAction::Echo { text } => self.append_output_line(text),
            ConsoleAction::Objects => {
                let Some(tracker) = scene.tracker() else {
                    self.append_output_line("error: object tracking is disabled");
                    return;
                };
                let names: Vec<String> = tracker.names().into_iter().map(str::to_string).collect();
                if names.is_empty() {
                    self.append_output_line("no tracked objects");
                }
                for name in names {
                    self.append_output_line(name);
                }
            }
            ConsoleAction::Inspect { name } => {
                let Some(tracker) = scene.tracker() else {
                    self.append_output_line("error: object tracking is disabled");
                    return;
                };
                let Some(object) = tracker.get(&name) else {
                    self.append_output_line(format!("error: no tracked object '{name}'"));
                    return;
                };
                match scene.inspect(object) {
                    Some(value) => self.append_json(&value),
                    None => self.append_output_line(format!("error: '{name}' no longer exists")),
                }
            }
            ConsoleAction::Entities => {
                let lines: Vec<String> = scene.entities().iter().map(describe_entity).collect();
                if lines.is_empty() {
                    self.append_output_line("no entities");
                }
                for line in lines {
                    self.append_output_line(line);
                }
            }
            ConsoleAction::Scene => {
                let snapshot = scene.snapshot();
                self.append_json(&snapshot);
            }
            ConsoleAction::Pause => {
                scene.set_paused(true);
                self.append_output_line("scene paused");
            }
            ConsoleAction::Resume => {
                scene.set_paused(false);
                self.append_output_line("scene resumed");
            }
            ConsoleAction::Pixels { x, y, w, h } => {
                let Some(grid) = scene.collision_grid() else {
                    self.append_output_line("error: no collision map loaded");
                    return;
                };
                let pixels: Vec<(u32, u32)> = grid.pixels_in_area(x, y, w, h).collect();
                let mut line = format!("{} solid pixel(s)", pixels.len());
                if !pixels.is_empty() {
                    let listed: Vec<String> = pixels
                        .iter()
                        .take(MAX_LISTED_PIXELS)
                        .map(|(px, py)| format!("({px},{py})"))
                        .collect();
                    line.push_str(": ");
                    line.push_str(&listed.join(" "));
                    if pixels.len() > MAX_LISTED_PIXELS {
                        line.push_str(" ...");
                    }
                }
                self.append_output_line(line);
            }
        }
    }

    fn append_json(&mut self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => {
                for line in text.lines() {
                    self.append_output_line(line);
                }
            }
            Err(error) => self.append_output_line(format!("error: {error}")),
        }
    }
}

fn describe_entity(entity: &Entity) -> String {
    let state = &entity.state;
    let behaviors: Vec<&str> = entity.behavior_names().collect();
    format!(
        "{} {} ({:.1}, {:.1}) behaviors=[{}]{}",
        entity.id().0,
        state.name,
        state.transform.position.x,
        state.transform.position.y,
        behaviors.join(","),
        if state.active { "" } else { " inactive" }
    )
}

fn push_bounded(queue: &mut VecDeque<String>, value: String, max_len: usize) {
    if queue.len() == max_len {
        queue.pop_front();
    }
    queue.push_back(value);
}

fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending_token {
                    tokens.push(std::mem::take(&mut current));
                    pending_token = false;
                }
            }
            _ => {
                current.push(ch);
                pending_token = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if pending_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_help_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "help")?;
    Ok(ConsoleAction::Help)
}

fn parse_clear_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "clear")?;
    Ok(ConsoleAction::Clear)
}

fn parse_echo_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    if args.is_empty() {
        return Err(CommandParseError::new(
            "missing required argument <text...>",
            "echo <text...>",
        ));
    }
    Ok(ConsoleAction::Echo {
        text: args.join(" "),
    })
}

fn parse_objects_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "objects")?;
    Ok(ConsoleAction::Objects)
}

fn parse_inspect_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    match args {
        [name] => Ok(ConsoleAction::Inspect { name: name.clone() }),
        _ => Err(CommandParseError::new(
            "expected exactly one argument <name>",
            "inspect <name>",
        )),
    }
}

fn parse_entities_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "entities")?;
    Ok(ConsoleAction::Entities)
}

fn parse_scene_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "scene")?;
    Ok(ConsoleAction::Scene)
}

fn parse_pause_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "pause")?;
    Ok(ConsoleAction::Pause)
}

fn parse_resume_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    require_no_args(args, "resume")?;
    Ok(ConsoleAction::Resume)
}

fn parse_pixels_command(args: &[String]) -> Result<ConsoleAction, CommandParseError> {
    const USAGE: &str = "pixels <x> <y> <w> <h>";
    let [x, y, w, h] = args else {
        return Err(CommandParseError::new(
            "expected four arguments <x> <y> <w> <h>",
            USAGE,
        ));
    };
    let parse = |label: &str, raw: &str| {
        raw.parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| {
                CommandParseError::new(format!("invalid {label} '{raw}' (expected f32)"), USAGE)
            })
    };
    Ok(ConsoleAction::Pixels {
        x: parse("x", x.as_str())?,
        y: parse("y", y.as_str())?,
        w: parse("w", w.as_str())?,
        h: parse("h", h.as_str())?,
    })
}

fn require_no_args(args: &[String], usage: &str) -> Result<(), CommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandParseError::new("unexpected extra arguments", usage))
    }
}
