use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pixelstage::{EngineConfig, InputAction, InputSnapshot};
use serde::Deserialize;
use thiserror::Error;

pub(crate) const CONFIG_ENV_VAR: &str = "PIXELSTAGE_CONFIG";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config {path}: input_script[{index}] has unknown action '{action}'")]
    UnknownAction {
        path: PathBuf,
        index: usize,
        action: String,
    },
    #[error("config {path}: {field} must be finite and positive")]
    InvalidNumber { path: PathBuf, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlayerConfig {
    pub(crate) spawn: [f32; 2],
    pub(crate) speed: f32,
    pub(crate) bounds: [f32; 2],
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            spawn: [16.0, 16.0],
            speed: 60.0,
            bounds: [6.0, 6.0],
        }
    }
}

/// Actions held for every tick in `from_tick..to_tick`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct InputSpan {
    pub(crate) from_tick: u64,
    pub(crate) to_tick: u64,
    pub(crate) actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GameConfig {
    pub(crate) visual_map: PathBuf,
    pub(crate) collision_map: PathBuf,
    pub(crate) fallback_viewport: [u32; 2],
    pub(crate) ticks: u64,
    pub(crate) target_tps: u32,
    pub(crate) player: PlayerConfig,
    pub(crate) spinner_degrees_per_second: f32,
    pub(crate) projectile_speed: f32,
    pub(crate) debug_tracking: bool,
    pub(crate) console_commands: Vec<String>,
    pub(crate) input_script: Vec<InputSpan>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            visual_map: PathBuf::from("maps/arena.png"),
            collision_map: PathBuf::from("maps/arena_collision.png"),
            fallback_viewport: [320, 240],
            ticks: 180,
            target_tps: 60,
            player: PlayerConfig::default(),
            spinner_degrees_per_second: 90.0,
            projectile_speed: 180.0,
            debug_tracking: false,
            console_commands: Vec::new(),
            input_script: vec![
                InputSpan {
                    from_tick: 0,
                    to_tick: 60,
                    actions: vec!["move_right".to_string()],
                },
                InputSpan {
                    from_tick: 30,
                    to_tick: 32,
                    actions: vec!["fire".to_string()],
                },
                InputSpan {
                    from_tick: 60,
                    to_tick: 120,
                    actions: vec!["move_down".to_string(), "fire".to_string()],
                },
            ],
        }
    }
}

impl GameConfig {
    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_tps: self.target_tps,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            debug_tracking: self.debug_tracking,
        }
        .normalized()
    }

    /// Input for `tick`: the union of every span covering it.
    pub(crate) fn input_for_tick(&self, tick: u64) -> InputSnapshot {
        self.input_script
            .iter()
            .filter(|span| (span.from_tick..span.to_tick).contains(&tick))
            .flat_map(|span| span.actions.iter())
            .filter_map(|raw| InputAction::parse(raw))
            .fold(InputSnapshot::empty(), |snapshot, action| {
                snapshot.with_action_down(action, true)
            })
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        for (index, span) in self.input_script.iter().enumerate() {
            if let Some(action) = span
                .actions
                .iter()
                .find(|raw| InputAction::parse(raw).is_none())
            {
                return Err(ConfigError::UnknownAction {
                    path: path.to_path_buf(),
                    index,
                    action: action.clone(),
                });
            }
        }
        let numbers = [
            ("player.speed", self.player.speed),
            ("projectile_speed", self.projectile_speed),
        ];
        for (field, value) in numbers {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidNumber {
                    path: path.to_path_buf(),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Loads the file named by `PIXELSTAGE_CONFIG`, or the defaults when unset.
pub(crate) fn load_from_env() -> Result<GameConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => load_from_path(Path::new(&path)),
        None => Ok(GameConfig::default()),
    }
}

pub(crate) fn load_from_path(path: &Path) -> Result<GameConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_json(&raw, path)
}

pub(crate) fn parse_config_json(raw: &str, path: &Path) -> Result<GameConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config: GameConfig =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let json_path = error.path().to_string();
            ConfigError::Parse {
                path: path.to_path_buf(),
                json_path,
                source: error.into_inner(),
            }
        })?;
    config.validate(path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<GameConfig, ConfigError> {
        parse_config_json(raw, Path::new("test.json"))
    }

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(parse("{}").expect("config"), GameConfig::default());
    }

    #[test]
    fn partial_config_overrides_named_fields_only() {
        let config = parse(r#"{ "ticks": 10, "player": { "speed": 5.0 } }"#).expect("config");
        assert_eq!(config.ticks, 10);
        assert_eq!(config.player.speed, 5.0);
        assert_eq!(config.player.spawn, PlayerConfig::default().spawn);
    }

    #[test]
    fn parse_errors_name_the_json_path() {
        let error = parse(r#"{ "player": { "bounds": [1.0, "wide"] } }"#).expect_err("bad type");
        match error {
            ConfigError::Parse { json_path, .. } => assert_eq!(json_path, "player.bounds[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = parse(r#"{ "tickz": 3 }"#).expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_actions_and_bad_speeds_fail_validation() {
        let error = parse(r#"{ "input_script": [ { "from_tick": 0, "to_tick": 1, "actions": ["jump"] } ] }"#)
            .expect_err("unknown action");
        assert!(matches!(
            error,
            ConfigError::UnknownAction { index: 0, ref action, .. } if action == "jump"
        ));

        let error = parse(r#"{ "projectile_speed": 0.0 }"#).expect_err("zero speed");
        assert!(matches!(
            error,
            ConfigError::InvalidNumber {
                field: "projectile_speed",
                ..
            }
        ));
    }

    #[test]
    fn input_spans_overlap_and_end_exclusive() {
        let config = GameConfig::default();
        let at_31 = config.input_for_tick(31);
        assert!(at_31.is_down(InputAction::MoveRight));
        assert!(at_31.is_down(InputAction::Fire));
        assert!(!config.input_for_tick(32).is_down(InputAction::Fire));
        assert!(!config.input_for_tick(60).is_down(InputAction::MoveRight));
        assert_eq!(config.input_for_tick(500), InputSnapshot::empty());
    }

    #[test]
    fn zero_tps_normalizes() {
        let config = GameConfig {
            target_tps: 0,
            ..GameConfig::default()
        };
        assert_eq!(config.engine_config().target_tps, 60);
    }
}
