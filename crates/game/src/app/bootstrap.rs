use std::path::PathBuf;

use pixelstage::{resolve_app_paths, AppPaths, EntityId, GameContext};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::config::{self, ConfigError, GameConfig};
use super::gameplay;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub(crate) struct AppWiring {
    pub(crate) config: GameConfig,
    pub(crate) game: GameContext,
    pub(crate) player: EntityId,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== pixelstage startup ===");

    let config = config::load_from_env()?;
    let paths = resolve_paths();
    let (game, player) = build_game(&config, &paths);
    Ok(AppWiring {
        config,
        game,
        player,
    })
}

/// Wires a game from `config`: behaviors, map (or open-field fallback),
/// player and props.
pub(crate) fn build_game(config: &GameConfig, paths: &AppPaths) -> (GameContext, EntityId) {
    let mut game = GameContext::new(config.engine_config(), gameplay::build_catalog(config));

    let visual = paths.asset(&config.visual_map);
    let collision = paths.asset(&config.collision_map);
    let [width, height] = config.fallback_viewport;
    if game
        .load_map_or_open_field(&visual, &collision, (width, height))
        .is_ok()
    {
        info!(visual = %visual.display(), "map_ready");
    }

    let player = game.spawn_player(gameplay::player_desc(config));
    game.spawn(gameplay::spinner_desc(config));
    info!(
        player = player.0,
        entity_count = game.scene().entity_count(),
        "scene_loaded"
    );
    (game, player)
}

fn resolve_paths() -> AppPaths {
    match resolve_app_paths() {
        Ok(paths) => {
            info!(root = %paths.root.display(), assets = %paths.assets_dir.display(), "startup");
            paths
        }
        Err(error) => {
            let root = PathBuf::from(".");
            warn!(error = %error, "project_root_unresolved");
            AppPaths {
                assets_dir: root.join("assets"),
                root,
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gameplay::SPINNER;

    #[test]
    fn missing_map_still_builds_a_playable_scene() {
        let dir = PathBuf::from("definitely/not/here");
        let paths = AppPaths {
            root: dir.clone(),
            assets_dir: dir.join("assets"),
        };
        let config = GameConfig::default();
        let (game, player) = build_game(&config, &paths);

        assert_eq!(game.player(), Some(player));
        assert_eq!(game.scene().entity_count(), 2);
        let grid = game.scene().collision_grid().expect("open field");
        assert_eq!(
            [grid.width(), grid.height()],
            config.fallback_viewport
        );
        assert!(game
            .scene()
            .entities_with_tag("prop")
            .all(|entity| entity.has_behavior(SPINNER)));
    }
}
