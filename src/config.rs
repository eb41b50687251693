use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    BUNNY_COUNT, BUSH_COUNT, DEFAULT_WORLD_ID, HUG_GOAL, ITEM_COUNT, MAP_SIZE, PLAYER_SPEED,
    TREE_COUNT,
};

/// Tunables of one world. Every field falls back to its default when absent
/// from a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    #[serde(rename = "mapSize")]
    pub map_size: i32,
    #[serde(rename = "playerSpeed")]
    pub player_speed: f64,
    #[serde(rename = "bunnyCount")]
    pub bunny_count: usize,
    #[serde(rename = "treeCount")]
    pub tree_count: usize,
    #[serde(rename = "bushCount")]
    pub bush_count: usize,
    #[serde(rename = "itemCount")]
    pub item_count: usize,
    #[serde(rename = "hugGoal")]
    pub hug_goal: u32,
    #[serde(rename = "worldId")]
    pub world_id: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_size: MAP_SIZE,
            player_speed: PLAYER_SPEED,
            bunny_count: BUNNY_COUNT,
            tree_count: TREE_COUNT,
            bush_count: BUSH_COUNT,
            item_count: ITEM_COUNT,
            hug_goal: HUG_GOAL,
            world_id: DEFAULT_WORLD_ID.to_string(),
        }
    }
}

impl WorldConfig {
    pub fn map_half_size(&self) -> i32 {
        self.map_size / 2
    }

    /// Reads a JSON config file. A missing or unreadable file yields the
    /// defaults so a session can always start.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %error, "config_read_failed");
                }
                return Self::default();
            }
        };
        match serde_json::from_str::<WorldConfig>(&text) {
            Ok(config) => config.sanitized(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "config_parse_failed");
                Self::default()
            }
        }
    }

    fn sanitized(mut self) -> Self {
        if self.map_size < 2 {
            self.map_size = MAP_SIZE;
        }
        if !self.player_speed.is_finite() || self.player_speed <= 0.0 {
            self.player_speed = PLAYER_SPEED;
        }
        if self.world_id.trim().is_empty() {
            self.world_id = DEFAULT_WORLD_ID.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "bunnyCount": 3, "worldId": "arena" }}"#).expect("write config");

        let config = WorldConfig::load(file.path());
        assert_eq!(config.bunny_count, 3);
        assert_eq!(config.world_id, "arena");
        assert_eq!(config.tree_count, TREE_COUNT);
        assert_eq!(config.map_half_size(), MAP_SIZE / 2);
    }

    #[test]
    fn invalid_values_are_replaced() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "mapSize": 0, "playerSpeed": -4, "worldId": "  " }}"#)
            .expect("write config");

        let config = WorldConfig::load(file.path());
        assert_eq!(config.map_size, MAP_SIZE);
        assert_eq!(config.player_speed, PLAYER_SPEED);
        assert_eq!(config.world_id, DEFAULT_WORLD_ID);
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert_eq!(
            WorldConfig::load(&dir.path().join("absent.json")),
            WorldConfig::default()
        );

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write config");
        assert_eq!(WorldConfig::load(file.path()), WorldConfig::default());
    }
}
