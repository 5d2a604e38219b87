use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use super::board::{Color, DEFAULT_BOARD_SIZE};

/// Failure to load a [`GameConfig`] or a catalog.
#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    #[display("invalid configuration json: {}", _0)]
    #[from]
    Parse(#[error(source)] serde_json::Error),
    #[display("invalid configuration: {}", reason)]
    Invalid { reason: String },
}

fn default_board_size() -> usize {
    DEFAULT_BOARD_SIZE
}

fn default_cascade_limit() -> u32 {
    20
}

fn default_combo_threshold() -> u32 {
    10
}

fn default_max_health() -> u32 {
    100
}

fn default_extra_turn_match_length() -> usize {
    4
}

fn default_ignite_bonus_damage() -> u32 {
    2
}

fn default_colors() -> Vec<Color> {
    Color::PLAYABLE.to_vec()
}

/// Tunables for one match. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameConfig {
    #[serde(default = "default_board_size")]
    pub board_size: usize,
    /// Safety bound on cascade passes per action.
    #[serde(default = "default_cascade_limit")]
    pub cascade_limit: u32,
    /// Combo count at which the acting player keeps the turn.
    #[serde(default = "default_combo_threshold")]
    pub combo_threshold: u32,
    #[serde(default = "default_max_health")]
    pub max_health: u32,
    /// Matches at least this long (or any T/L shape) grant an extra turn.
    #[serde(default = "default_extra_turn_match_length")]
    pub extra_turn_match_length: usize,
    #[serde(default = "default_ignite_bonus_damage")]
    pub ignite_bonus_damage: u32,
    #[serde(default = "default_colors")]
    pub colors: Vec<Color>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_size: default_board_size(),
            cascade_limit: default_cascade_limit(),
            combo_threshold: default_combo_threshold(),
            max_health: default_max_health(),
            extra_turn_match_length: default_extra_turn_match_length(),
            ignite_bonus_damage: default_ignite_bonus_damage(),
            colors: default_colors(),
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };
        if self.board_size < 4 {
            return invalid("board_size must be at least 4");
        }
        let playable = self.colors.iter().filter(|color| !color.is_empty()).count();
        if playable < 3 {
            return invalid("at least three playable colors are required");
        }
        if self.cascade_limit == 0 {
            return invalid("cascade_limit must be positive");
        }
        if self.max_health == 0 {
            return invalid("max_health must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = GameConfig::from_json("{}").expect("defaults are valid");
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.cascade_limit, 20);
        assert_eq!(config.combo_threshold, 10);
    }

    #[test]
    fn rejects_tiny_boards() {
        let error = GameConfig::from_json(r#"{"board_size": 2}"#).expect_err("too small");
        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let error = GameConfig::from_json("{board_size").expect_err("malformed");
        assert!(matches!(error, ConfigError::Parse(_)));
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().starts_with("invalid configuration json"));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = GameConfig::from_json(r#"{"combo_threshold": 6, "colors": ["red", "blue", "green"]}"#)
            .expect("valid override");
        assert_eq!(config.combo_threshold, 6);
        assert_eq!(config.colors.len(), 3);
        assert_eq!(config.board_size, DEFAULT_BOARD_SIZE);
    }
}
