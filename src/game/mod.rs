//! Deterministic match simulation: board, cascades, damage, skills and turns.

pub mod board;
pub mod cascade;
pub mod catalog;
pub mod config;
pub mod damage;
pub mod effects;
pub mod rules;
pub mod skills;
pub mod state;

pub use board::{Board, Color, Match, Position, SpecialShape, Tile, DEFAULT_BOARD_SIZE};
pub use cascade::{AnimationHost, CascadeOutcome, CascadeResolver, Immediate, PassControl};
pub use catalog::{Catalog, ClassDefinition, SkillId};
pub use config::{ConfigError, GameConfig};
pub use damage::{apply_damage, compute_damage, convert_resources, DamageKind, DamageReport};
pub use effects::{
    Aggregate, ColorStatBonus, ConvertTiles, ExpireAction, ManaConversion, ResourceBonus,
    StatusEffect, StatusLedger,
};
pub use rules::{RuleEngine, RuleError, RuleResolution};
pub use skills::{can_cast, ClassSkill, SkillEffect, SkillTarget};
pub use state::{
    GameEvent, GameState, IntegrityError, PlayerId, PlayerState, TurnPhase, VictoryReason,
    VictoryState,
};
