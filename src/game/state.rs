use std::collections::BTreeMap;

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use super::board::{Board, Color, Position, SpecialShape};
use super::catalog::{ClassDefinition, SkillId};
use super::effects::StatusEffect;

/// The two sides of a match.
#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PlayerId {
    #[display("human")]
    Human,
    #[display("ai")]
    Ai,
}

impl PlayerId {
    pub fn opponent(self) -> PlayerId {
        match self {
            PlayerId::Human => PlayerId::Ai,
            PlayerId::Ai => PlayerId::Human,
        }
    }

    pub fn turn_phase(self) -> TurnPhase {
        match self {
            PlayerId::Human => TurnPhase::HumanTurn,
            PlayerId::Ai => TurnPhase::AiTurn,
        }
    }
}

/// Turn state machine states. `GameOver` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurnPhase {
    HumanTurn,
    AiTurn,
    GameOver,
}

impl Default for TurnPhase {
    fn default() -> Self {
        TurnPhase::HumanTurn
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum VictoryReason {
    HealthDepleted { loser: PlayerId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub winner: PlayerId,
    pub reason: VictoryReason,
}

/// Per-side combat state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub health: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default)]
    pub resources: BTreeMap<Color, u32>,
    pub class_name: String,
    #[serde(default)]
    pub equipped_skill_ids: Vec<SkillId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_skill_id: Option<SkillId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_effects: Vec<StatusEffect>,
    #[serde(default)]
    pub skill_cast_counts: BTreeMap<SkillId, u32>,
    #[serde(default)]
    pub color_affinity: BTreeMap<Color, u32>,
}

impl PlayerState {
    pub fn new(class_name: impl Into<String>, health: u32) -> Self {
        Self {
            health,
            defense: 0,
            resources: BTreeMap::new(),
            class_name: class_name.into(),
            equipped_skill_ids: Vec::new(),
            active_skill_id: None,
            status_effects: Vec::new(),
            skill_cast_counts: BTreeMap::new(),
            color_affinity: BTreeMap::new(),
        }
    }

    pub fn from_class(class: &ClassDefinition, health: u32) -> Self {
        let mut player = Self::new(class.name.clone(), health);
        player.defense = class.base_defense;
        player.equipped_skill_ids = class.skills.clone();
        player.color_affinity = class.color_affinity.clone();
        player
    }

    pub fn resource(&self, color: Color) -> u32 {
        self.resources.get(&color).copied().unwrap_or(0)
    }

    pub fn add_resource(&mut self, color: Color, amount: u32) {
        if amount == 0 || color.is_empty() {
            return;
        }
        let held = self.resources.entry(color).or_insert(0);
        *held = held.saturating_add(amount);
    }

    /// Removes up to `amount`, never going below zero.
    pub fn spend_resource(&mut self, color: Color, amount: u32) {
        let entry = self.resources.entry(color).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }

    pub fn affinity(&self, color: Color) -> u32 {
        self.color_affinity.get(&color).copied().unwrap_or(0)
    }

    pub fn cast_count(&self, skill_id: &str) -> u32 {
        self.skill_cast_counts.get(skill_id).copied().unwrap_or(0)
    }

    pub fn has_equipped(&self, skill_id: &str) -> bool {
        self.equipped_skill_ids.iter().any(|id| id == skill_id)
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }
}

/// Lifecycle notifications. Everything the engine emits is appended to
/// `GameState::event_log` and handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GameEvent {
    StartOfTurn {
        player: PlayerId,
        turn: u32,
    },
    EndOfTurn {
        player: PlayerId,
    },
    TilesSwapped {
        player: PlayerId,
        from: Position,
        to: Position,
    },
    OnMatch {
        player: PlayerId,
        color: Color,
        length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        special_shape: Option<SpecialShape>,
        combo: u32,
    },
    ResourcesGained {
        player: PlayerId,
        color: Color,
        amount: u32,
    },
    OnDamageDealt {
        source: PlayerId,
        target: PlayerId,
        amount: u32,
        skill: bool,
    },
    OnDamageTaken {
        player: PlayerId,
        amount: u32,
        remaining_health: u32,
    },
    Healed {
        player: PlayerId,
        amount: u32,
    },
    DefenseChanged {
        player: PlayerId,
        defense: u32,
    },
    SkillActivated {
        player: PlayerId,
        skill_id: SkillId,
    },
    SkillCancelled {
        player: PlayerId,
        skill_id: SkillId,
    },
    OnSkillCast {
        player: PlayerId,
        skill_id: SkillId,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Position>,
    },
    StatusApplied {
        player: PlayerId,
        turns: u32,
    },
    StatusExpired {
        player: PlayerId,
        remaining: usize,
    },
    TilesConverted {
        player: PlayerId,
        color: Color,
        count: usize,
    },
    ExtraTurn {
        player: PlayerId,
        combo: u32,
    },
    CascadeOverrun {
        passes: u32,
    },
    BoardReinitialized,
    TurnForfeited {
        player: PlayerId,
    },
    GameWon {
        winner: PlayerId,
        reason: VictoryReason,
    },
}

#[derive(Debug, Clone, Display, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[display("row {} has {} tiles, expected {}", row, actual, expected)]
    NonSquareBoard {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[display("unknown tile symbol {:?} in row {}", symbol, row)]
    UnknownTileSymbol { row: usize, symbol: char },
    #[display("{} health {} exceeds the maximum", player, value)]
    HealthAboveMaximum { player: PlayerId, value: u32 },
    #[display("phase {:?} does not belong to {}", phase, current_player)]
    PhaseMismatch {
        current_player: PlayerId,
        phase: TurnPhase,
    },
}

/// Root of a running match. Exactly one instance is mutated per action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    pub board: Board,
    pub human: PlayerState,
    pub ai: PlayerState,
    pub current_player: PlayerId,
    #[serde(default)]
    pub phase: TurnPhase,
    #[serde(default)]
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tile: Option<Position>,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub current_combo: u32,
    #[serde(default)]
    pub extra_turn_granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(board: Board, human: PlayerState, ai: PlayerState, first: PlayerId) -> Self {
        Self {
            board,
            human,
            ai,
            current_player: first,
            phase: first.turn_phase(),
            turn: 1,
            selected_tile: None,
            is_game_over: false,
            current_combo: 0,
            extra_turn_granted: false,
            outcome: None,
            event_log: Vec::new(),
        }
    }

    pub fn player(&self, id: PlayerId) -> &PlayerState {
        match id {
            PlayerId::Human => &self.human,
            PlayerId::Ai => &self.ai,
        }
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut PlayerState {
        match id {
            PlayerId::Human => &mut self.human,
            PlayerId::Ai => &mut self.ai,
        }
    }

    /// Splits the two sides into `(actor, opponent)` borrows.
    pub fn sides_mut(&mut self, actor: PlayerId) -> (&mut PlayerState, &mut PlayerState) {
        match actor {
            PlayerId::Human => (&mut self.human, &mut self.ai),
            PlayerId::Ai => (&mut self.ai, &mut self.human),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.is_game_over || self.outcome.is_some()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    /// Ends the match if either side is at zero health. Idempotent.
    pub fn evaluate_victory(&mut self) -> Option<VictoryState> {
        if let Some(outcome) = &self.outcome {
            return Some(outcome.clone());
        }
        let loser = if self.human.is_defeated() {
            PlayerId::Human
        } else if self.ai.is_defeated() {
            PlayerId::Ai
        } else {
            return None;
        };
        Some(self.declare_victory(loser.opponent(), VictoryReason::HealthDepleted { loser }))
    }

    pub fn declare_victory(&mut self, winner: PlayerId, reason: VictoryReason) -> VictoryState {
        let victory = VictoryState { winner, reason };
        if self.outcome.is_none() {
            self.record_event(GameEvent::GameWon {
                winner: victory.winner,
                reason: victory.reason.clone(),
            });
            self.outcome = Some(victory.clone());
        }
        self.is_game_over = true;
        self.phase = TurnPhase::GameOver;
        victory
    }

    pub fn integrity_check(&self, max_health: u32) -> Result<(), IntegrityError> {
        self.board.integrity_check()?;
        for id in [PlayerId::Human, PlayerId::Ai] {
            let health = self.player(id).health;
            if health > max_health {
                return Err(IntegrityError::HealthAboveMaximum {
                    player: id,
                    value: health,
                });
            }
        }
        let consistent = match self.phase {
            TurnPhase::GameOver => true,
            phase => phase == self.current_player.turn_phase(),
        };
        if !consistent {
            return Err(IntegrityError::PhaseMismatch {
                current_player: self.current_player,
                phase: self.phase,
            });
        }
        Ok(())
    }
}
