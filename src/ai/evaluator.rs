use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{
    can_cast, Board, Catalog, Color, GameEvent, GameState, PlayerId, Position, RuleEngine,
    RuleError, RuleResolution, SkillId,
};

/// How many scored swaps the selector chooses from.
pub const MAX_CANDIDATES: usize = 5;

const MATCH_SCORE: u32 = 1000;
const EXTRA_LENGTH_SCORE: u32 = 2000;
const PRIMARY_COLOR_SCORE: u32 = 5000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Novice,
    Easy,
    Normal,
    Hard,
    Expert,
}

impl AiDifficulty {
    /// Numeric level, 1 (novice) to 5 (expert).
    pub fn level(self) -> u8 {
        match self {
            AiDifficulty::Novice => 1,
            AiDifficulty::Easy => 2,
            AiDifficulty::Normal => 3,
            AiDifficulty::Hard => 4,
            AiDifficulty::Expert => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(AiDifficulty::Novice),
            2 => Some(AiDifficulty::Easy),
            3 => Some(AiDifficulty::Normal),
            4 => Some(AiDifficulty::Hard),
            5 => Some(AiDifficulty::Expert),
            _ => None,
        }
    }
}

impl Default for AiDifficulty {
    fn default() -> Self {
        AiDifficulty::Normal
    }
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        if let Ok(level) = value.parse::<u8>() {
            return AiDifficulty::from_level(level).ok_or(());
        }
        match value.as_str() {
            "novice" | "beginner" => Ok(AiDifficulty::Novice),
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" => Ok(AiDifficulty::Hard),
            "expert" | "extreme" => Ok(AiDifficulty::Expert),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    /// Cast the first affordable skill before looking at swaps.
    pub use_skills: bool,
    pub max_candidates: usize,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        Self {
            difficulty,
            use_skills: true,
            max_candidates: MAX_CANDIDATES,
        }
    }

    pub fn without_skills(mut self) -> Self {
        self.use_skills = false;
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateMove {
    pub from: Position,
    pub to: Position,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    Swap {
        from: Position,
        to: Position,
    },
    CastSkill {
        skill_id: SkillId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Position>,
    },
    Forfeit,
}

impl GameAction {
    /// Runs the action through the rules engine on behalf of `player`.
    pub fn apply(
        &self,
        engine: &mut RuleEngine,
        state: &mut GameState,
        player: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match self {
            GameAction::Swap { from, to } => engine.swap(state, player, *from, *to),
            GameAction::CastSkill { skill_id, target } => {
                engine.cast_skill(state, player, skill_id, *target)
            }
            GameAction::Forfeit => engine.forfeit_turn(state, player),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GameAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default)]
    pub candidates: Vec<CandidateMove>,
    pub difficulty: AiDifficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RuleResolution>,
}

/// Score of one swap: every resulting match is worth 1000, plus 2000 per tile
/// beyond three, plus 5000 when it is in the mover's primary color. `None`
/// when the swap matches nothing.
pub fn score_swap(board: &Board, from: Position, to: Position, primary: Option<Color>) -> Option<u32> {
    let matches = board.matches_after_swap(from, to);
    if matches.is_empty() {
        return None;
    }
    let score = matches
        .iter()
        .map(|matched| {
            let extra = matched.length.saturating_sub(3) as u32;
            let primary_bonus = if Some(matched.color) == primary {
                PRIMARY_COLOR_SCORE
            } else {
                0
            };
            MATCH_SCORE + EXTRA_LENGTH_SCORE * extra + primary_bonus
        })
        .sum();
    Some(score)
}

/// Best-first list of the top [`MAX_CANDIDATES`] scoring swaps. Frozen tiles
/// never take part.
pub fn evaluate_moves(board: &Board, primary: Option<Color>) -> Vec<CandidateMove> {
    let mut moves: Vec<CandidateMove> = board
        .candidate_swaps()
        .into_iter()
        .filter_map(|(from, to)| {
            score_swap(board, from, to, primary).map(|score| CandidateMove { from, to, score })
        })
        .collect();
    moves.sort_by(|a, b| b.score.cmp(&a.score));
    moves.truncate(MAX_CANDIDATES);
    moves
}

/// Expert always takes the best move; lower levels pick uniformly from the
/// first `5 - level` entries.
pub fn select_move_by_difficulty<'a, R: Rng + ?Sized>(
    moves: &'a [CandidateMove],
    difficulty: AiDifficulty,
    rng: &mut R,
) -> Option<&'a CandidateMove> {
    if moves.is_empty() {
        return None;
    }
    let level = difficulty.level();
    if level >= 5 {
        return moves.first();
    }
    let upper = usize::from(5 - level).min(moves.len() - 1);
    moves.get(rng.gen_range(0..=upper))
}

/// Suggested swap for the player to move.
pub fn hint(board: &Board, primary: Option<Color>) -> Option<CandidateMove> {
    evaluate_moves(board, primary).into_iter().next()
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Skill first, then the difficulty-weighted swap, else forfeit.
    pub fn decide_action(
        &mut self,
        state: &GameState,
        player_id: PlayerId,
        catalog: &Catalog,
    ) -> AiDecision {
        let difficulty = self.config.difficulty;
        let mut decision = AiDecision {
            action: None,
            score: None,
            candidates: Vec::new(),
            difficulty,
            resolution: None,
        };
        if state.is_finished() {
            return decision;
        }

        if self.config.use_skills {
            if let Some(action) = Self::affordable_skill(state, player_id, catalog) {
                debug!(%player_id, ?action, "ai casts a skill");
                decision.action = Some(action);
                return decision;
            }
        }

        let primary = catalog
            .class(&state.player(player_id).class_name)
            .map(|class| class.primary_color);
        let mut moves = evaluate_moves(&state.board, primary);
        moves.truncate(self.config.max_candidates.max(1));
        decision.action = Some(
            match select_move_by_difficulty(&moves, difficulty, &mut self.rng) {
                Some(choice) => {
                    decision.score = Some(choice.score);
                    GameAction::Swap {
                        from: choice.from,
                        to: choice.to,
                    }
                }
                None => GameAction::Forfeit,
            },
        );
        debug!(%player_id, candidates = moves.len(), action = ?decision.action, "ai decided");
        decision.candidates = moves;
        decision
    }

    /// First equipped, affordable skill with a usable target.
    fn affordable_skill(state: &GameState, player_id: PlayerId, catalog: &Catalog) -> Option<GameAction> {
        let player = state.player(player_id);
        player.equipped_skill_ids.iter().find_map(|skill_id| {
            let skill = catalog.skill(skill_id)?;
            if !can_cast(player, skill) {
                return None;
            }
            let target = match (skill.requires_target, skill.target_color) {
                (false, _) => None,
                (true, Some(color)) => Some(state.board.positions_of(color).into_iter().next()?),
                (true, None) => Some(state.board.center()),
            };
            Some(GameAction::CastSkill {
                skill_id: skill.id.clone(),
                target,
            })
        })
    }
}
