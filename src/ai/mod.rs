//! Opponent move selection.

pub mod evaluator;

pub use evaluator::{
    evaluate_moves, hint, score_swap, select_move_by_difficulty, AiAgent, AiConfig, AiDecision,
    AiDifficulty, CandidateMove, GameAction, MAX_CANDIDATES,
};
