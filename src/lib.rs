pub mod ai;
pub mod game;
pub mod session;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    evaluate_moves, hint, select_move_by_difficulty, AiAgent, AiConfig, AiDecision, AiDifficulty,
    CandidateMove, GameAction,
};
pub use game::{
    AnimationHost, Board, Catalog, ClassSkill, Color, GameConfig, GameEvent, GameState, Match,
    PlayerId, PlayerState, Position, RuleEngine, RuleError, RuleResolution, SkillEffect,
    StatusEffect, TurnPhase, VictoryReason, VictoryState,
};
pub use session::{EventSink, Session, MAX_AI_ACTIONS};

const DEFAULT_HUMAN_CLASS: &str = "Pyromancer";
const DEFAULT_AI_CLASS: &str = "Frost Warden";

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    let banner = concat!("match_battle_core ", env!("CARGO_PKG_VERSION"), " loaded");
    web_sys::console::log_1(&banner.into());
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn parse_difficulty(difficulty: Option<String>) -> AiDifficulty {
    difficulty
        .as_deref()
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or_default()
}

fn primary_color(catalog: &Catalog, player: &PlayerState) -> Option<Color> {
    catalog
        .class(&player.class_name)
        .map(|class| class.primary_color)
}

#[wasm_bindgen]
pub struct GameEngine {
    session: Session,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        human_class: Option<String>,
        ai_class: Option<String>,
        difficulty: Option<String>,
        config_json: Option<String>,
    ) -> Result<GameEngine, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => GameConfig::default(),
        };
        let session = Session::start(
            config,
            human_class.as_deref().unwrap_or(DEFAULT_HUMAN_CLASS),
            ai_class.as_deref().unwrap_or(DEFAULT_AI_CLASS),
            parse_difficulty(difficulty),
        )
        .map_err(to_js_error)?;
        Ok(GameEngine { session })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(self.session.state())
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check(self.session.engine().config().max_health)
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
        self.session.replace_state(state);
        Ok(())
    }

    pub fn swap(
        &mut self,
        from_row: usize,
        from_col: usize,
        to_row: usize,
        to_col: usize,
    ) -> Result<String, JsValue> {
        let from = Position::new(from_row, from_col);
        let to = Position::new(to_row, to_col);
        let resolution = self
            .session
            .execute(|engine, state| engine.swap(state, PlayerId::Human, from, to))
            .map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn select_tile(&mut self, row: usize, col: usize) -> Result<String, JsValue> {
        let position = Position::new(row, col);
        let resolution = self
            .session
            .execute(|engine, state| engine.select_tile(state, PlayerId::Human, position))
            .map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn activate_skill(&mut self, skill_id: &str) -> Result<String, JsValue> {
        let resolution = self
            .session
            .execute(|engine, state| engine.activate_skill(state, PlayerId::Human, skill_id))
            .map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn select_target(&mut self, row: usize, col: usize) -> Result<String, JsValue> {
        let position = Position::new(row, col);
        let resolution = self
            .session
            .execute(|engine, state| engine.select_target(state, PlayerId::Human, position))
            .map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn cancel_skill(&mut self) -> Result<String, JsValue> {
        let resolution = self
            .session
            .execute(|engine, state| engine.cancel_skill(state, PlayerId::Human))
            .map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn apply_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let resolution = self.session.act(&action).map_err(to_js_error)?;
        to_json(&resolution)
    }

    pub fn hint_json(&self) -> Result<String, JsValue> {
        let state = self.session.state();
        let primary = primary_color(self.session.engine().catalog(), &state.human);
        to_json(&hint(&state.board, primary))
    }

    /// Plays the AI until the human is on move again.
    pub fn run_ai_json(&mut self) -> Result<String, JsValue> {
        let decisions = self.session.run_ai_turns();
        to_json(&decisions)
    }

    /// Computes (without applying) the AI's next action after an optional delay.
    pub fn think_ai(&self, difficulty: Option<String>, delay_ms: Option<u32>) -> Promise {
        let state = self.session.state().clone();
        let catalog = self.session.engine().catalog().clone();
        let difficulty = parse_difficulty(difficulty);
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut agent = AiAgent::new(AiConfig::from_difficulty(difficulty));
            let decision = agent.decide_action(&state, PlayerId::Ai, &catalog);
            let json = to_json(&decision)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

#[wasm_bindgen(js_name = "findMatches")]
pub fn find_matches(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    board
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    to_value(&board.find_matches()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(state: JsValue, difficulty: Option<String>) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut agent = AiAgent::new(AiConfig::from_difficulty(parse_difficulty(difficulty)));
    let decision = agent.decide_action(&state, state.current_player, Catalog::builtin());
    to_value(&decision).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "checkVictory")]
pub fn check_victory(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let outcome = RuleEngine::check_victory(&mut state);
    to_value(&outcome).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check(GameConfig::default().max_health)
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
