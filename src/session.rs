//! Drives a match end to end: human actions come in from the host, AI turns
//! are played out until control returns to the human or the match ends.

use tracing::{info, warn};

use crate::ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, GameAction};
use crate::game::{GameConfig, GameEvent, GameState, PlayerId, RuleEngine, RuleError, RuleResolution};

/// Upper bound on consecutive AI actions handled by one [`Session::run_ai_turns`] call.
pub const MAX_AI_ACTIONS: usize = 64;

/// Receives every event the session produces, in order.
pub trait EventSink {
    fn emit(&mut self, event: &GameEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&GameEvent),
{
    fn emit(&mut self, event: &GameEvent) {
        self(event);
    }
}

pub struct Session {
    engine: RuleEngine,
    agent: AiAgent,
    state: GameState,
    sinks: Vec<Box<dyn EventSink>>,
}

impl Session {
    pub fn new(engine: RuleEngine, agent: AiAgent, state: GameState) -> Self {
        Self {
            engine,
            agent,
            state,
            sinks: Vec::new(),
        }
    }

    /// Fresh match with the human moving first.
    pub fn start(
        config: GameConfig,
        human_class: &str,
        ai_class: &str,
        difficulty: AiDifficulty,
    ) -> Result<Self, RuleError> {
        let mut engine = RuleEngine::with_config(config);
        let state = engine.new_match(human_class, ai_class, PlayerId::Human)?;
        let agent = AiAgent::new(AiConfig::from_difficulty(difficulty));
        Ok(Self::new(engine, agent, state))
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn replace_state(&mut self, state: GameState) {
        self.state = state;
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.engine
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Runs `f` against the engine and state, then notifies the sinks.
    pub fn execute<F>(&mut self, f: F) -> Result<RuleResolution, RuleError>
    where
        F: FnOnce(&mut RuleEngine, &mut GameState) -> Result<Vec<GameEvent>, RuleError>,
    {
        let events = f(&mut self.engine, &mut self.state)?;
        self.dispatch(&events);
        Ok(RuleResolution::new(self.state.clone(), events))
    }

    /// Applies a human action. AI turns are not played; see [`Session::play`].
    pub fn act(&mut self, action: &GameAction) -> Result<RuleResolution, RuleError> {
        self.execute(|engine, state| action.apply(engine, state, PlayerId::Human))
    }

    /// Applies a human action, then lets the AI respond.
    pub fn play(&mut self, action: &GameAction) -> Result<(RuleResolution, Vec<AiDecision>), RuleError> {
        let resolution = self.act(action)?;
        let decisions = self.run_ai_turns();
        Ok((resolution, decisions))
    }

    /// Plays AI actions while the AI holds the turn. An action the engine
    /// rejects is replaced by a forfeit so the turn always advances.
    pub fn run_ai_turns(&mut self) -> Vec<AiDecision> {
        let mut decisions = Vec::new();
        while self.state.current_player == PlayerId::Ai && !self.state.is_finished() {
            if decisions.len() >= MAX_AI_ACTIONS {
                warn!(actions = decisions.len(), "ai action limit reached, yielding");
                break;
            }
            let mut decision =
                self.agent
                    .decide_action(&self.state, PlayerId::Ai, self.engine.catalog());
            let action = decision.action.clone().unwrap_or(GameAction::Forfeit);
            let result = match self.execute(|engine, state| action.apply(engine, state, PlayerId::Ai)) {
                Err(error) if action != GameAction::Forfeit => {
                    warn!(%error, ?action, "ai action rejected, forfeiting");
                    decision.action = Some(GameAction::Forfeit);
                    self.execute(|engine, state| engine.forfeit_turn(state, PlayerId::Ai))
                }
                other => other,
            };
            match result {
                Ok(resolution) => {
                    decision.resolution = Some(resolution);
                    decisions.push(decision);
                }
                Err(error) => {
                    warn!(%error, "ai could not act");
                    break;
                }
            }
        }
        if let Some(outcome) = &self.state.outcome {
            info!(winner = %outcome.winner, "match over");
        }
        decisions
    }

    fn dispatch(&mut self, events: &[GameEvent]) {
        for event in events {
            for sink in &mut self.sinks {
                sink.emit(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session(seed: u64) -> Session {
        let mut engine = RuleEngine::new().with_seed(seed);
        let state = engine
            .new_match("Pyromancer", "Shadowblade", PlayerId::Human)
            .expect("known classes");
        let agent = AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Expert), seed);
        Session::new(engine, agent, state)
    }

    #[test]
    fn human_action_hands_control_back_after_ai_turns() {
        let mut session = session(17);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        session.subscribe(Box::new(move |event: &GameEvent| sink.borrow_mut().push(event.clone())));

        let (from, to) = session
            .state()
            .board
            .legal_swaps()
            .first()
            .copied()
            .expect("generated boards always have a move");
        let (resolution, decisions) = session
            .play(&GameAction::Swap { from, to })
            .expect("legal swap");

        assert!(!resolution.events.is_empty());
        assert!(decisions.len() <= MAX_AI_ACTIONS);
        let state = session.state();
        assert!(state.is_finished() || state.current_player == PlayerId::Human || decisions.len() == MAX_AI_ACTIONS);
        assert!(seen
            .borrow()
            .iter()
            .any(|event| matches!(event, GameEvent::TilesSwapped { player: PlayerId::Human, .. })));
    }

    #[test]
    fn rejected_human_action_reaches_no_sink() {
        let mut session = session(3);
        let seen = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&seen);
        session.subscribe(Box::new(move |_: &GameEvent| *sink.borrow_mut() += 1));

        let error = session
            .act(&GameAction::CastSkill {
                skill_id: "fireball".into(),
                target: None,
            })
            .expect_err("no resources yet");
        assert!(matches!(error, RuleError::InsufficientResources { .. }));
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn ai_turns_do_nothing_on_the_human_turn() {
        let mut session = session(5);
        assert!(session.run_ai_turns().is_empty());
    }
}
