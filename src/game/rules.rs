use derive_more::{Display, Error};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::{
    board::{Board, Color, Position},
    cascade::{AnimationHost, CascadeOutcome, CascadeResolver, Immediate, PassControl},
    catalog::{Catalog, SkillId},
    config::GameConfig,
    damage::resolve_pass,
    effects::{ExpireAction, StatusLedger},
    skills::{apply_effect, can_cast, charge, Cast, ClassSkill, EffectEnv},
    state::{GameEvent, GameState, IntegrityError, PlayerId, PlayerState, VictoryState},
};

#[derive(Debug, Clone, Display, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    #[display("the match is already over")]
    GameFinished,
    #[display("it is not this player's turn")]
    NotPlayerTurn,
    #[display("{} is outside the board", position)]
    OutOfBounds { position: Position },
    #[display("{} and {} are not adjacent", from, to)]
    NotAdjacent { from: Position, to: Position },
    #[display("tile {} cannot be moved", position)]
    FrozenTile { position: Position },
    #[display("swapping {} and {} creates no match", from, to)]
    InvalidMove { from: Position, to: Position },
    #[display("not enough resources to cast {}", skill_id)]
    InsufficientResources { skill_id: SkillId },
    #[display("target must be {:?}, found {:?}", expected, actual)]
    WrongTarget { expected: Color, actual: Color },
    #[display("skill {} needs a target tile", skill_id)]
    TargetRequired { skill_id: SkillId },
    #[display("no skill is waiting for a target")]
    NoActiveSkill,
    #[display("skill {} is not equipped", skill_id)]
    SkillNotEquipped { skill_id: SkillId },
    #[display("equipped skill {} is missing from the catalog", skill_id)]
    UnknownSkill { skill_id: SkillId },
    #[display("unknown class {}", name)]
    UnknownClass { name: String },
    #[display("state integrity violated: {}", error)]
    IntegrityViolation {
        #[error(source)]
        error: IntegrityError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    pub fn new(state: GameState, mut events: Vec<GameEvent>) -> Self {
        let victory = state.outcome.clone();
        if let Some(ref outcome) = victory {
            let has_event = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameWon { .. }));
            if !has_event {
                events.push(GameEvent::GameWon {
                    winner: outcome.winner,
                    reason: outcome.reason.clone(),
                });
            }
        }

        Self {
            state,
            events,
            victory,
        }
    }
}

/// Records `event` in the state log and in the events returned to the caller.
fn emit(state: &mut GameState, events: &mut Vec<GameEvent>, event: GameEvent) {
    state.record_event(event.clone());
    events.push(event);
}

/// Turn/state machine. Every public operation either fails without touching
/// the state or runs the action to completion, cascades included.
pub struct RuleEngine {
    config: GameConfig,
    catalog: Catalog,
    resolver: CascadeResolver,
    rng: SmallRng,
    host: Box<dyn AnimationHost>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_config(GameConfig::default())
    }

    pub fn with_config(config: GameConfig) -> Self {
        Self {
            resolver: CascadeResolver::from_config(&config),
            catalog: Catalog::builtin().clone(),
            rng: SmallRng::from_entropy(),
            host: Box::new(Immediate),
            config,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_host(mut self, host: Box<dyn AnimationHost>) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[instrument(skip(self))]
    pub fn new_match(
        &mut self,
        human_class: &str,
        ai_class: &str,
        first: PlayerId,
    ) -> Result<GameState, RuleError> {
        let human = self.player_for(human_class)?;
        let ai = self.player_for(ai_class)?;
        let board = Board::generate(self.config.board_size, &self.config.colors, &mut self.rng);
        let mut state = GameState::new(board, human, ai, first);
        let turn = state.turn;
        state.record_event(GameEvent::StartOfTurn {
            player: first,
            turn,
        });
        info!(human = %state.human.class_name, ai = %state.ai.class_name, %first, "match started");
        Ok(state)
    }

    pub fn check_victory(state: &mut GameState) -> Option<VictoryState> {
        state.evaluate_victory()
    }

    fn player_for(&self, class_name: &str) -> Result<PlayerState, RuleError> {
        let class = self
            .catalog
            .class(class_name)
            .ok_or_else(|| RuleError::UnknownClass {
                name: class_name.to_string(),
            })?;
        Ok(PlayerState::from_class(class, self.config.max_health))
    }

    fn ensure_integrity(&self, state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check(self.config.max_health)
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_active(&self, state: &GameState, player: PlayerId) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        self.ensure_integrity(state)?;
        if state.current_player != player {
            return Err(RuleError::NotPlayerTurn);
        }
        Ok(())
    }

    fn ensure_in_bounds(state: &GameState, position: Position) -> Result<(), RuleError> {
        if !state.board.in_bounds(position) {
            return Err(RuleError::OutOfBounds { position });
        }
        Ok(())
    }

    fn equipped_skill(&self, player: &PlayerState, skill_id: &str) -> Result<&ClassSkill, RuleError> {
        if !player.has_equipped(skill_id) {
            return Err(RuleError::SkillNotEquipped {
                skill_id: skill_id.to_string(),
            });
        }
        self.catalog.skill(skill_id).ok_or_else(|| {
            error!(skill_id, class = %player.class_name, "equipped skill missing from catalog");
            RuleError::UnknownSkill {
                skill_id: skill_id.to_string(),
            }
        })
    }

    #[instrument(skip(self, state), fields(turn = state.turn))]
    pub fn swap(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        from: Position,
        to: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        Self::ensure_in_bounds(state, from)?;
        Self::ensure_in_bounds(state, to)?;
        if !from.is_adjacent(&to) {
            return Err(RuleError::NotAdjacent { from, to });
        }
        for position in [from, to] {
            if !state.board.is_swappable(position) {
                return Err(RuleError::FrozenTile { position });
            }
        }
        if state.board.matches_after_swap(from, to).is_empty() {
            debug!(%from, %to, "swap rejected, no match");
            return Err(RuleError::InvalidMove { from, to });
        }

        let mut events = Vec::new();
        if let Some(skill_id) = state.player_mut(player).active_skill_id.take() {
            emit(state, &mut events, GameEvent::SkillCancelled { player, skill_id });
        }
        state.current_combo = 0;
        state.selected_tile = None;
        state.board.swap(from, to);
        emit(state, &mut events, GameEvent::TilesSwapped { player, from, to });

        self.resolve_board(state, player, &mut events);
        self.finish_action(state, player, &mut events);
        Ok(events)
    }

    /// Click-style input: first tile selects, an adjacent second tile swaps,
    /// the same tile deselects, anything else moves the selection. While a
    /// targeted skill is active the tile is used as its target instead.
    #[instrument(skip(self, state))]
    pub fn select_tile(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        Self::ensure_in_bounds(state, position)?;
        if state.player(player).active_skill_id.is_some() {
            return self.select_target(state, player, position);
        }

        match state.selected_tile {
            Some(selected) if selected == position => {
                state.selected_tile = None;
                Ok(Vec::new())
            }
            Some(selected) if selected.is_adjacent(&position) => {
                self.swap(state, player, selected, position)
            }
            _ => {
                if !state.board.is_swappable(position) {
                    return Err(RuleError::FrozenTile { position });
                }
                state.selected_tile = Some(position);
                Ok(Vec::new())
            }
        }
    }

    /// Untargeted skills are cast on the spot; targeted ones wait for
    /// [`RuleEngine::select_target`].
    #[instrument(skip(self, state))]
    pub fn activate_skill(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        skill_id: &str,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        let skill = self.equipped_skill(state.player(player), skill_id)?.clone();
        if !can_cast(state.player(player), &skill) {
            return Err(RuleError::InsufficientResources { skill_id: skill.id });
        }
        if !skill.requires_target {
            return self.cast_skill(state, player, &skill.id, None);
        }

        let mut events = Vec::new();
        state.selected_tile = None;
        state.player_mut(player).active_skill_id = Some(skill.id.clone());
        emit(
            state,
            &mut events,
            GameEvent::SkillActivated {
                player,
                skill_id: skill.id,
            },
        );
        Ok(events)
    }

    #[instrument(skip(self, state))]
    pub fn select_target(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        let skill_id = state
            .player(player)
            .active_skill_id
            .clone()
            .ok_or(RuleError::NoActiveSkill)?;
        self.cast_skill(state, player, &skill_id, Some(position))
    }

    pub fn cancel_skill(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        let skill_id = state
            .player_mut(player)
            .active_skill_id
            .take()
            .ok_or(RuleError::NoActiveSkill)?;
        let mut events = Vec::new();
        emit(state, &mut events, GameEvent::SkillCancelled { player, skill_id });
        Ok(events)
    }

    /// Validates cost and target, applies the effect, then charges the cost
    /// and clears the active skill. Nothing changes when validation fails.
    #[instrument(skip(self, state), fields(turn = state.turn))]
    pub fn cast_skill(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
        skill_id: &str,
        target: Option<Position>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        let skill = self.equipped_skill(state.player(player), skill_id)?.clone();
        if !can_cast(state.player(player), &skill) {
            return Err(RuleError::InsufficientResources { skill_id: skill.id });
        }
        if let Some(position) = target {
            Self::ensure_in_bounds(state, position)?;
        }
        if skill.requires_target {
            let position = target.ok_or_else(|| RuleError::TargetRequired {
                skill_id: skill.id.clone(),
            })?;
            if let Some(expected) = skill.target_color {
                let actual = state.board.color_at(position);
                if actual != expected {
                    debug!(skill = %skill.id, ?expected, ?actual, "target rejected");
                    return Err(RuleError::WrongTarget { expected, actual });
                }
            }
        }

        let mut events = Vec::new();
        state.current_combo = 0;
        state.selected_tile = None;
        let cast = Cast {
            caster: player,
            skill_id: &skill.id,
            target,
            previous_casts: state.player(player).cast_count(&skill.id),
        };
        let effect_events = {
            let mut env = EffectEnv {
                config: &self.config,
                resolver: &self.resolver,
                rng: &mut self.rng,
                host: self.host.as_mut(),
            };
            apply_effect(&skill.effect, state, &cast, &mut env)
        };

        let caster = state.player_mut(player);
        charge(caster, &skill);
        caster.active_skill_id = None;
        *caster.skill_cast_counts.entry(skill.id.clone()).or_insert(0) += 1;
        emit(
            state,
            &mut events,
            GameEvent::OnSkillCast {
                player,
                skill_id: skill.id.clone(),
                target,
            },
        );
        for event in effect_events {
            emit(state, &mut events, event);
        }
        info!(%player, skill = %skill.id, "skill cast");

        if !state.player(player.opponent()).is_defeated() {
            let outcome = self.resolve_board(state, player, &mut events);
            if outcome.passes == 0 {
                state.board.settle();
                if self.resolver.ensure_playable(&mut state.board, &mut self.rng) {
                    emit(state, &mut events, GameEvent::BoardReinitialized);
                }
            }
        }
        self.finish_action(state, player, &mut events);
        Ok(events)
    }

    /// Ends the turn without acting, used when no move exists.
    #[instrument(skip(self, state))]
    pub fn forfeit_turn(
        &mut self,
        state: &mut GameState,
        player: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_active(state, player)?;
        let mut events = Vec::new();
        state.current_combo = 0;
        if let Some(skill_id) = state.player_mut(player).active_skill_id.take() {
            emit(state, &mut events, GameEvent::SkillCancelled { player, skill_id });
        }
        warn!(%player, "turn forfeited");
        emit(state, &mut events, GameEvent::TurnForfeited { player });
        self.complete_turn(state, player, &mut events);
        Ok(events)
    }

    /// Cascades whatever the board holds, crediting every pass to `actor`.
    fn resolve_board(
        &mut self,
        state: &mut GameState,
        actor: PlayerId,
        events: &mut Vec<GameEvent>,
    ) -> CascadeOutcome {
        let config = &self.config;
        let mut pass_events = Vec::new();
        let mut earned_extra_turn = false;

        let GameState {
            board,
            human,
            ai,
            current_combo,
            ..
        } = state;
        let (attacker, defender) = match actor {
            PlayerId::Human => (human, ai),
            PlayerId::Ai => (ai, human),
        };
        let outcome = self.resolver.resolve(
            board,
            &mut self.rng,
            self.host.as_mut(),
            *current_combo,
            |board, matches, combo| {
                let pass = resolve_pass(actor, attacker, defender, board, matches, combo, config);
                earned_extra_turn |= pass.extra_turn;
                pass_events.extend(pass.events);
                if pass.defeated {
                    PassControl::Halt
                } else {
                    PassControl::Continue
                }
            },
        );

        state.current_combo = outcome.combo;
        if earned_extra_turn {
            state.extra_turn_granted = true;
        }
        for event in pass_events {
            emit(state, events, event);
        }
        if outcome.overrun {
            emit(
                state,
                events,
                GameEvent::CascadeOverrun {
                    passes: outcome.passes,
                },
            );
        }
        if outcome.reinitialized {
            emit(state, events, GameEvent::BoardReinitialized);
        }
        outcome
    }

    fn finish_action(&mut self, state: &mut GameState, actor: PlayerId, events: &mut Vec<GameEvent>) {
        if let Some(victory) = state.evaluate_victory() {
            info!(winner = %victory.winner, "match decided");
            events.push(GameEvent::GameWon {
                winner: victory.winner,
                reason: victory.reason,
            });
            return;
        }
        self.complete_turn(state, actor, events);
    }

    /// End-of-turn bookkeeping for `actor`: tile conversion, ledger tick,
    /// then either an extra turn or a hand-over to the opponent.
    fn complete_turn(&mut self, state: &mut GameState, actor: PlayerId, events: &mut Vec<GameEvent>) {
        emit(state, events, GameEvent::EndOfTurn { player: actor });
        self.convert_tiles(state, actor, events);

        let before = state.player(actor).status_effects.len();
        let expired = StatusLedger::tick(&mut state.player_mut(actor).status_effects);
        for action in expired {
            Self::apply_expire(state, actor, action, events);
        }
        let remaining = state.player(actor).status_effects.len();
        if remaining < before {
            emit(
                state,
                events,
                GameEvent::StatusExpired {
                    player: actor,
                    remaining,
                },
            );
        }

        let keeps_turn = state.extra_turn_granted
            || StatusLedger::has_extra_turn(&state.player(actor).status_effects)
            || state.current_combo >= self.config.combo_threshold;
        state.extra_turn_granted = false;
        state.selected_tile = None;

        let next = if keeps_turn {
            let combo = state.current_combo;
            emit(state, events, GameEvent::ExtraTurn { player: actor, combo });
            actor
        } else {
            actor.opponent()
        };
        state.current_player = next;
        state.phase = next.turn_phase();
        state.turn += 1;
        let turn = state.turn;
        emit(state, events, GameEvent::StartOfTurn { player: next, turn });
        debug!(%actor, %next, turn, keeps_turn, "turn completed");
    }

    /// Recolors random tiles for an active `convert_tiles` effect, then lets
    /// the board settle without crediting anyone.
    fn convert_tiles(&mut self, state: &mut GameState, owner: PlayerId, events: &mut Vec<GameEvent>) {
        let Some(conversion) = StatusLedger::convert_tiles(&state.player(owner).status_effects) else {
            return;
        };
        let candidates: Vec<Position> = state
            .board
            .positions()
            .filter(|pos| {
                state
                    .board
                    .get(*pos)
                    .map(|tile| !tile.is_empty() && !tile.frozen && tile.color != conversion.color)
                    .unwrap_or(false)
            })
            .collect();
        let chosen: Vec<Position> = candidates
            .choose_multiple(&mut self.rng, conversion.count)
            .copied()
            .collect();
        for pos in &chosen {
            state.board.set_color(*pos, conversion.color);
        }
        emit(
            state,
            events,
            GameEvent::TilesConverted {
                player: owner,
                color: conversion.color,
                count: chosen.len(),
            },
        );

        let outcome = self
            .resolver
            .stabilize(&mut state.board, &mut self.rng, self.host.as_mut());
        if outcome.overrun {
            emit(
                state,
                events,
                GameEvent::CascadeOverrun {
                    passes: outcome.passes,
                },
            );
        }
        if outcome.reinitialized {
            emit(state, events, GameEvent::BoardReinitialized);
        }
    }

    fn apply_expire(
        state: &mut GameState,
        owner: PlayerId,
        action: ExpireAction,
        events: &mut Vec<GameEvent>,
    ) {
        match action {
            ExpireAction::Thaw => state.board.tiles_mut().for_each(|tile| tile.frozen = false),
            ExpireAction::Extinguish => state.board.tiles_mut().for_each(|tile| tile.ignited = false),
            ExpireAction::LoseDefense { amount } => {
                let player = state.player_mut(owner);
                player.defense = player.defense.saturating_sub(amount);
                let defense = player.defense;
                emit(
                    state,
                    events,
                    GameEvent::DefenseChanged {
                        player: owner,
                        defense,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::SpecialShape;
    use crate::game::effects::StatusEffect;
    use crate::game::state::TurnPhase;

    // Swapping (0,1) with (1,1) builds a red T of five; (1,3) with (2,3) a plain red three.
    const T_BOARD: [&str; 8] = [
        "KRGBYKGB",
        "RYRKRGBY",
        "BRKRGBYK",
        "YRBGBYKR",
        "KGGBYKRG",
        "RGBYKRGB",
        "GBYKRGBY",
        "BYKRGBYK",
    ];

    fn fixture(human: &str, ai: &str) -> GameState {
        let catalog = Catalog::builtin();
        GameState::new(
            Board::from_rows(&T_BOARD).expect("fixture should parse"),
            PlayerState::from_class(catalog.class(human).expect("known class"), 100),
            PlayerState::from_class(catalog.class(ai).expect("known class"), 100),
            PlayerId::Human,
        )
    }

    fn engine() -> RuleEngine {
        RuleEngine::new().with_seed(7)
    }

    fn first_match(events: &[GameEvent]) -> Option<(usize, Option<SpecialShape>)> {
        events.iter().find_map(|event| match event {
            GameEvent::OnMatch {
                length,
                special_shape,
                ..
            } => Some((*length, *special_shape)),
            _ => None,
        })
    }

    #[test]
    fn t_shape_grants_an_extra_turn() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        let events = engine
            .swap(&mut state, PlayerId::Human, Position::new(0, 1), Position::new(1, 1))
            .expect("swap forms a T");

        assert_eq!(first_match(&events), Some((5, Some(SpecialShape::T))));
        // 3 * ceil(5/3) * 2.0 * 1.5
        assert!(state.ai.health <= 82);
        assert!(state.human.resource(Color::Red) >= 5);
        assert_eq!(state.current_player, PlayerId::Human);
        assert_eq!(state.phase, TurnPhase::HumanTurn);
        assert!(!state.extra_turn_granted, "flag is consumed when the turn completes");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::ExtraTurn { player: PlayerId::Human, .. })));
    }

    #[test]
    fn plain_match_hands_the_turn_over_unless_a_cascade_earns_more() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        let events = engine
            .swap(&mut state, PlayerId::Human, Position::new(1, 3), Position::new(2, 3))
            .expect("swap forms a three");

        assert_eq!(first_match(&events), Some((3, None)));
        assert!(state.ai.health <= 97);
        let kept = events
            .iter()
            .any(|event| matches!(event, GameEvent::ExtraTurn { .. }));
        assert_eq!(state.current_player == PlayerId::Human, kept);
        assert_eq!(state.turn, 2);
        assert_eq!(state.event_log.len(), events.len());
    }

    #[test]
    fn combo_threshold_keeps_the_turn() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        state.current_combo = 10;
        let mut events = Vec::new();
        engine.complete_turn(&mut state, PlayerId::Human, &mut events);
        assert_eq!(state.current_player, PlayerId::Human);

        let config = GameConfig {
            combo_threshold: 1,
            ..GameConfig::default()
        };
        let mut engine = RuleEngine::with_config(config).with_seed(3);
        let mut state = fixture("Pyromancer", "Druid");
        engine
            .swap(&mut state, PlayerId::Human, Position::new(1, 3), Position::new(2, 3))
            .expect("swap forms a three");
        assert_eq!(state.current_player, PlayerId::Human);
    }

    #[test]
    fn swap_without_match_changes_nothing() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        let before = state.clone();
        let error = engine
            .swap(&mut state, PlayerId::Human, Position::new(0, 0), Position::new(0, 1))
            .expect_err("no match");
        assert!(matches!(error, RuleError::InvalidMove { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn swap_guards() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        let a = Position::new(0, 1);
        let b = Position::new(1, 1);

        assert_eq!(
            engine.swap(&mut state, PlayerId::Ai, a, b),
            Err(RuleError::NotPlayerTurn)
        );
        assert!(matches!(
            engine.swap(&mut state, PlayerId::Human, a, Position::new(2, 2)),
            Err(RuleError::NotAdjacent { .. })
        ));
        assert!(matches!(
            engine.swap(&mut state, PlayerId::Human, a, Position::new(0, 8)),
            Err(RuleError::OutOfBounds { .. })
        ));
        if let Some(tile) = state.board.get_mut(a) {
            tile.frozen = true;
        }
        assert_eq!(
            engine.swap(&mut state, PlayerId::Human, a, b),
            Err(RuleError::FrozenTile { position: a })
        );
    }

    #[test]
    fn unaffordable_skill_is_rejected_without_charge() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        state.human.add_resource(Color::Red, 2);
        state.human.active_skill_id = Some("ignite".into());
        let before = state.clone();

        let error = engine
            .activate_skill(&mut state, PlayerId::Human, "fireball")
            .expect_err("cost is red 4 + yellow 3");
        assert!(matches!(error, RuleError::InsufficientResources { .. }));
        assert_eq!(state.human.resource(Color::Red), 2);
        assert_eq!(state.human.active_skill_id.as_deref(), Some("ignite"));
        assert_eq!(state, before);
    }

    #[test]
    fn targeted_skill_checks_the_tile_color() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        state.human.add_resource(Color::Red, 3);

        let events = engine
            .activate_skill(&mut state, PlayerId::Human, "ignite")
            .expect("ignite is affordable");
        assert!(matches!(events.as_slice(), [GameEvent::SkillActivated { .. }]));

        let error = engine
            .select_tile(&mut state, PlayerId::Human, Position::new(0, 0))
            .expect_err("black tile");
        assert_eq!(
            error,
            RuleError::WrongTarget {
                expected: Color::Red,
                actual: Color::Black
            }
        );
        assert_eq!(state.human.resource(Color::Red), 3);
        assert!(state.human.active_skill_id.is_some());

        engine
            .select_tile(&mut state, PlayerId::Human, Position::new(0, 1))
            .expect("red tile");
        assert_eq!(state.human.resource(Color::Red), 0);
        assert!(state.human.active_skill_id.is_none());
        assert_eq!(state.human.cast_count("ignite"), 1);
        assert_eq!(state.ai.health, 98);
        assert!(state.board.count_where(|tile| tile.ignited) >= 1);
        assert_eq!(state.current_player, PlayerId::Ai);
    }

    #[test]
    fn cancel_clears_the_pending_skill() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        state.human.add_resource(Color::Red, 3);
        engine
            .activate_skill(&mut state, PlayerId::Human, "ignite")
            .expect("ignite is affordable");
        let events = engine
            .cancel_skill(&mut state, PlayerId::Human)
            .expect("a skill is pending");
        assert!(matches!(events.as_slice(), [GameEvent::SkillCancelled { .. }]));
        assert_eq!(
            engine.cancel_skill(&mut state, PlayerId::Human),
            Err(RuleError::NoActiveSkill)
        );
        assert_eq!(
            engine.activate_skill(&mut state, PlayerId::Human, "backstab"),
            Err(RuleError::SkillNotEquipped {
                skill_id: "backstab".into()
            })
        );
    }

    #[test]
    fn skill_extra_turn_keeps_the_caster_active() {
        let mut engine = engine();
        let mut state = fixture("Shadowblade", "Druid");
        state.human.add_resource(Color::Black, 3);
        engine
            .activate_skill(&mut state, PlayerId::Human, "shadow_step")
            .expect("affordable");
        engine
            .select_target(&mut state, PlayerId::Human, Position::new(0, 0))
            .expect("black target");
        assert_eq!(state.current_player, PlayerId::Human);
        assert!(!state.extra_turn_granted);
        assert_eq!(state.board.count_where(|tile| tile.is_empty()), 0);
    }

    #[test]
    fn only_the_acting_player_is_ticked() {
        let mut engine = engine();
        let mut state = fixture("Frost Warden", "Druid");
        state.human.defense = 4;
        state.human.status_effects.push(
            StatusEffect::new(1).on_expire(ExpireAction::LoseDefense { amount: 3 }),
        );
        state.ai.status_effects.push(StatusEffect::new(2));

        let events = engine
            .forfeit_turn(&mut state, PlayerId::Human)
            .expect("human may forfeit");
        assert!(state.human.status_effects.is_empty());
        assert_eq!(state.human.defense, 1);
        assert_eq!(state.ai.status_effects[0].turns_remaining, 2);
        assert_eq!(state.current_player, PlayerId::Ai);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::StatusExpired { remaining: 0, .. })));
    }

    #[test]
    fn convert_tiles_fires_when_the_owner_ends_a_turn() {
        let mut engine = engine();
        let mut state = fixture("Druid", "Shadowblade");
        state
            .human
            .status_effects
            .push(StatusEffect::new(2).with_convert_tiles(Color::Black, 3));
        let events = engine
            .forfeit_turn(&mut state, PlayerId::Human)
            .expect("human may forfeit");
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::TilesConverted {
                color: Color::Black,
                count: 3,
                ..
            }
        )));
        assert_eq!(state.board.count_where(|tile| tile.is_empty()), 0);
        assert_eq!(state.human.resource(Color::Black), 0, "conversions award nothing");
    }

    #[test]
    fn knockout_ends_the_match() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        state.ai.health = 1;
        let events = engine
            .swap(&mut state, PlayerId::Human, Position::new(0, 1), Position::new(1, 1))
            .expect("swap forms a T");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::GameWon { winner: PlayerId::Human, .. })));
        assert_eq!(state.phase, TurnPhase::GameOver);
        assert!(state.is_game_over);
        assert_eq!(
            engine.forfeit_turn(&mut state, PlayerId::Human),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn select_then_adjacent_select_swaps() {
        let mut engine = engine();
        let mut state = fixture("Pyromancer", "Druid");
        engine
            .select_tile(&mut state, PlayerId::Human, Position::new(0, 1))
            .expect("select");
        assert_eq!(state.selected_tile, Some(Position::new(0, 1)));
        let events = engine
            .select_tile(&mut state, PlayerId::Human, Position::new(1, 1))
            .expect("adjacent select swaps");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::TilesSwapped { .. })));
        assert_eq!(state.selected_tile, None);
    }

    #[test]
    fn new_match_builds_a_playable_board() {
        let mut engine = engine();
        let state = engine
            .new_match("Pyromancer", "frost warden", PlayerId::Human)
            .expect("known classes");
        assert!(state.board.find_matches().is_empty());
        assert!(state.board.has_legal_move());
        assert_eq!(state.ai.class_name, "Frost Warden");
        assert_eq!(state.ai.defense, 1);
        assert!(matches!(
            engine.new_match("Bard", "Druid", PlayerId::Ai),
            Err(RuleError::UnknownClass { .. })
        ));
    }
}
