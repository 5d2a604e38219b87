//! Skill descriptors and the interpreter that applies them to a [`GameState`].

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::board::{Color, Position};
use super::cascade::{AnimationHost, CascadeResolver};
use super::catalog::SkillId;
use super::config::GameConfig;
use super::damage::{apply_damage, push_damage_events, DamageKind};
use super::effects::{StatusEffect, StatusLedger};
use super::state::{GameEvent, GameState, PlayerId, PlayerState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SkillTarget {
    Caster,
    Opponent,
}

/// What a skill does. Area and line effects center on the chosen tile, or on
/// the board center when the skill is cast without a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SkillEffect {
    Damage {
        amount: u32,
        /// Added once per earlier cast of the same skill.
        #[serde(default)]
        per_cast_bonus: u32,
    },
    Heal {
        amount: u32,
    },
    GainDefense {
        amount: u32,
    },
    GainResources {
        color: Color,
        amount: u32,
    },
    DestroyArea {
        radius: usize,
    },
    DestroyRow,
    DestroyColumn,
    /// Every tile sharing the target's color becomes `to`.
    ConvertColor {
        to: Color,
    },
    Ignite {
        radius: usize,
    },
    Freeze {
        radius: usize,
    },
    ApplyStatus {
        target: SkillTarget,
        effect: StatusEffect,
    },
    ExtraTurn,
    Composite {
        effects: Vec<SkillEffect>,
    },
}

impl SkillEffect {
    /// Whether applying this effect can leave new runs on the board.
    pub fn touches_board(&self) -> bool {
        match self {
            SkillEffect::DestroyArea { .. }
            | SkillEffect::DestroyRow
            | SkillEffect::DestroyColumn
            | SkillEffect::ConvertColor { .. } => true,
            SkillEffect::Composite { effects } => effects.iter().any(SkillEffect::touches_board),
            _ => false,
        }
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassSkill {
    pub id: SkillId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cost: BTreeMap<Color, u32>,
    pub primary_color: Color,
    pub secondary_color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_color: Option<Color>,
    #[serde(default)]
    pub requires_target: bool,
    pub effect: SkillEffect,
}

impl ClassSkill {
    pub fn new(
        id: &str,
        name: &str,
        cost: BTreeMap<Color, u32>,
        primary_color: Color,
        secondary_color: Color,
        effect: SkillEffect,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            cost,
            primary_color,
            secondary_color,
            target_color: None,
            requires_target: false,
            effect,
        }
    }

    /// Marks the skill as needing a tile, optionally of a given color.
    pub fn targeting(mut self, color: Option<Color>) -> Self {
        self.requires_target = true;
        self.target_color = color;
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }
}

/// True iff every color in the cost is covered.
pub fn can_cast(player: &PlayerState, skill: &ClassSkill) -> bool {
    skill
        .cost
        .iter()
        .all(|(color, amount)| player.resource(*color) >= *amount)
}

/// Removes the skill cost from the caster.
pub fn charge(player: &mut PlayerState, skill: &ClassSkill) {
    for (color, amount) in &skill.cost {
        player.spend_resource(*color, *amount);
    }
}

/// One cast in flight.
#[derive(Debug, Clone, Copy)]
pub struct Cast<'a> {
    pub caster: PlayerId,
    pub skill_id: &'a str,
    pub target: Option<Position>,
    /// Casts of this skill before the current one.
    pub previous_casts: u32,
}

/// Collaborators the interpreter needs for board-destructive effects.
pub struct EffectEnv<'a> {
    pub config: &'a GameConfig,
    pub resolver: &'a CascadeResolver,
    pub rng: &'a mut dyn RngCore,
    pub host: &'a mut dyn AnimationHost,
}

/// Applies `effect` in place and returns the events it produced. Destroyed
/// tiles go through the regular collapse and award nothing.
pub fn apply_effect(
    effect: &SkillEffect,
    state: &mut GameState,
    cast: &Cast<'_>,
    env: &mut EffectEnv<'_>,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    run(effect, state, cast, env, &mut events);
    events
}

fn run(
    effect: &SkillEffect,
    state: &mut GameState,
    cast: &Cast<'_>,
    env: &mut EffectEnv<'_>,
    events: &mut Vec<GameEvent>,
) {
    let caster = cast.caster;
    let origin = cast.target.unwrap_or_else(|| state.board.center());
    let size = state.board.size();

    match effect {
        SkillEffect::Damage {
            amount,
            per_cast_bonus,
        } => {
            let raw = amount.saturating_add(per_cast_bonus.saturating_mul(cast.previous_casts));
            let (attacker, defender) = state.sides_mut(caster);
            let report = apply_damage(
                &attacker.status_effects,
                defender,
                f64::from(raw),
                DamageKind::SKILL,
            );
            push_damage_events(events, caster, report, true);
        }
        SkillEffect::Heal { amount } => {
            let player = state.player_mut(caster);
            let healed = (*amount).min(env.config.max_health.saturating_sub(player.health));
            player.health += healed;
            events.push(GameEvent::Healed {
                player: caster,
                amount: healed,
            });
        }
        SkillEffect::GainDefense { amount } => {
            let player = state.player_mut(caster);
            player.defense = player.defense.saturating_add(*amount);
            events.push(GameEvent::DefenseChanged {
                player: caster,
                defense: player.defense,
            });
        }
        SkillEffect::GainResources { color, amount } => {
            state.player_mut(caster).add_resource(*color, *amount);
            events.push(GameEvent::ResourcesGained {
                player: caster,
                color: *color,
                amount: *amount,
            });
        }
        SkillEffect::DestroyArea { radius } => {
            let cells = origin.area(*radius, size);
            destroy(state, &cells, env);
        }
        SkillEffect::DestroyRow => {
            let cells: Vec<Position> = (0..size).map(|col| Position::new(origin.row, col)).collect();
            destroy(state, &cells, env);
        }
        SkillEffect::DestroyColumn => {
            let cells: Vec<Position> = (0..size).map(|row| Position::new(row, origin.col)).collect();
            destroy(state, &cells, env);
        }
        SkillEffect::ConvertColor { to } => {
            let from = state.board.color_at(origin);
            if from.is_empty() || from == *to {
                return;
            }
            let cells = state.board.positions_of(from);
            for pos in &cells {
                state.board.set_color(*pos, *to);
            }
            events.push(GameEvent::TilesConverted {
                player: caster,
                color: *to,
                count: cells.len(),
            });
        }
        SkillEffect::Ignite { radius } => {
            for pos in origin.area(*radius, size) {
                if let Some(tile) = state.board.get_mut(pos) {
                    if !tile.is_empty() {
                        tile.ignited = true;
                    }
                }
            }
        }
        SkillEffect::Freeze { radius } => {
            for pos in origin.area(*radius, size) {
                if let Some(tile) = state.board.get_mut(pos) {
                    if !tile.is_empty() {
                        tile.frozen = true;
                    }
                }
            }
        }
        SkillEffect::ApplyStatus { target, effect } => {
            let player = match target {
                SkillTarget::Caster => caster,
                SkillTarget::Opponent => caster.opponent(),
            };
            if StatusLedger::add(&mut state.player_mut(player).status_effects, effect.clone()) {
                events.push(GameEvent::StatusApplied {
                    player,
                    turns: effect.turns_remaining,
                });
            }
        }
        SkillEffect::ExtraTurn => {
            state.extra_turn_granted = true;
        }
        SkillEffect::Composite { effects } => {
            for inner in effects {
                run(inner, state, cast, env, events);
                if state.player(caster.opponent()).is_defeated() {
                    break;
                }
            }
        }
    }
    debug!(skill = cast.skill_id, %caster, ?effect, "skill effect applied");
}

fn destroy(state: &mut GameState, cells: &[Position], env: &mut EffectEnv<'_>) {
    let destroyed = env.resolver.destroy_tiles(&mut state.board, cells, &mut *env.rng);
    env.host.wait_for_animation();
    debug!(destroyed, "skill destroyed tiles");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Board;
    use crate::game::cascade::Immediate;
    use crate::game::catalog::Catalog;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const ROWS: [&str; 8] = [
        "RGBYKRGB",
        "GBYKRGBY",
        "BYKRGBYK",
        "YKRGBYKR",
        "KRGBYKRG",
        "RGBYKRGB",
        "GBYKRGBY",
        "BYKRGBYK",
    ];

    fn state() -> GameState {
        let catalog = Catalog::builtin();
        let human = catalog.class("Pyromancer").expect("builtin class");
        let ai = catalog.class("Druid").expect("builtin class");
        GameState::new(
            Board::from_rows(&ROWS).expect("fixture"),
            PlayerState::from_class(human, 100),
            PlayerState::from_class(ai, 100),
            PlayerId::Human,
        )
    }

    fn cast(effect: &SkillEffect, state: &mut GameState, target: Option<Position>) -> Vec<GameEvent> {
        let config = GameConfig::default();
        let resolver = CascadeResolver::from_config(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut host = Immediate;
        let mut env = EffectEnv {
            config: &config,
            resolver: &resolver,
            rng: &mut rng,
            host: &mut host,
        };
        let cast = Cast {
            caster: PlayerId::Human,
            skill_id: "test",
            target,
            previous_casts: 2,
        };
        apply_effect(effect, state, &cast, &mut env)
    }

    #[test]
    fn can_cast_requires_every_color() {
        let skill = Catalog::builtin().skill("fireball").expect("builtin skill");
        let mut player = PlayerState::new("Pyromancer", 100);
        player.add_resource(Color::Red, 2);
        assert!(!can_cast(&player, skill));
        player.add_resource(Color::Red, 2);
        player.add_resource(Color::Yellow, 3);
        assert!(can_cast(&player, skill));
        charge(&mut player, skill);
        assert_eq!(player.resource(Color::Red), 0);
        assert_eq!(player.resource(Color::Yellow), 0);
    }

    #[test]
    fn damage_scales_with_previous_casts() {
        let mut state = state();
        let effect = SkillEffect::Damage {
            amount: 8,
            per_cast_bonus: 1,
        };
        let events = cast(&effect, &mut state, None);
        assert_eq!(state.ai.health, 90);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::OnDamageDealt { amount: 10, skill: true, .. })));
    }

    #[test]
    fn oversized_catalog_values_saturate() {
        let mut struck = state();
        let effect = SkillEffect::Damage {
            amount: u32::MAX,
            per_cast_bonus: u32::MAX,
        };
        cast(&effect, &mut struck, None);
        assert_eq!(struck.ai.health, 0);

        let mut frozen = state();
        assert_eq!(Position::new(3, 3).area(usize::MAX, 8).len(), 64);
        cast(&SkillEffect::Freeze { radius: usize::MAX }, &mut frozen, Some(Position::new(3, 3)));
        assert_eq!(frozen.board.count_where(|tile| tile.frozen), 64);
    }

    #[test]
    fn expired_status_is_neither_added_nor_announced() {
        let mut state = state();
        let effect = SkillEffect::ApplyStatus {
            target: SkillTarget::Caster,
            effect: StatusEffect::new(0).with_extra_turn(),
        };
        let events = cast(&effect, &mut state, None);
        assert!(state.human.status_effects.is_empty());
        assert!(!events
            .iter()
            .any(|event| matches!(event, GameEvent::StatusApplied { .. })));

        let effect = SkillEffect::ApplyStatus {
            target: SkillTarget::Caster,
            effect: StatusEffect::new(2).with_extra_turn(),
        };
        let events = cast(&effect, &mut state, None);
        assert!(matches!(
            events.as_slice(),
            [GameEvent::StatusApplied { player: PlayerId::Human, turns: 2 }]
        ));
    }

    #[test]
    fn heal_is_capped_at_max_health() {
        let mut state = state();
        state.human.health = 95;
        cast(&SkillEffect::Heal { amount: 10 }, &mut state, None);
        assert_eq!(state.human.health, 100);
    }

    #[test]
    fn destroy_row_refills_the_board() {
        let mut state = state();
        cast(&SkillEffect::DestroyRow, &mut state, Some(Position::new(7, 3)));
        assert_eq!(state.board.count_where(|tile| tile.is_empty()), 0);
        // everything above row 7 fell by one
        assert_eq!(state.board.color_at(Position::new(7, 0)), Color::Green);
    }

    #[test]
    fn freeze_and_ignite_flag_the_area() {
        let mut state = state();
        let target = Position::new(0, 0);
        cast(&SkillEffect::Freeze { radius: 1 }, &mut state, Some(target));
        cast(&SkillEffect::Ignite { radius: 0 }, &mut state, Some(target));
        assert_eq!(state.board.count_where(|tile| tile.frozen), 4);
        assert_eq!(state.board.count_where(|tile| tile.ignited), 1);
    }

    #[test]
    fn convert_color_rewrites_every_matching_tile() {
        let mut state = state();
        let reds = state.board.positions_of(Color::Red).len();
        let events = cast(
            &SkillEffect::ConvertColor { to: Color::Green },
            &mut state,
            Some(Position::new(0, 0)),
        );
        assert!(state.board.positions_of(Color::Red).is_empty());
        assert!(matches!(
            events.as_slice(),
            [GameEvent::TilesConverted { count, .. }] if *count == reds
        ));
    }

    #[test]
    fn status_lands_on_the_chosen_side() {
        let mut state = state();
        let effect = SkillEffect::Composite {
            effects: vec![
                SkillEffect::ApplyStatus {
                    target: SkillTarget::Opponent,
                    effect: StatusEffect::new(2).with_convert_tiles(Color::Black, 3),
                },
                SkillEffect::ExtraTurn,
            ],
        };
        cast(&effect, &mut state, None);
        assert_eq!(state.ai.status_effects.len(), 1);
        assert!(state.human.status_effects.is_empty());
        assert!(state.extra_turn_granted);
    }
}
