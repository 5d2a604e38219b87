//! Resource & damage pipeline: turns one cascade pass worth of matches into
//! resources for the actor and health damage for the opponent.

use serde::{Deserialize, Serialize};

use super::board::{Board, Color, Match};
use super::config::GameConfig;
use super::effects::{Aggregate, StatusEffect, StatusLedger};
use super::state::{GameEvent, PlayerId, PlayerState};

/// How a hit interacts with the modifier chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DamageKind {
    /// Scaled by the attacker's damage multiplier.
    pub direct: bool,
    /// Additionally scaled by skill multipliers and reduced by skill reduction.
    pub skill: bool,
}

impl DamageKind {
    pub const MATCH: DamageKind = DamageKind {
        direct: true,
        skill: false,
    };
    pub const SKILL: DamageKind = DamageKind {
        direct: true,
        skill: true,
    };
    pub const INDIRECT: DamageKind = DamageKind {
        direct: false,
        skill: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageReport {
    pub amount: u32,
    pub remaining_health: u32,
    pub defeated: bool,
}

/// Damage after the full modifier chain, before it touches health.
pub fn compute_damage(
    attacker_effects: &[StatusEffect],
    defender: &PlayerState,
    raw: f64,
    kind: DamageKind,
) -> u32 {
    let mut total = raw;
    if kind.direct {
        total *= StatusLedger::aggregate(attacker_effects, Aggregate::DamageMultiplier);
        if kind.skill {
            total *= StatusLedger::aggregate(attacker_effects, Aggregate::SkillDamageMultiplier);
        }
    }
    if kind.skill {
        let reduction =
            StatusLedger::aggregate(&defender.status_effects, Aggregate::SkillDamageReduction);
        total = (total - reduction).max(0.0);
    }
    total *= StatusLedger::aggregate(&defender.status_effects, Aggregate::DamageMultiplier);
    total = (total - f64::from(defender.defense)).max(0.0);
    total.round() as u32
}

/// Shared damage application used by matches and skills.
pub fn apply_damage(
    attacker_effects: &[StatusEffect],
    defender: &mut PlayerState,
    raw: f64,
    kind: DamageKind,
) -> DamageReport {
    let amount = compute_damage(attacker_effects, defender, raw, kind).min(defender.health);
    defender.health -= amount;
    DamageReport {
        amount,
        remaining_health: defender.health,
        defeated: defender.health == 0,
    }
}

/// Splits `amount` at `ratio`: `(converted, remainder)`, with
/// `converted * ratio + remainder == amount`.
pub fn convert_resources(amount: u32, ratio: u32) -> (u32, u32) {
    if ratio == 0 {
        return (0, amount);
    }
    (amount / ratio, amount % ratio)
}

/// Credits the resources for one match and returns what was gained per color.
pub fn accrue_resources(player: &mut PlayerState, matched: &Match) -> Vec<(Color, u32)> {
    let multiplier = StatusLedger::aggregate(&player.status_effects, Aggregate::ResourceMultiplier);
    let scaled = (matched.length as f64 * multiplier).round().max(0.0) as u32;
    let mut gains = Vec::new();

    match StatusLedger::mana_conversion(&player.status_effects, matched.color) {
        Some(conversion) if conversion.ratio > 0 => {
            let (converted, remainder) = convert_resources(scaled, conversion.ratio);
            gains.push((conversion.to, converted));
            gains.push((matched.color, remainder));
        }
        _ => gains.push((matched.color, scaled)),
    }

    if let Some(bonus) = StatusLedger::resource_bonus(&player.status_effects, matched.color) {
        gains.push((bonus.bonus_color, bonus.amount));
    }

    gains.retain(|(_, amount)| *amount > 0);
    for (color, amount) in &gains {
        player.add_resource(*color, *amount);
    }
    gains
}

fn length_multiplier(length: usize) -> f64 {
    match length {
        0..=3 => 1.0,
        4 => 1.5,
        _ => 2.0,
    }
}

pub fn combo_multiplier(combo: u32) -> f64 {
    if combo > 1 {
        1.0 + f64::from(combo - 1) * 0.5
    } else {
        1.0
    }
}

/// Raw damage of a single match before the shared modifier chain.
pub fn match_damage(attacker: &PlayerState, matched: &Match, combo: u32) -> f64 {
    let affinity = f64::from(attacker.affinity(matched.color))
        + StatusLedger::aggregate(
            &attacker.status_effects,
            Aggregate::ColorStatBonus(matched.color),
        );
    let groups = matched.length.div_ceil(3) as f64;
    let shape = if matched.is_special() { 1.5 } else { 1.0 };
    affinity * groups * length_multiplier(matched.length) * shape * combo_multiplier(combo)
}

/// Summed, rounded damage for one pass. Ignited tiles in a match add a flat bonus.
pub fn pass_damage(
    attacker: &PlayerState,
    board: &Board,
    matches: &[Match],
    combo: u32,
    ignite_bonus: u32,
) -> f64 {
    let total: f64 = matches
        .iter()
        .map(|matched| {
            let ignited = matched
                .tiles
                .iter()
                .filter(|pos| board.get(**pos).map(|tile| tile.ignited).unwrap_or(false))
                .count();
            match_damage(attacker, matched, combo) + (ignited as u32 * ignite_bonus) as f64
        })
        .sum();
    total.round()
}

/// Outcome of running one pass through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PassResult {
    pub events: Vec<GameEvent>,
    pub extra_turn: bool,
    pub defeated: bool,
}

/// Resources first, then damage, for every match of one cascade pass.
pub fn resolve_pass(
    actor: PlayerId,
    attacker: &mut PlayerState,
    defender: &mut PlayerState,
    board: &Board,
    matches: &[Match],
    combo: u32,
    config: &GameConfig,
) -> PassResult {
    let mut result = PassResult::default();

    for matched in matches {
        result.events.push(GameEvent::OnMatch {
            player: actor,
            color: matched.color,
            length: matched.length,
            special_shape: matched.special_shape,
            combo,
        });
        if matched.is_special() || matched.length >= config.extra_turn_match_length {
            result.extra_turn = true;
        }
        for (color, amount) in accrue_resources(attacker, matched) {
            result.events.push(GameEvent::ResourcesGained {
                player: actor,
                color,
                amount,
            });
        }
    }

    let raw = pass_damage(attacker, board, matches, combo, config.ignite_bonus_damage);
    if raw > 0.0 {
        let report = apply_damage(&attacker.status_effects, defender, raw, DamageKind::MATCH);
        push_damage_events(&mut result.events, actor, report, false);
        result.defeated = report.defeated;
    }

    tracing::debug!(%actor, combo, matches = matches.len(), raw, "pipeline pass resolved");
    result
}

pub(crate) fn push_damage_events(
    events: &mut Vec<GameEvent>,
    source: PlayerId,
    report: DamageReport,
    skill: bool,
) {
    events.push(GameEvent::OnDamageDealt {
        source,
        target: source.opponent(),
        amount: report.amount,
        skill,
    });
    events.push(GameEvent::OnDamageTaken {
        player: source.opponent(),
        amount: report.amount,
        remaining_health: report.remaining_health,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Position, SpecialShape};

    fn red_row_match() -> Match {
        Match::new(
            Color::Red,
            vec![Position::new(0, 0), Position::new(0, 1), Position::new(0, 2)],
            None,
        )
    }

    fn attacker() -> PlayerState {
        let mut player = PlayerState::new("Pyromancer", 100);
        player.color_affinity.insert(Color::Red, 3);
        player
    }

    #[test]
    fn three_red_with_affinity_three_deals_three() {
        let mut attacker = attacker();
        let mut defender = PlayerState::new("Druid", 100);
        let board = Board::empty(8);
        let result = resolve_pass(
            PlayerId::Human,
            &mut attacker,
            &mut defender,
            &board,
            &[red_row_match()],
            1,
            &GameConfig::default(),
        );
        assert_eq!(defender.health, 97);
        assert_eq!(attacker.resource(Color::Red), 3);
        assert!(!result.extra_turn);
        assert!(!result.defeated);
    }

    #[test]
    fn length_shape_and_combo_multipliers_stack() {
        let attacker = attacker();
        let tiles: Vec<Position> = (0..5).map(|col| Position::new(0, col)).collect();
        let t_shape = Match::new(Color::Red, tiles.clone(), Some(SpecialShape::T));
        // 3 * ceil(5/3) * 2.0 * 1.5 * (1 + 0.5)
        assert_eq!(match_damage(&attacker, &t_shape, 2), 27.0);

        let four = Match::new(Color::Red, tiles[..4].to_vec(), None);
        // 3 * 2 * 1.5
        assert_eq!(match_damage(&attacker, &four, 1), 9.0);
    }

    #[test]
    fn modifier_chain_is_deterministic() {
        let effects = vec![
            StatusEffect::new(2).with_damage_multiplier(2.0),
            StatusEffect::new(2).with_skill_damage_multiplier(1.5),
        ];
        let mut defender = PlayerState::new("Frost Warden", 100);
        defender.defense = 2;
        defender
            .status_effects
            .push(StatusEffect::new(2).with_skill_damage_reduction(4));
        defender
            .status_effects
            .push(StatusEffect::new(2).with_damage_multiplier(0.5));

        // ((10 * 2 * 1.5) - 4) * 0.5 - 2 = 11
        let first = compute_damage(&effects, &defender, 10.0, DamageKind::SKILL);
        let second = compute_damage(&effects, &defender, 10.0, DamageKind::SKILL);
        assert_eq!(first, 11);
        assert_eq!(first, second);

        // (10 * 2) * 0.5 - 2 = 8, skill reduction is ignored for match damage
        assert_eq!(compute_damage(&effects, &defender, 10.0, DamageKind::MATCH), 8);
        // indirect hits skip the attacker side entirely
        assert_eq!(compute_damage(&effects, &defender, 10.0, DamageKind::INDIRECT), 3);
    }

    #[test]
    fn damage_never_drops_health_below_zero() {
        let mut defender = PlayerState::new("Druid", 5);
        let report = apply_damage(&[], &mut defender, 40.0, DamageKind::MATCH);
        assert_eq!(report.amount, 5);
        assert_eq!(defender.health, 0);
        assert!(report.defeated);
    }

    #[test]
    fn conversion_preserves_the_total() {
        for amount in 0..40 {
            for ratio in 1..6 {
                let (converted, remainder) = convert_resources(amount, ratio);
                assert_eq!(converted, amount / ratio);
                assert_eq!(converted * ratio + remainder, amount);
            }
        }
    }

    #[test]
    fn mana_conversion_applies_to_the_source_color() {
        let mut player = PlayerState::new("Frost Warden", 100);
        player
            .status_effects
            .push(StatusEffect::new(3).with_mana_conversion(Color::Red, Color::Blue, 2));
        let matched = Match::new(
            Color::Red,
            (0..5).map(|col| Position::new(0, col)).collect(),
            None,
        );
        accrue_resources(&mut player, &matched);
        assert_eq!(player.resource(Color::Blue), 2);
        assert_eq!(player.resource(Color::Red), 1);
    }

    #[test]
    fn conversion_for_another_color_does_not_shadow_a_matching_one() {
        let mut player = PlayerState::new("Frost Warden", 100);
        player
            .status_effects
            .push(StatusEffect::new(3).with_mana_conversion(Color::Black, Color::Blue, 2));
        player
            .status_effects
            .push(StatusEffect::new(3).with_mana_conversion(Color::Red, Color::Green, 3));
        accrue_resources(&mut player, &red_row_match());
        assert_eq!(player.resource(Color::Green), 1);
        assert_eq!(player.resource(Color::Red), 0);
        assert_eq!(player.resource(Color::Blue), 0);
    }

    #[test]
    fn resource_multiplier_and_bonus() {
        let mut player = PlayerState::new("Druid", 100);
        player.status_effects.push(
            StatusEffect::new(3)
                .with_resource_multiplier(1.5)
                .with_resource_bonus(Color::Red, Color::Yellow, 1),
        );
        let gains = accrue_resources(&mut player, &red_row_match());
        // 3 * 1.5 = 4.5 rounds half away from zero
        assert_eq!(player.resource(Color::Red), 5);
        assert_eq!(player.resource(Color::Yellow), 1);
        assert_eq!(gains.len(), 2);
    }

    #[test]
    fn ignited_tiles_add_bonus_damage() {
        let attacker = attacker();
        let mut board = Board::empty(8);
        if let Some(tile) = board.get_mut(Position::new(0, 1)) {
            tile.ignited = true;
        }
        assert_eq!(pass_damage(&attacker, &board, &[red_row_match()], 1, 2), 5.0);
    }
}
