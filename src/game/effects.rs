use serde::{Deserialize, Serialize};

use super::board::Color;

fn one() -> f64 {
    1.0
}

fn is_one(value: &f64) -> bool {
    (*value - 1.0).abs() < f64::EPSILON
}

/// Converts `ratio` units of `from` into one unit of `to` as resources are gained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManaConversion {
    pub from: Color,
    pub to: Color,
    pub ratio: u32,
}

/// Turns `count` board tiles into `color` each time the owner's turn completes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvertTiles {
    pub color: Color,
    pub count: usize,
}

/// Grants `amount` of `bonus_color` for every match of `match_color`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceBonus {
    pub match_color: Color,
    pub bonus_color: Color,
    pub amount: u32,
}

/// Flat addition to the owner's affinity for one color.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorStatBonus {
    pub color: Color,
    pub amount: u32,
}

/// Runs once when the effect that carries it is removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ExpireAction {
    /// Unfreezes every tile on the board.
    Thaw,
    /// Clears every ignited tile.
    Extinguish,
    LoseDefense { amount: u32 },
}

/// A timed modifier attached to one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub damage_multiplier: f64,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub resource_multiplier: f64,
    pub turns_remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_damage_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_damage_reduction: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_stat_bonus: Option<ColorStatBonus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mana_conversion: Option<ManaConversion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_tiles: Option<ConvertTiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_bonus: Option<ResourceBonus>,
    #[serde(default)]
    pub extra_turn: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_expire: Option<ExpireAction>,
}

impl StatusEffect {
    /// Neutral effect lasting `turns` turns; combine with the `with_*` builders.
    pub fn new(turns: u32) -> Self {
        Self {
            name: None,
            damage_multiplier: 1.0,
            resource_multiplier: 1.0,
            turns_remaining: turns,
            skill_damage_multiplier: None,
            skill_damage_reduction: None,
            color_stat_bonus: None,
            mana_conversion: None,
            convert_tiles: None,
            resource_bonus: None,
            extra_turn: false,
            on_expire: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_damage_multiplier(mut self, value: f64) -> Self {
        self.damage_multiplier = value;
        self
    }

    pub fn with_resource_multiplier(mut self, value: f64) -> Self {
        self.resource_multiplier = value;
        self
    }

    pub fn with_skill_damage_multiplier(mut self, value: f64) -> Self {
        self.skill_damage_multiplier = Some(value);
        self
    }

    pub fn with_skill_damage_reduction(mut self, value: u32) -> Self {
        self.skill_damage_reduction = Some(value);
        self
    }

    pub fn with_color_stat_bonus(mut self, color: Color, amount: u32) -> Self {
        self.color_stat_bonus = Some(ColorStatBonus { color, amount });
        self
    }

    pub fn with_mana_conversion(mut self, from: Color, to: Color, ratio: u32) -> Self {
        self.mana_conversion = Some(ManaConversion { from, to, ratio });
        self
    }

    pub fn with_convert_tiles(mut self, color: Color, count: usize) -> Self {
        self.convert_tiles = Some(ConvertTiles { color, count });
        self
    }

    pub fn with_resource_bonus(mut self, match_color: Color, bonus_color: Color, amount: u32) -> Self {
        self.resource_bonus = Some(ResourceBonus {
            match_color,
            bonus_color,
            amount,
        });
        self
    }

    pub fn with_extra_turn(mut self) -> Self {
        self.extra_turn = true;
        self
    }

    pub fn on_expire(mut self, action: ExpireAction) -> Self {
        self.on_expire = Some(action);
        self
    }
}

/// Numeric fields that can be folded across a player's active effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    DamageMultiplier,
    ResourceMultiplier,
    SkillDamageMultiplier,
    SkillDamageReduction,
    ColorStatBonus(Color),
}

/// Status Effect Ledger operations over one player's effect list.
pub struct StatusLedger;

impl StatusLedger {
    /// Appends `effect`. An effect with no turns left is dropped and `false` returned.
    pub fn add(effects: &mut Vec<StatusEffect>, effect: StatusEffect) -> bool {
        if effect.turns_remaining == 0 {
            return false;
        }
        effects.push(effect);
        true
    }

    /// Decrements every effect once and removes the ones reaching zero. The
    /// expiry actions of removed effects are returned in list order, so each
    /// runs exactly once.
    pub fn tick(effects: &mut Vec<StatusEffect>) -> Vec<ExpireAction> {
        let mut expired = Vec::new();
        effects.retain_mut(|effect| {
            effect.turns_remaining = effect.turns_remaining.saturating_sub(1);
            if effect.turns_remaining > 0 {
                return true;
            }
            if let Some(action) = effect.on_expire {
                expired.push(action);
            }
            false
        });
        expired
    }

    /// Products start at 1, sums at 0.
    pub fn aggregate(effects: &[StatusEffect], field: Aggregate) -> f64 {
        match field {
            Aggregate::DamageMultiplier => effects.iter().map(|e| e.damage_multiplier).product(),
            Aggregate::ResourceMultiplier => effects.iter().map(|e| e.resource_multiplier).product(),
            Aggregate::SkillDamageMultiplier => effects
                .iter()
                .map(|e| e.skill_damage_multiplier.unwrap_or(1.0))
                .product(),
            Aggregate::SkillDamageReduction => effects
                .iter()
                .map(|e| f64::from(e.skill_damage_reduction.unwrap_or(0)))
                .sum(),
            Aggregate::ColorStatBonus(color) => effects
                .iter()
                .filter_map(|e| e.color_stat_bonus)
                .filter(|bonus| bonus.color == color)
                .map(|bonus| f64::from(bonus.amount))
                .sum(),
        }
    }

    pub fn has_extra_turn(effects: &[StatusEffect]) -> bool {
        effects.iter().any(|effect| effect.extra_turn)
    }

    /// First conversion whose source is `color`.
    pub fn mana_conversion(effects: &[StatusEffect], color: Color) -> Option<ManaConversion> {
        effects
            .iter()
            .find_map(|effect| effect.mana_conversion.filter(|c| c.from == color))
    }

    pub fn convert_tiles(effects: &[StatusEffect]) -> Option<ConvertTiles> {
        effects.iter().find_map(|effect| effect.convert_tiles)
    }

    /// First bonus triggered by a match of `match_color`.
    pub fn resource_bonus(effects: &[StatusEffect], match_color: Color) -> Option<ResourceBonus> {
        effects
            .iter()
            .find_map(|effect| effect.resource_bonus.filter(|b| b.match_color == match_color))
    }
}
