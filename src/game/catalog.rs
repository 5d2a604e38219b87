use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::board::Color;
use super::config::ConfigError;
use super::effects::{ExpireAction, StatusEffect};
use super::skills::{ClassSkill, SkillEffect, SkillTarget};

pub type SkillId = String;

/// A playable class: its colors, affinities and skill loadout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassDefinition {
    pub name: String,
    pub primary_color: Color,
    pub secondary_color: Color,
    #[serde(default)]
    pub base_defense: u32,
    pub color_affinity: BTreeMap<Color, u32>,
    pub skills: Vec<SkillId>,
}

/// Read-only class and skill tables, keyed by name and id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub classes: BTreeMap<String, ClassDefinition>,
    pub skills: BTreeMap<SkillId, ClassSkill>,
}

static BUILTIN: Lazy<Catalog> = Lazy::new(builtin_catalog);

impl Catalog {
    pub fn builtin() -> &'static Catalog {
        &BUILTIN
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every class skill must exist in the skill table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in self.classes.values() {
            if let Some(missing) = class.skills.iter().find(|id| !self.skills.contains_key(*id)) {
                return Err(ConfigError::Invalid {
                    reason: format!("class {} references unknown skill {missing}", class.name),
                });
            }
        }
        Ok(())
    }

    pub fn skill(&self, id: &str) -> Option<&ClassSkill> {
        self.skills.get(id)
    }

    /// Exact key first, then a case-insensitive match on the display name.
    pub fn class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.get(name).or_else(|| {
            self.classes
                .values()
                .find(|class| class.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.keys().map(String::as_str).collect()
    }
}

fn affinities(primary: Color, secondary: Color) -> BTreeMap<Color, u32> {
    Color::PLAYABLE
        .iter()
        .map(|color| {
            let value = if *color == primary {
                3
            } else if *color == secondary {
                2
            } else {
                1
            };
            (*color, value)
        })
        .collect()
}

fn cost(entries: &[(Color, u32)]) -> BTreeMap<Color, u32> {
    entries.iter().copied().collect()
}

fn class(
    name: &str,
    primary: Color,
    secondary: Color,
    base_defense: u32,
    skills: &[&str],
) -> ClassDefinition {
    ClassDefinition {
        name: name.to_string(),
        primary_color: primary,
        secondary_color: secondary,
        base_defense,
        color_affinity: affinities(primary, secondary),
        skills: skills.iter().map(|id| id.to_string()).collect(),
    }
}

fn builtin_catalog() -> Catalog {
    let classes = vec![
        class(
            "Pyromancer",
            Color::Red,
            Color::Yellow,
            0,
            &["fireball", "ignite", "inferno"],
        ),
        class(
            "Frost Warden",
            Color::Blue,
            Color::Black,
            1,
            &["frost_nova", "ice_armor", "glacial_focus"],
        ),
        class(
            "Druid",
            Color::Green,
            Color::Blue,
            0,
            &["regrowth", "overgrowth", "bloom"],
        ),
        class(
            "Shadowblade",
            Color::Black,
            Color::Red,
            0,
            &["backstab", "shadow_step", "hex"],
        ),
    ];

    let skills = vec![
        ClassSkill::new(
            "fireball",
            "Fireball",
            cost(&[(Color::Red, 4), (Color::Yellow, 3)]),
            Color::Red,
            Color::Yellow,
            SkillEffect::Damage {
                amount: 8,
                per_cast_bonus: 1,
            },
        )
        .describe("Hurl a fireball that grows hotter with every cast."),
        ClassSkill::new(
            "ignite",
            "Ignite",
            cost(&[(Color::Red, 3)]),
            Color::Red,
            Color::Yellow,
            SkillEffect::Composite {
                effects: vec![
                    SkillEffect::Ignite { radius: 1 },
                    SkillEffect::Damage {
                        amount: 2,
                        per_cast_bonus: 0,
                    },
                ],
            },
        )
        .targeting(Some(Color::Red))
        .describe("Set a red gem and its neighbours alight."),
        ClassSkill::new(
            "inferno",
            "Inferno",
            cost(&[(Color::Red, 6), (Color::Yellow, 4)]),
            Color::Red,
            Color::Yellow,
            SkillEffect::ApplyStatus {
                target: SkillTarget::Caster,
                effect: StatusEffect::new(3)
                    .named("Inferno")
                    .with_damage_multiplier(1.25)
                    .with_color_stat_bonus(Color::Red, 2)
                    .on_expire(ExpireAction::Extinguish),
            },
        ),
        ClassSkill::new(
            "frost_nova",
            "Frost Nova",
            cost(&[(Color::Blue, 5)]),
            Color::Blue,
            Color::Black,
            SkillEffect::Composite {
                effects: vec![
                    SkillEffect::Freeze { radius: 1 },
                    SkillEffect::ApplyStatus {
                        target: SkillTarget::Caster,
                        effect: StatusEffect::new(2)
                            .named("Permafrost")
                            .on_expire(ExpireAction::Thaw),
                    },
                    SkillEffect::Damage {
                        amount: 3,
                        per_cast_bonus: 0,
                    },
                ],
            },
        )
        .targeting(None)
        .describe("Freeze a patch of the board in place."),
        ClassSkill::new(
            "ice_armor",
            "Ice Armor",
            cost(&[(Color::Blue, 4), (Color::Black, 2)]),
            Color::Blue,
            Color::Black,
            SkillEffect::Composite {
                effects: vec![
                    SkillEffect::GainDefense { amount: 3 },
                    SkillEffect::ApplyStatus {
                        target: SkillTarget::Caster,
                        effect: StatusEffect::new(3)
                            .named("Ice Armor")
                            .with_skill_damage_reduction(4)
                            .on_expire(ExpireAction::LoseDefense { amount: 3 }),
                    },
                ],
            },
        ),
        ClassSkill::new(
            "glacial_focus",
            "Glacial Focus",
            cost(&[(Color::Blue, 3), (Color::Black, 3)]),
            Color::Blue,
            Color::Black,
            SkillEffect::Composite {
                effects: vec![
                    SkillEffect::ApplyStatus {
                        target: SkillTarget::Caster,
                        effect: StatusEffect::new(3)
                            .named("Glacial Focus")
                            .with_mana_conversion(Color::Black, Color::Blue, 2),
                    },
                    SkillEffect::ExtraTurn,
                ],
            },
        ),
        ClassSkill::new(
            "regrowth",
            "Regrowth",
            cost(&[(Color::Green, 5)]),
            Color::Green,
            Color::Blue,
            SkillEffect::Heal { amount: 10 },
        ),
        ClassSkill::new(
            "overgrowth",
            "Overgrowth",
            cost(&[(Color::Green, 4), (Color::Blue, 2)]),
            Color::Green,
            Color::Blue,
            SkillEffect::ConvertColor { to: Color::Green },
        )
        .targeting(None)
        .describe("Every gem sharing the target's color turns green."),
        ClassSkill::new(
            "bloom",
            "Bloom",
            cost(&[(Color::Green, 3), (Color::Yellow, 3)]),
            Color::Green,
            Color::Blue,
            SkillEffect::ApplyStatus {
                target: SkillTarget::Caster,
                effect: StatusEffect::new(3)
                    .named("Bloom")
                    .with_resource_multiplier(1.5)
                    .with_resource_bonus(Color::Green, Color::Yellow, 1),
            },
        ),
        ClassSkill::new(
            "backstab",
            "Backstab",
            cost(&[(Color::Black, 4), (Color::Red, 2)]),
            Color::Black,
            Color::Red,
            SkillEffect::Damage {
                amount: 6,
                per_cast_bonus: 2,
            },
        ),
        ClassSkill::new(
            "shadow_step",
            "Shadow Step",
            cost(&[(Color::Black, 3)]),
            Color::Black,
            Color::Red,
            SkillEffect::Composite {
                effects: vec![SkillEffect::DestroyRow, SkillEffect::ExtraTurn],
            },
        )
        .targeting(Some(Color::Black))
        .describe("Shatter the row of a black gem and act again."),
        ClassSkill::new(
            "hex",
            "Hex",
            cost(&[(Color::Black, 5), (Color::Green, 2)]),
            Color::Black,
            Color::Red,
            SkillEffect::Composite {
                effects: vec![
                    SkillEffect::ApplyStatus {
                        target: SkillTarget::Opponent,
                        effect: StatusEffect::new(2)
                            .named("Hex")
                            .with_convert_tiles(Color::Black, 3),
                    },
                    SkillEffect::Damage {
                        amount: 3,
                        per_cast_bonus: 0,
                    },
                ],
            },
        ),
    ];

    Catalog {
        classes: classes
            .into_iter()
            .map(|class| (class.name.clone(), class))
            .collect(),
        skills: skills
            .into_iter()
            .map(|skill| (skill.id.clone(), skill))
            .collect(),
    }
}
