// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Condition evaluator: recipient and template selection by queue position.
//!
//! With a current queue position (CQP) every comparison runs on the offset
//! `position - cqp`; without one, comparisons use the absolute position.
//! Independently of any condition, recipients at or before the CQP are never
//! selected. That rule lives in [`passes_safety_filter`] and is applied as the
//! last step of every selection, never folded into operator logic.

use std::str::FromStr;

use courier_core::types::{NewMessage, Recipient};
use courier_core::CourierError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Comparison operator of a template condition.
///
/// Parses case-insensitively from its canonical name or a common alias.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    #[strum(to_string = "EQUAL", serialize = "equals", serialize = "eq")]
    Equal,
    #[strum(to_string = "GREATER", serialize = "gt")]
    Greater,
    #[strum(to_string = "LESS", serialize = "lt")]
    Less,
    #[strum(to_string = "RANGE", serialize = "between")]
    Range,
    #[strum(to_string = "DEFAULT")]
    Default,
}

/// A parsed condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "UPPERCASE")]
pub enum Condition {
    Equal { value: i64 },
    Greater { value: i64 },
    Less { value: i64 },
    /// Inclusive on both ends.
    Range { min: i64, max: i64 },
    /// Fallback when no other condition of the template set matches.
    Default,
}

impl Condition {
    /// Build a condition from an operator and its operands.
    pub fn new(
        operator: Operator,
        value: Option<i64>,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Result<Self, CourierError> {
        let need_value = |value: Option<i64>| {
            value.ok_or_else(|| {
                CourierError::Validation(format!("{operator} condition requires a value"))
            })
        };
        match operator {
            Operator::Equal => Ok(Self::Equal {
                value: need_value(value)?,
            }),
            Operator::Greater => Ok(Self::Greater {
                value: need_value(value)?,
            }),
            Operator::Less => Ok(Self::Less {
                value: need_value(value)?,
            }),
            Operator::Range => match (min, max) {
                (Some(min), Some(max)) if min <= max => Ok(Self::Range { min, max }),
                (Some(min), Some(max)) => Err(CourierError::Validation(format!(
                    "RANGE condition has min {min} above max {max}"
                ))),
                _ => Err(CourierError::Validation(
                    "RANGE condition requires both min and max".into(),
                )),
            },
            Operator::Default => Ok(Self::Default),
        }
    }

    /// Parse loosely typed input: an operator name and a textual value.
    ///
    /// A range value is written `min,max`.
    pub fn parse(operator: &str, value: &str) -> Result<Self, CourierError> {
        let operator = Operator::from_str(operator.trim()).map_err(|_| {
            CourierError::Validation(format!("unknown condition operator `{operator}`"))
        })?;
        let number = |text: &str| {
            text.trim().parse::<i64>().map_err(|_| {
                CourierError::Validation(format!(
                    "{operator} condition value `{text}` is not an integer"
                ))
            })
        };
        match operator {
            Operator::Default => Ok(Self::Default),
            Operator::Range => {
                let (min, max) = value.split_once(',').ok_or_else(|| {
                    CourierError::Validation(format!(
                        "RANGE condition value `{value}` must be `min,max`"
                    ))
                })?;
                Self::new(operator, None, Some(number(min)?), Some(number(max)?))
            }
            _ => Self::new(operator, Some(number(value)?), None, None),
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            Self::Equal { .. } => Operator::Equal,
            Self::Greater { .. } => Operator::Greater,
            Self::Less { .. } => Operator::Less,
            Self::Range { .. } => Operator::Range,
            Self::Default => Operator::Default,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Operator logic only; the safety filter is not applied here.
    ///
    /// `Default` matches everything: precedence against the other conditions
    /// of a set is resolved by [`TemplateSet::template_for`].
    pub fn matches(&self, position: i64, cqp: Option<i64>) -> bool {
        let n = cqp.map_or(position, |cqp| position - cqp);
        match *self {
            Self::Equal { value } => n == value,
            Self::Greater { value } => n > value,
            Self::Less { value } => n < value,
            Self::Range { min, max } => (min..=max).contains(&n),
            Self::Default => true,
        }
    }
}

/// Convenience form taking an operator name and textual value.
pub fn matches_condition(
    position: i64,
    operator: &str,
    value: &str,
    cqp: Option<i64>,
) -> Result<bool, CourierError> {
    Ok(Condition::parse(operator, value)?.matches(position, cqp))
}

/// Offset of a position relative to the CQP. A missing CQP counts as 0.
pub fn offset(position: i64, cqp: Option<i64>) -> i64 {
    position - cqp.unwrap_or(0)
}

/// Recipients at or before the CQP are never selected.
pub fn passes_safety_filter(position: i64, cqp: Option<i64>) -> bool {
    offset(position, cqp) > 0
}

/// A recipient together with its absolute queue position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub recipient: Recipient,
    pub position: i64,
}

/// Candidates matching `condition`, in input order, safety filter last.
pub fn select_recipients(
    candidates: &[Candidate],
    cqp: Option<i64>,
    condition: &Condition,
) -> Vec<Candidate> {
    candidates
        .iter()
        .filter(|c| condition.matches(c.position, cqp))
        .filter(|c| passes_safety_filter(c.position, cqp))
        .cloned()
        .collect()
}

/// A message template guarded by a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub condition: Condition,
    /// Content with `{name}`, `{phone}`, `{position}`, and `{offset}` placeholders.
    pub content: String,
}

impl Template {
    pub fn render(&self, candidate: &Candidate, cqp: Option<i64>) -> String {
        self.content
            .replace("{name}", &candidate.recipient.name)
            .replace("{phone}", &candidate.recipient.phone)
            .replace("{position}", &candidate.position.to_string())
            .replace("{offset}", &offset(candidate.position, cqp).to_string())
    }
}

/// The templates of one queue. At most one of them carries `DEFAULT`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateSet {
    templates: Vec<Template>,
}

impl TemplateSet {
    pub fn new(templates: Vec<Template>) -> Result<Self, CourierError> {
        let defaults = templates.iter().filter(|t| t.condition.is_default()).count();
        if defaults > 1 {
            return Err(CourierError::Validation(format!(
                "a queue may have at most one DEFAULT condition, found {defaults}"
            )));
        }
        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// First matching non-default template, else the default one.
    pub fn template_for(&self, position: i64, cqp: Option<i64>) -> Option<&Template> {
        self.templates
            .iter()
            .filter(|t| !t.condition.is_default())
            .find(|t| t.condition.matches(position, cqp))
            .or_else(|| self.templates.iter().find(|t| t.condition.is_default()))
    }
}

/// Render one message per selectable candidate.
///
/// Candidates failing the safety filter or matching no template are skipped.
pub fn plan_messages(
    candidates: &[Candidate],
    cqp: Option<i64>,
    templates: &TemplateSet,
) -> Vec<NewMessage> {
    candidates
        .iter()
        .filter_map(|candidate| {
            let template = templates.template_for(candidate.position, cqp)?;
            Some((candidate, template))
        })
        .filter(|(candidate, _)| passes_safety_filter(candidate.position, cqp))
        .map(|(candidate, template)| NewMessage {
            recipient: candidate.recipient.clone(),
            content: template.render(candidate, cqp),
        })
        .collect()
}
