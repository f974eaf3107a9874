//! Parser output.
//!
//! A parser turns the payload of a message into one [`SlotParse`] per
//! declared parameter. Each slot may hold several scored candidate values;
//! [`ParseOutcome::collapse`] keeps the best one per slot.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::ParseError;
use crate::identity::UserId;

/// One parsed argument value.
#[derive(Clone)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    User(UserId),
    /// An optional parameter that was not supplied.
    Absent,
    /// A value produced by a custom parser.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ArgValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Downcasts a [`ArgValue::Custom`] payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::User(id) => f.debug_tuple("User").field(id).finish(),
            Self::Absent => f.write_str("Absent"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A candidate value with a confidence score in `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct SlotValue {
    pub value: ArgValue,
    pub score: f64,
}

impl SlotValue {
    pub fn new(value: ArgValue, score: f64) -> Self {
        Self { value, score }
    }
}

/// Every candidate reading of one parameter slot.
#[derive(Debug, Clone)]
pub struct SlotParse {
    pub values: Vec<SlotValue>,
}

impl SlotParse {
    /// A slot with exactly one reading.
    pub fn single(value: ArgValue, score: f64) -> Self {
        Self {
            values: vec![SlotValue::new(value, score)],
        }
    }

    /// Returns `true` if more than one reading survived.
    pub fn is_ambiguous(&self) -> bool {
        self.values.len() > 1
    }

    /// The highest-scoring reading; the earliest one wins ties.
    pub fn best(&self) -> Option<&SlotValue> {
        self.values.iter().fold(None, |best: Option<&SlotValue>, candidate| match best {
            Some(b) if b.score >= candidate.score => Some(b),
            _ => Some(candidate),
        })
    }
}

/// The final, single reading of a command's arguments.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    slots: Vec<SlotValue>,
}

impl ParsedArgs {
    pub fn new(slots: Vec<SlotValue>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The value in slot `index`.
    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.slots.get(index).map(|s| &s.value)
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(ArgValue::as_text)
    }

    pub fn integer(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(ArgValue::as_integer)
    }

    pub fn float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(ArgValue::as_float)
    }

    pub fn boolean(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(ArgValue::as_bool)
    }

    pub fn user(&self, index: usize) -> Option<UserId> {
        self.get(index).and_then(ArgValue::as_user)
    }

    pub fn custom<T: Any>(&self, index: usize) -> Option<&T> {
        self.get(index).and_then(ArgValue::downcast_ref::<T>)
    }

    /// Sum of the per-slot scores.
    pub fn score_sum(&self) -> f64 {
        self.slots.iter().map(|s| s.score).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.slots.iter().map(|s| &s.value)
    }
}

/// What a parser produced for one command.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// Every slot has exactly one reading.
    Success(Vec<SlotParse>),
    /// At least one slot has several readings.
    Ambiguous(Vec<SlotParse>),
    Failure(ParseError),
}

impl ParseOutcome {
    /// Builds `Success` or `Ambiguous` depending on the slots.
    pub fn from_slots(slots: Vec<SlotParse>) -> Self {
        if slots.iter().any(SlotParse::is_ambiguous) {
            Self::Ambiguous(slots)
        } else {
            Self::Success(slots)
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Collapses every slot to its best-scoring reading.
    ///
    /// A slot with no readings at all collapses to `Absent` with score zero.
    pub fn collapse(self) -> Result<ParsedArgs, ParseError> {
        let slots = match self {
            Self::Success(slots) | Self::Ambiguous(slots) => slots,
            Self::Failure(err) => return Err(err),
        };
        Ok(ParsedArgs::new(
            slots
                .iter()
                .map(|slot| {
                    slot.best()
                        .cloned()
                        .unwrap_or_else(|| SlotValue::new(ArgValue::Absent, 0.0))
                })
                .collect(),
        ))
    }
}
