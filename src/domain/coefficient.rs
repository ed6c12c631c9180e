//! Coefficient domains and bound values.
//!
//! A [`Coefficient`] describes the legal values of one tunable predictor
//! parameter. Enumerated ranges are never mutated: every option is kept alive
//! as a sibling in the tree. Numeric domains are searched by evolution.

use crate::domain::error::HorseError;
use crate::domain::period::PeriodSpec;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Number of starting candidates produced by numeric domains.
pub const N_SLOTS: usize = 6;

/// A concrete value bound to a coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoefValue {
    Int(i64),
    Float(f64),
    Period(PeriodSpec),
}

impl CoefValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CoefValue::Int(v) => Some(*v as f64),
            CoefValue::Float(v) => Some(*v),
            CoefValue::Period(_) => None,
        }
    }

    /// Order numeric values; periods compare equal to everything.
    fn numeric_cmp(&self, other: &CoefValue) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for CoefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoefValue::Int(v) => write!(f, "{v}"),
            CoefValue::Float(v) => write!(f, "{v:.4}"),
            CoefValue::Period(p) => write!(f, "{p}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coefficient {
    /// Finite enumerated domain. Not mutable.
    Range(Vec<CoefValue>),
    /// Inclusive integer domain.
    Int { min: i64, max: i64 },
    /// Closed float domain.
    Float { min: f64, max: f64 },
}

impl Coefficient {
    pub fn is_mutable(&self) -> bool {
        !matches!(self, Coefficient::Range(_))
    }

    /// Starting candidates: the full enumeration for ranges, [`N_SLOTS`]
    /// evenly spaced values (both bounds included) for numeric domains.
    pub fn seed(&self) -> Vec<CoefValue> {
        match self {
            Coefficient::Range(values) => values.clone(),
            Coefficient::Int { min, max } => {
                let step = (*max - *min) as f64 / (N_SLOTS - 1) as f64;
                (0..N_SLOTS)
                    .map(|i| CoefValue::Int((*min as f64 + i as f64 * step) as i64))
                    .collect()
            }
            Coefficient::Float { min, max } => {
                let step = (max - min) / (N_SLOTS - 1) as f64;
                (0..N_SLOTS)
                    .map(|i| CoefValue::Float(min + i as f64 * step))
                    .collect()
            }
        }
    }

    /// Reject domains nothing can be drawn from: an empty range, inverted
    /// bounds or non-finite float bounds.
    pub fn validate(&self, name: &str) -> Result<(), HorseError> {
        let problem = match self {
            Coefficient::Range(values) if values.is_empty() => Some("empty range".to_string()),
            Coefficient::Int { min, max } if min > max => Some(format!("min {min} above max {max}")),
            Coefficient::Float { min, max } if !min.is_finite() || !max.is_finite() => {
                Some(format!("bounds {min}..{max} are not finite"))
            }
            Coefficient::Float { min, max } if min > max => Some(format!("min {min} above max {max}")),
            _ => None,
        };
        match problem {
            Some(reason) => Err(HorseError::InvalidCoefficients {
                reason: format!("domain of '{name}': {reason}"),
            }),
            None => Ok(()),
        }
    }

    /// Uniform sample from the domain; `None` when the domain is empty.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CoefValue> {
        match self {
            Coefficient::Range(values) => values.choose(rng).copied(),
            Coefficient::Int { min, max } => {
                (min <= max).then(|| CoefValue::Int(rng.gen_range(*min..=*max)))
            }
            Coefficient::Float { min, max } => (min.is_finite() && max.is_finite() && min <= max)
                .then(|| CoefValue::Float(rng.gen_range(*min..=*max))),
        }
    }

    /// Halfway point between two values of this domain. Integer domains round
    /// towards the smaller value.
    pub fn midpoint(&self, a: &CoefValue, b: &CoefValue) -> Option<CoefValue> {
        let (lo, hi) = match a.numeric_cmp(b) {
            Ordering::Greater => (b, a),
            _ => (a, b),
        };
        match (self, lo, hi) {
            (Coefficient::Int { .. }, CoefValue::Int(lo), CoefValue::Int(hi)) => {
                Some(CoefValue::Int(lo + (hi - lo) / 2))
            }
            (Coefficient::Float { .. }, CoefValue::Float(lo), CoefValue::Float(hi)) => {
                Some(CoefValue::Float(lo + (hi - lo) / 2.0))
            }
            _ => None,
        }
    }

    /// Whether `value` has the right shape and lies inside the domain.
    pub fn admits(&self, value: &CoefValue) -> bool {
        match (self, value) {
            (Coefficient::Range(values), v) => values.contains(v),
            (Coefficient::Int { min, max }, CoefValue::Int(v)) => min <= v && v <= max,
            (Coefficient::Float { min, max }, CoefValue::Float(v)) => min <= v && v <= max,
            _ => false,
        }
    }
}

/// Coefficient names bound to values (`None` while still unbound).
pub type Binding = BTreeMap<String, Option<CoefValue>>;

/// Fully bound coefficients of a concrete predictor. Built once, checked
/// against the model's declared names, then read through typed accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSet {
    values: BTreeMap<String, CoefValue>,
}

impl CoefficientSet {
    pub fn new(values: BTreeMap<String, CoefValue>) -> Self {
        Self { values }
    }

    /// Convert a partial binding, failing if any name is still unbound.
    pub fn from_binding(binding: &Binding) -> Result<Self, HorseError> {
        let mut values = BTreeMap::new();
        for (name, value) in binding {
            let value = value.ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("coefficient '{name}' is unbound"),
            })?;
            values.insert(name.clone(), value);
        }
        Ok(Self { values })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<CoefValue, HorseError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("no coefficient named '{name}'"),
            })
    }

    pub fn int(&self, name: &str) -> Result<i64, HorseError> {
        match self.get(name)? {
            CoefValue::Int(v) => Ok(v),
            other => Err(wrong_type(name, "int", &other)),
        }
    }

    /// Numeric value of an int or float coefficient.
    pub fn float(&self, name: &str) -> Result<f64, HorseError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| wrong_type(name, "number", &value))
    }

    pub fn period(&self, name: &str) -> Result<PeriodSpec, HorseError> {
        match self.get(name)? {
            CoefValue::Period(p) => Ok(p),
            other => Err(wrong_type(name, "period", &other)),
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: CoefValue) {
        self.values.insert(name.to_string(), value);
    }
}

impl fmt::Display for CoefficientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

fn wrong_type(name: &str, expected: &str, got: &CoefValue) -> HorseError {
    HorseError::InvalidCoefficients {
        reason: format!("coefficient '{name}' should be {expected}, got {got:?}"),
    }
}
