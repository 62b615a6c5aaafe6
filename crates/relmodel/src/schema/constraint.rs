//! Column constraints and their combination algebra.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::field::DataType;
use crate::metadata::{CheckGenerator, ComparisonOp, Sign};
use crate::value::{ScalarType, Value};

/// A constraint on one column, as handed to schema emitters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constraint {
    /// Sign requirement.
    Signedness(Sign),
    /// Comparison against an anchor.
    Comparison(ComparisonOp, Value),
    /// Length bounds on text.
    StringLength {
        /// Minimum length.
        min: Option<usize>,
        /// Maximum length.
        max: Option<usize>,
    },
    /// Allowed or disallowed value set.
    Discreteness(Discreteness),
    /// Expression from a custom generator.
    Custom {
        /// Generator name.
        generator: String,
        /// Generator arguments.
        args: Vec<Value>,
        /// Generated check expression.
        expression: String,
    },
}

/// Allowed or disallowed value set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Discreteness {
    /// Values must be in the set.
    Allowed(Vec<Value>),
    /// Values must not be in the set.
    Disallowed(Vec<Value>),
}

/// One side of a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bound {
    /// Anchor value.
    pub value: Value,
    /// Whether the anchor itself is admitted.
    pub inclusive: bool,
}

/// A custom check attached to a column.
#[derive(Clone, Serialize)]
pub struct CustomCheck {
    /// Generator name.
    pub generator: String,
    /// Generator arguments.
    pub args: Vec<Value>,
    /// Generated expression, filled in once the column name is final.
    pub expression: Option<String>,
    #[serde(skip)]
    pub(crate) source: Arc<dyn CheckGenerator>,
}

impl CustomCheck {
    /// Create a custom check from a generator.
    pub fn new(source: Arc<dyn CheckGenerator>, args: Vec<Value>) -> Self {
        Self {
            generator: source.name().to_string(),
            args,
            expression: None,
            source,
        }
    }

    /// Run the generator for a column.
    pub fn generate(&mut self, column: &str, data_type: &DataType) -> Result<(), String> {
        self.expression = Some(self.source.generate(column, data_type, &self.args)?);
        Ok(())
    }
}

impl PartialEq for CustomCheck {
    fn eq(&self, other: &Self) -> bool {
        self.generator == other.generator && self.args == other.args
    }
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheck")
            .field("generator", &self.generator)
            .field("args", &self.args)
            .field("expression", &self.expression)
            .finish()
    }
}

/// The combined constraints of one field.
///
/// Repeated constraints combine: lower bounds keep the maximum, upper bounds
/// the minimum, allowed sets intersect, disallowed sets union and exact
/// duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstraintSet {
    /// Declared sign requirements.
    pub signs: Vec<Sign>,
    /// Tightest lower bound.
    pub lower: Option<Bound>,
    /// Tightest upper bound.
    pub upper: Option<Bound>,
    /// Tightest minimum length.
    pub min_length: Option<usize>,
    /// Tightest maximum length.
    pub max_length: Option<usize>,
    /// Allowed values, if restricted.
    pub allowed: Option<Vec<Value>>,
    /// Disallowed values.
    pub disallowed: Vec<Value>,
    /// Custom checks.
    pub custom: Vec<CustomCheck>,
}

impl ConstraintSet {
    /// Check if no constraint is present.
    pub fn is_empty(&self) -> bool {
        *self == ConstraintSet::default()
    }

    /// Add a sign requirement.
    pub fn add_sign(&mut self, sign: Sign) {
        if !self.signs.contains(&sign) {
            self.signs.push(sign);
        }
    }

    /// Add a comparison bound. The anchor must already be in the column's
    /// canonical representation.
    pub fn add_comparison(&mut self, op: ComparisonOp, anchor: Value) {
        let bound = Bound {
            value: anchor,
            inclusive: op.is_inclusive(),
        };
        if op.is_lower() {
            self.lower = Some(tighter(self.lower.take(), bound, Ordering::Greater));
        } else {
            self.upper = Some(tighter(self.upper.take(), bound, Ordering::Less));
        }
    }

    /// Add length bounds.
    pub fn add_length(&mut self, min: Option<usize>, max: Option<usize>) {
        if let Some(min) = min {
            self.min_length = Some(self.min_length.map_or(min, |m| m.max(min)));
        }
        if let Some(max) = max {
            self.max_length = Some(self.max_length.map_or(max, |m| m.min(max)));
        }
    }

    /// Restrict to an allowed set.
    pub fn add_allowed(&mut self, values: Vec<Value>) {
        let values = dedup(values);
        self.allowed = Some(match self.allowed.take() {
            Some(current) => current
                .into_iter()
                .filter(|v| values.iter().any(|w| w.same(v)))
                .collect(),
            None => values,
        });
    }

    /// Exclude a set of values.
    pub fn add_disallowed(&mut self, values: Vec<Value>) {
        for value in values {
            if !self.disallowed.iter().any(|v| v.same(&value)) {
                self.disallowed.push(value);
            }
        }
    }

    /// Add a custom check.
    pub fn add_custom(&mut self, check: CustomCheck) {
        if !self.custom.contains(&check) {
            self.custom.push(check);
        }
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: &ConstraintSet) {
        for sign in &other.signs {
            self.add_sign(*sign);
        }
        if let Some(lower) = &other.lower {
            let op = if lower.inclusive {
                ComparisonOp::GreaterOrEqual
            } else {
                ComparisonOp::GreaterThan
            };
            self.add_comparison(op, lower.value.clone());
        }
        if let Some(upper) = &other.upper {
            let op = if upper.inclusive {
                ComparisonOp::LessOrEqual
            } else {
                ComparisonOp::LessThan
            };
            self.add_comparison(op, upper.value.clone());
        }
        self.add_length(other.min_length, other.max_length);
        if let Some(allowed) = &other.allowed {
            self.add_allowed(allowed.clone());
        }
        self.add_disallowed(other.disallowed.clone());
        for check in &other.custom {
            self.add_custom(check.clone());
        }
    }

    /// Check a non-null value against every constraint except custom ones.
    ///
    /// Returns the label of the first violated constraint.
    pub fn admits(&self, value: &Value) -> Result<(), String> {
        self.admits_except_allowed(value)?;
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|v| v.same(value)) {
                return Err(format!("IsOneOf({})", join(allowed)));
            }
        }
        Ok(())
    }

    fn admits_except_allowed(&self, value: &Value) -> Result<(), String> {
        for sign in &self.signs {
            let ord = value.compare(&Value::Int(0));
            let ok = match sign {
                Sign::Positive => ord == Some(Ordering::Greater),
                Sign::Negative => ord == Some(Ordering::Less),
                Sign::NonZero => ord != Some(Ordering::Equal),
            };
            if !ok {
                return Err(format!("Is{:?}", sign));
            }
        }
        if let Some(lower) = &self.lower {
            let ok = match value.compare(&lower.value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => lower.inclusive,
                _ => false,
            };
            if !ok {
                return Err(format!("{} {}", lower_op(lower), lower.value));
            }
        }
        if let Some(upper) = &self.upper {
            let ok = match value.compare(&upper.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => upper.inclusive,
                _ => false,
            };
            if !ok {
                return Err(format!("{} {}", upper_op(upper), upper.value));
            }
        }
        if let Some(text) = value.as_str() {
            let len = text.chars().count();
            if self.min_length.is_some_and(|min| len < min)
                || self.max_length.is_some_and(|max| len > max)
            {
                return Err(format!(
                    "StringLength({:?}, {:?})",
                    self.min_length, self.max_length
                ));
            }
        }
        if self.disallowed.iter().any(|v| v.same(value)) {
            return Err(format!("IsNotOneOf({})", join(&self.disallowed)));
        }
        Ok(())
    }

    /// Prove that at least one value of the domain satisfies every constraint.
    pub fn check_satisfiable(&self, domain: &DataType) -> Result<(), String> {
        if self.signs.contains(&Sign::Positive) && self.signs.contains(&Sign::Negative) {
            return Err("IsPositive and IsNegative exclude each other".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(format!("minimum length {} exceeds maximum length {}", min, max));
            }
        }

        let (lower, upper) = self.effective_bounds();
        let scalar = match domain {
            DataType::Scalar(s) => Some(*s),
            DataType::Enumeration { .. } => None,
        };

        match scalar {
            Some(s) if s.is_discrete() => self.check_discrete(s, lower.as_ref(), upper.as_ref())?,
            _ => check_dense(lower.as_ref(), upper.as_ref())?,
        }

        if let Some(universe) = finite_universe(domain, self.max_length) {
            if !universe.iter().any(|v| self.admits(v).is_ok()) {
                return Err(format!("no value of {} satisfies every constraint", domain));
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|v| self.admits_except_allowed(v).is_ok()) {
                return Err("no allowed value satisfies the remaining constraints".to_string());
            }
        }
        Ok(())
    }

    fn effective_bounds(&self) -> (Option<Bound>, Option<Bound>) {
        let mut lower = self.lower.clone();
        let mut upper = self.upper.clone();
        let zero = |inclusive| Bound {
            value: Value::Int(0),
            inclusive,
        };
        if self.signs.contains(&Sign::Positive) {
            lower = Some(tighter(lower, zero(false), Ordering::Greater));
        }
        if self.signs.contains(&Sign::Negative) {
            upper = Some(tighter(upper, zero(false), Ordering::Less));
        }
        (lower, upper)
    }

    fn check_discrete(
        &self,
        scalar: ScalarType,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> Result<(), String> {
        let Some((dmin, dmax)) = scalar.discrete_range() else {
            return Ok(());
        };
        let lo = match lower {
            Some(b) => match b.value.as_discrete() {
                Some(v) if b.inclusive => v.max(dmin),
                Some(v) => (v + 1).max(dmin),
                None => dmin,
            },
            None => dmin,
        };
        let hi = match upper {
            Some(b) => match b.value.as_discrete() {
                Some(v) if b.inclusive => v.min(dmax),
                Some(v) => (v - 1).min(dmax),
                None => dmax,
            },
            None => dmax,
        };
        if lo > hi {
            return Err(format!("range [{}, {}] of {} is empty", lo, hi, scalar));
        }

        const ENUMERABLE: i128 = 4096;
        if hi - lo < ENUMERABLE {
            let candidate = |n: i128| -> Option<Value> {
                match scalar {
                    ScalarType::Char => char::from_u32(n as u32).map(Value::Char),
                    ScalarType::DateTime => Some(Value::DateTime(n as i64)),
                    s if s.integral_range().is_some_and(|(min, _)| min < 0) => {
                        Some(Value::Int(n as i64))
                    }
                    _ => Some(Value::UInt(n as u64)),
                }
            };
            let any = (lo..=hi)
                .filter_map(candidate)
                .any(|v| self.admits_except_allowed(&v).is_ok());
            if !any {
                return Err(format!(
                    "every value in [{}, {}] of {} is excluded",
                    lo, hi, scalar
                ));
            }
        }
        Ok(())
    }

    /// Normalized constraint list for a column.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut out = Vec::new();
        let strict_sign = self
            .signs
            .iter()
            .any(|s| matches!(s, Sign::Positive | Sign::Negative));
        for sign in &self.signs {
            if *sign == Sign::NonZero && strict_sign {
                continue;
            }
            out.push(Constraint::Signedness(*sign));
        }
        if let Some(lower) = &self.lower {
            out.push(Constraint::Comparison(lower_op(lower), lower.value.clone()));
        }
        if let Some(upper) = &self.upper {
            out.push(Constraint::Comparison(upper_op(upper), upper.value.clone()));
        }
        if self.min_length.is_some() || self.max_length.is_some() {
            out.push(Constraint::StringLength {
                min: self.min_length,
                max: self.max_length,
            });
        }
        if let Some(allowed) = &self.allowed {
            out.push(Constraint::Discreteness(Discreteness::Allowed(
                allowed.clone(),
            )));
        }
        if !self.disallowed.is_empty() {
            out.push(Constraint::Discreteness(Discreteness::Disallowed(
                self.disallowed.clone(),
            )));
        }
        for check in &self.custom {
            out.push(Constraint::Custom {
                generator: check.generator.clone(),
                args: check.args.clone(),
                expression: check.expression.clone().unwrap_or_default(),
            });
        }
        out
    }
}

fn tighter(current: Option<Bound>, candidate: Bound, direction: Ordering) -> Bound {
    let Some(current) = current else {
        return candidate;
    };
    match candidate.value.compare(&current.value) {
        Some(ord) if ord == direction => candidate,
        Some(Ordering::Equal) => Bound {
            value: current.value,
            inclusive: current.inclusive && candidate.inclusive,
        },
        _ => current,
    }
}

fn check_dense(lower: Option<&Bound>, upper: Option<&Bound>) -> Result<(), String> {
    if let (Some(lo), Some(hi)) = (lower, upper) {
        match lo.value.compare(&hi.value) {
            Some(Ordering::Greater) => {
                return Err(format!(
                    "lower bound {} exceeds upper bound {}",
                    lo.value, hi.value
                ));
            }
            Some(Ordering::Equal) if !(lo.inclusive && hi.inclusive) => {
                return Err(format!("range around {} is empty", lo.value));
            }
            _ => {}
        }
    }
    Ok(())
}

fn finite_universe(domain: &DataType, max_length: Option<usize>) -> Option<Vec<Value>> {
    match domain {
        DataType::Scalar(ScalarType::Bool) => Some(vec![Value::Bool(false), Value::Bool(true)]),
        DataType::Scalar(ScalarType::String) if max_length == Some(0) => Some(vec![Value::string("")]),
        DataType::Enumeration { decl, .. } if !decl.flags => Some(
            decl.variants
                .iter()
                .map(|v| Value::Enum(v.name.clone()))
                .collect(),
        ),
        _ => None,
    }
}

fn lower_op(bound: &Bound) -> ComparisonOp {
    if bound.inclusive {
        ComparisonOp::GreaterOrEqual
    } else {
        ComparisonOp::GreaterThan
    }
}

fn upper_op(bound: &Bound) -> ComparisonOp {
    if bound.inclusive {
        ComparisonOp::LessOrEqual
    } else {
        ComparisonOp::LessThan
    }
}

fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !out.iter().any(|v| v.same(&value)) {
            out.push(value);
        }
    }
    out
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
