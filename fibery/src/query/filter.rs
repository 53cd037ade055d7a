//! Filter compiler: turns user conditions into a `q/where` predicate and its
//! parameters.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use serde_json::{Map, Value};

use crate::classify::{self, FieldKind};
use crate::config::FieldPolicy;
use crate::datetime::normalize_instant;
use crate::query::Expr;
use crate::types::{Field, Schema, Type, DEFAULT_ID_FIELD};
use crate::{Error, ErrorKind, Result};

/// Filter operator as chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal to the value.
    Is,
    /// Not equal to the value.
    IsNot,
    /// Text contains the value, or collection contains one of the ids.
    Contains,
    /// Negation of [`Operator::Contains`].
    DoesNotContain,
    /// Text starts with the value.
    StartsWith,
    /// Text ends with the value.
    EndsWith,
    /// No value set.
    IsEmpty,
    /// Some value set.
    IsNotEmpty,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<=`
    LessThanOrEqual,
    /// Date strictly before.
    IsBefore,
    /// Date strictly after.
    IsAfter,
    /// Date before or equal.
    IsOnOrBefore,
    /// Date after or equal.
    IsOnOrAfter,
}

impl Operator {
    /// Name the operator is tagged with in filter conditions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::IsNot => "is_not",
            Operator::Contains => "contains",
            Operator::DoesNotContain => "does_not_contain",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::GreaterThanOrEqual => "greater_than_or_equal",
            Operator::LessThanOrEqual => "less_than_or_equal",
            Operator::IsBefore => "is_before",
            Operator::IsAfter => "is_after",
            Operator::IsOnOrBefore => "is_on_or_before",
            Operator::IsOnOrAfter => "is_on_or_after",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "is" => Operator::Is,
            "is_not" => Operator::IsNot,
            "contains" => Operator::Contains,
            "does_not_contain" => Operator::DoesNotContain,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "is_empty" => Operator::IsEmpty,
            "is_not_empty" => Operator::IsNotEmpty,
            "greater_than" => Operator::GreaterThan,
            "less_than" => Operator::LessThan,
            "greater_than_or_equal" => Operator::GreaterThanOrEqual,
            "less_than_or_equal" => Operator::LessThanOrEqual,
            "is_before" => Operator::IsBefore,
            "is_after" => Operator::IsAfter,
            "is_on_or_before" => Operator::IsOnOrBefore,
            "is_on_or_after" => Operator::IsOnOrAfter,
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Unknown filter operator {other}"),
                ))
            }
        };
        Ok(op)
    }
}

/// How several conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// All conditions must hold.
    #[default]
    And,
    /// Any condition must hold.
    Or,
}

impl MatchMode {
    /// Operator name in the predicate algebra.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::And => "q/and",
            MatchMode::Or => "q/or",
        }
    }
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "q/and" | "and" => Ok(MatchMode::And),
            "q/or" | "or" => Ok(MatchMode::Or),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown match mode {other}"),
            )),
        }
    }
}

/// Bound of a date range a condition compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePart {
    /// `q/start`
    #[default]
    Start,
    /// `q/end`
    End,
}

impl DatePart {
    /// Operator name in the predicate algebra.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Start => "q/start",
            DatePart::End => "q/end",
        }
    }
}

/// One user supplied filter condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Name of the filtered field.
    pub field: String,
    /// Control kind the condition was authored with.
    pub kind: FieldKind,
    /// Chosen operator.
    pub operator: Operator,
    /// Compared value, ignored by emptiness operators.
    pub value: Value,
    /// Bound compared on date range fields, start by default.
    pub date_part: Option<DatePart>,
    /// Timezone of a date value, the filter's default if unset.
    pub timezone: Option<FixedOffset>,
}

impl Condition {
    /// Create a condition.
    pub fn new(
        field: impl Into<String>,
        kind: FieldKind,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            operator,
            value: value.into(),
            date_part: None,
            timezone: None,
        }
    }

    /// Compare against one bound of a date range.
    pub fn with_date_part(mut self, date_part: DatePart) -> Self {
        self.date_part = Some(date_part);
        self
    }

    /// Interpret the date value in `timezone`.
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// Options shared by all conditions of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Timezone of date values that don't carry their own.
    pub timezone: FixedOffset,
    /// Field handling.
    pub policy: FieldPolicy,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            timezone: Utc.fix(),
            policy: FieldPolicy::default(),
        }
    }
}

/// Result of [`compile_filter`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    /// `q/where` predicate, `None` when nothing filters.
    pub predicate: Option<Expr>,
    /// Values of the parameters the predicate refers to.
    pub params: Map<String, Value>,
}

/// Compile `conditions` on `ty` into one predicate.
///
/// Conditions are numbered by position, the i-th one binds `$where{i}`.
/// Conditions with an operator their kind doesn't offer contribute nothing,
/// and neither do conditions on unsupported fields.
pub fn compile_filter(
    conditions: &[Condition],
    match_mode: MatchMode,
    ty: &Type,
    schema: &Schema,
    options: &FilterOptions,
) -> Result<CompiledFilter> {
    let mut predicates = Vec::with_capacity(conditions.len());
    let mut params = Map::new();

    for (idx, condition) in conditions.iter().enumerate() {
        let field = ty.field_by_name(&condition.field)?;
        if !classify::is_supported(field, &options.policy) {
            log::debug!(
                "Ignoring condition on unsupported field {} of {}",
                field.name,
                ty.name
            );
            continue;
        }

        let param = format!("$where{idx}");
        match build_predicate(condition, field, schema, &param, options)? {
            Some((predicate, value)) => {
                predicates.push(predicate);
                params.insert(param, value);
            }
            None => log::debug!(
                "Ignoring condition {} on {} field {}",
                condition.operator,
                condition.kind,
                field.name
            ),
        }
    }

    let predicate = match predicates.len() {
        0 => None,
        1 => predicates.pop(),
        _ => Some(Expr::call(match_mode.as_str(), predicates)),
    };

    Ok(CompiledFilter { predicate, params })
}

fn build_predicate(
    condition: &Condition,
    field: &Field,
    schema: &Schema,
    param: &str,
    options: &FilterOptions,
) -> Result<Option<(Expr, Value)>> {
    use FieldKind as K;
    use Operator as Op;

    let compare = |op: &'static str, lhs: Expr| Expr::call(op, vec![lhs, Expr::param(param)]);
    let path = || Expr::field(field.name.clone());
    let id_path = || {
        let id_field = schema
            .reference_target(field)
            .map(Type::id_field)
            .unwrap_or(DEFAULT_ID_FIELD);
        Expr::nested(field.name.clone(), id_field)
    };
    let date_path = || match condition.kind {
        K::DateRange => Expr::call(
            condition.date_part.unwrap_or_default().as_str(),
            vec![path()],
        ),
        _ => path(),
    };
    let null_or_empty = || Expr::call("q/null-or-empty?", vec![path()]);
    let value = || condition.value.clone();

    let built = match (condition.kind, condition.operator) {
        (K::Text, Op::Contains) => (compare("q/contains", path()), value()),
        (K::Text, Op::DoesNotContain) => (compare("q/does_not_contain", path()), value()),
        (K::Text, Op::Is) => (compare("q/equals-ignoring-case?", path()), value()),
        (K::Text, Op::IsNot) => (compare("q/not-equals-ignoring-case?", path()), value()),
        (K::Text, Op::StartsWith) => (compare("q/starts-with-ignoring-case?", path()), value()),
        (K::Text, Op::EndsWith) => (compare("q/ends-with-ignoring-case?", path()), value()),

        (K::Number, Op::Is) | (K::Boolean, Op::Is) => (compare("=", path()), value()),
        (K::Number, Op::IsNot) => (compare("!=", path()), value()),
        (K::Number, Op::GreaterThan) => (compare(">", path()), value()),
        (K::Number, Op::LessThan) => (compare("<", path()), value()),
        (K::Number, Op::GreaterThanOrEqual) => (compare(">=", path()), value()),
        (K::Number, Op::LessThanOrEqual) => (compare("<=", path()), value()),

        (K::Text | K::Number | K::MultiSelect | K::File, Op::IsEmpty) => {
            (compare("=", null_or_empty()), Value::Bool(true))
        }
        (K::Text | K::Number | K::MultiSelect | K::File, Op::IsNotEmpty) => {
            (compare("=", null_or_empty()), Value::Bool(false))
        }

        (K::Date | K::DateRange, Op::IsEmpty) => (
            compare("=", Expr::call("q/null?", vec![date_path()])),
            Value::Bool(true),
        ),
        (K::Date | K::DateRange, Op::IsNotEmpty) => (
            compare("=", Expr::call("q/null?", vec![date_path()])),
            Value::Bool(false),
        ),
        (K::Date | K::DateRange, op) => {
            let cmp = match op {
                Op::Is => "=",
                Op::IsBefore => "<",
                Op::IsAfter => ">",
                Op::IsOnOrBefore => "<=",
                Op::IsOnOrAfter => ">=",
                _ => return Ok(None),
            };
            (compare(cmp, date_path()), date_value(condition, options)?)
        }

        (K::Select, Op::Is) => (compare("=", id_path()), value()),
        (K::Select, Op::IsNot) => (compare("!=", id_path()), value()),
        (K::Select, Op::IsEmpty) => (compare("=", id_path()), Value::Null),
        (K::Select, Op::IsNotEmpty) => (compare("!=", id_path()), Value::Null),

        (K::MultiSelect, Op::Contains) => (compare("q/in", id_path()), value()),
        (K::MultiSelect, Op::DoesNotContain) => (compare("q/not-in", id_path()), value()),

        _ => return Ok(None),
    };

    Ok(Some(built))
}

fn date_value(condition: &Condition, options: &FilterOptions) -> Result<Value> {
    let raw = condition.value.as_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidInput, "date condition needs a string value")
            .with_context("field", condition.field.clone())
    })?;
    let timezone = condition.timezone.unwrap_or(options.timezone);

    normalize_instant(raw, timezone)
        .map(Value::String)
        .map_err(|e| e.with_context("field", condition.field.clone()))
}
