//! The runtime value universe and the collection that is FHIRPath's sole
//! first-class aggregate.
//!
//! There is no scalar/collection distinction at runtime: every expression
//! evaluates to a [`Collection`], an ordered, duplicate-preserving sequence
//! of [`Value`]s. The empty collection stands for both "no value" and
//! "unknown" (§3, §8 three-valued logic).

use crate::collections::IndexMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

mod datetime;
pub use datetime::{DateValue, DateTimeValue, TimeValue};

/// A FHIR `Quantity`: a decimal magnitude with an optional UCUM unit code.
/// A bare unitless number (`5`) has `unit: None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: Option<Arc<str>>,
}

impl Quantity {
    pub fn new(value: Decimal, unit: Option<impl Into<Arc<str>>>) -> Self {
        Self {
            value,
            unit: unit.map(Into::into),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} '{}'", self.value, unit),
            None => write!(f, "{}", self.value),
        }
    }
}

/// An opaque, model-defined record. The core never assumes anything about
/// field names beyond what's present; a [`crate::model::ModelProvider`] may
/// assign `type_name` a meaning, but the evaluator treats it as a label only.
#[derive(Clone, Debug, PartialEq)]
pub struct FhirObject {
    pub type_name: Option<Arc<str>>,
    pub fields: IndexMap<Arc<str>, Collection>,
}

impl FhirObject {
    pub fn new(type_name: Option<impl Into<Arc<str>>>) -> Self {
        Self {
            type_name: type_name.map(Into::into),
            fields: IndexMap::default(),
        }
    }

    pub fn with_field(mut self, name: impl Into<Arc<str>>, value: Collection) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.fields.get(name)
    }
}

/// One element of a [`Collection`]. Never itself "empty" — absence is
/// modeled by a zero-length collection, never by a `Value` variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(Arc<str>),
    Date(DateValue),
    DateTime(DateTimeValue),
    Time(TimeValue),
    Quantity(Quantity),
    Object(Arc<FhirObject>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Time(_) => "Time",
            Value::Quantity(_) => "Quantity",
            Value::Object(_) => "Object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&FhirObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// This value's numeric magnitude, promoting `Integer` to `Decimal` and
    /// unwrapping unitless `Quantity`. Used by arithmetic and comparison.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Quantity(q) if q.unit.is_none() => Some(q.value),
            _ => None,
        }
    }

    /// FHIRPath `=` equality: `None` when the two values are not of
    /// comparable categories (the caller folds that to an empty result).
    pub fn fhir_equals(&self, other: &Value) -> Option<bool> {
        use Value::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a == b),
            (String(a), String(b)) => Some(a == b),
            (Integer(a), Integer(b)) => Some(a == b),
            (Date(a), Date(b)) => a.partial_eq(b),
            (DateTime(a), DateTime(b)) => a.partial_eq(b),
            (Time(a), Time(b)) => a.partial_eq(b),
            (Object(a), Object(b)) => Some(a == b),
            (Quantity(a), Quantity(b)) => {
                if a.unit == b.unit {
                    Some(a.value == b.value)
                } else {
                    None
                }
            }
            (Integer(_) | Decimal(_) | Quantity(_), Integer(_) | Decimal(_) | Quantity(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => Some(a == b),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// FHIRPath `~` equivalence: like `=` but type/precision-tolerant and
    /// never undefined (always yields a definite boolean).
    pub fn fhir_equivalent(&self, other: &Value) -> bool {
        self.fhir_equals(other).unwrap_or_else(|| {
            // Fall back to a lenient numeric/string comparison for otherwise
            // incomparable categories, matching the spec's "always definite" rule.
            match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        })
    }

    /// FHIRPath ordering for `< > <= >=`. `None` when the types aren't ordered
    /// against each other.
    pub fn fhir_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        use Value::*;
        match (self, other) {
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (DateTime(a), DateTime(b)) => a.partial_cmp(b),
            (Time(a), Time(b)) => a.partial_cmp(b),
            (Quantity(a), Quantity(b)) if a.unit == b.unit => a.value.partial_cmp(&b.value),
            _ => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s.as_str()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Quantity(q) => write!(f, "{q}"),
            Value::Object(o) => write!(f, "{}", o.type_name.as_deref().unwrap_or("Object")),
        }
    }
}

/// The sole first-class aggregate: an ordered, duplicate-preserving sequence
/// of [`Value`]s. Equality is order-sensitive and element-wise (§8.6).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collection(Vec<Value>);

impl Collection {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn singleton(value: Value) -> Self {
        Self(vec![value])
    }

    pub fn collection(values: impl IntoIterator<Item = Value>) -> Self {
        Self(values.into_iter().collect())
    }

    /// Alias kept for call sites that read more naturally with a short name
    /// (e.g. test fixtures building literal collections).
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::collection(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn extend(&mut self, other: Collection) {
        self.0.extend(other.0);
    }

    /// This collection's single element, if it is exactly one long.
    /// Navigation and singleton-context operators flatten invisibly through
    /// this: there is no separate "scalar" representation to unwrap.
    pub fn as_singleton(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [v] => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Three-valued truthiness: `Some(b)` for a singleton boolean, `None`
    /// (meaning "unknown") for anything else, including empty and
    /// multi-element collections.
    pub fn as_bool3(&self) -> Option<bool> {
        self.as_singleton().and_then(Value::as_bool)
    }

    pub fn concat(collections: impl IntoIterator<Item = Collection>) -> Self {
        let mut out = Vec::new();
        for c in collections {
            out.extend(c.0);
        }
        Self(out)
    }

    /// Property navigation, shared by the evaluator and the compiler: for
    /// each element, either accept it as-is when `name` names its own
    /// resource type (the root type-name filter, e.g. a bare `Patient` at
    /// the start of a path) or descend into the named field.
    pub fn navigate(&self, name: &str) -> Collection {
        let mut out = Vec::new();
        for v in &self.0 {
            if let Value::Object(obj) = v {
                if obj.type_name.as_deref() == Some(name) {
                    out.push(v.clone());
                } else if let Some(values) = obj.get(name) {
                    out.extend(values.iter().cloned());
                }
            }
        }
        Collection::from_values(out)
    }
}

impl FromIterator<Value> for Collection {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Value> for Collection {
    fn from(value: Value) -> Self {
        Collection::singleton(value)
    }
}

impl From<bool> for Collection {
    fn from(b: bool) -> Self {
        Collection::singleton(Value::Boolean(b))
    }
}
