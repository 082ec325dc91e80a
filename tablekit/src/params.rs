//! Bind parameters: explicit ordered bags and serde-introspected records.
//!
//! A statement's parameters come either from a [`Params`] bag built by the
//! caller, or from any `Serialize` struct. Struct field names are resolved
//! once per type and cached in a [`ParamNameCache`]. The list is the type's
//! declared fields, so a field left out by `skip_serializing_if` still binds
//! (as `NULL`); fields marked with `#[serde(skip)]` (or `skip_serializing`)
//! never become parameters.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DataError;
use crate::fields::struct_fields;

/// An ordered, de-duplicated bag of named bind values.
///
/// Re-inserting a name replaces its value but keeps its original position.
///
/// ```ignore
/// let params = Params::new().with("facultyId", 1).with("city", "Kajang");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style [`try_insert`](Self::try_insert).
    pub fn try_with(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, DataError> {
        self.try_insert(name, value)?;
        Ok(self)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Bind any `Serialize` value; a value serde cannot represent is rejected.
    pub fn try_insert(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), DataError> {
        let name = name.into();
        let value = serde_json::to_value(value)
            .map_err(|e| DataError::invalid(format!("cannot bind {name:?}: {e}")))?;
        self.values.insert(name, value);
        Ok(())
    }

    /// Add every entry of `other`; names already present take the new value.
    pub fn extend(&mut self, other: Params) {
        for (name, value) in other.values {
            self.values.insert(name, value);
        }
    }

    /// Look up a value by name, falling back to an ASCII case-insensitive match.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TryFrom<Value> for Params {
    type Error = DataError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(values) => Ok(Params { values }),
            other => Err(not_a_record(&other)),
        }
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Identity of a record type, used as the parameter-name cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    id: TypeId,
    name: &'static str,
}

impl Shape {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Parameters as handed to a table or database operation.
#[derive(Debug, Clone)]
pub enum Args {
    /// A struct serialized through serde; its field list is cached by shape.
    Record {
        shape: Shape,
        /// Declared fields, `None` when the type does not serialize as a plain struct.
        fields: Option<Vec<&'static str>>,
        values: Map<String, Value>,
    },
    /// An explicit bag; its names are used verbatim.
    Bag(Params),
}

impl Args {
    /// Introspect a `Serialize` value.
    ///
    /// `serde_json::Value` and `Map` carry no stable shape, so they become bags.
    pub fn record<T: Serialize + ?Sized + 'static>(value: &T) -> Result<Self, DataError> {
        let json = serde_json::to_value(value)
            .map_err(|e| DataError::invalid(format!("cannot serialize parameters: {e}")))?;
        let shape = Shape::of::<T>();
        let dynamic =
            shape.id == TypeId::of::<Value>() || shape.id == TypeId::of::<Map<String, Value>>();
        match json {
            Value::Object(values) if dynamic => Ok(Args::Bag(Params { values })),
            Value::Object(values) => Ok(Args::Record {
                shape,
                fields: struct_fields(value),
                values,
            }),
            other => Err(not_a_record(&other)),
        }
    }

    /// Flatten into a bag holding exactly the values for `names`, in that order.
    ///
    /// Names the value does not carry (fields skipped by `skip_serializing_if`) bind as `NULL`.
    pub fn to_params(&self, names: &[String]) -> Params {
        names
            .iter()
            .map(|name| {
                let value = match self {
                    Args::Bag(params) => params.get(name),
                    Args::Record { values, .. } => values.get(name),
                };
                (name.clone(), value.cloned().unwrap_or(Value::Null))
            })
            .collect()
    }
}

fn not_a_record(value: &Value) -> DataError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "an object",
    };
    DataError::invalid(format!(
        "cannot resolve parameter names of {kind}; expected a struct or a parameter bag"
    ))
}

/// Anything that can be turned into statement parameters.
pub trait IntoArgs {
    fn into_args(self) -> Result<Args, DataError>;
}

impl<T: Serialize + ?Sized + 'static> IntoArgs for &T {
    fn into_args(self) -> Result<Args, DataError> {
        Args::record(self)
    }
}

impl IntoArgs for Params {
    fn into_args(self) -> Result<Args, DataError> {
        Ok(Args::Bag(self))
    }
}

impl IntoArgs for Args {
    fn into_args(self) -> Result<Args, DataError> {
        Ok(self)
    }
}

impl IntoArgs for Value {
    fn into_args(self) -> Result<Args, DataError> {
        Params::try_from(self).map(Args::Bag)
    }
}

/// Process-lifetime memo of parameter names per record shape.
#[derive(Debug, Default)]
pub struct ParamNameCache {
    names: DashMap<TypeId, Arc<[String]>>,
}

impl ParamNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered parameter names for `args`.
    ///
    /// Bags return their own names; structs are introspected on first sight of
    /// their shape and served from the cache afterwards. Types serialized as
    /// maps have no fixed field list and are never cached.
    pub fn resolve(&self, args: &Args) -> Arc<[String]> {
        match args {
            Args::Bag(params) => params.names().into(),
            Args::Record {
                shape,
                fields: Some(fields),
                ..
            } => self
                .names
                .entry(shape.id)
                .or_insert_with(|| fields.iter().map(|f| f.to_string()).collect())
                .clone(),
            Args::Record {
                fields: None,
                values,
                ..
            } => values.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&self) {
        self.names.clear();
    }
}
