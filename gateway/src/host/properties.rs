//! Typed object properties and the setter table
//!
//! Every property of a type belongs to one [`PropertyKind`]; the kind picks
//! the setter that turns an incoming JSON value into a [`PropertyValue`].
//! Setters report a per-property outcome and a batch is only applied when
//! every property in it validated.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Setter category of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Scalar,
    Text,
    Vector,
    Placement,
    Link,
    LinkList,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyKind::Scalar => "scalar",
            PropertyKind::Text => "text",
            PropertyKind::Vector => "vector",
            PropertyKind::Placement => "placement",
            PropertyKind::Link => "link",
            PropertyKind::LinkList => "link list",
        };
        f.write_str(s)
    }
}

pub type Vector3 = [f64; 3];

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(f64),
    Text(String),
    Vector(Vector3),
    Placement { base: Vector3, axis: Vector3, angle: f64 },
    Link(Option<String>),
    LinkList(Vec<String>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Scalar(_) => PropertyKind::Scalar,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Vector(_) => PropertyKind::Vector,
            PropertyValue::Placement { .. } => PropertyKind::Placement,
            PropertyValue::Link(_) => PropertyKind::Link,
            PropertyValue::LinkList(_) => PropertyKind::LinkList,
        }
    }

    pub fn identity_placement() -> Self {
        PropertyValue::Placement {
            base: [0.0; 3],
            axis: [0.0, 0.0, 1.0],
            angle: 0.0,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Scalar(value) => json!(value),
            PropertyValue::Text(text) => json!(text),
            PropertyValue::Vector(v) => vector_json(v),
            PropertyValue::Placement { base, axis, angle } => json!({
                "Base": vector_json(base),
                "Rotation": { "Axis": vector_json(axis), "Angle": angle },
            }),
            PropertyValue::Link(target) => json!(target),
            PropertyValue::LinkList(targets) => json!(targets),
        }
    }

    /// Object names this value refers to
    pub fn links(&self) -> Vec<&str> {
        match self {
            PropertyValue::Link(Some(target)) => vec![target.as_str()],
            PropertyValue::LinkList(targets) => targets.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Drop references to `name`; returns whether anything changed
    pub fn unlink(&mut self, name: &str) -> bool {
        match self {
            PropertyValue::Link(target) if target.as_deref() == Some(name) => {
                *target = None;
                true
            }
            PropertyValue::LinkList(targets) => {
                let before = targets.len();
                targets.retain(|target| target != name);
                targets.len() != before
            }
            _ => false,
        }
    }
}

fn vector_json(v: &Vector3) -> Value {
    json!({ "x": v[0], "y": v[1], "z": v[2] })
}

/// What a setter may look at besides the raw value
pub struct SetterContext<'a> {
    /// Object being edited, which may not link to itself
    pub owner: &'a str,
    pub is_object: &'a dyn Fn(&str) -> bool,
}

type Setter = fn(&Value, &SetterContext<'_>) -> Result<PropertyValue, String>;

/// Capability-keyed dispatch from property kind to setter
pub struct SetterTable {
    setters: HashMap<PropertyKind, Setter>,
}

impl Default for SetterTable {
    fn default() -> Self {
        let mut table = Self {
            setters: HashMap::new(),
        };
        table.register(PropertyKind::Scalar, set_scalar);
        table.register(PropertyKind::Text, set_text);
        table.register(PropertyKind::Vector, set_vector);
        table.register(PropertyKind::Placement, set_placement);
        table.register(PropertyKind::Link, set_link);
        table.register(PropertyKind::LinkList, set_link_list);
        table
    }
}

/// Result of validating one property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOutcome {
    pub name: String,
    pub result: Result<PropertyValue, String>,
}

impl SetterTable {
    pub fn register(&mut self, kind: PropertyKind, setter: Setter) {
        self.setters.insert(kind, setter);
    }

    pub fn set(&self, kind: PropertyKind, value: &Value, context: &SetterContext<'_>) -> Result<PropertyValue, String> {
        match self.setters.get(&kind) {
            Some(setter) => setter(value, context),
            None => Err(format!("no setter for {kind} properties")),
        }
    }

    /// Validate every property of a batch against `schema`.
    ///
    /// Returns one outcome per property, in key order.
    pub fn validate(
        &self,
        schema: &dyn Fn(&str) -> Option<PropertyKind>,
        properties: &Map<String, Value>,
        context: &SetterContext<'_>,
    ) -> Vec<PropertyOutcome> {
        properties
            .iter()
            .map(|(name, value)| PropertyOutcome {
                name: name.clone(),
                result: match schema(name) {
                    Some(kind) => self.set(kind, value, context),
                    None => Err("unknown property".to_string()),
                },
            })
            .collect()
    }
}

/// Split outcomes into applied values, or a combined error message
pub fn all_or_nothing(outcomes: Vec<PropertyOutcome>) -> Result<Vec<(String, PropertyValue)>, String> {
    let errors: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| match &outcome.result {
            Err(e) => Some(format!("{}: {e}", outcome.name)),
            Ok(_) => None,
        })
        .collect();
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    Ok(outcomes
        .into_iter()
        .filter_map(|outcome| outcome.result.ok().map(|value| (outcome.name, value)))
        .collect())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn set_scalar(value: &Value, _: &SetterContext<'_>) -> Result<PropertyValue, String> {
    number(value)
        .filter(|n| n.is_finite())
        .map(PropertyValue::Scalar)
        .ok_or_else(|| format!("expected a number, got {value}"))
}

fn set_text(value: &Value, _: &SetterContext<'_>) -> Result<PropertyValue, String> {
    match value {
        Value::String(s) => Ok(PropertyValue::Text(s.clone())),
        Value::Number(n) => Ok(PropertyValue::Text(n.to_string())),
        other => Err(format!("expected text, got {other}")),
    }
}

fn vector(value: &Value) -> Option<Vector3> {
    match value {
        Value::Array(items) if items.len() == 3 => {
            Some([number(&items[0])?, number(&items[1])?, number(&items[2])?])
        }
        Value::Object(fields) => {
            let axis = |name: &str| fields.get(name).map_or(Some(0.0), number);
            Some([axis("x")?, axis("y")?, axis("z")?])
        }
        _ => None,
    }
}

fn set_vector(value: &Value, _: &SetterContext<'_>) -> Result<PropertyValue, String> {
    vector(value)
        .map(PropertyValue::Vector)
        .ok_or_else(|| format!("expected [x, y, z] or {{x, y, z}}, got {value}"))
}

fn set_placement(value: &Value, _: &SetterContext<'_>) -> Result<PropertyValue, String> {
    let Value::Object(fields) = value else {
        return Err(format!("expected {{Base, Rotation}}, got {value}"));
    };

    let base = match fields.get("Base") {
        Some(base) => vector(base).ok_or_else(|| format!("Base: expected a vector, got {base}"))?,
        None => [0.0; 3],
    };
    let (axis, angle) = match fields.get("Rotation") {
        Some(Value::Object(rotation)) => {
            let axis = match rotation.get("Axis") {
                Some(axis) => vector(axis).ok_or_else(|| format!("Rotation.Axis: expected a vector, got {axis}"))?,
                None => [0.0, 0.0, 1.0],
            };
            if axis == [0.0; 3] {
                return Err("Rotation.Axis: must not be the zero vector".to_string());
            }
            let angle = match rotation.get("Angle") {
                Some(angle) => number(angle).ok_or_else(|| format!("Rotation.Angle: expected a number, got {angle}"))?,
                None => 0.0,
            };
            (axis, angle)
        }
        Some(other) => return Err(format!("Rotation: expected {{Axis, Angle}}, got {other}")),
        None => ([0.0, 0.0, 1.0], 0.0),
    };
    Ok(PropertyValue::Placement { base, axis, angle })
}

fn link_target(value: &Value, context: &SetterContext<'_>) -> Result<String, String> {
    let Value::String(target) = value else {
        return Err(format!("expected an object name, got {value}"));
    };
    if target == context.owner {
        return Err("an object cannot link to itself".to_string());
    }
    if !(context.is_object)(target) {
        return Err(format!("no object named '{target}'"));
    }
    Ok(target.clone())
}

fn set_link(value: &Value, context: &SetterContext<'_>) -> Result<PropertyValue, String> {
    match value {
        Value::Null => Ok(PropertyValue::Link(None)),
        other => link_target(other, context).map(|target| PropertyValue::Link(Some(target))),
    }
}

fn set_link_list(value: &Value, context: &SetterContext<'_>) -> Result<PropertyValue, String> {
    let Value::Array(items) = value else {
        return Err(format!("expected a list of object names, got {value}"));
    };
    items
        .iter()
        .map(|item| link_target(item, context))
        .collect::<Result<Vec<_>, _>>()
        .map(PropertyValue::LinkList)
}
