//! Configurations and the search spaces they are drawn from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of the categorical space used to pick a tool.
pub const TOOL_PICK_SPACE: &str = "tool-pick";
/// Parameter holding the picked tool name inside [`TOOL_PICK_SPACE`].
pub const TOOL_PICK_PARAM: &str = "tool";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            // Bit equality keeps Eq and Hash consistent for floats.
            (ParamValue::Float(a), ParamValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ParamValue::Str(a), ParamValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ParamValue::Bool(v) => v.hash(state),
            ParamValue::Int(v) => v.hash(state),
            ParamValue::Float(v) => v.to_bits().hash(state),
            ParamValue::Str(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

/// Immutable parameter assignment tagged with the space it belongs to.
///
/// Equality and hashing are structural over the space name and every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    space: String,
    values: BTreeMap<String, ParamValue>,
}

impl Configuration {
    pub fn new(space: impl Into<String>, values: BTreeMap<String, ParamValue>) -> Self {
        Self {
            space: space.into(),
            values,
        }
    }

    pub fn empty(space: impl Into<String>) -> Self {
        Self::new(space, BTreeMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.space)?;
        for (idx, (key, value)) in self.values.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamDomain {
    Categorical { choices: Vec<ParamValue> },
    Integer { low: i64, high: i64 },
    Float { low: f64, high: f64 },
    Bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub domain: ParamDomain,
    pub default: ParamValue,
}

impl Param {
    fn sample(&self, rng: &mut fastrand::Rng) -> ParamValue {
        match &self.domain {
            ParamDomain::Categorical { choices } if !choices.is_empty() => {
                choices[rng.usize(..choices.len())].clone()
            }
            ParamDomain::Categorical { .. } => self.default.clone(),
            ParamDomain::Integer { low, high } => ParamValue::Int(rng.i64(*low..=*high)),
            ParamDomain::Float { low, high } => ParamValue::Float(low + rng.f64() * (high - low)),
            ParamDomain::Bool => ParamValue::Bool(rng.bool()),
        }
    }
}

/// Named, ordered collection of tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub name: String,
    pub params: Vec<Param>,
}

impl SearchSpace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Single categorical parameter whose values are tool names.
    pub fn tool_pick(tools: &[String]) -> Self {
        let choices: Vec<ParamValue> = tools.iter().map(|t| ParamValue::Str(t.clone())).collect();
        let default = choices
            .first()
            .cloned()
            .unwrap_or_else(|| ParamValue::Str(String::new()));
        Self::new(TOOL_PICK_SPACE).categorical(TOOL_PICK_PARAM, choices, default)
    }

    pub fn categorical(
        mut self,
        name: impl Into<String>,
        choices: Vec<ParamValue>,
        default: impl Into<ParamValue>,
    ) -> Self {
        self.params.push(Param {
            name: name.into(),
            domain: ParamDomain::Categorical { choices },
            default: default.into(),
        });
        self
    }

    pub fn integer(mut self, name: impl Into<String>, low: i64, high: i64, default: i64) -> Self {
        self.params.push(Param {
            name: name.into(),
            domain: ParamDomain::Integer { low, high },
            default: ParamValue::Int(default),
        });
        self
    }

    pub fn float(mut self, name: impl Into<String>, low: f64, high: f64, default: f64) -> Self {
        self.params.push(Param {
            name: name.into(),
            domain: ParamDomain::Float { low, high },
            default: ParamValue::Float(default),
        });
        self
    }

    pub fn boolean(mut self, name: impl Into<String>, default: bool) -> Self {
        self.params.push(Param {
            name: name.into(),
            domain: ParamDomain::Bool,
            default: ParamValue::Bool(default),
        });
        self
    }

    pub fn default_configuration(&self) -> Configuration {
        let values = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        Configuration::new(self.name.clone(), values)
    }

    pub fn sample(&self, rng: &mut fastrand::Rng) -> Configuration {
        let values = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect();
        Configuration::new(self.name.clone(), values)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
