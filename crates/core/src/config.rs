//! Configuration contract between a layer and its host
//!
//! A layer declares the parameters it understands on a
//! [`ConfigurationRegistrar`] while it initializes. The host then checks raw
//! `name -> [value]` items against that registry, fills in defaults, and hands
//! the layer a typed [`ConfigurationUpdate`].
//!
//! Names the layer never declared are passed through as text rather than
//! rejected, so a newer platform description still loads against an older
//! layer. Layers are expected to skip names they do not know.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw configuration as read from a platform description or command line.
pub type RawConfiguration = Vec<(String, Vec<String>)>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("parameter '{0}' declared more than once")]
    DuplicateParameter(String),

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("parameter '{name}' takes {min}..={max} values, got {got}")]
    Cardinality {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("parameter '{name}': cannot parse '{value}' as {kind}")]
    InvalidValue {
        name: String,
        value: String,
        kind: ValueKind,
    },

    #[error("parameter '{name}' holds a {actual} value, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("parameter '{name}': {reason}")]
    Rejected { name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Text,
    UInt16,
}

impl ValueKind {
    fn parse(self, name: &str, raw: &str) -> Result<ConfigValue, ConfigError> {
        match self {
            ValueKind::Text => Ok(ConfigValue::Text(raw.to_owned())),
            ValueKind::UInt16 => raw
                .trim()
                .parse::<u16>()
                .map(ConfigValue::UInt16)
                .map_err(|_| ConfigError::InvalidValue {
                    name: name.to_owned(),
                    value: raw.to_owned(),
                    kind: self,
                }),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Text => write!(f, "text"),
            ValueKind::UInt16 => write!(f, "uint16"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    Text(String),
    UInt16(u16),
}

impl ConfigValue {
    pub fn text(value: impl Into<String>) -> Self {
        ConfigValue::Text(value.into())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Text(_) => ValueKind::Text,
            ConfigValue::UInt16(_) => ValueKind::UInt16,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            ConfigValue::UInt16(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Text(value) => write!(f, "{}", value),
            ConfigValue::UInt16(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Default(Vec<ConfigValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ValueKind,
    pub min_occurs: usize,
    pub max_occurs: usize,
    pub requirement: Requirement,
    pub description: String,
}

impl ParameterSpec {
    fn check_occurs(&self, got: usize) -> Result<(), ConfigError> {
        if (self.min_occurs..=self.max_occurs).contains(&got) {
            Ok(())
        } else {
            Err(ConfigError::Cardinality {
                name: self.name.clone(),
                min: self.min_occurs,
                max: self.max_occurs,
                got,
            })
        }
    }
}

/// Registry of the parameters one layer accepts.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationRegistrar {
    parameters: BTreeMap<String, ParameterSpec>,
}

impl ConfigurationRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a single-valued text parameter.
    pub fn register_non_numeric(
        &mut self,
        name: &str,
        requirement: Requirement,
        description: &str,
    ) -> Result<(), ConfigError> {
        self.register(name, ValueKind::Text, requirement, description)
    }

    /// Declare a single-valued unsigned 16-bit parameter.
    pub fn register_numeric_u16(
        &mut self,
        name: &str,
        requirement: Requirement,
        description: &str,
    ) -> Result<(), ConfigError> {
        self.register(name, ValueKind::UInt16, requirement, description)
    }

    fn register(
        &mut self,
        name: &str,
        kind: ValueKind,
        requirement: Requirement,
        description: &str,
    ) -> Result<(), ConfigError> {
        if self.parameters.contains_key(name) {
            return Err(ConfigError::DuplicateParameter(name.to_owned()));
        }

        if let Requirement::Default(values) = &requirement {
            if let Some(bad) = values.iter().find(|value| value.kind() != kind) {
                return Err(ConfigError::TypeMismatch {
                    name: name.to_owned(),
                    expected: kind,
                    actual: bad.kind(),
                });
            }
        }

        self.parameters.insert(
            name.to_owned(),
            ParameterSpec {
                name: name.to_owned(),
                kind,
                min_occurs: 1,
                max_occurs: 1,
                requirement,
                description: description.to_owned(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.values()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Turn raw items into a typed update, applying defaults for anything
    /// declared but not supplied.
    pub fn validate(
        &self,
        raw: &[(String, Vec<String>)],
    ) -> Result<ConfigurationUpdate, ConfigError> {
        let mut update = ConfigurationUpdate::new();
        let mut supplied = BTreeSet::new();

        for (name, values) in raw {
            match self.parameters.get(name) {
                Some(spec) => {
                    spec.check_occurs(values.len())?;
                    let parsed = values
                        .iter()
                        .map(|value| spec.kind.parse(name, value))
                        .collect::<Result<Vec<_>, _>>()?;
                    update.push(name.clone(), parsed);
                    supplied.insert(name.as_str());
                }
                None => {
                    debug!("passing through undeclared parameter '{}'", name);
                    update.push(
                        name.clone(),
                        values.iter().cloned().map(ConfigValue::Text).collect(),
                    );
                }
            }
        }

        for spec in self.parameters.values() {
            if supplied.contains(spec.name.as_str()) {
                continue;
            }
            match &spec.requirement {
                Requirement::Required => {
                    return Err(ConfigError::MissingParameter(spec.name.clone()));
                }
                Requirement::Default(values) => {
                    update.push(spec.name.clone(), values.clone());
                }
            }
        }

        Ok(update)
    }
}

/// Typed configuration delivered to a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationUpdate {
    entries: Vec<(String, Vec<ConfigValue>)>,
}

impl ConfigurationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = ConfigValue>,
    ) -> Self {
        self.push(name.into(), values.into_iter().collect());
        self
    }

    pub fn push(&mut self, name: String, values: Vec<ConfigValue>) {
        self.entries.push((name, values));
    }

    /// Values of the last entry called `name`.
    pub fn get(&self, name: &str) -> Option<&[ConfigValue]> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| entry == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ConfigValue])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
