use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A name/value pair owned by exactly one parent's parameter collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: i64,
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage discriminator of a parameter collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Host,
    Group,
    Domain,
    Os,
}

impl ParameterKind {
    /// Value of the `type` column for rows of this collection.
    pub fn type_name(self) -> &'static str {
        match self {
            ParameterKind::Host => "HostParameter",
            ParameterKind::Group => "GroupParameter",
            ParameterKind::Domain => "DomainParameter",
            ParameterKind::Os => "OsParameter",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// The closed set of entities that own parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKind {
    Host,
    Hostgroup,
    Domain,
    Operatingsystem,
}

impl ParentKind {
    pub const ALL: [ParentKind; 4] = [
        ParentKind::Host,
        ParentKind::Hostgroup,
        ParentKind::Domain,
        ParentKind::Operatingsystem,
    ];

    /// Parse the collection segment of a URL (`hosts`, `hostgroups`, ...).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.path_segment() == segment)
    }

    pub fn path_segment(self) -> &'static str {
        match self {
            ParentKind::Host => "hosts",
            ParentKind::Hostgroup => "hostgroups",
            ParentKind::Domain => "domains",
            ParentKind::Operatingsystem => "operatingsystems",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            ParentKind::Host => "host",
            ParentKind::Hostgroup => "hostgroup",
            ParentKind::Domain => "domain",
            ParentKind::Operatingsystem => "operatingsystem",
        }
    }

    /// SQLite table holding parents of this kind.
    pub fn table(self) -> &'static str {
        self.path_segment()
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

impl std::str::FromStr for ParentKind {
    type Err = String;

    /// Accepts either the singular or the plural form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.singular() == s || k.path_segment() == s)
            .ok_or_else(|| format!("Unknown parent kind: {s}"))
    }
}

/// A parent row: the narrow view the controller needs of hosts, hostgroups,
/// domains and operating systems.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentRecord {
    pub id: i64,
    pub name: String,
}

/// Caller-supplied attributes for create and update. Absent fields are left
/// untouched on update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterAttrs {
    pub name: Option<String>,
    pub value: Option<String>,
}

/// Request body for create and update: `{ "parameter": { ... } }`.
#[derive(Debug, Deserialize)]
pub struct ParameterRequest {
    pub parameter: ParameterAttrs,
}

/// Per-field validation messages, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// Human readable messages, e.g. `Name can't be blank`.
    pub fn full_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .flat_map(|(field, messages)| {
                messages
                    .iter()
                    .map(move |m| format!("{} {}", capitalize(field), m))
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Attribute-level checks that need no database access.
pub fn validate_attributes(name: &str, value: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if name.trim().is_empty() {
        errors.add("name", "can't be blank");
    } else if name.chars().any(char::is_whitespace) {
        errors.add("name", "can't contain white spaces");
    }

    if value.trim().is_empty() {
        errors.add("value", "can't be blank");
    }

    errors
}
