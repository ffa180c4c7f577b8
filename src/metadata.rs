//! Static description of a command: its name, positional inputs and options.
//!
//! Metadata is declared once per command and never mutated in place. The
//! executor works on clones when it needs to rewrite defaults (see
//! [`crate::env_binding::apply_overrides`]).

use crate::validators::Validator;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

/// Visibility and maturity tags attached to commands and options.
///
/// Groups only drive help filtering; they never gate execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    Advanced,
    Beta,
    Deprecated,
    Experimental,
    Hidden,
}

/// Whether a command may run anywhere or only inside a project directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandScope {
    #[default]
    Global,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionKind {
    Boolean,
    #[default]
    String,
}

/// A parsed (or default) option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    String(String),
    /// A string option given more than once.
    List(Vec<String>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string value; for a repeated option this is the last occurrence.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            OptionValue::List(values) => values.last().map(String::as_str),
            OptionValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::String(s) => write!(f, "{s}"),
            OptionValue::List(values) => write!(f, "{}", values.join(",")),
        }
    }
}

/// A positional argument.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub summary: String,
    pub validators: Vec<Validator>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            validators: Vec::new(),
        }
    }

    /// Shorthand for adding [`Validator::Required`].
    pub fn required(self) -> Self {
        self.validator(Validator::Required)
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn is_required(&self) -> bool {
        self.validators.contains(&Validator::Required)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: String,
    pub summary: String,
    pub kind: OptionKind,
    pub default: Option<OptionValue>,
    /// Single-character aliases, used as `-x`.
    pub aliases: Vec<char>,
    pub groups: BTreeSet<Group>,
}

impl OptionSpec {
    /// A string-valued option without a default.
    pub fn string(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            kind: OptionKind::String,
            default: None,
            aliases: Vec::new(),
            groups: BTreeSet::new(),
        }
    }

    /// A boolean flag; absent flags parse as `false` unless a default says otherwise.
    pub fn boolean(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind: OptionKind::Boolean,
            ..Self::string(name, summary)
        }
    }

    /// Value used when the option is not given on the command line.
    pub fn default_value(mut self, value: OptionValue) -> Self {
        self.default = Some(value);
        self
    }

    /// String default, for [`OptionKind::String`] options.
    pub fn default_str(self, value: impl Into<String>) -> Self {
        self.default_value(OptionValue::String(value.into()))
    }

    /// Boolean default, for [`OptionKind::Boolean`] options.
    pub fn default_bool(self, value: bool) -> Self {
        self.default_value(OptionValue::Bool(value))
    }

    /// Accept `-<alias>` for this option.
    pub fn alias(mut self, alias: char) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Tag the option for help filtering.
    pub fn group(mut self, group: Group) -> Self {
        self.groups.insert(group);
        self
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == OptionKind::Boolean
    }
}

/// Construction-time defects in command declarations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("command name `{0}` must be a non-empty token without whitespace")]
    InvalidName(String),
    #[error("command `{command}` declares input `{input}` more than once")]
    DuplicateInput { command: String, input: String },
    #[error("command `{command}` declares option `{option}` more than once")]
    DuplicateOption { command: String, option: String },
    #[error("option `{option}` of command `{command}` has a default that does not match its type")]
    DefaultTypeMismatch { command: String, option: String },
    #[error("option `{option}` of command `{command}` shadows a global option")]
    GlobalOptionCollision { command: String, option: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandMetadata {
    pub name: String,
    pub summary: String,
    pub description: Option<String>,
    pub inputs: Vec<InputSpec>,
    pub options: Vec<OptionSpec>,
    pub groups: BTreeSet<Group>,
    pub scope: CommandScope,
}

impl CommandMetadata {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            description: None,
            inputs: Vec::new(),
            options: Vec::new(),
            groups: BTreeSet::new(),
            scope: CommandScope::Global,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a positional input; inputs bind in declaration order.
    pub fn input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    /// Declare an option.
    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.insert(group);
        self
    }

    /// Only allow running inside a project directory.
    pub fn project_scoped(mut self) -> Self {
        self.scope = CommandScope::Project;
        self
    }

    pub fn find_option(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Check the declaration invariants: a bare-token name, unique input and
    /// option names, and defaults that match their option type.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.is_empty() || self.name.contains(char::is_whitespace) {
            return Err(MetadataError::InvalidName(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(MetadataError::DuplicateInput {
                    command: self.name.clone(),
                    input: input.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.name.as_str()) {
                return Err(MetadataError::DuplicateOption {
                    command: self.name.clone(),
                    option: option.name.clone(),
                });
            }
            let matches = match (&option.kind, &option.default) {
                (_, None) => true,
                (OptionKind::Boolean, Some(OptionValue::Bool(_))) => true,
                (OptionKind::String, Some(OptionValue::String(_))) => true,
                _ => false,
            };
            if !matches {
                return Err(MetadataError::DefaultTypeMismatch {
                    command: self.name.clone(),
                    option: option.name.clone(),
                });
            }
        }

        Ok(())
    }
}
