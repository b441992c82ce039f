//! Command model: the unit of work and the ordered batch request
//!
//! A [`Command`] is a SQL statement or stored procedure name together with
//! its bound parameters and the per-command policy the batch executor
//! applies when it runs. A [`Batch`] is an ordered list of commands; order is
//! significant because later commands may depend on the side effects of
//! earlier ones.

use serde::{Deserialize, Serialize};

use crate::Value;

/// How the text of a command is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandKind {
    /// Plain SQL text
    #[default]
    Text,
    /// Name of a stored procedure
    StoredProcedure,
}

/// Direction of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the database writes back into this parameter
    pub fn is_output(self) -> bool {
        matches!(
            self,
            ParameterDirection::Output | ParameterDirection::InputOutput
        )
    }
}

/// A named, typed parameter
///
/// The name may be empty for purely positional binding. A leading `@`, `:`
/// or `$` is accepted and kept as written; drivers resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Create an input parameter
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Create an unnamed input parameter bound by position
    pub fn positional(value: impl Into<Value>) -> Self {
        Self::new(String::new(), value)
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Name without any `@`, `:` or `$` prefix
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches(['@', ':', '$'])
    }

    pub fn is_named(&self) -> bool {
        !self.bare_name().is_empty()
    }
}

/// What the batch executor does when a command fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the containing chunk: roll it back and stop the batch
    #[default]
    Abort,
    /// Discard the failure; the command contributes zero rows
    Continue,
}

/// A single unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// SQL text or stored procedure name. Empty text is skipped by the
    /// batch executor without error.
    pub text: String,
    #[serde(default)]
    pub kind: CommandKind,
    /// Parameters in bind order
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Treat a successful execution affecting zero rows as a failure
    #[serde(default)]
    pub require_affected_rows: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Command {
    /// Create a SQL text command
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
            require_affected_rows: false,
            failure_policy: FailurePolicy::Abort,
        }
    }

    /// Create a stored procedure call
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::StoredProcedure,
            ..Self::text(name)
        }
    }

    /// Append a named input parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    /// Append a fully specified parameter
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn require_affected_rows(mut self) -> Self {
        self.require_affected_rows = true;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Shorthand for `with_failure_policy(FailurePolicy::Continue)`
    pub fn continue_on_error(self) -> Self {
        self.with_failure_policy(FailurePolicy::Continue)
    }

    /// Whether the batch executor skips this command
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// First 100 characters of the text, for logging
    pub fn preview(&self) -> String {
        self.text.chars().take(100).collect()
    }
}

/// An ordered list of commands submitted in one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn with(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl From<Vec<Command>> for Batch {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

impl FromIterator<Command> for Batch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
