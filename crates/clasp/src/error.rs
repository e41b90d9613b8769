use std::path::PathBuf;

use thiserror::Error;

use crate::model::{CommandTree, NodeId};

/// Closed set of user-input problems a single run can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CliErrorKind {
    VersionRequested,
    HelpRequested,
    MissingRequiredOption,
    MissingRequiredValue,
    UnknownOption,
    UnknownCommand,
    MissingOptionValue,
    BadOptionValue,
    /// Positional counterpart of `BadOptionValue`.
    BadValue,
    /// Surplus positional token with no value slot left to bind it.
    UnexpectedValue,
}

impl CliErrorKind {
    /// Terminal kinds stop matching and skip validation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::UnknownCommand | Self::HelpRequested | Self::VersionRequested
        )
    }

    /// Help and version requests are not failures.
    pub fn is_informational(self) -> bool {
        matches!(self, Self::HelpRequested | Self::VersionRequested)
    }
}

/// One user-input problem. Pure data; references into the command tree are
/// indices so errors can outlive the borrow of the tree that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub kind: CliErrorKind,
    pub command: Option<NodeId>,
    /// Index into the affected command's options.
    pub option: Option<usize>,
    /// Index into the affected command's values (ascending order).
    pub value: Option<usize>,
    /// The offending token, when there is one.
    pub token: Option<String>,
    pub message: Option<String>,
}

impl CliError {
    pub fn new(kind: CliErrorKind) -> Self {
        Self {
            kind,
            command: None,
            option: None,
            value: None,
            token: None,
            message: None,
        }
    }

    pub fn on_command(mut self, node: NodeId) -> Self {
        self.command = Some(node);
        self
    }

    pub fn on_option(mut self, node: NodeId, index: usize) -> Self {
        self.command = Some(node);
        self.option = Some(index);
        self
    }

    pub fn on_value(mut self, node: NodeId, index: usize) -> Self {
        self.command = Some(node);
        self.value = Some(index);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// One-line description suitable for a diagnostic.
    pub fn describe(&self, tree: &CommandTree) -> String {
        let node = self.command.map(|id| tree.node(id));
        let command = node
            .map(|n| tree.path(n.id()).join(" "))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| tree.root().name().to_string());
        let option = node
            .zip(self.option)
            .and_then(|(n, idx)| n.options().get(idx))
            .map(|o| o.display_name());
        let value = node
            .zip(self.value)
            .and_then(|(n, idx)| n.values().get(idx))
            .map(|v| format!("<{}>", v.name()));
        let token = self.token.as_deref().unwrap_or_default();

        let mut out = match self.kind {
            CliErrorKind::VersionRequested => format!("version requested for '{command}'"),
            CliErrorKind::HelpRequested => format!("help requested for '{command}'"),
            CliErrorKind::MissingRequiredOption => format!(
                "missing required option '{}' on command '{command}'",
                option.unwrap_or_default()
            ),
            CliErrorKind::MissingRequiredValue => format!(
                "missing required value {} on command '{command}'",
                value.unwrap_or_default()
            ),
            CliErrorKind::UnknownOption => format!("unknown option '{token}'"),
            CliErrorKind::UnknownCommand => format!("unknown command '{token}'"),
            CliErrorKind::MissingOptionValue => format!(
                "option '{}' requires a value",
                option.unwrap_or_else(|| token.to_string())
            ),
            CliErrorKind::BadOptionValue => format!(
                "invalid value '{token}' for option '{}'",
                option.unwrap_or_default()
            ),
            CliErrorKind::BadValue => format!(
                "invalid value '{token}' for {}",
                value.unwrap_or_default()
            ),
            CliErrorKind::UnexpectedValue => format!("unexpected value '{token}'"),
        };
        if let Some(message) = &self.message {
            out.push_str(": ");
            out.push_str(message);
        }
        out
    }
}

/// Programmer errors found while building the command tree. These prevent the
/// application from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("command name cannot be empty")]
    EmptyName,
    #[error("alias '{alias}' is used by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    #[error("command '{command}' declares option name '{name}' twice")]
    DuplicateOption { command: String, name: String },
    #[error("option '{target}' on command '{command}' has neither a long nor a short name")]
    OptionWithoutName { command: String, target: String },
    #[error("command '{command}' declares value order {order} twice")]
    DuplicateValueOrder { command: String, order: i32 },
    #[error("required value '{value}' on command '{command}' follows an optional value")]
    RequiredValueAfterOptional { command: String, value: String },
    #[error("collection value '{value}' on command '{command}' must be the last value")]
    MultipleValueNotLast { command: String, value: String },
    #[error("'{parent}' has more than one default command ('{first}', '{second}')")]
    MultipleDefaults {
        parent: String,
        first: String,
        second: String,
    },
    #[error("parent of command '{command}' is not registered")]
    UnknownParent { command: String },
    #[error("command '{command}' is its own ancestor")]
    ParentCycle { command: String },
    #[error("command '{command}' has no sub-commands and no executor")]
    MissingExecutor { command: String },
    #[error("invalid default for '{target}' on command '{command}': {reason}")]
    InvalidDefault {
        command: String,
        target: String,
        reason: String,
    },
}

/// Failure to load [`ApplicationOptions`](crate::ApplicationOptions) from JSON.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read application options from {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse application options: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to write a converted value into a parameter object slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("no slot named '{0}'")]
    UnknownTarget(String),
    #[error("expected {expected}, found '{found}'")]
    TypeMismatch { expected: String, found: String },
    #[error("{value} does not fit in {ty}")]
    OutOfRange { value: String, ty: &'static str },
    #[error("unknown variant '{0}'")]
    UnknownVariant(String),
}
