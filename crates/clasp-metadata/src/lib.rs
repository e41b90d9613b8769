//! Declaration data model for clasp commands.
//!
//! These types describe *what* a command accepts: its names, its named options
//! and its positional values. They carry no parsing logic. They are produced by
//! `#[derive(clasp::Command)]`, by the fluent builders in this crate, or by
//! deserializing JSON, and are consumed once when `clasp` builds its command
//! tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar kind of an option or positional slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Bool,
    Int,
    UInt,
    Float,
    #[default]
    Str,
    /// One of a fixed set of names, matched case-insensitively.
    Enum(Vec<String>),
}

impl ValueKind {
    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Bool => "a boolean".to_string(),
            Self::Int => "an integer".to_string(),
            Self::UInt => "a non-negative integer".to_string(),
            Self::Float => "a number".to_string(),
            Self::Str => "a string".to_string(),
            Self::Enum(choices) => format!("one of: {}", choices.join(", ")),
        }
    }
}

/// A typed value.
///
/// Used for declared defaults and for every value the binder writes into a
/// parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Enum(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) | Self::Enum(v) => f.write_str(v),
            Self::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Per-command parser settings. `None` inherits from the parent command and
/// finally from the application options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ParserOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_unknown_options: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_additional_values: Option<bool>,
}

impl ParserOverrides {
    pub fn is_empty(&self) -> bool {
        self.ignore_unknown_options.is_none() && self.ignore_additional_values.is_none()
    }
}

/// A named option (`--output`, `-o`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct OptionMeta {
    /// Slot on the parameter object the option writes to.
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub long: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short: Vec<char>,
    #[serde(default)]
    pub kind: ValueKind,
    /// Repeated occurrences accumulate instead of overwriting.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default)]
    pub help_order: i32,
    #[serde(default)]
    pub hidden: bool,
}

/// A positional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ValueMeta {
    pub target: String,
    /// Display name (`<SOURCE>` in usage lines).
    pub name: String,
    pub order: i32,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
}

/// Everything declared about one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CommandMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub help_order: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "ParserOverrides::is_empty")]
    pub overrides: ParserOverrides,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValueMeta>,
}

impl CommandMeta {
    /// Parse a declaration from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Encode the declaration as pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Create a command metadata builder.
///
/// # Example
///
/// ```
/// use clasp_metadata::{ValueKind, meta, option, value};
///
/// let build = meta("build")
///     .alias("b")
///     .help("Compile sources")
///     .option(option("output").long("output").short('o').required())
///     .option(option("jobs").short('j').kind(ValueKind::UInt).default_value(4u64))
///     .value(value("source").required())
///     .build();
/// assert_eq!(build.aliases, vec!["b".to_string()]);
/// assert_eq!(build.options.len(), 2);
/// ```
pub fn meta(name: impl Into<String>) -> MetaBuilder {
    MetaBuilder::new(name)
}

/// Create an option builder for the slot `target`.
pub fn option(target: impl Into<String>) -> OptionBuilder {
    OptionBuilder::new(target)
}

/// Create a positional value builder for the slot `target`.
pub fn value(target: impl Into<String>) -> ValueBuilder {
    ValueBuilder::new(target)
}

/// Builder for `CommandMeta`.
#[derive(Default)]
pub struct MetaBuilder {
    meta: CommandMeta,
    next_order: i32,
}

impl MetaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: CommandMeta {
                name: name.into(),
                ..Default::default()
            },
            next_order: 0,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.meta.aliases.push(alias.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.meta.help = help.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.meta.hidden = true;
        self
    }

    pub fn default_command(mut self) -> Self {
        self.meta.is_default = true;
        self
    }

    pub fn help_order(mut self, order: i32) -> Self {
        self.meta.help_order = order;
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.meta.examples.push(example.into());
        self
    }

    pub fn ignore_unknown_options(mut self, ignore: bool) -> Self {
        self.meta.overrides.ignore_unknown_options = Some(ignore);
        self
    }

    pub fn ignore_additional_values(mut self, ignore: bool) -> Self {
        self.meta.overrides.ignore_additional_values = Some(ignore);
        self
    }

    pub fn option(mut self, option: OptionBuilder) -> Self {
        self.meta.options.push(option.build());
        self
    }

    /// Add a positional value. Without an explicit `order`, values take
    /// consecutive orders in the sequence they are added.
    pub fn value(mut self, value: ValueBuilder) -> Self {
        let order = value.order.unwrap_or(self.next_order);
        self.next_order = order + 1;
        self.meta.values.push(value.build(order));
        self
    }

    pub fn build(self) -> CommandMeta {
        self.meta
    }
}

/// Builder for `OptionMeta`.
#[derive(Default)]
pub struct OptionBuilder {
    meta: OptionMeta,
}

impl OptionBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            meta: OptionMeta {
                target: target.into(),
                ..Default::default()
            },
        }
    }

    /// Add a long name. Leading dashes are stripped.
    pub fn long(mut self, long: impl Into<String>) -> Self {
        let long = long.into();
        self.meta.long.push(long.trim().trim_start_matches('-').to_string());
        self
    }

    pub fn short(mut self, short: char) -> Self {
        self.meta.short.push(short);
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.meta.kind = kind;
        self
    }

    /// Shorthand for a boolean flag.
    pub fn flag(self) -> Self {
        self.kind(ValueKind::Bool)
    }

    pub fn multiple(mut self) -> Self {
        self.meta.multiple = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.meta.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.meta.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.meta.help = help.into();
        self
    }

    pub fn help_order(mut self, order: i32) -> Self {
        self.meta.help_order = order;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.meta.hidden = true;
        self
    }

    pub fn build(self) -> OptionMeta {
        self.meta
    }
}

/// Builder for `ValueMeta`.
#[derive(Default)]
pub struct ValueBuilder {
    meta: ValueMeta,
    order: Option<i32>,
}

impl ValueBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            meta: ValueMeta {
                name: target.clone(),
                target,
                ..Default::default()
            },
            order: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.meta.kind = kind;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.meta.multiple = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.meta.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.meta.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.meta.help = help.into();
        self
    }

    pub fn build(mut self, order: i32) -> ValueMeta {
        self.meta.order = self.order.unwrap_or(order);
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_consecutive_value_orders() {
        let m = meta("copy")
            .value(value("from").required())
            .value(value("to").required())
            .value(value("rest").order(10).multiple())
            .value(value("after"))
            .build();
        let orders: Vec<i32> = m.values.iter().map(|v| v.order).collect();
        assert_eq!(orders, vec![0, 1, 10, 11]);
    }

    #[test]
    fn long_names_are_stored_without_dashes() {
        let o = option("output").long("--output").long("out").build();
        assert_eq!(o.long, vec!["output".to_string(), "out".to_string()]);
    }

    #[test]
    fn json_round_trip_keeps_typed_defaults() {
        let m = meta("serve")
            .ignore_unknown_options(true)
            .option(option("port").long("port").kind(ValueKind::UInt).default_value(8080u64))
            .build();
        let text = m.to_json();
        assert!(text.contains("\"ignore-unknown-options\": true"));
        let back = CommandMeta::from_json(&text).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.options[0].default, Some(Value::UInt(8080)));
    }

    #[test]
    fn json_declaration_uses_kebab_case_defaults() {
        let m = CommandMeta::from_json(
            r#"{
                "name": "clean",
                "is-default": true,
                "options": [{ "target": "all", "long": ["all"], "kind": "bool" }]
            }"#,
        )
        .unwrap();
        assert!(m.is_default);
        assert_eq!(m.options[0].kind, ValueKind::Bool);
        assert!(!m.options[0].required);
    }

    #[test]
    fn list_values_display_comma_separated() {
        let v = Value::List(vec![Value::from("a"), Value::UInt(2)]);
        assert_eq!(v.to_string(), "a, 2");
    }
}
