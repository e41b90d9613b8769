//! Converts routed tokens into typed values and writes them into a fresh
//! parameter object.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::command::ParameterObject;
use crate::error::{CliError, CliErrorKind};
use crate::model::CommandNode;
use crate::value::{Value, convert};

/// A parameter object populated for one run, plus a record of what was
/// bound. Created by the matcher, read by validators, consumed by the
/// executor.
pub struct BoundParameters {
    object: Box<dyn ParameterObject>,
    values: IndexMap<String, Value>,
    provided: HashSet<String>,
}

impl std::fmt::Debug for BoundParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundParameters")
            .field("values", &self.values)
            .field("provided", &self.provided)
            .finish_non_exhaustive()
    }
}

impl BoundParameters {
    pub(crate) fn new(node: &CommandNode) -> Self {
        Self {
            object: (node.factory)(),
            values: IndexMap::new(),
            provided: HashSet::new(),
        }
    }

    /// Value currently held by the slot `target`, including applied defaults.
    /// Collection slots hold a `Value::List`.
    pub fn get(&self, target: &str) -> Option<&Value> {
        self.values.get(target)
    }

    /// Whether argv mentioned the slot, successfully converted or not.
    pub fn is_provided(&self, target: &str) -> bool {
        self.provided.contains(target)
    }

    /// Bound slots in the order they were first written.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The typed parameter object, if it is a `P`.
    pub fn downcast_ref<P: 'static>(&self) -> Option<&P> {
        self.object.as_any().downcast_ref::<P>()
    }

    pub(crate) fn into_object(self) -> Box<dyn ParameterObject> {
        self.object
    }

    fn write(&mut self, target: &str, value: Value, multiple: bool) -> Result<(), String> {
        self.object
            .set(target, value.clone())
            .map_err(|e| e.to_string())?;
        if multiple {
            match self.values.entry(target.to_string()).or_insert(Value::List(Vec::new())) {
                Value::List(items) => items.push(value),
                other => *other = Value::List(vec![value]),
            }
        } else {
            self.values.insert(target.to_string(), value);
        }
        Ok(())
    }

    fn write_default(&mut self, target: &str, default: &Value, multiple: bool) {
        let items = match default {
            Value::List(items) => items.clone(),
            single => vec![single.clone()],
        };
        for item in items {
            if let Err(reason) = self.write(target, item, multiple) {
                tracing::warn!(slot = target, %reason, "declared default could not be applied");
            }
        }
    }
}

/// Outcome of routing a positional token.
#[derive(Debug)]
pub(crate) enum Positional {
    Bound,
    Invalid(CliError),
    /// Every value slot is already filled.
    NoSlot,
}

pub(crate) struct Binder<'t> {
    node: &'t CommandNode,
    params: BoundParameters,
    next_value: usize,
}

impl<'t> Binder<'t> {
    pub(crate) fn new(node: &'t CommandNode) -> Self {
        Self {
            node,
            params: BoundParameters::new(node),
            next_value: 0,
        }
    }

    /// Record that option `index` was mentioned even though nothing could be
    /// bound to it.
    pub(crate) fn mark_provided(&mut self, index: usize) {
        let spec = &self.node.options()[index];
        self.params.provided.insert(spec.target().to_string());
    }

    /// Bind one occurrence of option `index`. `raw` is `None` for a bare flag.
    pub(crate) fn bind_option(&mut self, index: usize, raw: Option<&str>) -> Result<(), CliError> {
        let node = self.node;
        let spec = &node.options()[index];
        self.params.provided.insert(spec.target().to_string());

        let value = match raw {
            None => Value::Bool(true),
            Some(raw) => convert(spec.kind(), raw).map_err(|reason| {
                CliError::new(CliErrorKind::BadOptionValue)
                    .on_option(node.id(), index)
                    .with_token(raw)
                    .with_message(reason)
            })?,
        };
        self.params
            .write(spec.target(), value, spec.is_multiple())
            .map_err(|reason| {
                CliError::new(CliErrorKind::BadOptionValue)
                    .on_option(node.id(), index)
                    .with_token(raw.unwrap_or("true"))
                    .with_message(reason)
            })
    }

    /// Bind a positional token to the next unfilled value slot. A collection
    /// slot keeps absorbing tokens.
    pub(crate) fn bind_positional(&mut self, raw: &str) -> Positional {
        let node = self.node;
        let Some(spec) = node.values().get(self.next_value) else {
            return Positional::NoSlot;
        };
        let index = self.next_value;
        if !spec.is_multiple() {
            self.next_value += 1;
        }
        self.params.provided.insert(spec.target().to_string());

        let bad = |reason: String| {
            Positional::Invalid(
                CliError::new(CliErrorKind::BadValue)
                    .on_value(node.id(), index)
                    .with_token(raw)
                    .with_message(reason),
            )
        };
        let value = match convert(spec.kind(), raw) {
            Ok(v) => v,
            Err(reason) => return bad(reason),
        };
        match self.params.write(spec.target(), value, spec.is_multiple()) {
            Ok(()) => Positional::Bound,
            Err(reason) => bad(reason),
        }
    }

    /// Apply declared defaults to every slot argv never mentioned.
    pub(crate) fn finish(mut self) -> BoundParameters {
        let node = self.node;
        for spec in node.options() {
            if let Some(default) = spec.default_value() {
                if !self.params.provided.contains(spec.target()) {
                    self.params.write_default(spec.target(), default, spec.is_multiple());
                }
            }
        }
        for spec in node.values() {
            if let Some(default) = spec.default_value() {
                if !self.params.provided.contains(spec.target()) {
                    self.params.write_default(spec.target(), default, spec.is_multiple());
                }
            }
        }
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;
    use crate::model::CommandTree;
    use crate::{Application, ApplicationOptions};

    #[derive(Debug, Default, Command)]
    #[command(name = "copy")]
    struct CopyFiles {
        #[option(long = "retries", default = 3)]
        retries: u8,
        #[option(long = "tag", short = 't')]
        tags: Vec<String>,
        #[option(long = "force")]
        force: bool,
        #[value(required)]
        from: String,
        #[value]
        to: Vec<String>,
    }

    fn tree() -> Application {
        Application::builder(ApplicationOptions::new("tool"))
            .command::<CopyFiles>(|r| r.execute_fn(|_| 0))
            .build()
            .unwrap()
    }

    fn node(tree: &CommandTree) -> &CommandNode {
        tree.node(tree.node_for::<CopyFiles>().unwrap())
    }

    #[test]
    fn repeated_options_accumulate_in_order() {
        let app = tree();
        let mut binder = Binder::new(node(app.tree()));
        binder.bind_option(1, Some("a")).unwrap();
        binder.bind_option(1, Some("b")).unwrap();
        let bound = binder.finish();
        let copy = bound.downcast_ref::<CopyFiles>().unwrap();
        assert_eq!(copy.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            bound.get("tags"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
    }

    #[test]
    fn defaults_apply_only_to_unmentioned_slots() {
        let app = tree();
        let bound = Binder::new(node(app.tree())).finish();
        assert_eq!(bound.downcast_ref::<CopyFiles>().unwrap().retries, 3);
        assert!(!bound.is_provided("retries"));

        let mut binder = Binder::new(node(app.tree()));
        binder.bind_option(0, Some("9")).unwrap();
        let bound = binder.finish();
        assert_eq!(bound.downcast_ref::<CopyFiles>().unwrap().retries, 9);
    }

    #[test]
    fn conversion_and_range_failures_are_bad_option_values() {
        let app = tree();
        let mut binder = Binder::new(node(app.tree()));
        let err = binder.bind_option(0, Some("lots")).unwrap_err();
        assert_eq!(err.kind, CliErrorKind::BadOptionValue);
        assert_eq!(err.option, Some(0));
        assert_eq!(err.token.as_deref(), Some("lots"));

        let err = binder.bind_option(0, Some("300")).unwrap_err();
        assert_eq!(err.kind, CliErrorKind::BadOptionValue);
        assert!(err.message.unwrap().contains("u8"));

        // Mentioned, so the default is not applied over the failure.
        let bound = binder.finish();
        assert!(bound.is_provided("retries"));
        assert_eq!(bound.downcast_ref::<CopyFiles>().unwrap().retries, 0);
    }

    #[test]
    fn mentioned_option_without_value_skips_its_default() {
        let app = tree();
        let mut binder = Binder::new(node(app.tree()));
        binder.mark_provided(0);
        let bound = binder.finish();
        assert!(bound.is_provided("retries"));
        assert_eq!(bound.get("retries"), None);
    }

    #[test]
    fn flags_bind_true_without_a_value() {
        let app = tree();
        let mut binder = Binder::new(node(app.tree()));
        binder.bind_option(2, None).unwrap();
        binder.bind_option(2, Some("false")).unwrap();
        let bound = binder.finish();
        assert!(!bound.downcast_ref::<CopyFiles>().unwrap().force);
    }

    #[test]
    fn positionals_fill_slots_and_the_collection_absorbs_the_rest() {
        let app = tree();
        let mut binder = Binder::new(node(app.tree()));
        for raw in ["src", "a", "b", "c"] {
            assert!(matches!(binder.bind_positional(raw), Positional::Bound));
        }
        let bound = binder.finish();
        let copy = bound.downcast_ref::<CopyFiles>().unwrap();
        assert_eq!(copy.from, "src");
        assert_eq!(copy.to, vec!["a", "b", "c"]);
    }
}
