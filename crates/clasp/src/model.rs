//! In-memory command tree.
//!
//! Built once from registrations and read-only afterwards. Nodes live in an
//! arena and refer to each other by [`NodeId`], so a node's parent link never
//! keeps anything alive.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use clasp_metadata::{CommandMeta, OptionMeta, ParserOverrides, ValueMeta};

use crate::command::{Factory, NoParameters, factory};
use crate::error::ConfigError;
use crate::executor::{ErrorHandler, Executor};
use crate::options::ApplicationOptions;
use crate::validate::Validator;
use crate::value::{Value, ValueKind, coerce};

/// Handle of a node inside a [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// One bindable named option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    target: String,
    long: Vec<String>,
    short: Vec<char>,
    kind: ValueKind,
    multiple: bool,
    required: bool,
    default: Option<Value>,
    help: String,
    help_order: i32,
    hidden: bool,
}

impl OptionSpec {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn long_names(&self) -> &[String] {
        &self.long
    }

    pub fn short_names(&self) -> &[char] {
        &self.short
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn help_order(&self) -> i32 {
        self.help_order
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Boolean options are flags; every other kind needs a value.
    pub fn takes_value(&self) -> bool {
        self.kind != ValueKind::Bool
    }

    /// Canonical display name: the first long name, else the first short one.
    pub fn display_name(&self) -> String {
        match (self.long.first(), self.short.first()) {
            (Some(long), _) => format!("--{long}"),
            (None, Some(short)) => format!("-{short}"),
            (None, None) => self.target.clone(),
        }
    }

    pub fn matches_long(&self, name: &str) -> bool {
        self.long.iter().any(|l| l.eq_ignore_ascii_case(name))
    }

    pub fn matches_short(&self, c: char) -> bool {
        self.short.contains(&c)
    }
}

/// One bindable positional value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    target: String,
    name: String,
    order: i32,
    kind: ValueKind,
    multiple: bool,
    required: bool,
    default: Option<Value>,
    help: String,
}

impl ValueSpec {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn help(&self) -> &str {
        &self.help
    }
}

/// One command definition.
pub struct CommandNode {
    id: NodeId,
    aliases: Vec<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    options: Vec<OptionSpec>,
    values: Vec<ValueSpec>,
    is_default: bool,
    hidden: bool,
    help_order: i32,
    help: String,
    description: String,
    examples: Vec<String>,
    overrides: ParserOverrides,
    type_id: TypeId,
    pub(crate) factory: Factory,
    pub(crate) executor: Option<Executor>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) validators: Vec<Arc<dyn Validator>>,
}

impl std::fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandNode")
            .field("id", &self.id)
            .field("aliases", &self.aliases)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("options", &self.options)
            .field("values", &self.values)
            .field("is_default", &self.is_default)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl CommandNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.aliases[0]
    }

    /// All names the command answers to; the primary name comes first.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    /// Positional values in ascending binding order.
    pub fn values(&self) -> &[ValueSpec] {
        &self.values
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn help_order(&self) -> i32 {
        self.help_order
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    pub fn overrides(&self) -> ParserOverrides {
        self.overrides
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    pub fn answers_to(&self, token: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(token))
    }

    pub fn find_long(&self, name: &str) -> Option<usize> {
        self.options.iter().position(|o| o.matches_long(name))
    }

    pub fn find_short(&self, c: char) -> Option<usize> {
        self.options.iter().position(|o| o.matches_short(c))
    }
}

/// Type-erased registration of one command type.
pub(crate) struct NodeSource {
    pub type_id: TypeId,
    pub parent: Option<TypeId>,
    pub meta: CommandMeta,
    pub factory: Factory,
    pub executor: Option<Executor>,
    pub error_handler: Option<ErrorHandler>,
    pub validators: Vec<Arc<dyn Validator>>,
}

/// The full command hierarchy. Node 0 is the application root.
#[derive(Debug)]
pub struct CommandTree {
    nodes: Vec<CommandNode>,
    by_type: HashMap<TypeId, NodeId>,
}

impl CommandTree {
    pub(crate) fn build(
        app: &ApplicationOptions,
        sources: Vec<NodeSource>,
    ) -> Result<Self, ConfigError> {
        let root_name = if app.name.trim().is_empty() {
            "app".to_string()
        } else {
            app.name.trim().to_string()
        };
        let mut nodes = vec![CommandNode {
            id: NodeId::ROOT,
            aliases: vec![root_name],
            parent: None,
            children: Vec::new(),
            options: Vec::new(),
            values: Vec::new(),
            is_default: false,
            hidden: false,
            help_order: 0,
            help: String::new(),
            description: app.description.clone(),
            examples: Vec::new(),
            overrides: ParserOverrides::default(),
            type_id: TypeId::of::<NoParameters>(),
            factory: factory::<NoParameters>,
            executor: None,
            error_handler: None,
            validators: Vec::new(),
        }];

        let mut by_type = HashMap::new();
        let mut parents = Vec::with_capacity(sources.len());
        for (idx, source) in sources.into_iter().enumerate() {
            let id = NodeId(idx + 1);
            by_type.insert(source.type_id, id);
            parents.push(source.parent);
            nodes.push(node_from_source(id, source)?);
        }

        for (idx, parent) in parents.iter().enumerate() {
            let id = NodeId(idx + 1);
            let parent_id = match parent {
                None => NodeId::ROOT,
                Some(type_id) => *by_type.get(type_id).ok_or_else(|| ConfigError::UnknownParent {
                    command: nodes[id.0].name().to_string(),
                })?,
            };
            nodes[id.0].parent = Some(parent_id);
        }

        // Every chain must reach the root within `nodes.len()` steps.
        for node in &nodes {
            let mut current = node.parent;
            let mut steps = 0usize;
            while let Some(p) = current {
                if p == node.id || steps > nodes.len() {
                    return Err(ConfigError::ParentCycle {
                        command: node.name().to_string(),
                    });
                }
                current = nodes[p.0].parent;
                steps += 1;
            }
        }

        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];
        for node in nodes.iter().skip(1) {
            if let Some(parent) = node.parent {
                children[parent.0].push(node.id);
            }
        }
        for (idx, mut kids) in children.into_iter().enumerate() {
            kids.sort_by_key(|k| (nodes[k.0].help_order, k.0));
            check_siblings(&nodes, NodeId(idx), &kids)?;
            nodes[idx].children = kids;
        }

        for node in nodes.iter().skip(1) {
            if node.children.is_empty() && node.executor.is_none() {
                return Err(ConfigError::MissingExecutor {
                    command: node.name().to_string(),
                });
            }
        }

        Ok(Self { nodes, by_type })
    }

    pub fn root(&self) -> &CommandNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> &CommandNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CommandNode> {
        self.nodes.iter()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &CommandNode> {
        self.nodes[id.0].children.iter().map(|c| &self.nodes[c.0])
    }

    /// Node registered for the parameter type `P`.
    pub fn node_for<P: 'static>(&self) -> Option<NodeId> {
        self.by_type.get(&TypeId::of::<P>()).copied()
    }

    /// Child of `id` answering to `token`, compared case-insensitively.
    pub fn find_child(&self, id: NodeId, token: &str) -> Option<NodeId> {
        self.children(id).find(|c| c.answers_to(token)).map(|c| c.id)
    }

    pub fn default_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).find(|c| c.is_default).map(|c| c.id)
    }

    /// `id` followed by each of its ancestors up to and including the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |n| self.nodes[n.0].parent)
    }

    /// Command names from the root's first child down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut path: Vec<&str> = self
            .ancestors(id)
            .filter(|n| *n != NodeId::ROOT)
            .map(|n| self.nodes[n.0].name())
            .collect();
        path.reverse();
        path
    }

    /// Resolve a path of names (or aliases) starting below the root.
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(NodeId::ROOT, |id, name| self.find_child(id, name))
    }
}

fn node_from_source(id: NodeId, source: NodeSource) -> Result<CommandNode, ConfigError> {
    let meta = source.meta;
    let name = meta.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }

    let mut aliases = vec![name.clone()];
    for alias in &meta.aliases {
        let alias = alias.trim();
        if alias.is_empty() || aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            continue;
        }
        aliases.push(alias.to_string());
    }

    let options = build_options(&name, meta.options)?;
    let values = build_values(&name, meta.values)?;

    Ok(CommandNode {
        id,
        aliases,
        parent: None,
        children: Vec::new(),
        options,
        values,
        is_default: meta.is_default,
        hidden: meta.hidden,
        help_order: meta.help_order,
        help: meta.help,
        description: meta.description,
        examples: meta.examples,
        overrides: meta.overrides,
        type_id: source.type_id,
        factory: source.factory,
        executor: source.executor,
        error_handler: source.error_handler,
        validators: source.validators,
    })
}

fn check_default(
    command: &str,
    target: &str,
    kind: &ValueKind,
    multiple: bool,
    default: Option<Value>,
) -> Result<Option<Value>, ConfigError> {
    let Some(default) = default else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::InvalidDefault {
        command: command.to_string(),
        target: target.to_string(),
        reason,
    };
    if !multiple && matches!(default, Value::List(_)) {
        return Err(invalid("a list default needs a collection slot".to_string()));
    }
    coerce(kind, default).map(Some).map_err(invalid)
}

fn build_options(command: &str, metas: Vec<OptionMeta>) -> Result<Vec<OptionSpec>, ConfigError> {
    let mut seen_long: HashSet<String> = HashSet::new();
    let mut seen_short: HashSet<char> = HashSet::new();
    let mut out = Vec::with_capacity(metas.len());

    for meta in metas {
        let long: Vec<String> = meta
            .long
            .iter()
            .map(|l| l.trim().trim_start_matches('-').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if long.is_empty() && meta.short.is_empty() {
            return Err(ConfigError::OptionWithoutName {
                command: command.to_string(),
                target: meta.target,
            });
        }
        for l in &long {
            if !seen_long.insert(l.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateOption {
                    command: command.to_string(),
                    name: format!("--{l}"),
                });
            }
        }
        for s in &meta.short {
            if !seen_short.insert(*s) {
                return Err(ConfigError::DuplicateOption {
                    command: command.to_string(),
                    name: format!("-{s}"),
                });
            }
        }

        let default = check_default(command, &meta.target, &meta.kind, meta.multiple, meta.default)?;
        out.push(OptionSpec {
            target: meta.target,
            long,
            short: meta.short,
            kind: meta.kind,
            multiple: meta.multiple,
            required: meta.required,
            default,
            help: meta.help,
            help_order: meta.help_order,
            hidden: meta.hidden,
        });
    }
    Ok(out)
}

fn build_values(command: &str, mut metas: Vec<ValueMeta>) -> Result<Vec<ValueSpec>, ConfigError> {
    metas.sort_by_key(|v| v.order);

    let mut out: Vec<ValueSpec> = Vec::with_capacity(metas.len());
    for meta in metas {
        if let Some(prev) = out.last() {
            if prev.order == meta.order {
                return Err(ConfigError::DuplicateValueOrder {
                    command: command.to_string(),
                    order: meta.order,
                });
            }
            if prev.multiple {
                return Err(ConfigError::MultipleValueNotLast {
                    command: command.to_string(),
                    value: prev.name.clone(),
                });
            }
            if meta.required && !prev.required {
                return Err(ConfigError::RequiredValueAfterOptional {
                    command: command.to_string(),
                    value: meta.name,
                });
            }
        }

        let default = check_default(command, &meta.target, &meta.kind, meta.multiple, meta.default)?;
        let name = if meta.name.trim().is_empty() {
            meta.target.clone()
        } else {
            meta.name
        };
        out.push(ValueSpec {
            target: meta.target,
            name,
            order: meta.order,
            kind: meta.kind,
            multiple: meta.multiple,
            required: meta.required,
            default,
            help: meta.help,
        });
    }
    Ok(out)
}

fn check_siblings(nodes: &[CommandNode], parent: NodeId, kids: &[NodeId]) -> Result<(), ConfigError> {
    let mut owners: HashMap<String, NodeId> = HashMap::new();
    let mut default: Option<NodeId> = None;

    for kid in kids {
        let node = &nodes[kid.0];
        for alias in &node.aliases {
            if let Some(prev) = owners.insert(alias.to_ascii_lowercase(), *kid) {
                return Err(ConfigError::DuplicateAlias {
                    alias: alias.clone(),
                    first: nodes[prev.0].name().to_string(),
                    second: node.name().to_string(),
                });
            }
        }
        if node.is_default {
            if let Some(prev) = default {
                return Err(ConfigError::MultipleDefaults {
                    parent: nodes[parent.0].name().to_string(),
                    first: nodes[prev.0].name().to_string(),
                    second: node.name().to_string(),
                });
            }
            default = Some(*kid);
        }
    }
    Ok(())
}
