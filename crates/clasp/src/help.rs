//! Help and version pages.

use crate::app::Application;
use crate::error::{CliError, CliErrorKind};
use crate::matcher::Synthesized;
use crate::model::{CommandNode, CommandTree, NodeId, OptionSpec, ValueSpec};
use crate::options::ApplicationOptions;
use crate::value::ValueKind;

/// Renders help, version and diagnostics for a run that will not execute.
pub trait HelpPage: Send + Sync {
    /// Write the page for `errors`. Returns `false` if nothing was written.
    fn write(&self, app: &Application, errors: &[CliError]) -> bool;
}

/// Text produced for one run, split by destination stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub stdout: String,
    pub stderr: String,
}

/// Plain-text help page. Help and version go to stdout, diagnostics to
/// stderr followed by the affected command's help.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextHelpPage;

impl TextHelpPage {
    pub fn render(&self, app: &Application, errors: &[CliError]) -> Rendered {
        let tree = app.tree();
        let opts = app.options();
        let target = errors
            .iter()
            .find_map(|e| e.command)
            .unwrap_or(NodeId::ROOT);

        if errors.iter().any(|e| e.kind == CliErrorKind::VersionRequested) {
            return Rendered {
                stdout: version(tree, opts),
                stderr: String::new(),
            };
        }
        if errors.iter().all(|e| e.kind == CliErrorKind::HelpRequested) {
            return Rendered {
                stdout: help(tree, opts, target),
                stderr: String::new(),
            };
        }

        let mut stderr = String::new();
        for error in errors.iter().filter(|e| !e.kind.is_informational()) {
            stderr.push_str(&format!("error: {}\n", error.describe(tree)));
        }
        stderr.push('\n');
        stderr.push_str(&help(tree, opts, target));
        Rendered {
            stdout: String::new(),
            stderr,
        }
    }
}

impl HelpPage for TextHelpPage {
    fn write(&self, app: &Application, errors: &[CliError]) -> bool {
        let rendered = self.render(app, errors);
        print!("{}", rendered.stdout);
        eprint!("{}", rendered.stderr);
        !(rendered.stdout.is_empty() && rendered.stderr.is_empty())
    }
}

/// Version line: the application name and, when set, its version.
pub fn version(tree: &CommandTree, opts: &ApplicationOptions) -> String {
    let name = tree.root().name();
    if opts.version.trim().is_empty() {
        format!("{name}\n")
    } else {
        format!("{name} {}\n", opts.version.trim())
    }
}

/// Help page for the command `id`.
pub fn help(tree: &CommandTree, opts: &ApplicationOptions, id: NodeId) -> String {
    let node = tree.node(id);
    let mut words = vec![tree.root().name()];
    words.extend(tree.path(id));
    let title = words.join(" ");

    let mut out = String::new();
    if node.help().trim().is_empty() {
        out.push_str(&title);
        out.push('\n');
    } else {
        out.push_str(&format!("{title} - {}\n", node.help().trim()));
    }

    let mut options: Vec<(String, String)> = visible_options(node)
        .into_iter()
        .map(|o| (option_left(o), option_help(o)))
        .collect();
    let synthesized = Synthesized::for_node(node, opts);
    match (synthesized.help_short, synthesized.help_long) {
        (true, true) => options.push(("-h, --help".to_string(), "Print help".to_string())),
        (false, true) => options.push(("--help".to_string(), "Print help".to_string())),
        (true, false) => options.push(("-h".to_string(), "Print help".to_string())),
        (false, false) => {}
    }
    if synthesized.version_long {
        options.push(("--version".to_string(), "Print version".to_string()));
    }
    let commands: Vec<&CommandNode> = tree.children(id).filter(|c| !c.is_hidden()).collect();

    let usage = usage(&title, node, !options.is_empty(), !commands.is_empty());
    out.push_str(&format!("\nUsage: {usage}\n"));

    if !node.description().trim().is_empty() {
        out.push('\n');
        out.push_str(node.description().trim_end());
        out.push('\n');
    }

    let arguments: Vec<(String, String)> = node
        .values()
        .iter()
        .map(|v| (value_left(v), value_help(v)))
        .collect();
    section(&mut out, "Arguments", &arguments);
    section(&mut out, "Options", &options);

    let rows: Vec<(String, String)> = commands
        .iter()
        .map(|c| {
            let mut help = c.help().trim().to_string();
            if c.is_default() {
                push_note(&mut help, "(default)");
            }
            (c.aliases().join(", "), help)
        })
        .collect();
    section(&mut out, "Commands", &rows);

    let examples: Vec<&String> = node
        .examples()
        .iter()
        .filter(|e| !e.trim().is_empty())
        .collect();
    if !examples.is_empty() {
        out.push_str("\nExamples:\n");
        for ex in examples {
            out.push_str(&format!("  {}\n", ex.trim_end()));
        }
    }

    out
}

fn usage(title: &str, node: &CommandNode, has_options: bool, has_commands: bool) -> String {
    let mut out = title.to_string();
    if has_options {
        out.push_str(" [OPTIONS]");
    }
    for value in node.values() {
        out.push(' ');
        out.push_str(&value_left(value));
    }
    if has_commands {
        out.push_str(if node.has_executor() { " [COMMAND]" } else { " <COMMAND>" });
    }
    out
}

fn visible_options(node: &CommandNode) -> Vec<&OptionSpec> {
    let mut options: Vec<&OptionSpec> = node.options().iter().filter(|o| !o.is_hidden()).collect();
    options.sort_by_key(|o| o.help_order());
    options
}

fn option_left(spec: &OptionSpec) -> String {
    let mut names: Vec<String> = spec.short_names().iter().map(|s| format!("-{s}")).collect();
    names.extend(spec.long_names().iter().map(|l| format!("--{l}")));
    let mut out = names.join(", ");
    if spec.takes_value() {
        out.push_str(&format!(" <{}>", spec.target().to_ascii_uppercase()));
        if spec.is_multiple() {
            out.push_str("...");
        }
    }
    out
}

fn option_help(spec: &OptionSpec) -> String {
    let mut out = spec.help().trim().to_string();
    if spec.is_required() {
        push_note(&mut out, "(required)");
    }
    annotate(&mut out, spec.kind(), spec.default_value().map(ToString::to_string));
    out
}

fn value_left(spec: &ValueSpec) -> String {
    let dots = if spec.is_multiple() { "..." } else { "" };
    if spec.is_required() {
        format!("<{}>{dots}", spec.name())
    } else {
        format!("[{}]{dots}", spec.name())
    }
}

fn value_help(spec: &ValueSpec) -> String {
    let mut out = spec.help().trim().to_string();
    annotate(&mut out, spec.kind(), spec.default_value().map(ToString::to_string));
    out
}

fn annotate(out: &mut String, kind: &ValueKind, default: Option<String>) {
    if let ValueKind::Enum(choices) = kind {
        push_note(out, &format!("[possible values: {}]", choices.join(", ")));
    }
    if let Some(default) = default {
        push_note(out, &format!("[default: {default}]"));
    }
}

fn push_note(out: &mut String, note: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(note);
}

fn section(out: &mut String, title: &str, rows: &[(String, String)]) {
    if rows.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:\n"));
    let width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    for (left, help) in rows {
        if help.is_empty() {
            out.push_str(&format!("  {left}\n"));
        } else {
            out.push_str(&format!("  {left:width$}  {help}\n"));
        }
    }
}
