//! Token matcher: resolves the command addressed by argv and routes the
//! remaining tokens to its options and positional values.

use crate::binder::{Binder, BoundParameters, Positional};
use crate::error::{CliError, CliErrorKind};
use crate::model::{CommandNode, CommandTree, NodeId};
use crate::options::{ApplicationOptions, ParserSettings};

const HELP: &str = "help";
const VERSION: &str = "version";
const HELP_SHORT: char = 'h';

/// Result of matching one argv against the command tree.
#[derive(Debug)]
pub struct ParseResult {
    /// The command argv resolved to, or the node a terminal error refers to.
    pub node: NodeId,
    pub params: BoundParameters,
    /// Errors in the order they were found. A terminal error is always alone.
    pub errors: Vec<CliError>,
}

impl ParseResult {
    pub fn is_terminal(&self) -> bool {
        self.errors.iter().any(|e| e.kind.is_terminal())
    }
}

/// Help and version options synthesized onto the resolved command, unless
/// the command declares the same names itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Synthesized {
    pub help_long: bool,
    pub help_short: bool,
    pub version_long: bool,
}

impl Synthesized {
    pub(crate) fn for_node(node: &CommandNode, app: &ApplicationOptions) -> Self {
        Self {
            help_long: app.provide_help_options && node.find_long(HELP).is_none(),
            help_short: app.provide_help_options && node.find_short(HELP_SHORT).is_none(),
            version_long: app.provide_version_options && node.find_long(VERSION).is_none(),
        }
    }
}

/// Match `args` against `tree`. Never fails: every problem is reported as a
/// [`CliError`] in the result.
pub fn parse<S: AsRef<str>>(
    tree: &CommandTree,
    app: &ApplicationOptions,
    args: &[S],
) -> ParseResult {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    Matcher { tree, app }.run(&args)
}

enum Resolution {
    /// Binding continues on `node` starting at token `next`.
    Resolved { node: NodeId, next: usize },
    /// Matching stops with a terminal error on `node`.
    Terminal { node: NodeId, error: CliError },
}

struct Matcher<'a> {
    tree: &'a CommandTree,
    app: &'a ApplicationOptions,
}

impl<'a> Matcher<'a> {
    fn run(&self, args: &[&str]) -> ParseResult {
        match self.resolve(args) {
            Resolution::Terminal { node, error } => self.terminal(node, error),
            Resolution::Resolved { node, next } => {
                tracing::debug!(
                    command = %self.tree.path(node).join(" "),
                    consumed = next,
                    "resolved command"
                );
                self.bind(node, &args[next..])
            }
        }
    }

    fn terminal(&self, node: NodeId, error: CliError) -> ParseResult {
        tracing::debug!(kind = ?error.kind, "terminal error");
        ParseResult {
            node,
            params: Binder::new(self.tree.node(node)).finish(),
            errors: vec![error],
        }
    }

    fn resolve(&self, args: &[&str]) -> Resolution {
        let mut node = NodeId::ROOT;
        let mut next = 0;
        loop {
            if let Some(token) = args.get(next) {
                if let Some(child) = self.tree.find_child(node, token) {
                    tracing::trace!(token, "descend");
                    node = child;
                    next += 1;
                    continue;
                }
                if self.app.provide_help_command && token.eq_ignore_ascii_case(HELP) {
                    let target = self.help_target(node, &args[next + 1..]);
                    return Resolution::Terminal {
                        node: target,
                        error: CliError::new(CliErrorKind::HelpRequested).on_command(target),
                    };
                }
                if self.app.provide_version_command && token.eq_ignore_ascii_case(VERSION) {
                    return Resolution::Terminal {
                        node,
                        error: CliError::new(CliErrorKind::VersionRequested).on_command(node),
                    };
                }
            }
            match self.tree.default_child(node) {
                Some(default) => {
                    tracing::trace!(command = self.tree.node(default).name(), "default command");
                    node = default;
                }
                None => break,
            }
        }
        Resolution::Resolved { node, next }
    }

    /// Deepest node reached by walking `path` below `from`.
    fn help_target(&self, from: NodeId, path: &[&str]) -> NodeId {
        let mut current = from;
        for token in path {
            match self.tree.find_child(current, token) {
                Some(child) => current = child,
                None => break,
            }
        }
        current
    }

    fn bind(&self, id: NodeId, tokens: &[&str]) -> ParseResult {
        let node = self.tree.node(id);
        let settings = ParserSettings::resolve(self.tree, id, self.app);
        let synthesized = Synthesized::for_node(node, self.app);
        let mut binder = Binder::new(node);
        let mut errors: Vec<CliError> = Vec::new();
        let mut only_positional = false;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];
            i += 1;

            if only_positional || token == "-" || !token.starts_with('-') {
                match binder.bind_positional(token) {
                    Positional::Bound => tracing::trace!(token, "positional"),
                    Positional::Invalid(err) => errors.push(err),
                    Positional::NoSlot => {
                        if !node.children().is_empty() && node.values().is_empty() {
                            return self.terminal(
                                id,
                                CliError::new(CliErrorKind::UnknownCommand)
                                    .on_command(id)
                                    .with_token(token),
                            );
                        }
                        if settings.ignore_additional_values {
                            tracing::trace!(token, "ignored surplus value");
                        } else {
                            errors.push(
                                CliError::new(CliErrorKind::UnexpectedValue)
                                    .on_command(id)
                                    .with_token(token),
                            );
                        }
                    }
                }
                continue;
            }

            if token == "--" {
                only_positional = true;
                continue;
            }

            if let Some(body) = token.strip_prefix("--") {
                let (name, inline) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (body, None),
                };
                match node.find_long(name) {
                    Some(idx) => {
                        let raw = if node.options()[idx].takes_value() {
                            match inline.or_else(|| take_next(tokens, &mut i)) {
                                Some(raw) => Some(raw),
                                None => {
                                    binder.mark_provided(idx);
                                    errors.push(
                                        CliError::new(CliErrorKind::MissingOptionValue)
                                            .on_option(id, idx),
                                    );
                                    continue;
                                }
                            }
                        } else {
                            inline
                        };
                        if let Err(err) = binder.bind_option(idx, raw) {
                            errors.push(err);
                        }
                    }
                    None if synthesized.help_long && name.eq_ignore_ascii_case(HELP) => {
                        return self.terminal(
                            id,
                            CliError::new(CliErrorKind::HelpRequested).on_command(id),
                        );
                    }
                    None if synthesized.version_long && name.eq_ignore_ascii_case(VERSION) => {
                        return self.terminal(
                            id,
                            CliError::new(CliErrorKind::VersionRequested).on_command(id),
                        );
                    }
                    None => {
                        let shown = format!("--{name}");
                        if settings.ignore_unknown_options {
                            tracing::trace!(token = %shown, "ignored unknown option");
                        } else {
                            errors.push(
                                CliError::new(CliErrorKind::UnknownOption)
                                    .on_command(id)
                                    .with_token(shown),
                            );
                        }
                    }
                }
                continue;
            }

            // Short group: every character is a short name until one takes a
            // value or is followed by `=`, which swallows the rest of the token.
            let group = &token[1..];
            for (offset, c) in group.char_indices() {
                match node.find_short(c) {
                    Some(idx) if node.options()[idx].takes_value() => {
                        let rest = &group[offset + c.len_utf8()..];
                        let rest = rest.strip_prefix('=').unwrap_or(rest);
                        let raw = if rest.is_empty() {
                            take_next(tokens, &mut i)
                        } else {
                            Some(rest)
                        };
                        match raw {
                            Some(raw) => {
                                if let Err(err) = binder.bind_option(idx, Some(raw)) {
                                    errors.push(err);
                                }
                            }
                            None => {
                                binder.mark_provided(idx);
                                errors.push(
                                    CliError::new(CliErrorKind::MissingOptionValue)
                                        .on_option(id, idx),
                                );
                            }
                        }
                        break;
                    }
                    Some(idx) => {
                        // `-r=false` sets the flag explicitly and ends the group.
                        let inline = group[offset + c.len_utf8()..].strip_prefix('=');
                        if let Err(err) = binder.bind_option(idx, inline) {
                            errors.push(err);
                        }
                        if inline.is_some() {
                            break;
                        }
                    }
                    None if synthesized.help_short && c == HELP_SHORT => {
                        return self.terminal(
                            id,
                            CliError::new(CliErrorKind::HelpRequested).on_command(id),
                        );
                    }
                    None => {
                        let shown = format!("-{c}");
                        if settings.ignore_unknown_options {
                            tracing::trace!(token = %shown, "ignored unknown option");
                        } else {
                            errors.push(
                                CliError::new(CliErrorKind::UnknownOption)
                                    .on_command(id)
                                    .with_token(shown),
                            );
                        }
                    }
                }
            }
        }

        let params = binder.finish();
        if errors.is_empty() && !node.has_executor() {
            tracing::debug!(command = node.name(), "no executor, showing group help");
            return ParseResult {
                node: id,
                params,
                errors: vec![CliError::new(CliErrorKind::HelpRequested).on_command(id)],
            };
        }
        ParseResult {
            node: id,
            params,
            errors,
        }
    }
}

fn take_next<'t>(tokens: &[&'t str], i: &mut usize) -> Option<&'t str> {
    let token = tokens.get(*i).copied()?;
    *i += 1;
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::{Application, ApplicationOptions, Command, value_enum};

    value_enum! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        enum Profile {
            #[default]
            Debug,
            Release,
        }
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "build", alias = "b")]
    struct Build {
        #[option(long = "output", short = 'o', required)]
        output: String,
        #[option(long = "release", short = 'r')]
        release: bool,
        #[option(long = "jobs", short = 'j', default = 4)]
        jobs: u32,
        #[option(long = "define", short = 'D')]
        defines: Vec<String>,
        #[option(long = "profile")]
        profile: Option<Profile>,
        #[option(long = "color", default = true)]
        color: bool,
        #[value(required)]
        source: String,
        #[value]
        extra: Vec<String>,
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "remote")]
    struct Remote;

    #[derive(Debug, Default, Command)]
    #[command(name = "list", alias = "ls", parent = Remote, default)]
    struct RemoteList {
        #[option(long = "verbose", short = 'v')]
        verbose: bool,
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "add", parent = Remote)]
    struct RemoteAdd {
        #[value(required)]
        name: String,
        #[value(required)]
        url: String,
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "status")]
    struct Status {
        #[option(long = "help", help = "explicit help wins")]
        help: bool,
    }

    fn app_with(opts: ApplicationOptions) -> Application {
        Application::builder(opts)
            .command::<Build>(|r| r.execute_fn(|_| 0))
            .command::<Remote>(|r| r)
            .command::<RemoteList>(|r| r.execute_fn(|_| 0))
            .command::<RemoteAdd>(|r| r.execute_fn(|_| 0))
            .command::<Status>(|r| r.execute_fn(|_| 0))
            .build()
            .unwrap()
    }

    fn app() -> Application {
        app_with(ApplicationOptions::new("tool").version("1.2.3"))
    }

    fn kinds(result: &ParseResult) -> Vec<CliErrorKind> {
        result.errors.iter().map(|e| e.kind).collect()
    }

    fn path(app: &Application, result: &ParseResult) -> Vec<String> {
        app.tree()
            .path(result.node)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn resolves_and_binds_a_full_command_line() {
        let app = app();
        let result = app.parse(["build", "--output", "out/", "src/main.rs"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(path(&app, &result), vec!["build"]);
        let build = result.params.downcast_ref::<Build>().unwrap();
        assert_eq!(build.output, "out/");
        assert_eq!(build.source, "src/main.rs");
        assert_eq!(build.jobs, 4);
        assert!(!build.release);
    }

    #[test]
    fn command_names_match_case_insensitively() {
        let app = app();
        let a = app.parse(["Build", "-o", "x", "s"]);
        let b = app.parse(["BUILD", "-o", "x", "s"]);
        let c = app.parse(["b", "-o", "x", "s"]);
        assert_eq!(a.node, b.node);
        assert_eq!(a.node, c.node);
        assert_eq!(a.errors, b.errors);
    }

    #[test]
    fn parsing_twice_yields_identical_results() {
        let app = app();
        let args = ["build", "--jobs", "many", "--nope", "s"];
        let first = app.parse(args);
        let second = app.parse(args);
        assert_eq!(first.node, second.node);
        assert_eq!(first.errors, second.errors);
    }

    #[test]
    fn default_child_is_selected_without_consuming_a_token() {
        let app = app();
        let result = app.parse(["remote"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(path(&app, &result), vec!["remote", "list"]);

        let result = app.parse(["remote", "-v"]);
        assert!(result.params.downcast_ref::<RemoteList>().unwrap().verbose);

        let result = app.parse(["remote", "add", "origin", "https://x"]);
        assert_eq!(path(&app, &result), vec!["remote", "add"]);
        let add = result.params.downcast_ref::<RemoteAdd>().unwrap();
        assert_eq!((add.name.as_str(), add.url.as_str()), ("origin", "https://x"));
    }

    #[test]
    fn flag_forms_bind_true_false_and_default() {
        let app = app();
        let on = app.parse(["build", "-o", "x", "s", "--release"]);
        assert!(on.params.downcast_ref::<Build>().unwrap().release);
        let off = app.parse(["build", "-o", "x", "s", "--release=false"]);
        assert!(!off.params.downcast_ref::<Build>().unwrap().release);
        assert!(off.errors.is_empty());
        let unset = app.parse(["build", "-o", "x", "s"]);
        assert!(!unset.params.downcast_ref::<Build>().unwrap().release);
    }

    #[test]
    fn flag_with_declared_default_keeps_it_unless_overridden() {
        fn color(app: &Application, args: &[&str]) -> bool {
            let result = app.parse(args);
            assert!(result.errors.is_empty(), "{:?}", result.errors);
            result.params.downcast_ref::<Build>().unwrap().color
        }
        let app = app();
        assert!(color(&app, &["build", "-o", "x", "s"]));
        assert!(color(&app, &["build", "-o", "x", "s", "--color"]));
        assert!(!color(&app, &["build", "-o", "x", "s", "--color=false"]));
    }

    #[test]
    fn short_flag_accepts_inline_value() {
        let app = app();
        let off = app.parse(["build", "-o", "x", "s", "-r=false"]);
        assert!(off.errors.is_empty(), "{:?}", off.errors);
        assert!(!off.params.downcast_ref::<Build>().unwrap().release);

        let on = app.parse(["build", "-o", "x", "s", "-r=yes"]);
        assert!(on.params.downcast_ref::<Build>().unwrap().release);

        let bad = app.parse(["build", "-o", "x", "s", "-r=maybe"]);
        assert_eq!(kinds(&bad), vec![CliErrorKind::BadOptionValue]);
        assert_eq!(bad.errors[0].token.as_deref(), Some("maybe"));
    }

    #[test]
    fn option_missing_its_value_is_reported_once() {
        let app = app();
        for args in [["build", "s", "--output"], ["build", "s", "-o"]] {
            let result = app.parse(args);
            let mut errors = result.errors.clone();
            errors.extend(app.validate(&result));
            let found: Vec<_> = errors.iter().map(|e| e.kind).collect();
            assert_eq!(found, vec![CliErrorKind::MissingOptionValue], "{args:?}");
            assert_eq!(errors[0].option, Some(0));
        }
    }

    #[test]
    fn version_option_is_terminal_and_alone() {
        let app = app();
        let result = app.parse(["--nope", "--version"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::VersionRequested]);
    }

    #[test]
    fn unknown_command_is_terminal() {
        let app = app();
        let result = app.parse(["frobnicate", "--output", "x"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnknownCommand]);
        assert_eq!(result.errors[0].token.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn unknown_options_follow_the_ignore_policy() {
        let app = app();
        let result = app.parse(["build", "-o", "x", "s", "--unknown-flag"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnknownOption]);
        assert_eq!(result.errors[0].option, None);
        assert_eq!(result.errors[0].token.as_deref(), Some("--unknown-flag"));

        let mut opts = ApplicationOptions::new("tool");
        opts.ignore_unknown_options = true;
        let app = app_with(opts);
        let result = app.parse(["build", "-o", "x", "s", "--unknown-flag", "-z"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn ignored_unknown_long_option_leaves_its_value_positional() {
        let mut opts = ApplicationOptions::new("tool");
        opts.ignore_unknown_options = true;
        let app = app_with(opts);
        let result = app.parse(["build", "-o", "x", "--color", "always", "s"]);
        let build = result.params.downcast_ref::<Build>().unwrap();
        assert_eq!(build.source, "always");
        assert_eq!(build.extra, vec!["s"]);
    }

    #[test]
    fn missing_and_bad_option_values_do_not_stop_matching() {
        let app = app();
        let result = app.parse(["build", "s", "--jobs", "lots", "--output"]);
        assert_eq!(
            kinds(&result),
            vec![CliErrorKind::BadOptionValue, CliErrorKind::MissingOptionValue]
        );
    }

    #[test]
    fn short_groups_and_attached_values() {
        let app = app();
        let result = app.parse(["build", "-rj8", "-ofile", "s"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let build = result.params.downcast_ref::<Build>().unwrap();
        assert!(build.release);
        assert_eq!(build.jobs, 8);
        assert_eq!(build.output, "file");

        let result = app.parse(["build", "-o=out", "s"]);
        assert_eq!(result.params.downcast_ref::<Build>().unwrap().output, "out");
    }

    #[test]
    fn option_value_may_start_with_a_dash() {
        let app = app();
        let result = app.parse(["build", "--output", "-", "s"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.params.downcast_ref::<Build>().unwrap().output, "-");
    }

    #[test]
    fn double_dash_ends_option_parsing() {
        let app = app();
        let result = app.parse(["build", "-o", "x", "--", "--weird", "-r"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let build = result.params.downcast_ref::<Build>().unwrap();
        assert_eq!(build.source, "--weird");
        assert_eq!(build.extra, vec!["-r"]);
        assert!(!build.release);
    }

    #[test]
    fn repeated_options_and_enum_choices() {
        let app = app();
        let result = app.parse([
            "build", "-o", "x", "-D", "A=1", "--define", "B=2", "--profile", "RELEASE", "s",
        ]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let build = result.params.downcast_ref::<Build>().unwrap();
        assert_eq!(build.defines, vec!["A=1", "B=2"]);
        assert_eq!(build.profile, Some(Profile::Release));
        assert_eq!(
            result.params.get("profile"),
            Some(&Value::Enum("Release".to_string()))
        );

        let result = app.parse(["build", "-o", "x", "--profile", "fast", "s"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::BadOptionValue]);
    }

    #[test]
    fn surplus_values_follow_the_additional_values_policy() {
        let app = app();
        let result = app.parse(["remote", "add", "a", "b", "c"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnexpectedValue]);
        assert_eq!(result.errors[0].token.as_deref(), Some("c"));

        let mut opts = ApplicationOptions::new("tool");
        opts.ignore_additional_values = true;
        let app = app_with(opts);
        let result = app.parse(["remote", "add", "a", "b", "c"]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn help_pseudo_command_targets_the_named_path() {
        let app = app();
        let result = app.parse(["help", "remote", "add"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::HelpRequested]);
        assert_eq!(path(&app, &result), vec!["remote", "add"]);

        let result = app.parse(["remote", "help"]);
        assert_eq!(path(&app, &result), vec!["remote"]);

        let result = app.parse(["version"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::VersionRequested]);
    }

    #[test]
    fn reserved_words_are_plain_tokens_when_disabled() {
        let mut opts = ApplicationOptions::new("tool");
        opts.provide_help_command = false;
        opts.provide_help_options = false;
        let app = app_with(opts);
        let result = app.parse(["help"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnknownCommand]);
        let result = app.parse(["build", "-o", "x", "s", "--help"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnknownOption]);
    }

    #[test]
    fn explicit_option_names_win_over_synthesized_ones() {
        let app = app();
        let result = app.parse(["status", "--help"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.params.downcast_ref::<Status>().unwrap().help);

        let result = app.parse(["status", "-h"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::HelpRequested]);
    }

    #[test]
    fn empty_argv_and_groups_without_executor_request_help() {
        let app = app();
        let result = app.parse(Vec::<String>::new());
        assert_eq!(kinds(&result), vec![CliErrorKind::HelpRequested]);
        assert_eq!(result.node, NodeId::ROOT);
    }

    #[test]
    fn positional_at_a_group_is_an_unknown_command() {
        let app = Application::builder(ApplicationOptions::new("tool"))
            .command::<Remote>(|r| r)
            .command::<RemoteAdd>(|r| r.execute_fn(|_| 0))
            .build()
            .unwrap();
        let result = app.parse(["remote", "rename"]);
        assert_eq!(kinds(&result), vec![CliErrorKind::UnknownCommand]);
        assert_eq!(path(&app, &result), vec!["remote"]);
    }

    #[test]
    fn missing_required_bindings_surface_after_validation() {
        let app = app();
        let result = app.parse(["build"]);
        assert!(result.errors.is_empty());
        let errors = app.validate(&result);
        assert_eq!(
            errors.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                CliErrorKind::MissingRequiredOption,
                CliErrorKind::MissingRequiredValue
            ]
        );
        let node = app.tree().node(result.node);
        assert_eq!(node.options()[errors[0].option.unwrap()].target(), "output");
    }
}
