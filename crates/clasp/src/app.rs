//! Application assembly and the run entry points.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::command::{Command, factory};
use crate::error::{CliError, CliErrorKind, ConfigError};
use crate::executor::{ErrorHandler, Execute, ExecuteAsync, Executor};
use crate::help::{HelpPage, TextHelpPage};
use crate::matcher::{self, ParseResult};
use crate::model::{CommandTree, NodeSource};
use crate::options::ApplicationOptions;
use crate::validate::{RequiredValidator, TypedValidator, Validator, run_pipeline};

/// Per-command registration: executor, error hook and validators for `P`.
pub struct Registration<P> {
    executor: Option<Executor>,
    error_handler: Option<ErrorHandler>,
    validators: Vec<Arc<dyn Validator>>,
    _params: PhantomData<fn() -> P>,
}

impl<P: Command> Registration<P> {
    fn new() -> Self {
        Self {
            executor: None,
            error_handler: None,
            validators: Vec::new(),
            _params: PhantomData,
        }
    }

    pub fn execute(mut self, executor: impl Execute<P>) -> Self {
        self.executor = Some(Executor::sync(executor));
        self
    }

    pub fn execute_async(mut self, executor: impl ExecuteAsync<P>) -> Self {
        self.executor = Some(Executor::from_async(executor));
        self
    }

    pub fn execute_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(P) -> i32 + Send + Sync + 'static,
    {
        self.executor = Some(Executor::from_fn(f));
        self
    }

    /// Hook that sees non-terminal errors before the help page does. The
    /// returned list replaces the errors; an empty list lets execution go on.
    pub fn handle_errors<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<CliError>, Option<&P>) -> Vec<CliError> + Send + Sync + 'static,
    {
        self.error_handler = Some(ErrorHandler::new(f));
        self
    }

    /// Command-specific validator over the bound parameter object.
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&P) -> Result<(), Vec<CliError>> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(TypedValidator::<P, F>::new(f)));
        self
    }
}

pub struct ApplicationBuilder {
    options: ApplicationOptions,
    commands: IndexMap<TypeId, NodeSource>,
    validators: Vec<Arc<dyn Validator>>,
    help_page: Arc<dyn HelpPage>,
}

impl ApplicationBuilder {
    /// Register the command type `P`. Registering the same type again
    /// replaces the earlier registration.
    pub fn command<P: Command>(
        mut self,
        configure: impl FnOnce(Registration<P>) -> Registration<P>,
    ) -> Self {
        let registration = configure(Registration::new());
        let source = NodeSource {
            type_id: TypeId::of::<P>(),
            parent: P::parent(),
            meta: P::meta(),
            factory: factory::<P>,
            executor: registration.executor,
            error_handler: registration.error_handler,
            validators: registration.validators,
        };
        if self.commands.insert(source.type_id, source).is_some() {
            tracing::debug!(
                command = std::any::type_name::<P>(),
                "replaced earlier registration"
            );
        }
        self
    }

    /// Application-wide validator, run for every command after the required
    /// checks and before command-specific validators.
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn help_page(mut self, page: impl HelpPage + 'static) -> Self {
        self.help_page = Arc::new(page);
        self
    }

    pub fn build(self) -> Result<Application, ConfigError> {
        let tree = CommandTree::build(&self.options, self.commands.into_values().collect())?;
        tracing::debug!(
            app = tree.root().name(),
            commands = tree.nodes().count() - 1,
            "command tree built"
        );
        Ok(Application {
            options: self.options,
            tree,
            validators: self.validators,
            help_page: self.help_page,
        })
    }
}

/// A configured command-line application. Immutable once built; any number
/// of runs may share it.
pub struct Application {
    options: ApplicationOptions,
    tree: CommandTree,
    validators: Vec<Arc<dyn Validator>>,
    help_page: Arc<dyn HelpPage>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("options", &self.options)
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

enum Dispatch {
    Run(Executor, Box<dyn Any + Send>),
    Exit(i32),
}

impl Application {
    pub fn builder(options: ApplicationOptions) -> ApplicationBuilder {
        ApplicationBuilder {
            options,
            commands: IndexMap::new(),
            validators: Vec::new(),
            help_page: Arc::new(TextHelpPage),
        }
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// Match `args` (without the program name) against the command tree.
    pub fn parse<I, S>(&self, args: I) -> ParseResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        matcher::parse(&self.tree, &self.options, &args)
    }

    /// Run the validation pipeline for a parse result. Returns nothing when
    /// matching already ended in a terminal error.
    pub fn validate(&self, result: &ParseResult) -> Vec<CliError> {
        if result.is_terminal() {
            return Vec::new();
        }
        let node = self.tree.node(result.node);
        let validators = std::iter::once(&RequiredValidator as &dyn Validator)
            .chain(self.validators.iter().map(|v| v.as_ref() as &dyn Validator))
            .chain(node.validators.iter().map(|v| v.as_ref() as &dyn Validator));
        run_pipeline(validators, &self.tree, node, &result.params)
    }

    /// Parse, validate and execute. Asynchronous executors are driven on a
    /// current-thread runtime, so this must not be called from inside one;
    /// use [`run_async`](Self::run_async) there.
    pub fn run<I, S>(&self, args: I) -> i32
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.dispatch(args) {
            Dispatch::Exit(code) => code,
            Dispatch::Run(Executor::Sync(f), params) => f(params),
            Dispatch::Run(Executor::Async(f), params) => {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(f(params)),
                    Err(err) => {
                        tracing::error!(%err, "failed to start async runtime");
                        self.options.parse_error_exit_code
                    }
                }
            }
        }
    }

    /// Parse, validate and execute, awaiting an asynchronous executor.
    pub async fn run_async<I, S>(&self, args: I) -> i32
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.dispatch(args) {
            Dispatch::Exit(code) => code,
            Dispatch::Run(Executor::Sync(f), params) => f(params),
            Dispatch::Run(Executor::Async(f), params) => f(params).await,
        }
    }

    fn dispatch<I, S>(&self, args: I) -> Dispatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let result = self.parse(args);
        let mut errors = result.errors.clone();
        errors.extend(self.validate(&result));

        let node = self.tree.node(result.node);
        if !errors.is_empty() && !result.is_terminal() {
            if let Some(handler) = &node.error_handler {
                let before = errors.len();
                errors = handler.handle(errors, &result.params);
                tracing::debug!(before, after = errors.len(), "error hook ran");
            }
        }

        if !errors.is_empty() {
            return Dispatch::Exit(self.report(&errors));
        }
        match &node.executor {
            Some(executor) => {
                tracing::debug!(
                    command = %self.tree.path(node.id()).join(" "),
                    asynchronous = executor.is_async(),
                    "dispatching"
                );
                Dispatch::Run(executor.clone(), result.params.into_object().into_any())
            }
            None => {
                let help = CliError::new(CliErrorKind::HelpRequested).on_command(node.id());
                Dispatch::Exit(self.report(&[help]))
            }
        }
    }

    fn report(&self, errors: &[CliError]) -> i32 {
        if !self.help_page.write(self, errors) {
            tracing::warn!(errors = errors.len(), "help page wrote nothing");
        }
        if errors.iter().all(|e| e.kind.is_informational()) {
            0
        } else {
            self.options.parse_error_exit_code
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    use async_trait::async_trait;

    use crate::model::CommandNode;
    use crate::{BoundParameters, Command};

    #[derive(Debug, Default, Command)]
    #[command(name = "build")]
    struct Build {
        #[option(long = "output", required)]
        output: String,
        #[value(required)]
        source: String,
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "serve")]
    struct Serve {
        #[option(long = "port", default = 80)]
        port: u16,
    }

    #[derive(Debug, Default, Command)]
    #[command(name = "fetch")]
    struct Fetch {
        #[value]
        url: Option<String>,
    }

    /// Records what it was asked to render.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<CliErrorKind>>>>);

    impl HelpPage for Recorder {
        fn write(&self, _app: &Application, errors: &[CliError]) -> bool {
            self.0
                .lock()
                .unwrap()
                .push(errors.iter().map(|e| e.kind).collect());
            true
        }
    }

    impl Recorder {
        fn pages(&self) -> Vec<Vec<CliErrorKind>> {
            self.0.lock().unwrap().clone()
        }
    }

    struct BuildExecutor(Arc<AtomicI32>);

    impl Execute<Build> for BuildExecutor {
        fn execute(&self, params: Build) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            if params.output == "out/" && params.source == "src/main.rs" {
                7
            } else {
                99
            }
        }
    }

    struct FetchExecutor;

    #[async_trait]
    impl ExecuteAsync<Fetch> for FetchExecutor {
        async fn execute(&self, params: Fetch) -> i32 {
            tokio::task::yield_now().await;
            params.url.map(|u| u.len() as i32).unwrap_or(0)
        }
    }

    fn app(recorder: &Recorder, calls: &Arc<AtomicI32>) -> Application {
        Application::builder(ApplicationOptions::new("tool"))
            .command::<Build>(|r| r.execute(BuildExecutor(Arc::clone(calls))))
            .command::<Fetch>(|r| r.execute_async(FetchExecutor))
            .command::<Serve>(|r| {
                r.execute_fn(|p: Serve| i32::from(p.port))
                    .handle_errors(|errors, _| {
                        errors
                            .into_iter()
                            .filter(|e| e.kind != CliErrorKind::BadOptionValue)
                            .collect()
                    })
            })
            .help_page(recorder.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn successful_run_returns_the_executor_code() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run(["build", "--output", "out/", "src/main.rs"]), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(recorder.pages().is_empty());
    }

    #[test]
    fn missing_required_option_goes_to_the_help_page() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run(["build", "main.rs"]), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            recorder.pages(),
            vec![vec![CliErrorKind::MissingRequiredOption]]
        );
    }

    #[test]
    fn help_and_version_exit_zero_without_executing() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run(["--version"]), 0);
        assert_eq!(app.run(["build", "--help"]), 0);
        assert_eq!(app.run(Vec::<&str>::new()), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            recorder.pages(),
            vec![
                vec![CliErrorKind::VersionRequested],
                vec![CliErrorKind::HelpRequested],
                vec![CliErrorKind::HelpRequested],
            ]
        );
    }

    #[test]
    fn terminal_errors_skip_validation() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run(["frobnicate"]), 1);
        assert_eq!(recorder.pages(), vec![vec![CliErrorKind::UnknownCommand]]);
    }

    #[test]
    fn parse_error_exit_code_is_configurable() {
        let mut opts = ApplicationOptions::new("tool");
        opts.parse_error_exit_code = 64;
        let app = Application::builder(opts)
            .command::<Serve>(|r| r.execute_fn(|_| 0))
            .help_page(Recorder::default())
            .build()
            .unwrap();
        assert_eq!(app.run(["serve", "--port", "x"]), 64);
    }

    #[test]
    fn error_hook_can_recover() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        // The failed conversion leaves the field at its type default.
        assert_eq!(app.run(["serve", "--port", "http"]), 0);
        assert_eq!(app.run(["serve"]), 80);
        assert!(recorder.pages().is_empty());

        assert_eq!(app.run(["serve", "--nope"]), 1);
        assert_eq!(recorder.pages(), vec![vec![CliErrorKind::UnknownOption]]);
    }

    #[test]
    fn run_drives_async_executors() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run(["fetch", "abcd"]), 4);
        assert_eq!(app.run(["fetch"]), 0);
    }

    #[tokio::test]
    async fn run_async_awaits_async_and_sync_executors() {
        let recorder = Recorder::default();
        let calls = Arc::new(AtomicI32::new(0));
        let app = app(&recorder, &calls);
        assert_eq!(app.run_async(["fetch", "abc"]).await, 3);
        assert_eq!(app.run_async(["build", "--output", "out/", "src/main.rs"]).await, 7);
    }

    #[test]
    fn validators_run_in_pipeline_order() {
        let recorder = Recorder::default();
        let app = Application::builder(ApplicationOptions::new("tool"))
            .command::<Build>(|r| {
                r.execute_fn(|_| 0).validate(|p: &Build| {
                    if p.source.ends_with(".rs") {
                        Ok(())
                    } else {
                        Err(vec![CliError::new(CliErrorKind::BadValue).with_message("not rust")])
                    }
                })
            })
            .validator(
                |_: &CommandTree, node: &CommandNode, _: &BoundParameters| -> Result<(), Vec<CliError>> {
                    Err(vec![CliError::new(CliErrorKind::UnexpectedValue).on_command(node.id())])
                },
            )
            .help_page(recorder.clone())
            .build()
            .unwrap();

        assert_eq!(app.run(["build", "main.c"]), 1);
        assert_eq!(
            recorder.pages(),
            vec![vec![
                CliErrorKind::MissingRequiredOption,
                CliErrorKind::UnexpectedValue,
                CliErrorKind::BadValue,
            ]]
        );
    }

    #[test]
    fn registering_a_type_twice_replaces_the_first() {
        let app = Application::builder(ApplicationOptions::new("tool"))
            .command::<Serve>(|r| r.execute_fn(|_| 1))
            .command::<Serve>(|r| r.execute_fn(|_| 2))
            .help_page(Recorder::default())
            .build()
            .unwrap();
        assert_eq!(app.tree().nodes().count(), 2);
        assert_eq!(app.run(["serve"]), 2);
    }

    #[test]
    fn built_application_is_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Application>();

        let calls = Arc::new(AtomicI32::new(0));
        let counter = Arc::clone(&calls);
        let app = Arc::new(
            Application::builder(ApplicationOptions::new("tool"))
                .command::<Build>(move |r| {
                    r.execute_fn(move |b: Build| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if b.output == b.source { 3 } else { 0 }
                    })
                })
                .help_page(Recorder::default())
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let app = Arc::clone(&app);
                std::thread::spawn(move || {
                    let source = format!("src{i}");
                    app.run(["build", "--output", "out", source.as_str()])
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(app.run(["build", "--output", "same", "same"]), 3);
    }

    #[test]
    fn configuration_errors_prevent_building() {
        let err = Application::builder(ApplicationOptions::new("tool"))
            .command::<Serve>(|r| r)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingExecutor {
                command: "serve".to_string()
            }
        );
    }
}
