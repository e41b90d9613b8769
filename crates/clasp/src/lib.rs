//! Declarative command-line parsing and dispatch.
//!
//! Commands are plain structs described with `#[derive(Command)]` (or with
//! the builders in [`metadata`]). An [`Application`] assembles them into a
//! command tree once, then each run goes through the same pipeline:
//! match argv against the tree, validate the bound parameters, and either
//! execute the resolved command or hand the errors to the [`HelpPage`].
//!
//! ```
//! use clasp::{Application, ApplicationOptions, Command};
//!
//! #[derive(Debug, Default, Command)]
//! #[command(name = "greet")]
//! struct Greet {
//!     #[option(long = "loud", short = 'l')]
//!     loud: bool,
//!     #[value(required)]
//!     name: String,
//! }
//!
//! let app = Application::builder(ApplicationOptions::new("demo"))
//!     .command::<Greet>(|r| r.execute_fn(|g: Greet| if g.loud { 2 } else { 1 }))
//!     .build()
//!     .unwrap();
//! assert_eq!(app.run(["greet", "-l", "world"]), 2);
//! ```

extern crate self as clasp;

mod app;
mod binder;
mod command;
mod error;
mod executor;
pub mod help;
mod matcher;
mod model;
mod options;
mod validate;
mod value;

pub use async_trait::async_trait;
pub use clasp_metadata as metadata;
pub use clasp_macros::Command;

pub use app::{Application, ApplicationBuilder, Registration};
pub use binder::BoundParameters;
pub use command::{Command, ParameterObject};
pub use error::{BindError, CliError, CliErrorKind, ConfigError, OptionsError};
pub use executor::{Execute, ExecuteAsync, Executor};
pub use help::{HelpPage, Rendered, TextHelpPage};
pub use matcher::ParseResult;
pub use model::{CommandNode, CommandTree, NodeId, OptionSpec, ValueSpec};
pub use options::{ApplicationOptions, ParserSettings};
pub use validate::{RequiredValidator, Validator};
pub use value::{Bindable, Value, ValueKind, coerce, convert};
