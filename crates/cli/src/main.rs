mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clasp::{Application, ApplicationOptions};
use tracing_subscriber::{EnvFilter, fmt};

/// Path of an optional JSON file with application options.
const CONFIG_ENV: &str = "CLASP_DEMO_CONFIG";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let options = load_options()?;
    let app = commands::register(Application::builder(options))
        .build()
        .context("invalid command configuration")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = app.run(&args);
    tracing::debug!(code, "exiting");
    std::process::exit(code);
}

fn load_options() -> Result<ApplicationOptions> {
    let mut options = match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            ApplicationOptions::from_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => ApplicationOptions::default(),
    };
    if options.name.is_empty() {
        options.name = "clasp-demo".to_string();
    }
    if options.version.is_empty() {
        options.version = env!("CARGO_PKG_VERSION").to_string();
    }
    if options.description.is_empty() {
        options.description = "Example build tool".to_string();
    }
    Ok(options)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
