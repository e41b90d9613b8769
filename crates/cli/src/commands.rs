//! Commands exposed by `clasp-demo`.

use std::path::PathBuf;

use clasp::{
    ApplicationBuilder, CliError, CliErrorKind, Command, Execute, ExecuteAsync, async_trait,
};

clasp::value_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum Profile {
        #[default]
        Dev,
        Release,
        Bench,
    }
}

/// Compile a source file.
///
/// Writes the build artifact for SOURCE to the given output path.
#[derive(Debug, Default, Command)]
#[command(
    name = "build",
    alias = "b",
    example = "clasp-demo build -o out/app src/main.x",
    example = "clasp-demo b -r -j 8 -D feature=fast -o out/app src/main.x"
)]
pub struct Build {
    /// Artifact path.
    #[option(long = "output", short = 'o', required)]
    pub output: PathBuf,
    /// Build with the release profile.
    #[option(long = "release", short = 'r')]
    pub release: bool,
    /// Parallel jobs.
    #[option(long = "jobs", short = 'j', default = 4)]
    pub jobs: u32,
    /// Preprocessor define, may be repeated.
    #[option(long = "define", short = 'D')]
    pub defines: Vec<String>,
    /// Build profile.
    #[option(long = "profile")]
    pub profile: Option<Profile>,
    /// Entry file.
    #[value(required)]
    pub source: String,
    /// Additional inputs.
    #[value]
    pub extra: Vec<String>,
}

impl Build {
    fn effective_profile(&self) -> Profile {
        if self.release {
            Profile::Release
        } else {
            self.profile.unwrap_or_default()
        }
    }
}

struct BuildRunner;

impl Execute<Build> for BuildRunner {
    fn execute(&self, build: Build) -> i32 {
        if build.jobs == 0 {
            eprintln!("error: --jobs must be at least 1");
            return 2;
        }
        tracing::info!(source = %build.source, jobs = build.jobs, "building");
        println!(
            "build {} -> {} profile={:?} jobs={} defines=[{}] extra=[{}]",
            build.source,
            build.output.display(),
            build.effective_profile(),
            build.jobs,
            build.defines.join(","),
            build.extra.join(","),
        );
        0
    }
}

/// Remove build outputs.
#[derive(Debug, Default, Command)]
#[command(name = "clean")]
pub struct Clean {
    /// Directory to remove.
    #[option(long = "dir", default = "target")]
    pub dir: PathBuf,
    /// Only report what would be removed.
    #[option(long = "dry-run", short = 'n')]
    pub dry_run: bool,
}

struct Cleaner;

#[async_trait]
impl ExecuteAsync<Clean> for Cleaner {
    async fn execute(&self, clean: Clean) -> i32 {
        let exists = tokio::fs::metadata(&clean.dir).await.is_ok();
        if clean.dry_run || !exists {
            println!(
                "clean {} dry-run={} exists={exists}",
                clean.dir.display(),
                clean.dry_run
            );
            return 0;
        }
        match tokio::fs::remove_dir_all(&clean.dir).await {
            Ok(()) => {
                println!("clean {} removed", clean.dir.display());
                0
            }
            Err(err) => {
                eprintln!("error: failed to remove {}: {err}", clean.dir.display());
                1
            }
        }
    }
}

/// Manage remotes.
#[derive(Debug, Default, Command)]
#[command(name = "remote")]
pub struct Remote;

/// List configured remotes.
#[derive(Debug, Default, Command)]
#[command(name = "list", alias = "ls", parent = Remote, default)]
pub struct RemoteList {
    /// Show URLs too.
    #[option(long = "verbose", short = 'v')]
    pub verbose: bool,
}

/// Add a remote.
#[derive(Debug, Default, Command)]
#[command(name = "add", parent = Remote, example = "clasp-demo remote add origin https://example.com/repo")]
pub struct RemoteAdd {
    /// Remote name.
    #[value(required)]
    pub name: String,
    /// Remote URL, including its scheme.
    #[value(required)]
    pub url: String,
}

fn check_url(add: &RemoteAdd) -> Result<(), Vec<CliError>> {
    if add.url.contains("://") {
        return Ok(());
    }
    Err(vec![
        CliError {
            value: Some(1),
            ..CliError::new(CliErrorKind::BadValue)
        }
        .with_token(add.url.as_str())
        .with_message("URL must include a scheme such as https://"),
    ])
}

/// Serve build outputs over HTTP.
#[derive(Debug, Default, Command)]
#[command(name = "serve")]
pub struct Serve {
    /// Port to listen on.
    #[option(long = "port", short = 'p')]
    pub port: Option<u16>,
    /// Address to bind.
    #[option(long = "host", default = "127.0.0.1")]
    pub host: String,
}

const FALLBACK_PORT: u16 = 8080;

/// A bad port is not fatal: warn and let the executor use the fallback.
fn recover_port(errors: Vec<CliError>, _serve: Option<&Serve>) -> Vec<CliError> {
    let (bad_port, rest): (Vec<_>, Vec<_>) = errors
        .into_iter()
        .partition(|e| e.kind == CliErrorKind::BadOptionValue);
    for err in &bad_port {
        eprintln!(
            "warning: ignoring port '{}', using {FALLBACK_PORT}",
            err.token.as_deref().unwrap_or_default()
        );
    }
    rest
}

fn serve(serve: Serve) -> i32 {
    let port = serve.port.unwrap_or(FALLBACK_PORT);
    println!("serve {}:{port}", serve.host);
    0
}

fn list_remotes(list: RemoteList) -> i32 {
    let remotes = [("origin", "https://example.com/origin")];
    for (name, url) in remotes {
        if list.verbose {
            println!("{name}\t{url}");
        } else {
            println!("{name}");
        }
    }
    0
}

fn add_remote(add: RemoteAdd) -> i32 {
    println!("added {} {}", add.name, add.url);
    0
}

pub fn register(builder: ApplicationBuilder) -> ApplicationBuilder {
    builder
        .command::<Build>(|r| r.execute(BuildRunner))
        .command::<Clean>(|r| r.execute_async(Cleaner))
        .command::<Remote>(|r| r)
        .command::<RemoteList>(|r| r.execute_fn(list_remotes))
        .command::<RemoteAdd>(|r| r.execute_fn(add_remote).validate(check_url))
        .command::<Serve>(|r| r.execute_fn(serve).handle_errors(recover_port))
}
