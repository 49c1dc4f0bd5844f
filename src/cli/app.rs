//! Main CLI application

use crate::commands::BuilderRegistry;
use crate::config::{load_settings, Settings};
use crate::eval::Evaluator;
use crate::persistent::{FileStore, MemoryStore, Persistent};
use crate::report::DirReport;
use crate::runner::{ExecutionContext, Verbosity};
use crate::suite::{Suite, SuiteOptions};
use crate::ui;
use anyhow::{bail, Context as _};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flags of one invocation
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub paths: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub persistent_file: Option<PathBuf>,
    pub clean_persistent: bool,
    pub all_persistent: bool,
    pub attachments: Option<PathBuf>,
    pub vars: Vec<(String, String)>,
    pub skip: Vec<String>,
    pub no_color: bool,
    pub verbosity: Verbosity,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        CliOptions {
            paths: values(matches, "paths").into_iter().map(PathBuf::from).collect(),
            config: matches.get_one::<String>("config").map(PathBuf::from),
            dry_run: matches.get_flag("dry-run"),
            persistent_file: matches.get_one::<String>("persistent-file").map(PathBuf::from),
            clean_persistent: matches.get_flag("clean-persistent"),
            all_persistent: matches.get_flag("all-persistent"),
            attachments: matches.get_one::<String>("attachments").map(PathBuf::from),
            vars: matches
                .get_many::<(String, String)>("var")
                .map(|vars| vars.cloned().collect())
                .unwrap_or_default(),
            skip: values(matches, "skip"),
            no_color: matches.get_flag("no-color"),
            verbosity: get_verbosity(matches),
        }
    }
}

fn values(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("declarate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run declarative YAML test documents")
        .arg(
            Arg::new("paths")
                .value_name("PATHS")
                .help("Test files, directories or glob patterns (default: `tests` from the settings file)")
                .num_args(0..),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to declarate.yml settings file"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Parse and validate the tests without running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("persistent-file")
                .long("persistent-file")
                .value_name("FILE")
                .help("File holding persistent variables"),
        )
        .arg(
            Arg::new("clean-persistent")
                .long("clean-persistent")
                .help("Clear persistent variables before running")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("all-persistent")
                .long("all-persistent")
                .help("Store every variable persistently")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("attachments")
                .long("attachments")
                .value_name("DIR")
                .help("Write command responses into this directory"),
        )
        .arg(
            Arg::new("var")
                .long("var")
                .value_name("KEY=VALUE")
                .help("Set a variable before the run (repeatable)")
                .value_parser(parse_key_value)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("skip")
                .long("skip")
                .value_name("GLOB")
                .help("Skip test files matching this glob (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print failures and the summary")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print nested steps and debug logs")
                .action(ArgAction::SetTrue),
        )
}

/// Parse `KEY=VALUE`
fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", input)),
    }
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Initialize tracing on stderr. `RUST_LOG` overrides the verbosity flags.
fn init_logging(verbosity: Verbosity) {
    let default = match verbosity {
        Verbosity::Silent => "off",
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "declarate=debug,warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed when running embedded
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

/// Default location of the persistent variable file
fn default_persistent_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "declarate").map(|dirs| dirs.data_dir().join("persistent.json"))
}

fn open_store(options: &CliOptions, settings: &Settings, base: &Path) -> anyhow::Result<Box<dyn Persistent>> {
    if options.dry_run {
        return Ok(Box::new(MemoryStore::new()));
    }
    let path = options
        .persistent_file
        .clone()
        .or_else(|| settings.persistent_file.as_ref().map(|file| base.join(file)))
        .or_else(default_persistent_file);
    match path {
        Some(path) => {
            debug!("Persistent variables in {}", path.display());
            let store = FileStore::open(&path, false)
                .with_context(|| format!("Failed to open persistent store {}", path.display()))?;
            Ok(Box::new(store))
        }
        None => {
            warn!("No data directory available, persistent variables are kept in memory");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

/// Run with already parsed options. Returns whether every test passed.
pub fn execute(options: CliOptions) -> anyhow::Result<bool> {
    if options.no_color {
        ui::set_color(false);
    }

    let (settings, settings_path) =
        load_settings(options.config.as_deref()).context("Failed to load settings")?;
    let base = settings_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let paths = if options.paths.is_empty() {
        settings.tests.iter().map(|test| base.join(test)).collect::<Vec<_>>()
    } else {
        options.paths.clone()
    };
    if paths.is_empty() {
        bail!("No test paths given and the settings file lists no `tests`");
    }

    let mut variables: BTreeMap<String, String> = settings.variables.clone();
    variables.extend(options.vars.iter().cloned());

    let mut skip = settings.skip.clone();
    skip.extend(options.skip.iter().cloned());

    let store = open_store(&options, &settings, &base)?;
    let mut ctx = ExecutionContext::from_parts(
        Rc::new(Evaluator::new()),
        store,
        options.all_persistent || settings.all_persistent,
        settings.compare.clone(),
    )
    .with_verbosity(options.verbosity);
    if let Some(host) = &settings.host {
        ctx = ctx.with_builders(BuilderRegistry::with_host(host));
    }
    if let Some(dir) = &options.attachments {
        ctx = ctx.with_report(Box::new(DirReport::new(dir)));
    }

    let suite_options = SuiteOptions {
        paths,
        skip,
        dry_run: options.dry_run,
        reset_persistent: options.clean_persistent,
        variables,
    };
    let summary = Suite::new(ctx, suite_options).run().context("Test run aborted")?;

    if options.dry_run {
        ui::print_dry_run(&summary, options.verbosity);
    } else {
        ui::print_summary(&summary, options.verbosity);
    }
    Ok(summary.success())
}

/// Run the CLI with the given arguments
pub fn run_from<I, T>(args: I) -> anyhow::Result<bool>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().get_matches_from(args);
    let options = CliOptions::from_matches(&matches);

    init_logging(options.verbosity);
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!("Failed to load .env: {}", err);
        }
    }

    execute(options)
}

/// Run the CLI application with the process arguments
pub fn run() -> anyhow::Result<bool> {
    run_from(std::env::args_os())
}
