// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use orderdesk_app::{PopupLauncher, SelectionChannel};
use orderdesk_db::SessionStore;
use orderdesk_engine::{OrderSession, SessionConfig, demo_seed_rows};
use runtime::{SharedLookup, ShellRuntime};
use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    match options.action {
        Action::Help => {
            print_help();
            return Ok(());
        }
        Action::PrintConfigPath => {
            println!("{}", options.config_path.display());
            return Ok(());
        }
        Action::PrintExample => {
            print!("{}", Config::example_config(&options.config_path));
            return Ok(());
        }
        Action::PrintDbPath | Action::Check | Action::Shell => {}
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `orderdesk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo { None } else { config.db_path() };
    if options.action == Action::PrintDbPath {
        match &db_path {
            Some(path) => println!("{}", path.display()),
            None => println!(":memory:"),
        }
        return Ok(());
    }

    init_logging(&config)?;

    let store = match &db_path {
        Some(path) => SessionStore::open(path).with_context(|| {
            format!(
                "open session database {} -- if this path is wrong, fix [session].db_path",
                path.display()
            )
        })?,
        None => SessionStore::open_memory()?,
    };

    let client = orderdesk_lookup::Client::new(config.base_url()).with_context(|| {
        format!(
            "invalid [backend] config in {}; fix base_url",
            options.config_path.display()
        )
    })?;
    if options.action == Action::Check {
        use orderdesk_app::Lookup as _;
        client.ping().with_context(|| {
            format!("backend health check against {} failed", client.base_url())
        })?;
        tracing::info!(base_url = %client.base_url(), "config, session storage, and backend look good");
        return Ok(());
    }

    let (screen_width, screen_height) = config.screen_size();
    let launcher = PopupLauncher::new(config.popup_origin(), screen_width, screen_height)?;
    let session_config = SessionConfig {
        channel: SelectionChannel::new(config.popup_origin())?,
        pricing: config.pricing_policy()?,
        seed_rows: if options.demo {
            demo_seed_rows()
        } else {
            Vec::new()
        },
    };
    let session = OrderSession::new(store, session_config);
    let lookup: SharedLookup = Arc::new(client);

    let mut runtime = ShellRuntime::new(session, lookup, launcher, config.document_dir());
    runtime.start()?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    runtime.run(stdin.lock(), &mut stdout)
}

/// Logs go to stderr so the shell's stdout stays readable. `RUST_LOG`
/// overrides `[logging].level`.
fn init_logging(config: &Config) -> Result<()> {
    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("{}={}", config::APP_NAME, config.log_level()));
    let filter = EnvFilter::try_new(&directive).with_context(|| {
        format!("parse log filter {directive:?}; set [logging].level to error, warn, info, debug, or trace")
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    let installed = if config.log_json() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|error| anyhow!("install log subscriber: {error}"))
}

/// What the invocation does. When several flags are given the highest
/// ranked one wins, so `--help` always just prints help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    Shell,
    Check,
    PrintDbPath,
    PrintExample,
    PrintConfigPath,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    action: Action,
    demo: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        action: Action::Shell,
        demo: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let requested = match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
                continue;
            }
            "--demo" => {
                options.demo = true;
                continue;
            }
            "--check" => Action::Check,
            "--print-path" => Action::PrintDbPath,
            "--print-example-config" => Action::PrintExample,
            "--print-config-path" => Action::PrintConfigPath,
            "--help" | "-h" => Action::Help,
            unknown => bail!("unknown argument {unknown:?}; run with --help to see supported options"),
        };
        options.action = options.action.max(requested);
    }

    Ok(options)
}

fn print_help() {
    println!("orderdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved session database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Start with starter rows and in-memory session storage");
    println!("  --check                  Validate config + session storage + backend health");
    println!("  --help                   Show this help");
}
