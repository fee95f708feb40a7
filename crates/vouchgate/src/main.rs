mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The guard flushes the file writer on drop, so it lives until exit.
    let _guard = init_tracing(&cli);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    // `serve` is a daemon: its lifecycle events are the point of running it.
    let serving = matches!(cli.command, Command::Serve(_));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli.global.verbose, serving)));

    let stderr = if cli.global.log_json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let log_dir = match &cli.command {
        Command::Serve(args) => args.log_dir.as_deref(),
        _ => None,
    };
    let (file, guard) = log_dir.map(file_layer).unzip();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();

    guard
}

fn default_level(verbosity: u8, serving: bool) -> &'static str {
    match (verbosity, serving) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    }
}

fn file_layer<S>(dir: &Path) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir, "vouchgate.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    (layer, guard)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;
    match command {
        // Config commands work without a valid config
        Command::Config(args) => commands::config_cmd::handle(args, &global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "vouchgate", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = load(&global)?;
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &cfg, &global).await
        }
    }
}

fn load(global: &GlobalOpts) -> Result<vouchgate_config::Config, CliError> {
    Ok(vouchgate_config::load_config(global.config.as_deref())?)
}
