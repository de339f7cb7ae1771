use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dbgp_config::{load_config, load_file, Config};
use dbgp_controller::{Controller, ControllerOptions, DebuggerEvent, UserCommand};
use dbgp_platform::{log_level_to_filter, open_log_file, DefaultPaths, PlatformPaths};
use dbgp_proto::{Breakpoint, BreakpointStore};
use dbgp_server::{Transport, TransportConfig};

use crate::cli::Cli;
use crate::console::{self, OutputFormat};

const EVENT_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 32;

/// Load settings, start logging, and serve until the console quits.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;

    let (mut config, config_error) = match &cli.config {
        Some(path) => (
            load_file(path).with_context(|| format!("failed to load {}", path.display()))?,
            None,
        ),
        None => {
            let project_dir = std::env::current_dir().ok();
            match load_config(&paths.config_dir(), project_dir.as_deref()) {
                Ok(config) => (config, None),
                Err(e) => (Config::default(), Some(e)),
            }
        }
    };
    cli.apply(&mut config);

    init_logging(&config, &cli, &paths)?;
    if let Some(e) = config_error {
        warn!("config load failed, using defaults: {}", e);
    }
    info!(
        port = config.server.port,
        idekey = %config.session.idekey,
        breakpoints = config.breakpoints.len(),
        "dbgpd starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let result = runtime.block_on(serve(config, format, !cli.no_listen));

    // Stdin reads block a runtime thread until the next line arrives.
    runtime.shutdown_timeout(Duration::from_secs(2));
    info!("dbgpd exited");
    result
}

fn init_logging(config: &Config, cli: &Cli, paths: &DefaultPaths) -> Result<()> {
    let level = match (&cli.log_level, config.debug) {
        (Some(level), _) => log_level_to_filter(level),
        (None, true) => "debug",
        (None, false) => config.log.level.as_str(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if cli.log_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_path = config.log.file.clone().unwrap_or_else(|| paths.log_file());
        let file = open_log_file(&log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }
    Ok(())
}

/// Seed breakpoints from one-based config entries.
fn seed_breakpoints(config: &Config) -> BreakpointStore {
    config
        .breakpoints
        .iter()
        .map(|entry| Breakpoint::new(entry.file.clone(), entry.line.saturating_sub(1)))
        .collect()
}

fn controller_options(config: &Config) -> ControllerOptions {
    ControllerOptions {
        port: config.server.port,
        idekey: config.session.idekey.clone(),
        language: config.session.language.clone(),
        max_pending_transactions: config.session.max_pending_transactions,
        file_uris: config.session.file_uris,
        debug: config.debug,
    }
}

fn transport_config(config: &Config) -> TransportConfig {
    TransportConfig {
        bind_address: config.server.bind_address.clone(),
        max_sessions: config.server.max_sessions,
        max_packet_len: config.server.max_packet_bytes,
    }
}

async fn serve(config: Config, format: OutputFormat, listen: bool) -> Result<()> {
    let (controller_side, transport_side) = dbgp_server::channel(config.bridge.capacity);
    let transport = Transport::spawn(transport_config(&config), transport_side);

    let (event_tx, event_rx) = mpsc::channel::<DebuggerEvent>(EVENT_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel::<UserCommand>(COMMAND_CAPACITY);

    let controller = Controller::new(
        controller_options(&config),
        controller_side,
        event_tx.clone(),
        seed_breakpoints(&config),
    );
    let mut controller = tokio::spawn(controller.run(command_rx));
    let output = tokio::spawn(console::output_loop(event_rx, format, tokio::io::stdout()));

    if listen {
        command_tx
            .send(UserCommand::Start)
            .await
            .context("controller stopped before start")?;
    }
    let interrupt = command_tx.clone();
    let input = tokio::spawn(console::input_loop(
        BufReader::new(tokio::io::stdin()),
        command_tx,
        event_tx,
    ));

    tokio::select! {
        joined = &mut controller => joined.context("controller task failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            let _ = interrupt.send(UserCommand::Shutdown).await;
            controller.await.context("controller task failed")?;
        }
    }
    input.abort();
    drop(interrupt);

    transport.await.context("transport task failed")?;
    output
        .await
        .context("output task failed")?
        .context("failed to write events")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgp_config::BreakpointEntry;

    #[test]
    fn seed_breakpoints_are_zero_based() {
        let config = Config {
            breakpoints: vec![
                BreakpointEntry {
                    file: "/a.php".into(),
                    line: 5,
                },
                BreakpointEntry {
                    file: "/a.php".into(),
                    line: 5,
                },
            ],
            ..Config::default()
        };
        let store = seed_breakpoints(&config);
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0], Breakpoint::new("/a.php", 4));
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.server.port = 9003;
        config.session.file_uris = true;
        config.debug = true;

        let options = controller_options(&config);
        assert_eq!(options.port, 9003);
        assert_eq!(options.idekey, "xdebug");
        assert!(options.file_uris);
        assert!(options.debug);

        let transport = transport_config(&config);
        assert_eq!(transport.bind_address, "127.0.0.1");
        assert_eq!(transport.max_sessions, 8);
    }
}
