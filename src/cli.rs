use std::path::PathBuf;

use clap::Parser;
use dbgp_config::{BreakpointEntry, Config};

/// Command-line flags. Anything given here wins over the config files.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Drive DBGP debugger engines from a line console", long_about = None)]
pub(crate) struct Cli {
    /// Port engines connect to.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to listen on.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// IDE key engines must offer.
    #[arg(long)]
    pub idekey: Option<String>,

    /// Breakpoint to set on every session, one-based line.
    #[arg(short = 'b', long = "break", value_name = "FILE:LINE", value_parser = parse_breakpoint)]
    pub breakpoints: Vec<BreakpointEntry>,

    /// Log every packet and command verbatim.
    #[arg(short, long)]
    pub debug: bool,

    /// Print events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,

    /// Log to stderr instead of the log file.
    #[arg(long)]
    pub log_stderr: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Use this config file instead of the global and project ones.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Wait for a `start` command before listening.
    #[arg(long)]
    pub no_listen: bool,
}

impl Cli {
    /// Apply flag overrides to a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(idekey) = &self.idekey {
            config.session.idekey = idekey.clone();
        }
        config.debug |= self.debug;
        config.breakpoints.extend(self.breakpoints.iter().cloned());
    }
}

/// `<file>:<line>`, splitting at the last colon so drive letters survive.
fn parse_breakpoint(text: &str) -> Result<BreakpointEntry, String> {
    let (file, line) = text
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got `{text}`"))?;
    if file.is_empty() {
        return Err(format!("missing file in `{text}`"));
    }
    let line: u32 = line
        .parse()
        .map_err(|_| format!("invalid line number `{line}`"))?;
    if line == 0 {
        return Err("lines are one-based".to_string());
    }
    Ok(BreakpointEntry {
        file: file.to_string(),
        line,
    })
}
