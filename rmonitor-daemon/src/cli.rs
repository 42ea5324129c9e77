//! Command-line overrides

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use rmonitor_protocol::Charset;

use crate::config::{DaemonConfig, FeedMode};

#[derive(Parser, Debug)]
#[command(name = "rmonitor-daemon")]
#[command(about = "Collect an RMONITOR timing feed and relay it to downstream clients", long_about = None)]
pub struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Connect out to a timing system at HOST:PORT
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "push")]
    pub pull: Option<String>,

    /// Let the timing system connect in on PORT
    #[arg(long, value_name = "PORT")]
    pub push: Option<u16>,

    /// Port downstream clients connect to
    #[arg(long)]
    pub relay_port: Option<u16>,

    /// Wire charset label, e.g. cp1252 or utf-8
    #[arg(long)]
    pub charset: Option<String>,

    /// Maximum log level
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Load the configuration file this invocation points at
    pub fn load_config(&self) -> Result<DaemonConfig> {
        match &self.config {
            Some(path) => DaemonConfig::load_from(path),
            None => DaemonConfig::load(),
        }
    }

    /// Apply command-line values on top of `config`
    pub fn apply(&self, config: &mut DaemonConfig) -> Result<()> {
        if let Some(target) = &self.pull {
            let (host, port) = split_host_port(target)?;
            config.collector.mode = FeedMode::Pull;
            config.collector.host = Some(host);
            config.collector.port = Some(port);
        }

        if let Some(port) = self.push {
            config.collector.mode = FeedMode::Push;
            config.collector.host = None;
            config.collector.port = Some(port);
        }

        if let Some(port) = self.relay_port {
            config.relay.port = port;
        }

        if let Some(label) = &self.charset {
            config.charset = Charset::from_label(label).context("Invalid --charset")?;
        }

        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        Ok(())
    }
}

fn split_host_port(target: &str) -> Result<(String, u16)> {
    let Some((host, port)) = target.rsplit_once(':') else {
        bail!("Expected HOST:PORT, got '{}'", target);
    };
    if host.is_empty() {
        bail!("Missing host in '{}'", target);
    }
    let port = port
        .parse()
        .with_context(|| format!("Invalid port in '{}'", target))?;
    Ok((host.to_string(), port))
}
