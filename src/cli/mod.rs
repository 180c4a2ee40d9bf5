//! Ambient CLI surface (§6a): the minimal composition root a faithful
//! implementation needs even though the HTTP front door is out of scope.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::runtime::RuntimeContext;

#[derive(Debug, Parser)]
#[command(name = "controlplane", version, about = "Headless browser-automation control plane")]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,

    /// Path to a YAML config file, overriding the default hierarchical lookup.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Run the Task Queue scheduler, LLM Router self-learner, and Adaptive
    /// Memory Optimizer as background workers until interrupted.
    Run,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration file"),
            None => ConfigLoader::load(),
        }
    }

    pub async fn dispatch(self) -> Result<()> {
        let config = self.load_config()?;
        let _logger = LoggerImpl::init(&LogConfig::from(&config.logging)).context("failed to initialize logger")?;

        match self.mode {
            Mode::Run => {
                let runtime = RuntimeContext::init(config).await.context("failed to initialize runtime")?;
                runtime.run_until_shutdown().await
            }
        }
    }
}
