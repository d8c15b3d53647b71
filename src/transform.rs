//! Downstream transformation trigger.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use crate::config::TransformConfig;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {output}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

#[async_trait]
pub trait Transformer: Send + Sync {
    /// Build staging, intermediate and mart models from the bronze table.
    async fn run_models(&self) -> Result<(), TransformError>;

    /// Run the transformation layer's data tests.
    async fn run_tests(&self) -> Result<(), TransformError>;
}

/// Runs the configured shell commands inside the project directory.
pub struct CommandTransformer {
    project_dir: PathBuf,
    run_command: String,
    test_command: String,
}

impl CommandTransformer {
    pub fn new(project_dir: PathBuf, run_command: String, test_command: String) -> Self {
        Self {
            project_dir,
            run_command,
            test_command,
        }
    }

    async fn run(&self, command: &str) -> Result<(), TransformError> {
        info!("Running `{}` in {}", command, self.project_dir.display());

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.project_dir)
            .output()
            .await
            .map_err(|source| TransformError::Launch {
                command: command.to_string(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            error!("`{}` failed: {}", command, tail(&text, 20));
            return Err(TransformError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                output: tail(&text, 20),
            });
        }

        info!("`{}` finished", command);
        Ok(())
    }
}

#[async_trait]
impl Transformer for CommandTransformer {
    async fn run_models(&self) -> Result<(), TransformError> {
        self.run(&self.run_command).await
    }

    async fn run_tests(&self) -> Result<(), TransformError> {
        self.run(&self.test_command).await
    }
}

/// Used when no transformation project is configured.
pub struct SkipTransformer;

#[async_trait]
impl Transformer for SkipTransformer {
    async fn run_models(&self) -> Result<(), TransformError> {
        info!("No transformation project configured, skipping models");
        Ok(())
    }

    async fn run_tests(&self) -> Result<(), TransformError> {
        info!("No transformation project configured, skipping tests");
        Ok(())
    }
}

/// Pick the transformer for a configuration.
pub fn from_config(config: &TransformConfig) -> Box<dyn Transformer> {
    match &config.project_dir {
        Some(dir) => Box::new(CommandTransformer::new(
            dir.clone(),
            config.run_command.clone(),
            config.test_command.clone(),
        )),
        None => Box::new(SkipTransformer),
    }
}

/// Last `lines` lines of command output.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
