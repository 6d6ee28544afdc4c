use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::extraction::{extract_command_output, Extracted};
use crate::models::{ProviderKind, TrackedItem};
use crate::plugins::traits::PriceProvider;
use crate::utils::error::{ExtractionError, ProviderError};

/// Placeholder replaced with the item URL in each command token.
pub const URL_PLACEHOLDER: &str = "{url}";

const STDERR_LIMIT: usize = 512;

/// Runs an external program that prints one JSON price record on stdout.
///
/// The template is split with POSIX shell quoting rules and executed directly,
/// without a shell.
/// The child is killed if the fetch future is dropped (timeout or shutdown).
#[derive(Debug, Default, Clone)]
pub struct CommandProvider;

impl CommandProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Tokenise `template` like a shell would, then substitute the URL per token.
/// The URL itself is never re-split, whatever it contains.
pub fn build_argv(template: &str, url: &str) -> Result<Vec<String>, ProviderError> {
    let tokens = shell_words::split(template).map_err(|e| {
        ProviderError::InvalidTarget(format!("cannot parse command template '{}': {}", template, e))
    })?;
    let argv: Vec<String> = tokens
        .into_iter()
        .map(|token| token.replace(URL_PLACEHOLDER, url))
        .collect();

    if argv.is_empty() {
        return Err(ProviderError::InvalidTarget("empty command template".into()));
    }
    Ok(argv)
}

#[async_trait]
impl PriceProvider for CommandProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Command
    }

    async fn fetch(&self, item: &TrackedItem) -> Result<String, ProviderError> {
        let template = item.command.as_deref().ok_or_else(|| {
            ProviderError::InvalidTarget(format!("item {} has no command", item.id))
        })?;
        let argv = build_argv(template, &item.url)?;
        let program = argv[0].clone();

        tracing::debug!("Running {} for item {}", program, item.id);

        let output = Command::new(&program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProviderError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(STDERR_LIMIT)
                .collect();
            return Err(ProviderError::ProcessExit {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn extract(&self, raw: &str, item: &TrackedItem) -> Result<Extracted, ExtractionError> {
        extract_command_output(raw, &item.rule)
    }
}
