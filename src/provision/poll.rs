// ABOUTME: Bounded wait for a stack to reach a terminal status.
// ABOUTME: Consecutive transient describe failures are retried up to a budget, then surfaced.

use std::time::Duration;
use tokio::time::Instant;

use super::error::{ProvisionError, Result};
use super::services::{ServiceError, StackDescription, StackService};
use crate::config::StackPolling;

/// How long and how often to poll, and whether to poll at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_transient_retries: u32,
    /// Return right after the mutating call instead of waiting.
    pub skip_wait: bool,
}

impl PollSettings {
    pub fn from_config(polling: &StackPolling, skip_wait: bool) -> Self {
        Self {
            interval: polling.interval,
            timeout: polling.timeout,
            max_transient_retries: polling.max_transient_retries,
            skip_wait,
        }
    }
}

/// Poll `stack` until its status is terminal.
///
/// Returns `None` when the stack no longer exists, which ends a delete.
pub async fn wait_for_terminal(
    service: &dyn StackService,
    stack: &str,
    settings: &PollSettings,
) -> Result<Option<StackDescription>> {
    let started = Instant::now();
    let mut transient_failures = 0u32;

    loop {
        match service.describe_stack(stack).await {
            Ok(description) if description.status.is_terminal() => {
                tracing::debug!(stack, status = %description.status, "stack settled");
                return Ok(Some(description));
            }
            Ok(description) => {
                transient_failures = 0;
                tracing::debug!(stack, status = %description.status, "waiting for stack");
            }
            Err(ServiceError::NotFound(_)) => return Ok(None),
            Err(e) if e.is_transient() => {
                transient_failures += 1;
                if transient_failures > settings.max_transient_retries {
                    return Err(ProvisionError::PollExhausted {
                        stack: stack.to_string(),
                        attempts: transient_failures,
                        source: e,
                    });
                }
                tracing::warn!(stack, attempt = transient_failures, error = %e, "transient polling failure");
            }
            Err(source) => {
                return Err(ProvisionError::Remote {
                    stack: stack.to_string(),
                    operation: "describe",
                    source,
                });
            }
        }

        if started.elapsed() >= settings.timeout {
            return Err(ProvisionError::Timeout {
                stack: stack.to_string(),
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(settings.interval).await;
    }
}
