// PromptChain — Reply completion detection by polling the surface

use super::Timing;
use crate::surface::{SurfaceLocator, TargetSurface};
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The surface went idle after `polls` checks.
    Done { polls: u32 },
    /// The configured maximum wait elapsed while the surface was still busy.
    TimedOut { waited: Duration },
}

/// Waits for the chat surface to stop producing output.
///
/// Idle means: no busy indicator is present, and an input can be located and
/// is not disabled. Dropping the future returned by [`wait`](Self::wait)
/// cancels any pending poll.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    locator: SurfaceLocator,
    timing: Timing,
}

impl CompletionDetector {
    pub fn new(locator: SurfaceLocator, timing: Timing) -> Self {
        Self { locator, timing }
    }

    pub async fn wait(&self, surface: &dyn TargetSurface) -> Completion {
        let started = Instant::now();
        tracing::debug!("Waiting for response...");
        sleep(self.timing.initial_delay).await;

        let mut polls = 0;
        loop {
            polls += 1;
            if self.is_idle(surface).await {
                tracing::debug!(polls, elapsed_ms = %started.elapsed().as_millis(), "Response completed");
                return Completion::Done { polls };
            }

            if let Some(max_wait) = self.timing.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    tracing::warn!(polls, waited_ms = %waited.as_millis(), "Gave up waiting for response");
                    return Completion::TimedOut { waited };
                }
            }

            tracing::trace!(polls, "Still waiting for response...");
            sleep(self.timing.poll_interval).await;
        }
    }

    /// One poll of both signals.
    pub async fn is_idle(&self, surface: &dyn TargetSurface) -> bool {
        if self.locator.is_busy(surface).await {
            return false;
        }
        match self.locator.locate(surface).await {
            Some(input) => !surface.is_disabled(&input).await,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
