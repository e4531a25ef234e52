use std::time::Duration;

/// Side effect run before each retry of a failed call.
pub trait RetryHook {
    fn before_retry(&self, attempt: u32, err: &anyhow::Error);
}

/// Fixed-delay retry: every error is retried until `max_attempts` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn run<T>(
        &self,
        hook: &dyn RetryHook,
        mut op: impl FnMut() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, max_attempts, error = %format!("{err:#}"), "call failed; retrying");
                    hook.before_retry(attempt, &err);
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
