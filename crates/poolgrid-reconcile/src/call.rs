//! Guarded provider calls.
//!
//! Every provider call made by an ensure step goes through
//! [`StepEnv::call`], which bounds it with the per-call timeout, retries
//! retryable failures within the retry budget and checks the cancellation
//! token before each mutating attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use poolgrid_provider::{CallOp, ProviderError, ProviderGateway, ProviderResult, ResourceKind, RetryConfig};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::{ReconcileError, ReconcileResult};

/// Everything an ensure step needs to talk to the provider.
///
/// Cheap to clone; each instance task gets its own copy.
#[derive(Clone)]
pub struct StepEnv {
    pub provider: Arc<dyn ProviderGateway>,
    pub call_timeout: Duration,
    pub retry: RetryConfig,
    pub cancel: CancelToken,
}

impl StepEnv {
    pub fn new(provider: Arc<dyn ProviderGateway>) -> Self {
        Self {
            provider,
            call_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Issue `call` until it succeeds, fails for good, or the retry budget
    /// is spent.
    pub async fn call<T, F, Fut>(
        &self,
        op: CallOp,
        kind: ResourceKind,
        name: &str,
        call: F,
    ) -> ReconcileResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if op == CallOp::Create {
                self.cancel.check()?;
            }

            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "no answer within {}ms",
                    self.call_timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        %kind,
                        name,
                        ?op,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(ReconcileError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(ReconcileError::provider(kind, name, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_core::ErrorKind;
    use poolgrid_provider::SimulatedProvider;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn env() -> StepEnv {
        StepEnv::new(Arc::new(SimulatedProvider::new()))
            .with_call_timeout(Duration::from_millis(50))
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            })
    }

    #[tokio::test]
    async fn timeouts_are_retried_within_budget() {
        let env = env();
        let attempts = AtomicU32::new(0);
        let value = env
            .call(CallOp::Create, ResourceKind::PublicIp, "pip", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Timeout("slow".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_a_provider_timeout() {
        let env = env();
        let attempts = AtomicU32::new(0);
        let err = env
            .call(CallOp::Get, ResourceKind::PublicIp, "pip", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::Timeout("slow".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderTimeout);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn elapsed_timeout_counts_as_provider_timeout() {
        let env = env().with_retry(RetryConfig::none());
        let err = env
            .call(CallOp::Get, ResourceKind::VirtualMachine, "vm", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ProviderError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderTimeout);
    }

    #[tokio::test]
    async fn rejections_are_not_retried() {
        let env = env();
        let attempts = AtomicU32::new(0);
        let err = env
            .call(CallOp::Create, ResourceKind::VirtualMachine, "vm", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::Rejected("quota".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderError);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_blocks_mutating_calls_only() {
        let env = env();
        env.cancel.cancel();
        let attempts = AtomicU32::new(0);

        let err = env
            .call(CallOp::Create, ResourceKind::PublicIp, "pip", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        env.call(CallOp::Get, ResourceKind::PublicIp, "pip", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff_sleep() {
        let env = env().with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        });
        let cancel = env.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let attempts = AtomicU32::new(0);
        let started = std::time::Instant::now();
        let err = env
            .call(CallOp::Get, ResourceKind::PublicIp, "pip", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::Timeout("slow".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
