use crate::utils::error::{DocCrewError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 第一次失敗後最多再試幾次
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        let scaled = current.as_secs_f64() * f64::from(self.backoff_multiplier.max(1.0));
        Duration::try_from_secs_f64(scaled).unwrap_or(max).min(max)
    }
}

/// 執行 operation，遇到可重試的錯誤時依 policy 退避重試
pub async fn execute_with_retry<T, Op, Fut>(policy: &RetryPolicy, label: &str, mut operation: Op) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(policy.initial_delay_ms);

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < policy.max_retries && error.is_retryable() => {
                attempt += 1;
                tracing::warn!(
                    "🔁 {} failed with retryable error (attempt {}/{}), retrying in {:?}: {}",
                    label,
                    attempt,
                    policy.max_retries,
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
            Err(error) => return Err(error),
        }
    }
}

/// 把非 2xx 回應轉成 ProviderError，保留狀態碼與回應內容
pub async fn ensure_success(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DocCrewError::ProviderError {
        provider: provider.to_string(),
        status: Some(status.as_u16()),
        message: body.chars().take(500).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        }
    }

    fn throttled() -> DocCrewError {
        DocCrewError::ProviderError {
            provider: "test".to_string(),
            status: Some(429),
            message: "slow down".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&fast_policy(3), "test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(throttled())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute_with_retry(&fast_policy(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(throttled()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute_with_retry(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DocCrewError::ProviderError {
                    provider: "test".to_string(),
                    status: Some(400),
                    message: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay_ms: 1_000,
            ..RetryPolicy::default()
        };
        let next = policy.next_delay(Duration::from_millis(800));
        assert_eq!(next, Duration::from_millis(1_000));
    }

    #[test]
    fn test_huge_multiplier_falls_back_to_max_delay() {
        let max = Duration::from_millis(8_000);
        for backoff_multiplier in [f32::INFINITY, f32::NAN, 1e30] {
            let policy = RetryPolicy {
                backoff_multiplier,
                ..RetryPolicy::default()
            };
            assert_eq!(policy.next_delay(Duration::from_millis(1)), max);
        }
    }
}
