//! Pure retry/backoff calculations (§4.3).

use std::time::Duration;

use tokio::sync::watch;

use crate::domain::models::RetryPolicy;

pub const BACKOFF_CEILING_MS: u64 = 60_000;

/// `count < effective.maxRetries`.
pub fn should_retry(count: u32, policy: Option<&RetryPolicy>) -> bool {
    let max_retries = policy.map(|p| p.max_retries).unwrap_or(RetryPolicy::default().max_retries);
    count < max_retries
}

/// `min(base · multiplier^count, ceiling)`.
pub fn get_backoff_ms(count: u32, policy: Option<&RetryPolicy>) -> u64 {
    let default = RetryPolicy::default();
    let policy = policy.unwrap_or(&default);
    let backoff = policy.backoff_ms as f64 * policy.backoff_multiplier.powi(count as i32);
    if backoff.is_finite() {
        (backoff as u64).min(BACKOFF_CEILING_MS)
    } else {
        BACKOFF_CEILING_MS
    }
}

/// Sleeps for `getBackoffMs(count, policy)`, cooperatively cancellable via
/// `shutdown` (fired by scheduler shutdown).
pub async fn wait_for_retry(count: u32, policy: Option<&RetryPolicy>, shutdown: &mut watch::Receiver<bool>) {
    let backoff = Duration::from_millis(get_backoff_ms(count, policy));
    tokio::select! {
        _ = tokio::time::sleep(backoff) => {}
        _ = shutdown.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retry_respects_default_max() {
        assert!(should_retry(0, None));
        assert!(should_retry(2, None));
        assert!(!should_retry(3, None));
    }

    #[test]
    fn should_retry_respects_custom_policy() {
        let policy = RetryPolicy { max_retries: 1, backoff_ms: 500, backoff_multiplier: 2.0 };
        assert!(should_retry(0, Some(&policy)));
        assert!(!should_retry(1, Some(&policy)));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps_at_ceiling() {
        assert_eq!(get_backoff_ms(0, None), 1000);
        assert_eq!(get_backoff_ms(1, None), 2000);
        assert_eq!(get_backoff_ms(2, None), 4000);
        assert_eq!(get_backoff_ms(20, None), BACKOFF_CEILING_MS);
    }

    #[tokio::test]
    async fn wait_for_retry_returns_immediately_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let policy = RetryPolicy { max_retries: 3, backoff_ms: 60_000, backoff_multiplier: 1.0 };
        let wait = tokio::spawn(async move {
            wait_for_retry(0, Some(&policy), &mut rx).await;
        });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), wait).await.unwrap().unwrap();
    }
}
