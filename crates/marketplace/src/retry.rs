use std::future::Future;

use crate::error::Result;

/// Runs a unit of work, starting over while it fails with a retryable conflict.
pub(crate) async fn with_retries<T, F, Fut>(
    max_attempts: u32,
    operation: &'static str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(err) if err.is_retryable() && tries < max_attempts => {
                tracing::warn!(operation, attempt = tries, error = %err, "retrying after conflict");
                metrics::counter!("unit_of_work_retries_total", "operation" => operation)
                    .increment(1);
                tries += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketplaceError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use store::StoreError;

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(MarketplaceError::from(StoreError::Conflict("busy".into())))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(2, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MarketplaceError::from(StoreError::Conflict("busy".into())))
        })
        .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(5, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MarketplaceError::CartEmpty)
        })
        .await;
        assert!(matches!(result, Err(MarketplaceError::CartEmpty)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
