use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crewdesk_cache::RetryPolicy;
use crewdesk_core::config::RetrySettings;
use crewdesk_core::{AppError, BackendError, ErrorKind};

#[test]
fn test_policy_from_settings() {
    assert_eq!(RetryPolicy::queries().max_retries(), 3);
    assert_eq!(RetryPolicy::mutations().max_retries(), 1);
    let policy = RetryPolicy::from(RetrySettings {
        max_retries: 2,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(150),
    });
    assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    assert_eq!(policy.delay_for(1), Duration::from_millis(150));
}

#[test]
fn test_should_retry() {
    let policy = RetryPolicy::queries();
    let network = AppError::new(ErrorKind::Network, "offline");
    let validation = AppError::new(ErrorKind::Validation, "bad");
    let not_found = AppError::normalize(BackendError::new("missing").with_status(404));

    assert!(policy.should_retry(0, &network));
    assert!(policy.should_retry(2, &network));
    assert!(!policy.should_retry(3, &network));
    assert!(!policy.should_retry(0, &validation));
    assert!(!policy.should_retry(0, &not_found));
    assert!(!RetryPolicy::none().should_retry(0, &network));
}

#[tokio::test(start_paused = true)]
async fn test_run_gives_up_after_budget() {
    let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_secs(1));
    let calls = AtomicUsize::new(0);

    let result: Result<(), AppError> = policy
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::new(ErrorKind::Network, "offline")) }
        })
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_between_attempts() {
    let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(30));
    let calls = AtomicUsize::new(0);
    let started = tokio::time::Instant::now();

    let result = policy
        .run(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AppError::new(ErrorKind::Network, "offline"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}
