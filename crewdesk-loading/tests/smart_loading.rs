use std::time::Duration;

use crewdesk_core::config::LoadingSettings;
use crewdesk_loading::{LoadingInputs, LoadingOptions, LoadingPhase, SmartLoading};

const LOADING: LoadingInputs = LoadingInputs {
    is_loading: true,
    is_fetching: true,
    has_data: false,
};
const LOADED: LoadingInputs = LoadingInputs {
    is_loading: false,
    is_fetching: false,
    has_data: true,
};
const REFETCHING: LoadingInputs = LoadingInputs {
    is_loading: false,
    is_fetching: true,
    has_data: true,
};

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn fast_response_never_shows_spinner() {
    let loading = SmartLoading::default();

    let signal = loading.update(LOADING);
    assert!(signal.is_initial_load);
    assert!(!signal.should_show_loading);
    assert_eq!(loading.phase(), LoadingPhase::Pending);

    sleep_ms(50).await;
    let signal = loading.update(LOADED);
    assert!(!signal.should_show_loading);
    assert!(!signal.is_initial_load);
    assert!(signal.has_loaded_once);
    assert_eq!(loading.phase(), LoadingPhase::Idle);

    sleep_ms(500).await;
    assert!(!loading.signal().should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn slow_response_shows_spinner_at_delay_mark() {
    let loading = SmartLoading::default();
    loading.update(LOADING);

    sleep_ms(199).await;
    assert!(!loading.signal().should_show_loading);

    sleep_ms(1).await;
    assert!(loading.signal().should_show_loading);
    assert_eq!(loading.phase(), LoadingPhase::Showing);

    sleep_ms(100).await;
    let signal = loading.update(LOADED);
    assert!(!signal.should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_the_delayed_signal() {
    let loading = SmartLoading::default();
    let mut signals = loading.subscribe();

    loading.update(LOADING);
    signals.changed().await.unwrap();
    assert!(signals.borrow_and_update().is_initial_load);
    assert!(!signals.borrow().should_show_loading);

    let start = tokio::time::Instant::now();
    signals.changed().await.unwrap();
    assert!(signals.borrow_and_update().should_show_loading);
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn interrupted_condition_restarts_the_delay() {
    let loading = SmartLoading::default();

    loading.update(LOADING);
    sleep_ms(150).await;
    loading.update(LoadingInputs::default());
    loading.update(LOADING);

    sleep_ms(100).await;
    assert!(!loading.signal().should_show_loading);
    sleep_ms(100).await;
    assert!(loading.signal().should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn background_refetch_is_silent_by_default() {
    let loading = SmartLoading::default();
    loading.update(LOADED);

    let signal = loading.update(REFETCHING);
    assert!(signal.is_background_refetch);
    assert!(!signal.is_initial_load);
    assert_eq!(loading.phase(), LoadingPhase::Idle);

    sleep_ms(1_000).await;
    assert!(!loading.signal().should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn background_refetch_can_be_shown() {
    let loading = SmartLoading::new(LoadingOptions::default().with_background_refetch(true));
    loading.update(LOADED);
    loading.update(REFETCHING);

    sleep_ms(200).await;
    assert!(loading.signal().should_show_loading);

    let signal = loading.update(LOADED);
    assert!(!signal.should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn loaded_once_never_resets() {
    let loading = SmartLoading::default();
    loading.update(LOADED);

    let signal = loading.update(LOADING);
    assert!(signal.has_loaded_once);
    assert!(!signal.is_initial_load);

    sleep_ms(500).await;
    assert!(!loading.signal().should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn non_data_queries_have_no_initial_load() {
    let loading = SmartLoading::new(LoadingOptions::default().not_a_data_query());

    let signal = loading.update(LOADING);
    assert!(!signal.is_initial_load);

    sleep_ms(500).await;
    assert!(!loading.signal().should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn zero_delay_shows_immediately() {
    let loading = SmartLoading::new(LoadingOptions::default().with_delay(Duration::ZERO));

    assert!(loading.update(LOADING).should_show_loading);
    assert!(!loading.update(LOADED).should_show_loading);
}

#[tokio::test(start_paused = true)]
async fn dropping_cancels_the_timer() {
    let loading = SmartLoading::default();
    let mut signals = loading.subscribe();
    loading.update(LOADING);
    signals.borrow_and_update();

    drop(loading);

    assert!(signals.changed().await.is_err());
    assert!(!signals.borrow().should_show_loading);
}

#[test]
fn delay_is_checked_on_read_without_runtime() {
    let loading = SmartLoading::new(LoadingOptions::default().with_delay(Duration::from_millis(5)));

    loading.update(LOADING);
    assert_eq!(loading.phase(), LoadingPhase::Pending);

    std::thread::sleep(Duration::from_millis(20));
    assert!(loading.signal().should_show_loading);
}

#[test]
fn options_from_settings() {
    let options = LoadingOptions::from(LoadingSettings {
        delay: Duration::from_millis(350),
        show_background_refetch: true,
    });
    assert!(options.is_data_query);
    assert_eq!(options.loading_delay, Duration::from_millis(350));
    assert!(options.show_background_refetch);
    assert_eq!(LoadingOptions::default().loading_delay, Duration::from_millis(200));
}
