use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use crewdesk::prelude::*;

fn backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new().with_latency(Duration::from_millis(300));
    backend.seed(
        "jobs",
        [
            json!({"id": "j1", "title": "Rewire kitchen", "status": "AVAILABLE", "organisation_id": "o1", "created_at": "2026-10-18T08:00:00Z"}),
            json!({"id": "j2", "title": "Fix boiler", "status": "COMPLETED", "organisation_id": "o1", "created_at": "2026-10-12T08:00:00Z"}),
        ],
    );
    backend
}

#[tokio::test(start_paused = true)]
async fn slow_board_shows_loading_then_relative_dates() {
    let layer = DataLayer::new(backend());
    let board = Arc::new(
        resources::jobs(&layer).list(resources::jobs_with_status(JobStatus::Available)),
    );
    let loading = SmartLoading::new(LoadingOptions::default());

    let task = tokio::spawn({
        let board = Arc::clone(&board);
        async move { board.load().await }
    });
    tokio::task::yield_now().await;
    assert!(!loading.update(&board.state()).should_show_loading);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(loading.signal().should_show_loading);

    let jobs = task.await.unwrap().unwrap();
    let signal = loading.update(&board.state());
    assert!(!signal.should_show_loading);
    assert!(signal.has_loaded_once);

    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let labels: Vec<_> = jobs
        .iter()
        .map(|job| format_relative_date(job.created_at, now))
        .collect();
    assert_eq!(labels, ["Yesterday"]);
}

#[tokio::test(start_paused = true)]
async fn facade_exposes_every_layer() {
    let layer = crewdesk::data::DataLayer::new(backend());
    let key = crewdesk::domain::resources::keys::<Job>().lists();
    assert_eq!(key.to_json(), json!(["jobs", "list"]));

    let job = resources::job(&layer).item("j2").load().await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        crewdesk::loading::DEFAULT_LOADING_DELAY,
        Duration::from_millis(200)
    );
}
