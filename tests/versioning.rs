use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use page_engine::error::AppError;
use page_engine::infrastructure::{InMemoryRegistry, WidgetTypeRegistry};
use page_engine::models::{CreatePage, PageId, PublicationSchedule, VersionDraft, Widget};
use page_engine::PageEngine;

async fn engine() -> PageEngine {
    page_engine::init_tracing();
    let mut widget_types = WidgetTypeRegistry::new();
    widget_types.register("text", vec!["content".to_string()]);
    widget_types.register("menu", vec![]);
    PageEngine::in_memory(Arc::new(InMemoryRegistry::new()), Arc::new(widget_types))
        .await
        .unwrap()
}

async fn make_page(engine: &PageEngine, slug: &str) -> PageId {
    engine
        .pages
        .create_page(CreatePage::new(None, slug))
        .await
        .unwrap()
        .page
        .id
}

#[tokio::test]
async fn version_numbers_are_consecutive() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;

    for expected in 1..=3 {
        let version = engine
            .create_version(page_id, "alice", VersionDraft::default())
            .await
            .unwrap();
        assert_eq!(version.version_number, expected);
    }
    let latest = engine.versions.latest(page_id).await.unwrap().unwrap();
    assert_eq!(latest.version_number, 3);
}

#[tokio::test]
async fn concurrent_version_creation_yields_distinct_numbers() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;

    let svc_a = engine.versions.clone();
    let svc_b = engine.versions.clone();
    let a = tokio::spawn(async move {
        svc_a
            .create_version(page_id, "alice", VersionDraft::default())
            .await
    });
    let b = tokio::spawn(async move {
        svc_b
            .create_version(page_id, "bob", VersionDraft::default())
            .await
    });

    let va = a.await.unwrap().unwrap();
    let vb = b.await.unwrap().unwrap();
    let mut numbers = vec![va.version_number, vb.version_number];
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn publish_is_reported_when_already_published() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;
    let version = engine
        .create_version(page_id, "alice", VersionDraft::default())
        .await
        .unwrap();

    let published = engine.publish_version(version.id).await.unwrap();
    assert!(published.effective_date.is_some());
    assert!(published.expiry_date.is_none());

    let err = engine.publish_version(version.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyPublished { .. }));
}

#[tokio::test]
async fn superseded_versions_are_immutable() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;
    let v1 = engine
        .create_version(page_id, "alice", VersionDraft::default())
        .await
        .unwrap();
    engine
        .create_version(page_id, "alice", VersionDraft::default())
        .await
        .unwrap();

    let err = engine
        .versions
        .update_draft(v1.id, VersionDraft::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn superseded_versions_cannot_be_published() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;
    let v1 = engine
        .create_version(page_id, "alice", VersionDraft::default())
        .await
        .unwrap();
    let v2 = engine
        .create_version(page_id, "alice", VersionDraft::default())
        .await
        .unwrap();

    // Stamping dates onto superseded history is as much a mutation as
    // editing its content.
    let err = engine.publish_version(v1.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let unchanged = engine.versions.get_version(v1.id).await.unwrap();
    assert!(unchanged.effective_date.is_none());

    assert!(engine.publish_version(v2.id).await.is_ok());
}

#[tokio::test]
async fn schedule_rejects_past_effective_date() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;
    let now = Utc::now();

    let past = PublicationSchedule::new(Some(now - Duration::hours(1)), None).unwrap();
    let err = engine.schedule(page_id, past, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSchedule(_)));

    let future = PublicationSchedule::new(
        Some(now + Duration::hours(1)),
        Some(now + Duration::hours(2)),
    )
    .unwrap();
    let version = engine.schedule(page_id, future, "alice").await.unwrap();
    assert_eq!(version.effective_date, future.effective_date);
    assert_eq!(version.expiry_date, future.expiry_date);
}

#[tokio::test]
async fn widget_validation_runs_at_write_time() {
    let engine = engine().await;
    let page_id = make_page(&engine, "home").await;

    let unknown = VersionDraft::default().with_widgets(vec![Widget::new("carousel", "main", 0)]);
    assert!(matches!(
        engine.create_version(page_id, "alice", unknown).await,
        Err(AppError::Validation(_))
    ));

    let missing_field = VersionDraft::default().with_widgets(vec![Widget::new("text", "main", 0)]);
    assert!(matches!(
        engine.create_version(page_id, "alice", missing_field).await,
        Err(AppError::Validation(_))
    ));

    let duplicate_id = VersionDraft::default().with_widgets(vec![
        Widget::new("menu", "header", 0).with_id("w1"),
        Widget::new("menu", "footer", 0).with_id("w1"),
    ]);
    assert!(matches!(
        engine.create_version(page_id, "alice", duplicate_id).await,
        Err(AppError::Validation(_))
    ));

    let duplicate_order = VersionDraft::default().with_widgets(vec![
        Widget::new("menu", "header", 0),
        Widget::new("menu", "header", 0),
    ]);
    assert!(matches!(
        engine.create_version(page_id, "alice", duplicate_order).await,
        Err(AppError::Validation(_))
    ));

    let valid = VersionDraft::default().with_widgets(vec![
        Widget::new("text", "main", 0).with_configuration(json!({"content": "hello"})),
        Widget::new("menu", "header", 0),
    ]);
    assert!(engine.create_version(page_id, "alice", valid).await.is_ok());
}

#[tokio::test]
async fn bulk_schedule_with_invalid_window_mutates_nothing() {
    let engine = engine().await;
    let p1 = make_page(&engine, "p1").await;
    let p2 = make_page(&engine, "p2").await;
    let p3 = make_page(&engine, "p3").await;
    let now = Utc::now();

    // expiry before effective: internally invalid
    let bad = PublicationSchedule {
        effective_date: Some(now + Duration::hours(2)),
        expiry_date: Some(now + Duration::hours(1)),
    };
    let err = engine
        .bulk_schedule(&[p1, p2, p3], bad, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidSchedule(_)));

    for page_id in [p1, p2, p3] {
        assert!(engine.versions.versions(page_id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn bulk_publish_collects_per_page_failures() {
    let engine = engine().await;
    let p1 = make_page(&engine, "p1").await;
    let p2 = make_page(&engine, "p2").await;
    let missing: PageId = 9999;

    let report = engine.bulk_publish(&[p1, missing, p2], "alice").await.unwrap();
    assert_eq!(report.count, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, missing);

    let now = Utc::now();
    for page_id in [p1, p2] {
        let current = engine
            .versions
            .current_published(page_id, now)
            .await
            .unwrap();
        assert!(current.is_some());
    }
}

#[tokio::test]
async fn bulk_schedule_stamps_every_page() {
    let engine = engine().await;
    let p1 = make_page(&engine, "p1").await;
    let p2 = make_page(&engine, "p2").await;
    let now = Utc::now();
    let schedule = PublicationSchedule::new(
        Some(now + Duration::hours(1)),
        Some(now + Duration::hours(3)),
    )
    .unwrap();

    let report = engine.bulk_schedule(&[p1, p2], schedule, "alice").await.unwrap();
    assert_eq!(report.count, 2);
    assert!(report.errors.is_empty());

    // Not yet effective now, effective inside the window.
    assert!(engine
        .versions
        .current_published(p1, now)
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .versions
        .current_published(p1, now + Duration::hours(2))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sweeps_report_due_transitions_without_writing() {
    let engine = engine().await;
    let live = make_page(&engine, "live").await;
    let stale = make_page(&engine, "stale").await;
    let now = Utc::now();

    // One page went live yesterday, one expired an hour ago.
    engine
        .create_version(
            live,
            "alice",
            VersionDraft::default().effective_at(now - Duration::days(1)),
        )
        .await
        .unwrap();
    engine
        .create_version(
            stale,
            "alice",
            VersionDraft::default()
                .effective_at(now - Duration::days(2))
                .expires_at(now - Duration::hours(1)),
        )
        .await
        .unwrap();

    let publications = engine.scheduling.process_due_publications(now).await.unwrap();
    assert_eq!(publications.processed, 1);
    assert!(publications.errors.is_empty());

    let expirations = engine.scheduling.process_due_expirations(now).await.unwrap();
    assert_eq!(expirations.processed, 1);

    // Sweeps never mutate: the expired version still carries its dates.
    let version = engine.versions.latest(stale).await.unwrap().unwrap();
    assert!(version.expiry_date.is_some());
}
