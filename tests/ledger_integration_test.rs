//! End-to-end tests for the audit ledger over a SQLite store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::SqlitePool;

use audit_ledger::store::SqliteLedgerStore;
use audit_ledger::{
    ActorType, AppendRequest, AuditLedgerService, EntryFilter, Persistence, Source,
    VerificationMode,
};

async fn sqlite_service() -> (Arc<AuditLedgerService>, SqlitePool) {
    let store = SqliteLedgerStore::connect("sqlite::memory:", Duration::from_secs(5))
        .await
        .expect("connect in-memory sqlite");
    let pool = store.pool().clone();
    let service = Arc::new(AuditLedgerService::new(Arc::new(store)));
    (service, pool)
}

fn project_request(action: &str) -> AppendRequest {
    AppendRequest::new(
        "u1",
        ActorType::User,
        action,
        "project",
        "p1",
        Source::Web,
    )
    .with_project("p1")
    .with_payload(json!({"action": action}))
    .unwrap()
    .with_request_metadata(Some("10.0.0.1".to_string()), Some("s-1".to_string()))
}

#[tokio::test]
async fn test_three_entry_scenario() {
    let (service, _pool) = sqlite_service().await;

    for action in ["project.create", "project.update", "project.delete"] {
        let outcome = service.append(project_request(action)).await.unwrap();
        assert!(outcome.is_persisted());
    }

    let report = service.verify_chain(None, None).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.mode, VerificationMode::Full);
    assert_eq!(report.checked_count, 3);

    let filter = EntryFilter {
        project_id: Some("p1".to_string()),
        ..Default::default()
    };
    let page = service.get_entries(filter).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.entries.len(), 3);
    // Newest first.
    assert_eq!(page.entries[0].action, "project.delete");
    assert_eq!(page.entries[2].action, "project.create");
}

#[tokio::test]
async fn test_direct_storage_tampering_is_detected() {
    let (service, pool) = sqlite_service().await;

    let mut appended = Vec::new();
    for action in ["project.create", "project.update", "project.delete"] {
        appended.push(service.append(project_request(action)).await.unwrap().entry);
    }

    // Mutate a persisted payload behind the service's back.
    sqlx::query("UPDATE ledger_entries SET payload = ?1 WHERE sequence_id = 1")
        .bind(r#"{"action":"project.update","amount":999999}"#)
        .execute(&pool)
        .await
        .unwrap();

    let report = service.verify_chain(None, None).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.mode, VerificationMode::Full);
    assert_eq!(report.checked_count, 1);
    assert_eq!(report.broken_at_sequence_id, Some(1));
    assert_eq!(
        report.broken_at_entry_id.as_deref(),
        Some(appended[1].entry_id.as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_stay_gap_free() {
    let (service, _pool) = sqlite_service().await;
    let task_count = 50;

    let mut handles = Vec::new();
    for i in 0..task_count {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let request = AppendRequest::new(
                format!("u{}", i % 5),
                ActorType::ApiKey,
                "task.update",
                "task",
                format!("t{}", i),
                Source::Api,
            )
            .with_project("p1")
            .with_payload(json!({"task": i}))
            .unwrap();
            service.append(request).await.unwrap()
        }));
    }

    let mut sequence_ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.is_persisted());
        assert!(sequence_ids.insert(outcome.entry.sequence_id));
    }

    assert_eq!(sequence_ids.len(), task_count);
    assert_eq!(*sequence_ids.iter().min().unwrap(), 0);
    assert_eq!(*sequence_ids.iter().max().unwrap(), task_count as i64 - 1);

    let report = service.verify_chain(None, None).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.mode, VerificationMode::Full);
    assert_eq!(report.checked_count, task_count);
}

#[tokio::test]
async fn test_filtered_verification_never_reports_full() {
    let (service, _pool) = sqlite_service().await;

    for (action, project) in [
        ("project.create", "p1"),
        ("project.create", "p2"),
        ("project.update", "p1"),
    ] {
        let request = AppendRequest::new(
            "u1",
            ActorType::User,
            action,
            "project",
            project,
            Source::Web,
        )
        .with_project(project);
        service.append(request).await.unwrap();
    }

    let report = service.verify_chain(Some("p1"), None).await.unwrap();
    assert_eq!(report.mode, VerificationMode::Structural);
    assert!(report.valid);
    assert_eq!(report.checked_count, 2);

    let since = chrono::Utc::now() - chrono::Duration::hours(1);
    let report = service.verify_chain(None, Some(since)).await.unwrap();
    assert_eq!(report.mode, VerificationMode::Structural);
}

#[tokio::test]
async fn test_append_survives_store_outage() {
    let (service, pool) = sqlite_service().await;
    pool.close().await;

    let outcome = service.append(project_request("project.create")).await.unwrap();
    assert!(!outcome.is_persisted());
    assert_eq!(outcome.entry.entry_hash.len(), 64);
    assert!(!outcome.entry.entry_id.is_empty());
    assert!(matches!(
        outcome.persistence,
        Persistence::Unpersisted { .. }
    ));
}

#[tokio::test]
async fn test_head_recovers_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let database_url = format!(
        "sqlite://{}",
        dir.path().join("ledger.db").to_string_lossy()
    );

    {
        let store = SqliteLedgerStore::connect(&database_url, Duration::from_secs(5))
            .await
            .unwrap();
        let service = AuditLedgerService::new(Arc::new(store));
        service.append(project_request("project.create")).await.unwrap();
        service.append(project_request("project.update")).await.unwrap();
    }

    // A fresh process picks the chain up from the stored head.
    let store = SqliteLedgerStore::connect(&database_url, Duration::from_secs(5))
        .await
        .unwrap();
    let service = AuditLedgerService::new(Arc::new(store));
    let outcome = service.append(project_request("project.delete")).await.unwrap();
    assert!(outcome.is_persisted());
    assert_eq!(outcome.entry.sequence_id, 2);

    let report = service.verify_chain(None, None).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.checked_count, 3);
}

#[tokio::test]
async fn test_get_entries_combines_filters() {
    let (service, _pool) = sqlite_service().await;

    for i in 0..4 {
        let request = AppendRequest::new(
            if i % 2 == 0 { "u1" } else { "u2" },
            ActorType::User,
            "task.update",
            "task",
            format!("t{}", i),
            Source::Web,
        )
        .with_project("p1");
        service.append(request).await.unwrap();
    }

    let filter = EntryFilter {
        project_id: Some("p1".to_string()),
        actor_id: Some("u1".to_string()),
        ..Default::default()
    };
    let page = service.get_entries(filter).await.unwrap();
    assert_eq!(page.total, 2);

    let filter = EntryFilter {
        entity_type: Some("task".to_string()),
        entity_id: Some("t3".to_string()),
        ..Default::default()
    };
    let page = service.get_entries(filter).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].actor_id, "u2");
}
