//! Integration tests for recording completed sessions with the backend.
//!
//! Runs the controller end to end against a mockito server standing in for
//! `POST /sessions`.

use hatchery_core::unlock::LEDGER_KEY;
use hatchery_core::{
    bootstrap, Catalog, Config, Database, Event, HttpSessionRecorder, ManualClock, RemoteConfig,
    SessionController, StaticToken, TimerConfig,
};
use std::sync::Arc;

fn config(base_url: String) -> Config {
    Config {
        timer: TimerConfig {
            seconds_per_minute: 1,
            ..TimerConfig::default()
        },
        remote: RemoteConfig {
            base_url,
            timeout_secs: 5,
        },
    }
}

fn recorder(config: &Config) -> HttpSessionRecorder {
    HttpSessionRecorder::new(&config.remote, Arc::new(StaticToken("secret".into()))).unwrap()
}

fn complete(ctrl: &mut SessionController, clock: &ManualClock, minutes: u32) -> Event {
    let item = ctrl.next_available().unwrap();
    ctrl.begin().unwrap();
    ctrl.select_duration(minutes).unwrap();
    ctrl.select_item(item).unwrap();
    ctrl.link_task(Some(42)).unwrap();
    ctrl.start().unwrap();
    clock.advance_secs(i64::from(minutes));
    ctrl.tick().expect("session should complete")
}

#[tokio::test]
async fn completed_session_is_recorded_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/sessions")
        .match_header("authorization", "Bearer secret")
        .match_header("idempotency-key", mockito::Matcher::Any)
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "duration_minutes": 25,
            "task_id": 42
        })))
        .with_status(201)
        .with_body(r#"{"coins_earned": 30, "session_id": 7}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config(format!("{}/api", server.url()));
    let db = Arc::new(Database::open_memory().unwrap());
    let clock = ManualClock::default();
    let mut ctrl = bootstrap(db, &config, &Catalog::default(), Arc::new(clock.clone()));

    let event = complete(&mut ctrl, &clock, 25);
    assert!(matches!(event, Event::SessionCompleted { reward: 30, .. }));

    let report = ctrl.outbox().reconcile(&recorder(&config)).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.delivered.len(), 1);
    assert!(!report.delivered[0].diverges());
    assert!(ctrl.outbox().pending().unwrap().is_empty());

    // A second pass has nothing left to send.
    let report = ctrl.outbox().reconcile(&recorder(&config)).await.unwrap();
    assert!(report.delivered.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn completion_event_is_delivered_directly() {
    let mut server = mockito::Server::new_async().await;
    let clock = ManualClock::default();
    let db = Arc::new(Database::open_memory().unwrap());
    let config = config(format!("{}/api", server.url()));
    let mut ctrl = bootstrap(db, &config, &Catalog::default(), Arc::new(clock.clone()));

    let pending = match complete(&mut ctrl, &clock, 50) {
        Event::SessionCompleted { pending, reward, .. } => {
            assert_eq!(reward, 65);
            assert_eq!(pending.local_reward, 65);
            pending
        }
        other => panic!("Expected SessionCompleted, got {other:?}"),
    };

    let mock = server
        .mock("POST", "/api/sessions")
        .match_header("idempotency-key", pending.idempotency_key.as_str())
        .with_status(201)
        .with_body(r#"{"coins_earned": 65}"#)
        .expect(1)
        .create_async()
        .await;

    let recorded = ctrl
        .outbox()
        .deliver(&recorder(&config), &pending)
        .await
        .unwrap();
    assert_eq!(recorded.item_id, 1);
    assert_eq!(recorded.coins_earned, 65);
    assert!(ctrl.outbox().pending().unwrap().is_empty());

    // Nothing left for the startup pass.
    let report = ctrl.outbox().reconcile(&recorder(&config)).await.unwrap();
    assert!(report.delivered.is_empty() && report.failed.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn backend_failure_keeps_unlock_and_retries_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hatchery.db");
    let clock = ManualClock::default();

    let key = {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/api/sessions")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let config = config(format!("{}/api/", server.url()));
        let db = Arc::new(Database::open_at(&path).unwrap());
        let mut ctrl = bootstrap(db.clone(), &config, &Catalog::default(), Arc::new(clock.clone()));
        complete(&mut ctrl, &clock, 10);

        let report = ctrl.outbox().reconcile(&recorder(&config)).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("503"));
        failing.assert_async().await;

        // The unlock stands regardless of the backend.
        assert_eq!(db.kv_get(LEDGER_KEY).unwrap().as_deref(), Some("[1]"));
        let pending = ctrl.outbox().pending().unwrap();
        assert_eq!(pending[0].attempts, 1);
        pending[0].idempotency_key.clone()
    };

    let mut server = mockito::Server::new_async().await;
    let accepting = server
        .mock("POST", "/api/sessions")
        .match_header("idempotency-key", key.as_str())
        .with_status(200)
        .with_body(r#"{"coins_earned": 12}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config(format!("{}/api/", server.url()));
    let db = Arc::new(Database::open_at(&path).unwrap());
    let ctrl = bootstrap(db, &config, &Catalog::default(), Arc::new(clock.clone()));
    assert_eq!(ctrl.ledger().claimed(), &[1]);

    let report = ctrl.outbox().reconcile(&recorder(&config)).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.delivered[0].local_reward, 10);
    assert_eq!(report.delivered[0].coins_earned, 12);
    assert!(report.delivered[0].diverges());
    assert!(ctrl.outbox().pending().unwrap().is_empty());
    accepting.assert_async().await;
}

#[tokio::test]
async fn missing_token_leaves_session_pending() {
    let server = mockito::Server::new_async().await;
    let config = config(format!("{}/api", server.url()));
    let db = Arc::new(Database::open_memory().unwrap());
    let clock = ManualClock::default();
    let mut ctrl = bootstrap(db, &config, &Catalog::default(), Arc::new(clock.clone()));
    complete(&mut ctrl, &clock, 5);

    let anonymous =
        HttpSessionRecorder::new(&config.remote, Arc::new(StaticToken(String::new()))).unwrap();
    let report = ctrl.outbox().reconcile(&anonymous).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(ctrl.outbox().pending().unwrap().len(), 1);
    assert_eq!(ctrl.ledger().claimed(), &[1]);
}
