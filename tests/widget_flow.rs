//! End-to-end widget flows against a local fake chat API and a SQLite store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use fantabase_demo::config::Config;
use fantabase_demo::storage::keys::REMAINING_MESSAGES_KEY;
use fantabase_demo::storage::{open_or_memory, KeyValueStore, SqliteStore};
use fantabase_demo::widget::client::GUEST_MESSAGE_PATH;
use fantabase_demo::widget::{
    BubbleContent, ChatWidget, Role, SendOutcome, ViewState, WidgetEvent, WidgetObserver,
    MAX_GUEST_MESSAGES,
};
use serde_json::{json, Value};

#[derive(Clone)]
struct FakeApi {
    remaining: Arc<AtomicU32>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn guest_message(State(api): State<FakeApi>, Json(body): Json<Value>) -> Response {
    api.bodies.lock().unwrap().push(body.clone());
    match body["message"].as_str().unwrap_or_default() {
        "fail" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "oops"})),
        )
            .into_response(),
        "limit" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"message": "Guest limit reached"})),
        )
            .into_response(),
        message => {
            if message == "slow" {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            let left = api.remaining.load(Ordering::SeqCst).saturating_sub(1);
            api.remaining.store(left, Ordering::SeqCst);
            Json(json!({"text": format!("re: {message}"), "remainingMessages": left}))
                .into_response()
        }
    }
}

async fn spawn_fake_api() -> (String, FakeApi) {
    let api = FakeApi {
        remaining: Arc::new(AtomicU32::new(MAX_GUEST_MESSAGES)),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };
    let router = Router::new()
        .route(GUEST_MESSAGE_PATH, post(guest_message))
        .with_state(api.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}/"), api)
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<WidgetEvent>>,
}

impl Recorder {
    fn saw(&self, event: &WidgetEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }
}

impl WidgetObserver for Recorder {
    fn on_event(&self, event: &WidgetEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    data_dir: std::path::PathBuf,
    config: Config,
    api: FakeApi,
}

impl Harness {
    async fn new() -> Self {
        let (base, api) = spawn_fake_api().await;
        let data_dir =
            std::env::temp_dir().join(format!("fantabase_flow_{}", uuid::Uuid::new_v4()));
        let config = Config {
            api_base_url: base,
            data_dir: data_dir.to_string_lossy().to_string(),
            request_timeout_secs: 5,
            ..Config::default()
        };
        Self {
            data_dir,
            config,
            api,
        }
    }

    fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(SqliteStore::open(&self.config.data_dir).unwrap())
    }

    fn widget(&self) -> (ChatWidget, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let widget = ChatWidget::from_config(&self.config, self.store(), recorder.clone());
        (widget, recorder)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

#[tokio::test]
async fn test_five_messages_exhaust_the_guest_allowance() {
    let harness = Harness::new().await;
    let (widget, recorder) = harness.widget();
    assert_eq!(widget.view_state(), ViewState::Config);
    widget.skip_sleeper();
    widget.open();
    assert_eq!(widget.view_state(), ViewState::Chatting);

    for (i, expected_left) in [4, 3, 2, 1].into_iter().enumerate() {
        let outcome = widget.send_message(&format!("question {i}")).await;
        assert_eq!(
            outcome,
            SendOutcome::Replied {
                text: format!("re: question {i}"),
                limit_reached: false
            }
        );
        assert_eq!(widget.remaining(), expected_left);
        assert!(widget.is_chat_enabled());
    }

    let outcome = widget.send_message("question 4").await;
    assert_eq!(
        outcome,
        SendOutcome::Replied {
            text: "re: question 4".into(),
            limit_reached: true
        }
    );
    assert_eq!(widget.remaining(), 0);
    assert_eq!(widget.view_state(), ViewState::LimitReached);
    assert!(!widget.is_chat_enabled());
    assert_eq!(widget.quota_display().counter_label(), "5/5");
    assert!(recorder.saw(&WidgetEvent::ViewChanged(ViewState::LimitReached)));

    assert_eq!(widget.send_message("one more").await, SendOutcome::Ignored);
    assert_eq!(harness.api.bodies.lock().unwrap().len(), 5);
    assert_eq!(widget.history().len(), 10);
}

#[tokio::test]
async fn test_server_error_restores_quota() {
    let harness = Harness::new().await;
    let (widget, _recorder) = harness.widget();
    widget.skip_sleeper();
    widget.open();
    widget.send_message("hello").await;
    assert_eq!(widget.remaining(), 4);

    let outcome = widget.send_message("fail").await;
    assert_eq!(outcome, SendOutcome::Failed { text: "oops".into() });
    assert_eq!(widget.remaining(), 4);
    assert!(widget.is_chat_enabled());
    let last = widget.transcript().last().cloned().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, BubbleContent::Text("oops".into()));
}

#[tokio::test]
async fn test_rate_limit_forces_limit_reached() {
    let harness = Harness::new().await;
    let (widget, _recorder) = harness.widget();
    widget.skip_sleeper();
    widget.open();

    assert_eq!(widget.send_message("limit").await, SendOutcome::RateLimited);
    assert_eq!(widget.remaining(), 0);
    assert_eq!(widget.view_state(), ViewState::LimitReached);
    assert!(!widget.is_chat_enabled());

    widget.open_config();
    assert_eq!(widget.view_state(), ViewState::LimitReached);
    assert!(widget.submit_waitlist("fan@example.com"));
}

#[tokio::test]
async fn test_state_survives_reload() {
    let harness = Harness::new().await;
    let session = {
        let (widget, _recorder) = harness.widget();
        widget.configure_sleeper("sleeperjim");
        widget.open();
        widget.send_message("remember me").await;
        widget.session_id().clone()
    };

    let (widget, recorder) = harness.widget();
    assert_eq!(widget.session_id(), &session);
    assert_eq!(widget.view_state(), ViewState::Chatting);
    assert_eq!(widget.sleeper_username().as_deref(), Some("sleeperjim"));
    assert_eq!(widget.remaining(), 4);

    let texts: Vec<BubbleContent> = widget.transcript().into_iter().map(|b| b.content).collect();
    assert_eq!(
        texts,
        vec![
            BubbleContent::Text("remember me".into()),
            BubbleContent::Text("re: remember me".into()),
        ]
    );
    assert!(recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, WidgetEvent::MessageAdded { role: Role::Assistant, .. })));

    let bodies = harness.api.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["sessionId"], session.as_str());
    assert_eq!(bodies[0]["sleeperUsername"], "sleeperjim");
}

#[tokio::test]
async fn test_concurrent_send_is_rejected() {
    let harness = Harness::new().await;
    let (widget, _recorder) = harness.widget();
    widget.skip_sleeper();
    widget.open();

    let (first, second) = tokio::join!(widget.send_message("slow"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        widget.send_message("impatient").await
    });
    assert!(matches!(first, SendOutcome::Replied { .. }));
    assert_eq!(second, SendOutcome::Busy);
    assert_eq!(harness.api.bodies.lock().unwrap().len(), 1);
    assert_eq!(widget.remaining(), 4);
}

#[tokio::test]
async fn test_external_quota_write_is_picked_up() {
    let harness = Harness::new().await;
    let (widget, _recorder) = harness.widget();
    widget.skip_sleeper();
    widget.open();

    harness.store().set(REMAINING_MESSAGES_KEY, "0").unwrap();
    assert_eq!(widget.send_message("hi").await, SendOutcome::Ignored);
    assert_eq!(widget.view_state(), ViewState::LimitReached);
    assert!(harness.api.bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unusable_api_base_disables_chat() {
    let harness = Harness::new().await;
    let config = Config {
        api_base_url: "   ".into(),
        ..harness.config.clone()
    };
    let recorder = Arc::new(Recorder::default());
    let widget = ChatWidget::from_config(&config, harness.store(), recorder.clone());
    assert!(!widget.api_configured());
    widget.skip_sleeper();
    widget.open();
    assert!(!widget.is_chat_enabled());
    assert_eq!(widget.send_message("hi").await, SendOutcome::NotConfigured);
    assert!(recorder.saw(&WidgetEvent::ApiErrorShown));
    assert_eq!(widget.remaining(), MAX_GUEST_MESSAGES);
}

#[tokio::test]
async fn test_unreachable_api_reports_network_error() {
    let harness = Harness::new().await;
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = Config {
        api_base_url: format!("http://{addr}"),
        ..harness.config.clone()
    };
    let widget = ChatWidget::from_config(&config, harness.store(), Arc::new(Recorder::default()));
    widget.skip_sleeper();
    widget.open();

    match widget.send_message("hi").await {
        SendOutcome::Failed { text } => assert!(text.starts_with("Network error: "), "{text}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(widget.remaining(), MAX_GUEST_MESSAGES);
    assert!(widget.is_chat_enabled());
}

#[tokio::test]
async fn test_unusable_data_dir_runs_without_persistence() {
    let harness = Harness::new().await;
    std::fs::create_dir_all(&harness.data_dir).unwrap();
    let blocker = harness.data_dir.join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let config = Config {
        data_dir: blocker.join("data").to_string_lossy().to_string(),
        ..harness.config.clone()
    };

    let store = open_or_memory(&config.data_dir);
    let widget = ChatWidget::from_config(&config, store, Arc::new(Recorder::default()));
    widget.skip_sleeper();
    widget.open();
    assert!(matches!(
        widget.send_message("hi").await,
        SendOutcome::Replied { .. }
    ));
    assert_eq!(widget.remaining(), 4);
    assert_eq!(widget.history().len(), 2);
}
