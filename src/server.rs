use crate::api;
use crate::config::AppConfig;
use crate::engine::EngineBackend;
use crate::pages;
use crate::session::SessionStore;
use crate::telemetry::TelemetrySink;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<dyn EngineBackend>,
    pub sessions: Arc<dyn SessionStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn EngineBackend>,
        sessions: Arc<dyn SessionStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            engine,
            sessions,
            telemetry,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let enable_cors = state.config.enable_cors;
    let mut router = Router::new()
        .route("/", get(pages::serve_chat_page))
        .route("/report", get(pages::serve_report_page))
        .route("/assets/widget.js", get(pages::serve_widget_script))
        .route("/assets/report.js", get(pages::serve_report_script))
        .route("/api/chat/session", post(api::create_session))
        .route("/api/chat/message", post(api::post_message))
        .route("/api/chat/report/{session_id}", get(api::get_report))
        .route("/api/leads", post(api::post_lead))
        .route("/api/gui/events", post(api::post_events))
        .route("/healthz", get(api::healthz))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
    if enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to install ctrl-c handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Done, EngineError, EngineReply, ScriptedEngineBackend};
    use crate::profile::{Profile, ProfileField};
    use crate::session::InMemorySessionStore;
    use crate::telemetry::TracingTelemetrySink;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            engine_url: None,
            engine_timeout: Duration::from_secs(1),
            session_ttl: Duration::ZERO,
            enable_cors: false,
            assets_dir: "assets".into(),
            reveal_delay_ms: 10,
        }
    }

    fn test_app(engine: Arc<dyn EngineBackend>) -> (Router, Arc<InMemorySessionStore>) {
        let sessions = Arc::new(InMemorySessionStore::new(Duration::ZERO));
        let state = AppState::new(
            test_config(),
            engine,
            sessions.clone(),
            Arc::new(TracingTelemetrySink),
        );
        (router(state), sessions)
    }

    async fn request_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, json)
    }

    async fn send_message(app: &Router, session_id: &str, message: &str) -> serde_json::Value {
        let (status, json) = request_json(
            app,
            "POST",
            "/api/chat/message",
            Some(serde_json::json!({ "session_id": session_id, "message": message })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json
    }

    #[tokio::test]
    async fn full_conversation_reaches_the_report() {
        let (app, _) = test_app(Arc::new(ScriptedEngineBackend));

        let (status, start) = request_json(
            &app,
            "POST",
            "/api/chat/session",
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let session_id = start["session_id"].as_str().unwrap().to_string();
        assert!(start["reply"].as_str().unwrap().contains("מה גילך"));
        assert_eq!(start["field"], "age");

        let mut turn = serde_json::Value::Null;
        for answer in ["30", "כן", "כן", "כן", "נשוי"] {
            turn = send_message(&app, &session_id, answer).await;
            assert!(turn["profile"].is_object());
        }
        assert_eq!(turn["report_ready"], true);
        assert_eq!(turn["reveal_delay_ms"], 10);
        assert!(turn["reply"].as_str().unwrap().contains("1."));

        // Conversation is over; late input is rejected without an engine call.
        let late = send_message(&app, &session_id, "עוד שאלה").await;
        assert_eq!(late["closed"], true);
        assert_eq!(late["reply"], api::CLOSED_TEXT);

        let (status, report) = request_json(
            &app,
            "GET",
            &format!("/api/chat/report/{session_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["rights"].as_array().unwrap().len(), 3);
        assert_eq!(report["unclaimed_value"], 2_800);

        let (status, ack) = request_json(
            &app,
            "POST",
            "/api/leads",
            Some(serde_json::json!({
                "session_id": session_id,
                "name": "דנה",
                "phone": "050-1234567",
                "email": "dana@example.com"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["message"], api::LEAD_ACK_TEXT);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_state_change() {
        let (app, sessions) = test_app(Arc::new(ScriptedEngineBackend));
        let (_, start) = request_json(
            &app,
            "POST",
            "/api/chat/session",
            Some(serde_json::json!({})),
        )
        .await;
        let session_id = start["session_id"].as_str().unwrap().to_string();

        let (status, _) = request_json(
            &app,
            "POST",
            "/api/chat/message",
            Some(serde_json::json!({ "session_id": session_id, "message": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stored = sessions.get(&session_id).await.unwrap().unwrap();
        assert!(stored.profile.is_empty());

        // The pending question is still live; a real answer lands normally.
        let turn = send_message(&app, &session_id, "30").await;
        assert_eq!(turn["profile"]["age"], "30");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (app, _) = test_app(Arc::new(ScriptedEngineBackend));
        let (status, _) = request_json(
            &app,
            "POST",
            "/api/chat/message",
            Some(serde_json::json!({ "session_id": "no-such-session", "message": "שלום" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Scripted engine that fails exactly one exchange when armed.
    struct FailOnceBackend {
        inner: ScriptedEngineBackend,
        armed: AtomicBool,
    }

    #[async_trait]
    impl EngineBackend for FailOnceBackend {
        async fn exchange(&self, profile: &Profile) -> Result<EngineReply, EngineError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(EngineError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            self.inner.exchange(profile).await
        }
    }

    #[tokio::test]
    async fn engine_failure_leaves_session_state_unchanged() {
        let backend = Arc::new(FailOnceBackend {
            inner: ScriptedEngineBackend,
            armed: AtomicBool::new(false),
        });
        let (app, sessions) = test_app(backend.clone());

        let (_, start) = request_json(
            &app,
            "POST",
            "/api/chat/session",
            Some(serde_json::json!({})),
        )
        .await;
        let session_id = start["session_id"].as_str().unwrap().to_string();
        let before = sessions.get(&session_id).await.unwrap().unwrap();

        backend.armed.store(true, Ordering::SeqCst);
        let turn = send_message(&app, &session_id, "30").await;
        assert_eq!(turn["reply"], api::TRANSPORT_ERROR_TEXT);
        assert_eq!(turn["error"], true);
        assert!(turn.get("profile").is_none());

        let after = sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(after.profile, before.profile);
        assert_eq!(after.last_question, before.last_question);
        assert!(after.accepts_input());

        // The next answer still classifies against the pending question.
        let turn = send_message(&app, &session_id, "31").await;
        assert_eq!(turn["profile"]["age"], "31");
    }

    /// Engine that asks one question, then reports no applicable rights.
    struct NoRightsBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EngineBackend for NoRightsBackend {
        async fn exchange(&self, profile: &Profile) -> Result<EngineReply, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if profile.is_empty() {
                return Ok(EngineReply {
                    reply: "מה גילך?".to_string(),
                    done: Done::Continue,
                    field: Some(ProfileField::Age.key().to_string()),
                    progress: None,
                    options: Vec::new(),
                });
            }
            Ok(EngineReply {
                reply: "לא נמצאו זכויות רלוונטיות.".to_string(),
                done: Done::NoRights,
                field: None,
                progress: None,
                options: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn no_rights_closes_without_further_engine_calls() {
        let backend = Arc::new(NoRightsBackend {
            calls: AtomicUsize::new(0),
        });
        let (app, _) = test_app(backend.clone());

        let (_, start) = request_json(
            &app,
            "POST",
            "/api/chat/session",
            Some(serde_json::json!({})),
        )
        .await;
        let session_id = start["session_id"].as_str().unwrap().to_string();

        let turn = send_message(&app, &session_id, "30").await;
        assert_eq!(turn["closed"], true);
        assert!(turn["reply"].as_str().unwrap().contains("לא נמצאו"));
        let calls_after_close = backend.calls.load(Ordering::SeqCst);

        let late = send_message(&app, &session_id, "בכל זאת?").await;
        assert_eq!(late["reply"], api::CLOSED_TEXT);
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls_after_close);
    }

    #[tokio::test]
    async fn report_for_unknown_session_is_empty_not_an_error() {
        let (app, _) = test_app(Arc::new(ScriptedEngineBackend));
        let (status, report) =
            request_json(&app, "GET", "/api/chat/report/missing", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["report"], "");
        assert_eq!(report["rights"].as_array().unwrap().len(), 0);
        assert_eq!(report["unclaimed_value"], 0);
    }

    #[tokio::test]
    async fn serves_embedded_pages_and_scripts() {
        let (app, _) = test_app(Arc::new(ScriptedEngineBackend));
        for (uri, marker) in [
            ("/", "id=\"chatbox\""),
            ("/report", "id=\"rightsContainer\""),
            ("/assets/widget.js", "userInput"),
            ("/assets/report.js", "sendLead"),
            ("/healthz", "ok"),
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert!(
                String::from_utf8_lossy(&bytes).contains(marker),
                "{uri} should contain {marker}"
            );
        }
    }
}
