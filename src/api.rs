use crate::config::AppConfig;
use crate::engine::{Done, EngineReply};
use crate::report::{Lead, extract_rights, extract_unclaimed_value};
use crate::server::AppState;
use crate::session::{ChatSession, ClosedReason, SessionError};
use crate::telemetry::TelemetryEvent;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Shown for any failed engine exchange, with no distinction between
/// timeout, bad status and parse failure.
pub const TRANSPORT_ERROR_TEXT: &str = "אירעה שגיאה בתקשורת עם השרת.";
/// Shown when a message arrives after the conversation ended.
pub const CLOSED_TEXT: &str = "השיחה הסתיימה. רעננו את העמוד כדי להתחיל בדיקה חדשה.";
pub const LEAD_ACK_TEXT: &str = "תודה! פרטיך התקבלו.";

#[derive(Debug, Serialize)]
pub struct SessionStartResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub turn: ChatTurnResponse,
}

#[derive(Debug, Default, Serialize)]
pub struct ChatTurnResponse {
    pub reply: String,
    /// Snapshot of the profile after this turn's answer was recorded; the
    /// widget renders it as the transcript's debug message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub report_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub closed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub error: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Fold an engine reply into the session and shape the browser-facing turn.
fn apply_turn(config: &AppConfig, session: &mut ChatSession, reply: EngineReply) -> ChatTurnResponse {
    match reply.done {
        Done::Continue => {
            session.note_question(&reply.reply, reply.field.as_deref());
            ChatTurnResponse {
                reply: reply.reply,
                field: reply.field,
                progress: reply.progress,
                options: reply.options,
                ..Default::default()
            }
        }
        Done::Complete => {
            info!(session_id = %session.id, "eligibility report ready");
            session.complete(reply.reply.clone());
            ChatTurnResponse {
                reply: reply.reply,
                report_ready: true,
                reveal_delay_ms: Some(config.reveal_delay_ms),
                ..Default::default()
            }
        }
        Done::NoRights => {
            info!(session_id = %session.id, "engine found no applicable rights");
            session.close(ClosedReason::NoRights);
            ChatTurnResponse {
                reply: reply.reply,
                closed: true,
                ..Default::default()
            }
        }
        Done::EngineError => {
            warn!(session_id = %session.id, "engine reported an internal failure");
            session.close(ClosedReason::EngineFault);
            ChatTurnResponse {
                reply: reply.reply,
                closed: true,
                error: true,
                ..Default::default()
            }
        }
    }
}

pub async fn create_session(State(state): State<AppState>) -> Response {
    let mut session = match state.sessions.create().await {
        Ok(session) => session,
        Err(err) => return store_error(err),
    };
    let session_id = session.id.clone();
    let turn = match state.engine.exchange(&session.profile).await {
        Ok(reply) => apply_turn(&state.config, &mut session, reply),
        Err(err) => {
            // The session stays open; the browser shows the error text
            // instead of a silently empty chat.
            warn!(session_id = %session_id, %err, "initial engine exchange failed");
            return Json(SessionStartResponse {
                session_id,
                turn: ChatTurnResponse {
                    reply: TRANSPORT_ERROR_TEXT.to_string(),
                    error: true,
                    ..Default::default()
                },
            })
            .into_response();
        }
    };
    if let Err(err) = state.sessions.put(session).await {
        return store_error(err);
    }
    Json(SessionStartResponse { session_id, turn }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let message = body.message.trim();
    if message.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty message").into_response();
    }
    let mut session = match state.sessions.get(&body.session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, SessionError::Unknown.to_string()).into_response();
        }
        Err(err) => return store_error(err),
    };
    if !session.accepts_input() {
        debug!(session_id = %session.id, phase = ?session.phase, "message rejected; conversation is over");
        return Json(ChatTurnResponse {
            reply: CLOSED_TEXT.to_string(),
            closed: true,
            ..Default::default()
        })
        .into_response();
    }

    match session.record_answer(message) {
        Some(field) => debug!(session_id = %session.id, %field, "recorded answer"),
        None => debug!(
            session_id = %session.id,
            question = %session.last_question,
            "answer matched no field; not recorded"
        ),
    }
    let profile_snapshot = serde_json::to_value(&session.profile).unwrap_or_default();

    let reply = match state.engine.exchange(&session.profile).await {
        Ok(reply) => reply,
        Err(err) => {
            // The mutated clone is dropped without a put, so the stored
            // profile and last question are exactly as before the call.
            warn!(session_id = %session.id, %err, "engine exchange failed");
            return Json(ChatTurnResponse {
                reply: TRANSPORT_ERROR_TEXT.to_string(),
                error: true,
                ..Default::default()
            })
            .into_response();
        }
    };

    let mut turn = apply_turn(&state.config, &mut session, reply);
    turn.profile = Some(profile_snapshot);
    if let Err(err) = state.sessions.put(session).await {
        return store_error(err);
    }
    Json(turn).into_response()
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: String,
    pub rights: Vec<String>,
    pub unclaimed_value: u64,
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let report = match state.sessions.get(&session_id).await {
        Ok(Some(session)) => session.final_report.unwrap_or_default(),
        // An unknown session or a report-less one yields an empty
        // checklist, not an error.
        Ok(None) => String::new(),
        Err(err) => return store_error(err),
    };
    let rights = extract_rights(&report);
    let unclaimed_value = extract_unclaimed_value(&report);
    Json(ReportResponse {
        report,
        rights,
        unclaimed_value,
    })
    .into_response()
}

pub async fn post_lead(State(state): State<AppState>, Json(lead): Json<Lead>) -> impl IntoResponse {
    // Leads are logged and acknowledged, never stored or forwarded.
    info!(
        session_id = ?lead.session_id,
        name = %lead.name,
        phone = %lead.phone,
        email = %lead.email,
        "lead captured"
    );
    let metadata = serde_json::to_value(&lead).unwrap_or_default();
    state
        .telemetry
        .record_event(TelemetryEvent::now("lead_submitted", "/report", metadata))
        .await;
    Json(serde_json::json!({ "message": LEAD_ACK_TEXT }))
}

#[derive(Debug, Deserialize)]
pub struct TelemetryRequest {
    pub event_type: String,
    pub path: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub async fn post_events(
    State(state): State<AppState>,
    Json(body): Json<TelemetryRequest>,
) -> impl IntoResponse {
    state
        .telemetry
        .record_event(TelemetryEvent::now(body.event_type, body.path, body.metadata))
        .await;
    StatusCode::ACCEPTED
}

pub async fn healthz() -> impl IntoResponse {
    "ok"
}

fn store_error(err: SessionError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            engine_url: None,
            engine_timeout: std::time::Duration::from_secs(1),
            session_ttl: std::time::Duration::ZERO,
            enable_cors: false,
            assets_dir: "assets".into(),
            reveal_delay_ms: 1500,
        }
    }

    fn reply(done: Done) -> EngineReply {
        serde_json::from_value(serde_json::json!({ "reply": "טקסט" }))
            .map(|mut r: EngineReply| {
                r.done = done;
                r
            })
            .unwrap()
    }

    #[test]
    fn ordinary_turn_updates_last_question() {
        let mut session = ChatSession::new();
        let turn = apply_turn(&test_config(), &mut session, reply(Done::Continue));
        assert_eq!(session.last_question, "טקסט");
        assert!(!turn.report_ready && !turn.closed);
        assert!(session.accepts_input());
    }

    #[test]
    fn complete_turn_flags_report_and_delay_once() {
        let mut session = ChatSession::new();
        let turn = apply_turn(&test_config(), &mut session, reply(Done::Complete));
        assert!(turn.report_ready);
        assert_eq!(turn.reveal_delay_ms, Some(1500));
        assert_eq!(session.phase, Phase::Reporting);
        assert_eq!(session.final_report.as_deref(), Some("טקסט"));
    }

    #[test]
    fn no_rights_turn_closes_the_conversation() {
        let mut session = ChatSession::new();
        let turn = apply_turn(&test_config(), &mut session, reply(Done::NoRights));
        assert!(turn.closed && !turn.error);
        assert_eq!(session.phase, Phase::Closed(ClosedReason::NoRights));
    }

    #[test]
    fn engine_error_turn_closes_with_error_flag() {
        let mut session = ChatSession::new();
        let turn = apply_turn(&test_config(), &mut session, reply(Done::EngineError));
        assert!(turn.closed && turn.error);
        assert_eq!(session.phase, Phase::Closed(ClosedReason::EngineFault));
    }
}
