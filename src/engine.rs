use crate::config::AppConfig;
use crate::profile::{Profile, ProfileField};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Pluggable backend for the remote eligibility engine. One call per
/// conversation turn: the full profile goes out, the next dialogue step
/// comes back.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    async fn exchange(&self, profile: &Profile) -> Result<EngineReply, EngineError>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Transport(reqwest::Error),
    #[error("engine returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("engine payload was not valid JSON: {0}")]
    Decode(reqwest::Error),
}

/// One turn of the dialogue as the engine reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineReply {
    pub reply: String,
    #[serde(default)]
    pub done: Done,
    /// Field key the next answer should fill, when the engine announces one.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Completion marker of an engine reply. On the wire this is `false`/absent
/// (ordinary turn), `true` (report ready), `"no-rights"`, or `"error"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Done {
    #[default]
    Continue,
    Complete,
    NoRights,
    EngineError,
}

impl<'de> Deserialize<'de> for Done {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Marker(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Done::Complete,
            Raw::Flag(false) => Done::Continue,
            Raw::Marker(m) if m == "no-rights" => Done::NoRights,
            Raw::Marker(m) if m == "error" => Done::EngineError,
            // Unknown markers fall through to an ordinary turn.
            Raw::Marker(_) => Done::Continue,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    profile: &'a Profile,
}

#[derive(Clone, Debug)]
pub struct EngineClientConfig {
    pub endpoint: url::Url,
    pub timeout: std::time::Duration,
}

/// HTTP backend for a remote eligibility engine. Single attempt per turn;
/// a failed turn surfaces as one fixed error message upstream.
#[derive(Clone)]
pub struct HttpEngineBackend {
    cfg: EngineClientConfig,
    client: reqwest::Client,
}

impl HttpEngineBackend {
    pub fn new(cfg: EngineClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { cfg, client })
    }
}

#[async_trait]
impl EngineBackend for HttpEngineBackend {
    async fn exchange(&self, profile: &Profile) -> Result<EngineReply, EngineError> {
        let response = self
            .client
            .post(self.cfg.endpoint.clone())
            .json(&ChatRequest { profile })
            .send()
            .await
            .map_err(EngineError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status(status));
        }
        response.json().await.map_err(EngineError::Decode)
    }
}

const OPENING: &str = "שלום! אני כאן לעזור לך למצוא את כל הזכויות שמגיעות לך.\nבואו נתחיל עם השאלה הראשונה: מה גילך?";

const QUESTIONS: [(ProfileField, &str); 5] = [
    (ProfileField::Age, "מה גילך?"),
    (ProfileField::EmploymentStatus, "האם אתה עובד כיום?"),
    (
        ProfileField::Disability,
        "האם יש לך נכות רפואית כלשהי? (כן/לא)",
    ),
    (ProfileField::MilitaryService, "האם שירתת בצבא?"),
    (ProfileField::MaritalStatus, "מה מצבך המשפחתי?"),
];

const SCRIPTED_REPORT: &str = "להלן הזכויות שעשויות להגיע לך:\n\
    1. קצבת נכות כללית\n\
    2. הנחה בארנונה\n\
    3. מענק עבודה\n\
    \n\
    | זכות | שווי מוערך | מצב |\n\
    | קצבת נכות כללית | 1,000–2,000 ₪ | לא מומש |\n\
    | הנחה בארנונה | 800 ₪ | לא מומש |\n\
    \n\
    מומלץ לפנות לגורם המוסמך למימוש הזכויות.";

/// Deterministic in-process questionnaire, used when no engine URL is
/// configured and by tests. Asks the fixed questions in order and emits a
/// canned report once the profile is complete.
#[derive(Clone, Default)]
pub struct ScriptedEngineBackend;

#[async_trait]
impl EngineBackend for ScriptedEngineBackend {
    async fn exchange(&self, profile: &Profile) -> Result<EngineReply, EngineError> {
        let progress = profile.answered() as f64 / QUESTIONS.len() as f64 * 100.0;
        if profile.is_empty() {
            return Ok(EngineReply {
                reply: OPENING.to_string(),
                done: Done::Continue,
                field: Some(ProfileField::Age.key().to_string()),
                progress: Some(0.0),
                options: Vec::new(),
            });
        }
        for (field, question) in QUESTIONS {
            if profile.get(field).is_none() {
                return Ok(EngineReply {
                    reply: question.to_string(),
                    done: Done::Continue,
                    field: Some(field.key().to_string()),
                    progress: Some(progress),
                    options: Vec::new(),
                });
            }
        }
        Ok(EngineReply {
            reply: SCRIPTED_REPORT.to_string(),
            done: Done::Complete,
            field: None,
            progress: Some(100.0),
            options: Vec::new(),
        })
    }
}

/// Build an engine backend from config. Falls back to the scripted
/// questionnaire when no engine URL is configured or the URL is unusable.
pub fn backend_from_config(config: &AppConfig) -> Arc<dyn EngineBackend> {
    if let Some(raw) = &config.engine_url {
        match raw.parse::<url::Url>() {
            Ok(endpoint) => {
                let cfg = EngineClientConfig {
                    endpoint,
                    timeout: config.engine_timeout,
                };
                match HttpEngineBackend::new(cfg) {
                    Ok(backend) => {
                        info!(engine_url = %raw, "using HTTP eligibility engine");
                        return Arc::new(backend);
                    }
                    Err(err) => {
                        warn!(?err, "failed to init HTTP engine backend; using scripted engine");
                    }
                }
            }
            Err(err) => {
                warn!(engine_url = %raw, ?err, "invalid engine URL; using scripted engine");
            }
        }
    } else {
        info!("no engine URL configured; using scripted engine backend");
    }
    Arc::new(ScriptedEngineBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_from(json: serde_json::Value) -> EngineReply {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn done_marker_decodes_all_wire_shapes() {
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r", "done": true})).done,
            Done::Complete
        );
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r", "done": false})).done,
            Done::Continue
        );
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r"})).done,
            Done::Continue
        );
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r", "done": "no-rights"})).done,
            Done::NoRights
        );
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r", "done": "error"})).done,
            Done::EngineError
        );
        assert_eq!(
            reply_from(serde_json::json!({"reply": "r", "done": "later"})).done,
            Done::Continue
        );
    }

    #[test]
    fn decodes_question_metadata() {
        let reply = reply_from(serde_json::json!({
            "reply": "מה גילך?",
            "done": false,
            "field": "age",
            "progress": 20.0,
            "options": ["18-", "18+"]
        }));
        assert_eq!(reply.field.as_deref(), Some("age"));
        assert_eq!(reply.progress, Some(20.0));
        assert_eq!(reply.options.len(), 2);
    }

    #[tokio::test]
    async fn scripted_engine_walks_the_questionnaire() {
        let engine = ScriptedEngineBackend;
        let mut profile = Profile::default();

        let first = engine.exchange(&profile).await.unwrap();
        assert_eq!(first.done, Done::Continue);
        assert_eq!(first.field.as_deref(), Some("age"));
        assert!(first.reply.contains("מה גילך"));

        profile.set(ProfileField::Age, "42");
        let second = engine.exchange(&profile).await.unwrap();
        assert_eq!(second.field.as_deref(), Some("employment_status"));

        for field in ProfileField::ALL {
            profile.set(field, "כן");
        }
        let last = engine.exchange(&profile).await.unwrap();
        assert_eq!(last.done, Done::Complete);
        assert!(last.reply.contains("1."));
        assert_eq!(last.progress, Some(100.0));
    }
}
