//! API routes

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::core::{Preview, TurnError};
use crate::settings::{Settings, SettingsError, SettingsPatch};
use crate::voice::{CaptureState, ToggleOutcome, VoiceError};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub settings: Settings,
    pub theme_changed: bool,
}

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub state: CaptureState,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Message>, ApiError> {
    let reply = state.session.submit(&request.message).await.map_err(|e| {
        let status = match e {
            TurnError::EmptyInput => StatusCode::BAD_REQUEST,
            TurnError::Busy => StatusCode::CONFLICT,
            TurnError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e)
    })?;

    Ok(Json(reply))
}

async fn preview(State(state): State<AppState>) -> Json<Preview> {
    Json(state.session.preview())
}

async fn messages(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.session.messages().await)
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.session.settings().await)
}

async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let (settings, change) = state.session.update_settings(patch).await.map_err(|e| {
        let status = match e {
            SettingsError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, e)
    })?;

    Ok(Json(SettingsResponse {
        settings,
        theme_changed: change.theme_changed,
    }))
}

async fn toggle_voice(State(state): State<AppState>) -> Result<Json<VoiceResponse>, ApiError> {
    let outcome = state
        .voice
        .toggle(state.session.clone())
        .await
        .map_err(|e| {
            let status = match e {
                VoiceError::CapabilityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                VoiceError::Recognition(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            api_error(status, e)
        })?;

    let state = match outcome {
        ToggleOutcome::Started(_) => CaptureState::Listening,
        ToggleOutcome::Stopped => CaptureState::Idle,
    };
    Ok(Json(VoiceResponse { state }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/chat/preview", get(preview))
        .route("/v1/messages", get(messages))
        .route("/v1/settings", get(get_settings).patch(patch_settings))
        .route("/v1/voice/toggle", post(toggle_voice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use futures::stream;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::core::chat::FALLBACK_MESSAGE_TEXT;
    use crate::core::Session;
    use crate::providers::{ChatCapability, ChatEvent, ChatRequest as Capability, ProviderError, SnapshotStream};
    use crate::voice::{VoiceCapture, CAPTURE_UNAVAILABLE_NOTICE};

    struct FixedChat(Option<&'static str>);

    #[async_trait::async_trait]
    impl ChatCapability for FixedChat {
        async fn stream_chat(&self, _request: Capability) -> Result<SnapshotStream, ProviderError> {
            let text = self
                .0
                .ok_or_else(|| ProviderError::InvalidResponse("offline".into()))?;
            Ok(Box::pin(stream::iter(vec![
                Ok::<_, ProviderError>(ChatEvent::Snapshot(text.to_string())),
                Ok(ChatEvent::Completed { citations: vec![] }),
            ])))
        }
    }

    fn app(reply: Option<&'static str>) -> Router {
        let settings = Settings {
            voice_enabled: false,
            ..Settings::default()
        };
        let state = AppState {
            session: Arc::new(Session::new(Arc::new(FixedChat(reply)), settings)),
            voice: Arc::new(VoiceCapture::new(None)),
        };
        router().with_state(state)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Some("hi"))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_returns_assistant_message() {
        let app = app(Some("Hi there."));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/chat", json!({ "message": "Hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["content"], "Hi there.");

        let response = app
            .oneshot(Request::get("/v1/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let log = body_json(response).await;
        assert_eq!(log.as_array().unwrap().len(), 2);
        assert_eq!(log[0]["content"], "Hello");
    }

    #[tokio::test]
    async fn test_chat_failure_is_fallback_not_error() {
        let response = app(None)
            .oneshot(json_request("POST", "/v1/chat", json!({ "message": "Hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["content"], FALLBACK_MESSAGE_TEXT);
    }

    #[tokio::test]
    async fn test_empty_chat_is_bad_request() {
        let response = app(Some("hi"))
            .oneshot(json_request("POST", "/v1/chat", json!({ "message": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preview_is_idle_between_turns() {
        let response = app(Some("hi"))
            .oneshot(Request::get("/v1/chat/preview").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let preview = body_json(response).await;
        assert_eq!(preview["phase"], "idle");
        assert_eq!(preview["text"], "");
    }

    #[tokio::test]
    async fn test_patch_settings() {
        let app = app(Some("hi"));

        let response = app
            .clone()
            .oneshot(json_request("PATCH", "/v1/settings", json!({ "theme": "gold" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["themeChanged"], true);
        assert_eq!(body["settings"]["theme"], "gold");

        let response = app
            .clone()
            .oneshot(json_request("PATCH", "/v1/settings", json!({ "avatarSpeed": -1.0 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(Request::get("/v1/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let settings = body_json(response).await;
        assert_eq!(settings["theme"], "gold");
        assert_eq!(settings["avatarSpeed"], 1.2);
    }

    #[tokio::test]
    async fn test_voice_toggle_without_recognizer() {
        let response = app(Some("hi"))
            .oneshot(Request::post("/v1/voice/toggle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"], CAPTURE_UNAVAILABLE_NOTICE);
    }
}
