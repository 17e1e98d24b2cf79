use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Prompt id the fake engine hands out.
pub const PROMPT_ID: &str = "prompt-1";

/// Prompt id whose history reports an execution error.
pub const FAILING_PROMPT_ID: &str = "prompt-err";

#[derive(Clone, Default)]
struct EngineState {
    history_polls: Arc<AtomicUsize>,
}

/// Start a fake ComfyUI engine on an ephemeral port and return its base URL.
///
/// `POST /prompt` rejects graphs without nodes (400) and otherwise queues
/// [`PROMPT_ID`]. `GET /history/{id}` returns `{}` on the first poll and the
/// finished entry afterwards.
pub async fn spawn_engine() -> String {
    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{id}", get(history))
        .with_state(EngineState::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

async fn submit(Json(body): Json<Value>) -> Response {
    let empty = body
        .get("prompt")
        .and_then(Value::as_object)
        .map(|graph| graph.is_empty())
        .unwrap_or(true);
    if empty {
        return (StatusCode::BAD_REQUEST, r#"{"error":"no prompt"}"#).into_response();
    }
    Json(json!({ "prompt_id": PROMPT_ID, "number": 0, "node_errors": {} })).into_response()
}

async fn history(State(state): State<EngineState>, Path(id): Path<String>) -> Json<Value> {
    if id == FAILING_PROMPT_ID {
        return Json(json!({
            id: {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", {"exception_message": "CUDA out of memory"}]]
                },
                "outputs": {}
            }
        }));
    }
    if id != PROMPT_ID || state.history_polls.fetch_add(1, Ordering::SeqCst) == 0 {
        return Json(json!({}));
    }
    Json(json!({
        id: {
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {
                "9": {"images": [{"filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"}]}
            }
        }
    }))
}
