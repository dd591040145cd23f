//! Full pipeline runs against an in-process fake ComfyUI server.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use iconsmith_comfyui::api::ComfyUIApiError;
use iconsmith_comfyui::poll::PollConfig;
use iconsmith_pipeline::{run_pipeline, PipelineConfig, PipelineError};

/// How the fake server answers requests.
#[derive(Clone, Copy)]
enum Behaviour {
    /// One pending poll, then a SaveImage output.
    Succeed,
    /// Report an execution error for every prompt.
    Fail,
    /// Reject every submission with a 500.
    RejectSubmit,
    /// Accept submissions but answer without a `prompt_id`.
    OmitPromptId,
    /// Answer `/history` with a body that is not JSON.
    GarbledHistory,
}

struct FakeComfy {
    behaviour: Behaviour,
    png: Vec<u8>,
    workflows: Vec<Value>,
    client_ids: Vec<String>,
    history_polls: HashMap<String, u32>,
    views: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<FakeComfy>>;

fn test_png() -> Vec<u8> {
    let image = image::RgbaImage::from_fn(512, 512, |x, y| {
        image::Rgba([(x / 2) as u8, (y / 2) as u8, 255, 255])
    });
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

async fn submit(State(state): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut fake = state.lock().unwrap();
    if let Behaviour::RejectSubmit = fake.behaviour {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "queue full" })),
        );
    }
    fake.workflows.push(body["prompt"].clone());
    fake.client_ids
        .push(body["client_id"].as_str().unwrap_or_default().to_string());
    let number = fake.workflows.len();
    if let Behaviour::OmitPromptId = fake.behaviour {
        return (StatusCode::OK, Json(json!({ "number": number })));
    }
    (
        StatusCode::OK,
        Json(json!({ "prompt_id": format!("prompt-{number}"), "number": number })),
    )
}

async fn history(State(state): State<Shared>, UrlPath(prompt_id): UrlPath<String>) -> Response {
    let mut fake = state.lock().unwrap();
    if let Behaviour::GarbledHistory = fake.behaviour {
        return (StatusCode::OK, "<html>502 Bad Gateway</html>").into_response();
    }
    let polls = fake.history_polls.entry(prompt_id.clone()).or_insert(0);
    *polls += 1;
    if *polls == 1 {
        return Json(json!({})).into_response();
    }

    let entry = match fake.behaviour {
        Behaviour::Fail => json!({
            "outputs": {},
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [
                    ["execution_start", { "prompt_id": prompt_id }],
                    ["execution_error", {
                        "node_id": "6",
                        "exception_type": "torch.OutOfMemoryError",
                        "exception_message": "CUDA out of memory"
                    }]
                ]
            }
        }),
        _ => json!({
            "outputs": {
                "9": { "images": [
                    { "filename": format!("{prompt_id}_00001_.png"), "subfolder": "", "type": "output" }
                ] }
            },
            "status": { "status_str": "success", "completed": true, "messages": [] }
        }),
    };
    Json(json!({ prompt_id: entry })).into_response()
}

async fn view(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Vec<u8> {
    let mut fake = state.lock().unwrap();
    fake.views.push(params);
    fake.png.clone()
}

/// Bind the fake server on an ephemeral port and return its base URL.
async fn spawn_fake(behaviour: Behaviour) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeComfy {
        behaviour,
        png: test_png(),
        workflows: Vec::new(),
        client_ids: Vec::new(),
        history_polls: HashMap::new(),
        views: Vec::new(),
    }));

    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

fn config_for(url: String, root: &Path) -> PipelineConfig {
    PipelineConfig {
        comfyui_url: url,
        asset_dir: root.join("assets/icons"),
        destination: root.join("app-logos/task-slice.png"),
        poll: PollConfig {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(20),
        },
        http_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn generates_all_variants_and_publishes_v2() {
    let (url, state) = spawn_fake(Behaviour::Succeed).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    let summary = run_pipeline(&api, &config).await.unwrap();

    let names: Vec<_> = summary.variants.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["v1", "v2", "v3"]);
    for name in ["v1", "v2", "v3"] {
        let path = dir.path().join(format!("assets/icons/task-slice-{name}.png"));
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (600, 600));
    }
    assert_eq!(
        std::fs::read(&summary.destination).unwrap(),
        std::fs::read(dir.path().join("assets/icons/task-slice-v2.png")).unwrap()
    );

    let fake = state.lock().unwrap();
    assert_eq!(fake.workflows.len(), 3);
    let seeds: Vec<_> = fake.workflows.iter().map(|w| w["6"]["inputs"]["seed"].clone()).collect();
    assert_eq!(seeds, [json!(86231), json!(86232), json!(86233)]);
    assert!(fake.client_ids.iter().all(|id| id == api.client_id()));
    // Every prompt was polled once while pending and once when done.
    assert!(fake.history_polls.values().all(|&polls| polls == 2));
    assert_eq!(fake.views.len(), 3);
    assert_eq!(fake.views[0]["filename"], "prompt-1_00001_.png");
    assert_eq!(fake.views[0]["type"], "output");
}

#[tokio::test]
async fn generated_assets_contain_no_scratch_files() {
    let (url, _state) = spawn_fake(Behaviour::Succeed).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    run_pipeline(&api, &config).await.unwrap();

    let mut files: Vec<_> = std::fs::read_dir(dir.path().join("assets/icons"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        ["task-slice-v1.png", "task-slice-v2.png", "task-slice-v3.png"]
    );
}

#[tokio::test]
async fn execution_error_aborts_before_publishing() {
    let (url, state) = spawn_fake(Behaviour::Fail).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    let result = run_pipeline(&api, &config).await;

    assert_matches!(
        result,
        Err(PipelineError::Service(ComfyUIApiError::JobFailed { ref prompt_id, ref message }))
            if prompt_id == "prompt-1" && message.contains("CUDA out of memory")
    );
    assert_eq!(state.lock().unwrap().workflows.len(), 1);
    assert!(!config.destination.exists());
}

#[tokio::test]
async fn rejected_submission_surfaces_status_and_body() {
    let (url, _state) = spawn_fake(Behaviour::RejectSubmit).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    let result = run_pipeline(&api, &config).await;

    assert_matches!(
        result,
        Err(PipelineError::Service(ComfyUIApiError::ApiError { status: 500, ref body }))
            if body.contains("queue full")
    );
    assert!(!dir.path().join("assets/icons").exists());
}

#[tokio::test]
async fn submission_without_prompt_id_is_protocol_error() {
    let (url, state) = spawn_fake(Behaviour::OmitPromptId).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    let result = run_pipeline(&api, &config).await;

    assert_matches!(
        result,
        Err(PipelineError::Service(ComfyUIApiError::Protocol(ref message)))
            if message.contains("/prompt") && message.contains("prompt_id")
    );
    assert_eq!(state.lock().unwrap().workflows.len(), 1);
}

#[tokio::test]
async fn non_json_history_is_protocol_error() {
    let (url, state) = spawn_fake(Behaviour::GarbledHistory).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(url, dir.path());
    let api = config.comfyui_api().unwrap();

    let result = run_pipeline(&api, &config).await;

    assert_matches!(
        result,
        Err(PipelineError::Service(ComfyUIApiError::Protocol(ref message)))
            if message.contains("/history")
    );
    assert!(state.lock().unwrap().views.is_empty());
    assert!(!config.destination.exists());
}
