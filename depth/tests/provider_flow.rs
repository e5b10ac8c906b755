use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use depth_pipeline::{
    error::{DownloadError, PollError, SubmissionError},
    event::ERROR_EVENT,
    locator::ResultLocator,
    pipeline::download,
    provider::{
        direct::{DirectSubmitter, StatusPoller},
        stream::{EventStreamPoller, UploadSubmitter},
        types::{PollerT, SubmitterT},
    },
    ErrorCategory, FetchError, JobHandle, Pipeline, PipelineConfig, Provider, ResultReference,
};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma};
use serde_json::{json, Value};
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use url::Url;

const INTERVAL: Duration = Duration::from_millis(20);
const ARTIFACT_PATH: &str = "/tmp/gradio/depth.png";

/// In-process stand-in for both provider flavours.
#[derive(Default)]
struct Mock {
    hits: AtomicUsize,
    polls: AtomicUsize,
    /// Replies for successive poll requests; the last one repeats.
    script: Mutex<Vec<(u16, String)>>,
    artifact: Vec<u8>,
    uploads: Mutex<Vec<(String, Option<String>)>>,
    calls: Mutex<Vec<Value>>,
    auth: Mutex<Vec<String>>,
}

impl Mock {
    fn scripted(script: Vec<(u16, String)>, artifact: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            artifact,
            ..Default::default()
        })
    }

    fn next_reply(&self) -> Response {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let (code, body) = script
            .get(n)
            .or(script.last())
            .cloned()
            .unwrap_or((200, String::new()));
        (StatusCode::from_u16(code).unwrap(), body).into_response()
    }
}

async fn upload(State(mock): State<Arc<Mock>>, mut form: Multipart) -> Json<Vec<String>> {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    while let Some(field) = form.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        mock.uploads.lock().unwrap().push((name, file_name));
    }
    Json(vec!["/tmp/gradio/abc/image.jpg".to_string()])
}

async fn call(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Json<Value> {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    mock.calls.lock().unwrap().push(body);
    Json(json!({"event_id": "evt-1"}))
}

async fn poll_event(State(mock): State<Arc<Mock>>, Path(id): Path<String>) -> Response {
    assert_eq!(id, "evt-1");
    mock.next_reply()
}

async fn create_prediction(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get("authorization") {
        mock.auth
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap().to_string());
    }
    mock.calls.lock().unwrap().push(body);
    Json(json!({"id": "p-1", "status": "starting", "output": null, "error": null}))
}

async fn poll_prediction(State(mock): State<Arc<Mock>>, Path(id): Path<String>) -> Response {
    assert_eq!(id, "p-1");
    mock.next_reply()
}

async fn artifact(State(mock): State<Arc<Mock>>) -> Vec<u8> {
    mock.artifact.clone()
}

async fn spawn(mock: Arc<Mock>) -> Url {
    let app = Router::new()
        .route("/upload", post(upload))
        .route("/call/on_submit", post(call))
        .route("/call/on_submit/:id", get(poll_event))
        .route("/predictions", post(create_prediction))
        .route("/predictions/:id", get(poll_prediction))
        .route(&format!("/file={}", ARTIFACT_PATH), get(artifact))
        .route("/artifacts/depth.png", get(artifact))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

fn png(img: DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// 100x50 photo-like upload.
fn upload_image() -> Vec<u8> {
    png(DynamicImage::ImageLuma8(GrayImage::from_fn(100, 50, |x, y| {
        Luma([((x + y) % 256) as u8])
    })))
}

/// 100x50 16-bit depth map with every sample at 0x8080.
fn depth_artifact() -> Vec<u8> {
    let buf: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(100, 50, Luma([32896]));
    png(DynamicImage::ImageLuma16(buf))
}

fn pending_event() -> (u16, String) {
    (200, "event: generating\ndata: null\n\n".to_string())
}

fn complete_event() -> (u16, String) {
    let payload = json!([
        {"path": "/tmp/gradio/slider.png"},
        {"path": ARTIFACT_PATH},
        {"path": "/tmp/gradio/raw.png"}
    ]);
    (200, format!("event: complete\ndata: {}\n\n", payload))
}

fn prediction(status: &str, output: Value, error: Value) -> (u16, String) {
    let body = json!({"id": "p-1", "status": status, "output": output, "error": error});
    (200, body.to_string())
}

fn stream_pipeline(
    base: &Url,
    deadline: Duration,
) -> Pipeline<UploadSubmitter, EventStreamPoller> {
    let client = reqwest::Client::new();
    Pipeline::new(
        client.clone(),
        UploadSubmitter::new(client.clone(), base.clone()),
        EventStreamPoller::new(
            client,
            base.clone(),
            ResultLocator::with_defaults(base.clone()),
            INTERVAL,
        ),
        deadline,
    )
}

fn direct_pipeline(
    base: &Url,
    token: Option<&str>,
    deadline: Duration,
) -> Pipeline<DirectSubmitter, StatusPoller> {
    let client = reqwest::Client::new();
    let token = token.map(str::to_string);
    Pipeline::new(
        client.clone(),
        DirectSubmitter::new(client.clone(), base.clone(), token.clone(), "v1"),
        StatusPoller::new(client, base.clone(), token, "grey_depth", INTERVAL),
        deadline,
    )
}

#[tokio::test]
async fn stream_upload_poll_download_decode() -> anyhow::Result<()> {
    let mock = Mock::scripted(
        vec![pending_event(), pending_event(), complete_event()],
        depth_artifact(),
    );
    let base = spawn(mock.clone()).await;

    let surface = stream_pipeline(&base, Duration::from_secs(5))
        .fetch(&upload_image())
        .await?;

    assert_eq!((surface.width(), surface.height()), (100, 50));
    assert_eq!(surface.values().len(), 5000);
    let expected = 32896.0 / 65535.0;
    assert!(surface
        .values()
        .iter()
        .all(|v| (v - expected).abs() < 1e-6));
    assert_eq!(mock.polls.load(Ordering::SeqCst), 3);

    let uploads = mock.uploads.lock().unwrap().clone();
    assert_eq!(
        uploads,
        vec![("files".to_string(), Some("image.jpg".to_string()))]
    );
    let calls = mock.calls.lock().unwrap().clone();
    assert_eq!(
        calls[0],
        json!({
            "data": [{"path": "/tmp/gradio/abc/image.jpg", "meta": {"_type": "gradio.FileData"}}]
        })
    );
    Ok(())
}

#[tokio::test]
async fn stream_error_event_fails_without_waiting() {
    let mock = Mock::scripted(vec![(200, ERROR_EVENT.to_string())], Vec::new());
    let base = spawn(mock.clone()).await;

    let err = stream_pipeline(&base, Duration::from_secs(30))
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::Provider(_))));
    assert_eq!(err.category(), ErrorCategory::UpstreamRejected);
    assert_eq!(mock.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_pending_forever_times_out() {
    let mock = Mock::scripted(vec![pending_event()], Vec::new());
    let base = spawn(mock.clone()).await;
    let deadline = Duration::from_millis(200);

    let err = stream_pipeline(&base, deadline)
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::TimedOut(d)) if d == deadline));
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert!(mock.polls.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn stream_not_found_then_complete_keeps_polling() {
    let mock = Mock::scripted(
        vec![
            (404, json!({"detail": "Not Found"}).to_string()),
            complete_event(),
        ],
        depth_artifact(),
    );
    let base = spawn(mock.clone()).await;

    let surface = stream_pipeline(&base, Duration::from_secs(5))
        .fetch(&upload_image())
        .await
        .unwrap();

    assert_eq!((surface.width(), surface.height()), (100, 50));
    assert_eq!(mock.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_server_errors_are_not_terminal() {
    let mock = Mock::scripted(vec![(503, "overloaded".to_string())], Vec::new());
    let base = spawn(mock.clone()).await;
    let deadline = Duration::from_millis(200);

    let err = stream_pipeline(&base, deadline)
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::TimedOut(d)) if d == deadline));
    assert!(mock.polls.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn wait_or_cancel_returns_promptly() {
    let mock = Mock::scripted(vec![pending_event()], Vec::new());
    let base = spawn(mock).await;
    let client = reqwest::Client::new();
    let poller = EventStreamPoller::new(
        client,
        base.clone(),
        ResultLocator::with_defaults(base),
        INTERVAL,
    );

    let started = tokio::time::Instant::now();
    let err = poller
        .wait_or_cancel(
            &JobHandle::new("evt-1"),
            Duration::from_secs(30),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PollError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn direct_mode_without_token_makes_no_request() {
    let mock = Mock::scripted(Vec::new(), Vec::new());
    let base = spawn(mock.clone()).await;

    let err = direct_pipeline(&base, None, Duration::from_secs(5))
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Submit(SubmissionError::AuthMissing)));
    assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn direct_mode_failed_status_is_terminal() {
    let mock = Mock::scripted(
        vec![
            prediction("processing", Value::Null, Value::Null),
            prediction("failed", Value::Null, json!("NSFW content detected")),
        ],
        Vec::new(),
    );
    let base = spawn(mock.clone()).await;

    let err = direct_pipeline(&base, Some("r8_test"), Duration::from_secs(30))
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::Provider(m)) if m.contains("NSFW")));
    assert_eq!(mock.polls.load(Ordering::SeqCst), 2);
    assert_eq!(
        mock.auth.lock().unwrap().first().map(String::as_str),
        Some("Bearer r8_test")
    );
    let calls = mock.calls.lock().unwrap().clone();
    assert_eq!(calls[0]["version"], "v1");
    assert!(calls[0]["input"]["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn direct_mode_failed_or_canceled_without_error_is_terminal() {
    for status in ["failed", "canceled"] {
        let mock = Mock::scripted(vec![prediction(status, Value::Null, Value::Null)], Vec::new());
        let base = spawn(mock.clone()).await;

        let err = direct_pipeline(&base, Some("r8_test"), Duration::from_secs(30))
            .fetch(&upload_image())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, FetchError::Poll(PollError::Provider(m)) if m.contains(status)),
            "{}: {}",
            status,
            err
        );
        assert_eq!(err.category(), ErrorCategory::UpstreamRejected);
        assert_eq!(mock.polls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn direct_mode_error_while_processing_is_terminal() {
    let mock = Mock::scripted(
        vec![prediction("processing", Value::Null, json!("worker crashed"))],
        Vec::new(),
    );
    let base = spawn(mock.clone()).await;

    let err = direct_pipeline(&base, Some("r8_test"), Duration::from_secs(30))
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::Provider(m)) if m == "worker crashed"));
    assert_eq!(mock.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_mode_success_without_output_url_is_decode_error() {
    let mock = Mock::scripted(
        vec![prediction(
            "succeeded",
            json!({"color_depth": "https://cdn.example/c.png"}),
            Value::Null,
        )],
        Vec::new(),
    );
    let base = spawn(mock.clone()).await;

    let err = direct_pipeline(&base, Some("r8_test"), Duration::from_secs(30))
        .fetch(&upload_image())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Poll(PollError::Decode(ref m)) if m.contains("grey_depth")));
    assert_eq!(err.category(), ErrorCategory::MalformedUpstreamResponse);
    assert_eq!(mock.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_mode_downloads_named_output() {
    let mock = Mock::scripted(Vec::new(), depth_artifact());
    let base = spawn(mock.clone()).await;
    let artifact_url = base.join("/artifacts/depth.png").unwrap();
    *mock.script.lock().unwrap() = vec![
        prediction("starting", Value::Null, Value::Null),
        prediction(
            "succeeded",
            json!({
                "color_depth": "http://unused.invalid/c.png",
                "grey_depth": artifact_url.as_str()
            }),
            Value::Null,
        ),
    ];

    let surface = direct_pipeline(&base, Some("r8_test"), Duration::from_secs(5))
        .fetch(&upload_image())
        .await
        .unwrap();
    assert_eq!((surface.width(), surface.height()), (100, 50));
    assert_eq!(mock.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_artifact_is_a_download_error() {
    let base = spawn(Mock::scripted(Vec::new(), Vec::new())).await;
    let missing = ResultReference::new(base.join("/nothing-here.png").unwrap());

    let err = download(&reqwest::Client::new(), &missing).await.unwrap_err();
    assert!(matches!(err, DownloadError::Status(404)));
}

#[tokio::test]
async fn configured_provider_runs_the_stream_flow() {
    let mock = Mock::scripted(vec![complete_event()], depth_artifact());
    let base = spawn(mock).await;
    let config = PipelineConfig::parse_from([
        "depth",
        "--provider",
        "stream",
        "--provider-url",
        base.as_str(),
        "--poll-interval-ms",
        "20",
        "--poll-timeout-secs",
        "5",
    ]);

    let provider = Provider::from_config(&config).unwrap();
    let surface = provider.fetch(&upload_image()).await.unwrap();
    assert_eq!(surface.width(), 100);
}

#[tokio::test]
async fn empty_upload_is_invalid_input() {
    let mock = Mock::scripted(Vec::new(), Vec::new());
    let base = spawn(mock.clone()).await;

    let err = stream_pipeline(&base, Duration::from_secs(5))
        .fetch(&[])
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::InvalidInput);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submitter_trait_is_usable_on_its_own() {
    let mock = Mock::scripted(Vec::new(), Vec::new());
    let base = spawn(mock).await;
    let submitter = UploadSubmitter::new(reqwest::Client::new(), base);
    let handle = submitter.submit(&upload_image()).await.unwrap();
    assert_eq!(handle.as_str(), "evt-1");
}
