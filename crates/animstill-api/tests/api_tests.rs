//! API integration tests.

use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt;

use animstill_api::{create_router, ApiConfig, AppState};
use animstill_models::{AnimationKind, Job, JobId};
use animstill_queue::{JobQueue, JobReceiver, JobStore};
use animstill_worker::{CleanupScheduler, RenderWorker, WorkerConfig};

const BOUNDARY: &str = "animstill-test-boundary";

const FAKE_ENCODER: &str = r#"#!/bin/sh
for last; do :; done
echo "out_time=00:00:03.000000" >&2
printf 'fake mp4' > "$last"
exit 0
"#;

struct TestApp {
    dir: TempDir,
    store: Arc<JobStore>,
    router: Router,
    // Keeps the queue open when no worker runs
    _receiver: Option<JobReceiver>,
    _shutdown: Option<watch::Sender<bool>>,
}

impl TestApp {
    fn config(dir: &TempDir) -> (ApiConfig, WorkerConfig) {
        let config = ApiConfig {
            static_dir: dir.path().join("static"),
            renders_dir: dir.path().join("renders"),
            uploads_dir: dir.path().join("uploads"),
            metrics_enabled: false,
            ..ApiConfig::default()
        };
        for path in [&config.static_dir, &config.renders_dir, &config.uploads_dir] {
            std::fs::create_dir_all(path).unwrap();
        }

        let encoder = dir.path().join("fake-ffmpeg.sh");
        std::fs::write(&encoder, FAKE_ENCODER).unwrap();
        std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();

        let worker_config = WorkerConfig {
            ffmpeg_path: encoder,
            ..WorkerConfig::default()
        };
        (config, worker_config)
    }

    /// Router whose queue is never drained.
    fn idle() -> Self {
        let dir = TempDir::new().unwrap();
        let (config, worker_config) = Self::config(&dir);
        let store = Arc::new(JobStore::new());
        let (queue, receiver) = JobQueue::new();
        let state = AppState::new(config, worker_config, Arc::clone(&store), queue);

        Self {
            dir,
            store,
            router: create_router(state, None),
            _receiver: Some(receiver),
            _shutdown: None,
        }
    }

    /// Router backed by a running worker and the fake encoder.
    fn with_worker() -> Self {
        let dir = TempDir::new().unwrap();
        let (config, worker_config) = Self::config(&dir);
        let store = Arc::new(JobStore::new());
        let (queue, receiver) = JobQueue::new();
        let (cleanup, _) = CleanupScheduler::spawn(Arc::clone(&store), worker_config.retention);
        let (shutdown, shutdown_rx) = watch::channel(false);
        RenderWorker::new(worker_config.clone(), Arc::clone(&store), cleanup, shutdown_rx)
            .spawn(receiver);
        let state = AppState::new(config, worker_config, Arc::clone(&store), queue);

        Self {
            dir,
            store,
            router: create_router(state, None),
            _receiver: None,
            _shutdown: Some(shutdown),
        }
    }

    fn uploads(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }

    async fn get(&self, uri: &str) -> Response {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn submit(&self, form: MultipartForm) -> Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/render")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(form.finish()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

#[derive(Default)]
struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    fn file(mut self, name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::idle();

    for uri in ["/health", "/healthz"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "healthy");
    }
}

#[tokio::test]
async fn test_ready_reports_encoder() {
    let app = TestApp::idle();
    let response = app.get("/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["worker"]["detail"], "0 queued, 0 running");
}

#[tokio::test]
async fn test_ready_degraded_without_worker() {
    let mut app = TestApp::idle();
    app._receiver = None;

    let response = app.get("/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["worker"]["status"], "error");
}

#[tokio::test]
async fn test_submit_queues_job() {
    let app = TestApp::idle();
    let form = MultipartForm::default()
        .file("image", "image/png", &png(400, 400))
        .text("animation", "zoomIn")
        .text("speed", "2");

    let response = app.submit(form).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = json(response).await["id"].as_str().unwrap().to_string();

    let progress = json(app.get(&format!("/progress/{}", id)).await).await;
    assert_eq!(progress["state"], "queued");
    assert_eq!(progress["progress"], 0);
    assert_eq!(progress["done"], false);
    assert!(progress["url"].is_null());
    assert!(progress["error"].is_null());

    // Raw upload is gone, the 16:9 still waits for the worker
    let crop = app.uploads().join(format!("{}_crop.jpg", id));
    assert!(crop.exists());
    assert!(!app.uploads().join(format!("{}_in", id)).exists());
    let still = image::open(&crop).unwrap();
    assert_eq!((still.width(), still.height()), (400, 225));

    let job = app.store.get(&id.as_str().into()).unwrap();
    assert_eq!(job.speed, 2.0);
}

#[tokio::test]
async fn test_unknown_animation_falls_back_to_static() {
    let app = TestApp::idle();
    let form = MultipartForm::default()
        .file("image", "image/png", &png(64, 36))
        .text("animation", "spin");

    let response = app.submit(form).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = json(response).await["id"].as_str().unwrap().to_string();

    let job = app.store.get(&id.as_str().into()).unwrap();
    assert_eq!(job.animation.as_str(), "static");
    assert_eq!(job.speed, 1.0);
}

#[tokio::test]
async fn test_non_image_upload_rejected() {
    let app = TestApp::idle();
    let form = MultipartForm::default().file("image", "text/plain", b"hello");

    let response = app.submit(form).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json(response).await["detail"].is_string());
    assert!(app.store.is_empty());
    assert!(dir_is_empty(&app.uploads()));
}

#[tokio::test]
async fn test_missing_image_rejected() {
    let app = TestApp::idle();
    let form = MultipartForm::default().text("animation", "lr");

    assert_eq!(app.submit(form).await.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_bad_speed_rejected() {
    let app = TestApp::idle();

    for speed in ["fast", "0", "-1", "NaN", "1e-300", "0.01", "1000"] {
        let form = MultipartForm::default()
            .file("image", "image/png", &png(32, 18))
            .text("speed", speed);
        assert_eq!(
            app.submit(form).await.status(),
            StatusCode::BAD_REQUEST,
            "speed {}",
            speed
        );
    }
    assert!(app.store.is_empty());
    assert!(dir_is_empty(&app.uploads()));
}

#[tokio::test]
async fn test_undecodable_image_cleans_up() {
    let app = TestApp::idle();
    let form = MultipartForm::default().file("image", "image/jpeg", b"not really a jpeg");

    let response = app.submit(form).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.store.is_empty());
    assert!(dir_is_empty(&app.uploads()));
}

#[tokio::test]
async fn test_unknown_job_not_found() {
    let app = TestApp::idle();

    let response = app.get("/progress/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["detail"], "Job not found");

    assert_eq!(
        app.get("/download/does-not-exist").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_download_requires_finished_render() {
    let app = TestApp::idle();
    let form = MultipartForm::default().file("image", "image/png", &png(32, 18));
    let id = json(app.submit(form).await).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    assert_eq!(
        app.get(&format!("/download/{}", id)).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_static_ui_served_at_root() {
    let app = TestApp::idle();
    std::fs::write(app.dir.path().join("static/index.html"), "<h1>animstill</h1>").unwrap();

    let response = app.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    // Development servers speak plain HTTP
    assert!(!response.headers().contains_key("strict-transport-security"));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<h1>animstill</h1>");
}

#[tokio::test]
async fn test_render_completes_end_to_end() {
    let app = TestApp::with_worker();
    let form = MultipartForm::default()
        .file("image", "image/png", &png(320, 240))
        .text("animation", "zoomIn")
        .text("speed", "1.0");

    let response = app.submit(form).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = json(response).await["id"].as_str().unwrap().to_string();

    let mut last_progress = 0;
    let mut finished = None;
    for _ in 0..250 {
        let progress = json(app.get(&format!("/progress/{}", id)).await).await;
        let value = progress["progress"].as_u64().unwrap();
        assert!(value >= last_progress);
        last_progress = value;
        if progress["done"] == true {
            finished = Some(progress);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let finished = finished.expect("render did not finish");
    assert_eq!(finished["state"], "succeeded");
    assert_eq!(finished["progress"], 100);
    let url = finished["url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("/renders/{}.mp4", id));

    let response = app.get(&url).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&format!("/download/{}", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}.mp4\"", id).as_str()
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"fake mp4");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/download/{}", id))
                .header(header::RANGE, "bytes=0-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert!(response.headers().contains_key(header::CONTENT_DISPOSITION));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"fake");
}

#[tokio::test]
async fn test_download_of_deleted_render_not_found() {
    let app = TestApp::idle();
    let id = JobId::new();
    let job = Job::new(
        id.clone(),
        app.uploads().join("gone_crop.jpg"),
        app.dir.path().join("renders/gone.mp4"),
        AnimationKind::Static,
        1.0,
    );
    app.store.insert(job).unwrap();
    app.store.start(&id, 5).unwrap();
    app.store.succeed(&id, "/renders/gone.mp4").unwrap();

    let response = app.get(&format!("/download/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["detail"], "Render not found");
}

#[tokio::test]
async fn test_request_id_kept_when_well_formed() {
    let app = TestApp::idle();
    let request = |id: &str| {
        Request::builder()
            .uri("/health")
            .header("x-request-id", id)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.router.clone().oneshot(request("client-42")).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "client-42");

    let response = app.router.clone().oneshot(request("not ok;")).await.unwrap();
    let replaced = response.headers()["x-request-id"].to_str().unwrap();
    assert_ne!(replaced, "not ok;");
    assert_eq!(replaced.len(), 36);
}

#[tokio::test]
async fn test_production_sends_strict_transport_security() {
    let dir = TempDir::new().unwrap();
    let (mut config, worker_config) = TestApp::config(&dir);
    config.environment = "production".to_string();
    let (queue, _receiver) = JobQueue::new();
    let state = AppState::new(config, worker_config, Arc::new(JobStore::new()), queue);
    let router = create_router(state, None);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("strict-transport-security"));
}
