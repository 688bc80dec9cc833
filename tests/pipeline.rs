//! End-to-end generation tests against a wiremock fal server.
//!
//! The mock server plays three roles: model endpoints, object storage and
//! the CDN the generated images are downloaded from.

use fal_image_mcp::mcp::{GenerateImageTool, ListModelsTool, McpServer, McpTool};
use fal_image_mcp::services::invoker::RetryPolicy;
use fal_image_mcp::services::{FalClient, ImageGenerator, ImagePersister, UsageLogger};
use fal_image_mcp::{Config, ErrorCategory, GenerationRequest, ModelKind};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn generator_for(server: &MockServer, usage: UsageLogger) -> ImageGenerator {
    let config = Config {
        api_key: "fal_test_key".to_string(),
        api_base: server.uri(),
        storage_base: server.uri(),
        debug: false,
        log_dir: None,
    };
    let http = reqwest::Client::new();
    ImageGenerator::new(
        Arc::new(FalClient::new(&config, http.clone())),
        ImagePersister::new(http),
        usage,
    )
    .with_retry_policy(RetryPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        ..Default::default()
    })
}

fn images_body(server: &MockServer, names: &[&str]) -> Value {
    let images: Vec<Value> = names
        .iter()
        .map(|n| json!({"url": format!("{}/cdn/{}", server.uri(), n), "width": 1024, "height": 1024}))
        .collect();
    json!({ "images": images, "description": "done" })
}

async fn serve_file(server: &MockServer, name: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

async fn expect_no_uploads(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/storage/upload/initiate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn text_prompt_routes_to_fast_generate() {
    let server = MockServer::start().await;
    expect_no_uploads(&server).await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana"))
        .and(header("Authorization", "Key fal_test_key"))
        .and(body_partial_json(json!({
            "prompt": "a red cube",
            "output_format": "png",
            "num_images": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(images_body(&server, &["cube.png"])))
        .expect(1)
        .mount(&server)
        .await;
    serve_file(&server, "cube.png", b"cube-bytes").await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("cube.png");
    let outcome = generator_for(&server, UsageLogger::default())
        .generate(&GenerationRequest::new("a red cube", &output))
        .await
        .unwrap();

    assert_eq!(outcome.result.image_path, output);
    assert_eq!(outcome.result.model, ModelKind::Fast);
    assert_eq!(outcome.description.as_deref(), Some("done"));
    assert_eq!(std::fs::read(&output).unwrap(), b"cube-bytes");

    let requests = server.received_requests().await.unwrap();
    let run: &Request = requests
        .iter()
        .find(|r| r.url.path() == "/fal-ai/nano-banana")
        .unwrap();
    let body: Value = serde_json::from_slice(&run.body).unwrap();
    assert!(body.get("image_urls").is_none());
    assert!(body.get("resolution").is_none());
}

#[tokio::test]
async fn remote_reference_is_forwarded_to_fast_edit() {
    let server = MockServer::start().await;
    expect_no_uploads(&server).await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana/edit"))
        .and(body_partial_json(json!({
            "prompt": "add a hat",
            "image_urls": ["https://x/y.jpg"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(images_body(&server, &["hat.png"])))
        .expect(1)
        .mount(&server)
        .await;
    serve_file(&server, "hat.png", b"hat-bytes").await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hat.png");
    let request = GenerationRequest::new("add a hat", &output).with_reference_image("https://x/y.jpg");
    generator_for(&server, UsageLogger::default())
        .generate(&request)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), b"hat-bytes");
}

#[tokio::test]
async fn local_reference_is_uploaded_for_pro_edit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/upload/initiate"))
        .and(body_partial_json(json!({"content_type": "image/jpeg", "file_name": "dog.jpg"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": format!("{}/put/dog.jpg", server.uri()),
            "file_url": "https://cdn.fal.test/dog.jpg"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/put/dog.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana-pro/edit"))
        .and(body_partial_json(json!({
            "image_urls": ["https://cdn.fal.test/dog.jpg"],
            "resolution": "2K",
            "aspect_ratio": "auto",
            "num_images": 2
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(images_body(&server, &["a.png", "b.png"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    serve_file(&server, "a.png", b"first").await;
    serve_file(&server, "b.png", b"second").await;

    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("dog.jpg");
    std::fs::write(&reference, b"jpeg").unwrap();
    let output = dir.path().join("dog-hat.png");

    let request = GenerationRequest::new("put a hat on the dog", &output)
        .with_model(ModelKind::HighFidelity)
        .with_reference_image(reference.to_string_lossy())
        .with_aspect_ratio("auto")
        .with_resolution(fal_image_mcp::models::Resolution::TwoK)
        .with_num_images(2);
    let outcome = generator_for(&server, UsageLogger::default())
        .generate(&request)
        .await
        .unwrap();

    let second = dir.path().join("dog-hat_2.png");
    assert_eq!(outcome.saved.extra, vec![second.clone()]);
    assert_eq!(std::fs::read(&output).unwrap(), b"first");
    assert_eq!(std::fs::read(&second).unwrap(), b"second");
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "busy"})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(images_body(&server, &["ok.png"])))
        .expect(1)
        .mount(&server)
        .await;
    serve_file(&server, "ok.png", b"ok").await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("ok.png");
    generator_for(&server, UsageLogger::default())
        .generate(&GenerationRequest::new("retry me", &output))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), b"ok");
}

#[tokio::test]
async fn auth_failure_is_classified_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/nano-banana"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid API key"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let usage = UsageLogger::new(Some(dir.path().join("logs")));
    let err = generator_for(&server, usage.clone())
        .generate(&GenerationRequest::new("a red cube", dir.path().join("x.png")))
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::AuthError);
    assert_eq!(err.status, Some(401));
    assert!(err.caller_text().starts_with("[AUTH_ERROR]"));

    let log = std::fs::read_to_string(usage.usage_file().unwrap()).unwrap();
    let record: Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(record["success"], false);
    assert_eq!(record["model"], "fast");
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn tools_over_the_protocol() {
    let server = MockServer::start().await;
    let generator = Arc::new(generator_for(&server, UsageLogger::default()));
    let mcp = McpServer::new("fal-image-mcp", "0.1.0")
        .with_tool(GenerateImageTool::new(generator.clone()))
        .with_tool(ListModelsTool::new(generator.clone()));

    let reply = mcp
        .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap();
    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["generate_image", "list_models"]);

    let reply = mcp
        .handle_message(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"generate_image","arguments":{"prompt":"cube","output_path":"/tmp/c.png","resolution":"4K"}}}"#,
        )
        .await
        .unwrap();
    assert_eq!(reply["result"]["isError"], true);
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("[VALIDATION_ERROR]"));

    let listed = ListModelsTool::new(generator).execute(Value::Null).await.unwrap();
    assert_eq!(listed.structured["models"][1]["id"], "high-fidelity");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_model_argument_is_recorded_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let usage = UsageLogger::new(Some(dir.path().to_path_buf()));
    let tool = GenerateImageTool::new(Arc::new(generator_for(&server, usage.clone())));

    let err = match tool
        .execute(json!({"prompt": "cube", "output_path": "/tmp/c.png", "model": "ultra"}))
        .await
    {
        Ok(_) => panic!("unknown model was accepted"),
        Err(err) => err,
    };
    assert_eq!(err.category, ErrorCategory::ValidationError);

    let log = std::fs::read_to_string(usage.usage_file().unwrap()).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"success\":false"));
    assert!(server.received_requests().await.unwrap().is_empty());
}
