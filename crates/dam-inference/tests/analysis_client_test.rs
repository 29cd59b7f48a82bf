//! HTTP contract tests for the analysis service client.

use dam_core::{
    BlockType, Error, LabelDetector, TextDetectionJobs, TextDetectionStatus, TextDetector,
    Translator,
};
use dam_inference::{AnalysisConfig, HttpAnalysisClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, api_key: Option<&str>) -> HttpAnalysisClient {
    HttpAnalysisClient::new(AnalysisConfig {
        base_url: server.uri(),
        api_key: api_key.map(String::from),
        timeout_seconds: 5,
    })
    .expect("Failed to create client")
}

#[tokio::test]
async fn test_detect_text_returns_blocks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text/detect"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_json(json!({ "storage_key": "documents/u/label.png" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blocks": [
                { "block_type": "PAGE" },
                { "block_type": "LINE", "text": "Eau de parfum" },
                { "block_type": "WORD", "text": "Eau" },
                { "block_type": "LINE", "text": "100 ml" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let blocks = client(&server, Some("secret"))
        .detect_text("documents/u/label.png")
        .await
        .unwrap();

    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0].block_type, BlockType::Page);
    assert_eq!(dam_core::join_lines(&blocks), "Eau de parfum\n100 ml");
}

#[tokio::test]
async fn test_detect_text_error_status_maps_to_ocr_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text/detect"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "unsupported image" })),
        )
        .mount(&server)
        .await;

    let err = client(&server, None)
        .detect_text("documents/u/bad.tif")
        .await
        .unwrap_err();
    match err {
        Error::Ocr(msg) => {
            assert!(msg.contains("422"));
            assert!(msg.contains("unsupported image"));
        }
        other => panic!("expected OCR error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_text_job_start_and_poll() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "j-42" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/text/jobs/j-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "blocks": [{ "block_type": "LINE", "text": "page one" }]
        })))
        .mount(&server)
        .await;

    let client = client(&server, None);
    let job_id = client.start_job("documents/u/scan.pdf").await.unwrap();
    assert_eq!(job_id, "j-42");

    let job = client.poll(&job_id).await.unwrap();
    assert_eq!(job.status, TextDetectionStatus::Succeeded);
    assert_eq!(dam_core::join_lines(&job.blocks), "page one");
}

#[tokio::test]
async fn test_detect_labels_sends_thresholds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/labels/detect"))
        .and(body_json(json!({
            "storage_key": "documents/u/a.jpg",
            "max_labels": 5,
            "min_confidence": 90.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "labels": [
                { "name": "Bottle", "confidence": 99.2 },
                { "name": "Perfume", "confidence": 93.5 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let labels = client(&server, None)
        .detect_labels("documents/u/a.jpg", 5, 90.0)
        .await
        .unwrap();
    let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Bottle", "Perfume"]);
}

#[tokio::test]
async fn test_label_failure_maps_to_vision_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/labels/detect"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .detect_labels("documents/u/a.jpg", 5, 90.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Vision(_)));
}

#[tokio::test]
async fn test_translate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/translate"))
        .and(body_json(json!({
            "text": "Bottle",
            "source_lang": "en",
            "target_lang": "es"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "translated_text": "Botella" })),
        )
        .mount(&server)
        .await;

    let translated = client(&server, None)
        .translate("Bottle", "en", "es")
        .await
        .unwrap();
    assert_eq!(translated, "Botella");
}

#[tokio::test]
async fn test_malformed_translation_body_is_translation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/translate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .translate("Bottle", "en", "es")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Translation(_)));
}
