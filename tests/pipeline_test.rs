//! End-to-end pipeline scenarios driven through mock engines.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use paragon_ocr::engines::mock::{MockClassical, MockFallback, MockVision};
use paragon_ocr::{ExtractionRequest, PipelineConfig, ReceiptPipeline};

const RECEIPT_TEXT: &str = "BIEDRONKA\nPARAGON FISKALNY\nChleb 3,99\nMleko 2,49\nSUMA PLN 17,57\nData: 15.12.2024\nDziękujemy";

fn test_config() -> PipelineConfig {
    PipelineConfig {
        max_retries: 1,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        ..PipelineConfig::default()
    }
}

/// A clean, unrotated synthetic receipt raster: dark text-like bars on a
/// white ground.
fn receipt_png() -> Vec<u8> {
    let img: GrayImage = ImageBuffer::from_fn(240, 320, |x, y| {
        if y % 20 < 2 && x > 16 && x < 224 {
            Luma([20u8])
        } else {
            Luma([245u8])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode test PNG");
    buf
}

/// Minimal single-page PDF with embedded text, built with lopdf.
fn text_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode content")));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize test PDF");
    bytes
}

fn temp_artifacts() -> HashSet<PathBuf> {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("paragon-ocr-"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn clean_receipt_extracts_text_with_high_confidence() {
    let classical = Arc::new(MockClassical::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical.clone()).build();

    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    assert!(response.text.contains("SUMA PLN 17,57"));
    assert!(response.text.contains("Data: 15.12.2024"));
    assert!(response.confidence >= 0.65, "confidence {}", response.confidence);
    assert_eq!(response.engines_used, vec!["mock-classical"]);
    assert_eq!(classical.calls(), 1);
    assert_eq!(
        response.preprocessing.operations_applied,
        vec!["resize", "deskew", "denoise", "contrast", "text_enhance"]
    );
}

#[tokio::test]
async fn empty_input_fails_validation_before_any_engine_runs() {
    let classical = Arc::new(MockClassical::returning(RECEIPT_TEXT));
    let vision = Arc::new(MockVision::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical.clone())
        .with_vision(vision.clone())
        .build();

    let failure = pipeline
        .run(ExtractionRequest::image(Vec::new()))
        .await
        .expect_err("empty input must fail");

    assert_eq!(failure.stage, "validate");
    assert_eq!(failure.kind, "VALIDATION");
    assert_eq!(classical.calls(), 0);
    assert_eq!(vision.calls(), 0);
}

#[tokio::test]
async fn document_input_never_invokes_vision() {
    let classical = Arc::new(MockClassical::returning("unused for digital PDFs"));
    let vision = Arc::new(MockVision::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical.clone())
        .with_vision(vision.clone())
        .build();

    let pdf = text_pdf("SUMA PLN 17,57 Data: 15.12.2024");
    let response = pipeline
        .run(ExtractionRequest::document(pdf))
        .await
        .expect("digital PDF should extract directly");

    assert!(response.text.contains("SUMA PLN 17,57"));
    assert_eq!(vision.calls(), 0, "vision must never see document inputs");
    // Direct text extraction succeeded, so even the classical OCR engine
    // stayed idle.
    assert_eq!(classical.calls(), 0);
    assert!(response.preprocessing.operations_applied.is_empty());
}

#[tokio::test]
async fn unreadable_document_fails_with_dedicated_error() {
    let classical = Arc::new(MockClassical::returning("unused"));
    let vision = Arc::new(MockVision::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_vision(vision.clone())
        .build();

    let failure = pipeline
        .run(ExtractionRequest::document(b"%PDF-1.4 not actually a pdf".to_vec()))
        .await
        .expect_err("garbage PDF must fail");

    assert_eq!(failure.stage, "recognize");
    assert_eq!(failure.kind, "UNSUPPORTED_DOCUMENT");
    assert_eq!(vision.calls(), 0);
}

#[tokio::test]
async fn short_vision_output_falls_back_to_classical_text() {
    let classical_text = "Chleb 3,99\nMleko 2,49\nSUMA PLN 6,48";
    let classical = Arc::new(MockClassical::returning(classical_text));
    let vision = Arc::new(MockVision::returning("SUMA"));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_vision(vision.clone())
        .build();

    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    assert_eq!(vision.calls(), 1);
    assert!(
        response.text.len() >= classical_text.trim().len(),
        "final text must be at least as long as the classical output"
    );
    assert!(response.text.contains("Chleb 3,99"));
}

#[tokio::test]
async fn vision_wins_when_its_text_scores_higher() {
    let classical = Arc::new(MockClassical::returning("blurry smudge text"));
    let vision = Arc::new(MockVision::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_vision(vision.clone())
        .build();

    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    assert!(response.text.contains("SUMA PLN 17,57"));
    assert!(response.engines_used.contains(&"mock-vision".to_string()));
}

#[tokio::test]
async fn duplicate_lines_survive_once_in_first_position() {
    let classical = Arc::new(MockClassical::returning(
        "Chleb 3,99\nMleko 2,49\nChleb 3,99\nSUMA PLN 6,48",
    ));
    let pipeline = ReceiptPipeline::builder(test_config(), classical).build();

    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    let lines: Vec<&str> = response.text.lines().collect();
    assert_eq!(lines.iter().filter(|l| **l == "Chleb 3,99").count(), 1);
    assert_eq!(lines[0], "Chleb 3,99");
}

#[tokio::test]
async fn low_confidence_triggers_fallback_engine() {
    let classical = Arc::new(MockClassical::returning("zzzz qqqq xxxx"));
    let fallback = Arc::new(MockFallback::returning("RAZEM PLN 25,00\nDziękujemy", 0.9));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_fallback(fallback.clone())
        .build();

    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    assert_eq!(fallback.calls(), 1);
    assert!(response.text.contains("RAZEM PLN 25,00"));
    assert!(response.engines_used.contains(&"mock-fallback".to_string()));
}

#[tokio::test]
async fn confident_result_skips_fallback_engine() {
    let classical = Arc::new(MockClassical::returning(RECEIPT_TEXT));
    let fallback = Arc::new(MockFallback::returning("unused", 0.9));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_fallback(fallback.clone())
        .build();

    pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");

    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn caller_fallback_text_rescues_a_run_with_no_engine_output() {
    let classical = Arc::new(MockClassical::failing("engine offline"));
    let vision = Arc::new(MockVision::failing("endpoint down"));
    let pipeline = ReceiptPipeline::builder(test_config(), classical)
        .with_vision(vision)
        .build();

    let request = ExtractionRequest::image(receipt_png())
        .with_fallback_text("SUMA PLN 17,57\nData: 15.12.2024");
    let response = pipeline.run(request).await.expect("fallback text should rescue the run");

    assert!(response.text.contains("SUMA PLN 17,57"));
    assert_eq!(response.engines_used, vec!["fallback-text"]);
}

#[tokio::test]
async fn temp_files_are_gone_after_success_and_failure() {
    // Success path: the response reports the temp path, which must be
    // gone by the time the run returns.
    let classical = Arc::new(MockClassical::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical).build();
    let response = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("run should succeed");
    let reported = response
        .preprocessing
        .processed_image_path
        .expect("processed image path should be reported");
    assert!(!reported.exists(), "temp file leaked on success: {reported:?}");

    // Failure path: no path is reported, so diff the temp directory and
    // allow concurrent runs a moment to clean up their own files.
    let before = temp_artifacts();
    let failing = Arc::new(MockClassical::failing("engine offline"));
    let pipeline = ReceiptPipeline::builder(test_config(), failing).build();
    let failure = pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect_err("run should fail");
    assert_eq!(failure.stage, "recognize");
    assert_eq!(failure.kind, "STAGE_RETRY_EXHAUSTED");

    let mut leaked: Vec<PathBuf> = temp_artifacts().difference(&before).cloned().collect();
    for _ in 0..20 {
        leaked.retain(|p| p.exists());
        if leaked.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(leaked.is_empty(), "temp files leaked on failure: {leaked:?}");
}

#[tokio::test]
async fn statistics_accumulate_across_runs() {
    let classical = Arc::new(MockClassical::returning(RECEIPT_TEXT));
    let pipeline = ReceiptPipeline::builder(test_config(), classical).build();

    pipeline
        .run(ExtractionRequest::image(receipt_png()))
        .await
        .expect("first run should succeed");
    pipeline
        .run(ExtractionRequest::image(Vec::new()))
        .await
        .expect_err("second run should fail validation");

    let stats = pipeline.statistics();
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.per_stage["validate"].count, 2);
    assert_eq!(stats.per_stage["preprocess"].count, 1);
    assert_eq!(stats.per_stage["postprocess"].count, 1);

    pipeline.reset_statistics();
    assert_eq!(pipeline.statistics().total_processed, 0);
}
