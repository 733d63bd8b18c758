//! End-to-end properties of the prediction pipeline
//!
//! Runs the full decode → preprocess → infer → explain → composite chain over
//! the reference model written by `common::reference_model_dir`.

mod common;

use base64::Engine;
use common::{
    channel_distance, golden_config, golden_pipeline, jpeg, load_model, png,
    reference_model_dir, reference_model_dir_with, solid, two_tone, GOLDEN_CONFIDENCE,
    GOLDEN_LABEL, GOLDEN_OVERLAY,
};
use lesionscope::{
    error::Result, load_pipeline, predict_from_reader, OverlayFormat, PredictionPipeline,
    ServiceConfig,
};
use serde_json::json;

#[test]
fn test_golden_red_fixture() -> Result<()> {
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());

    let outcome = pipeline.predict_bytes(&png(&solid(64, 48, [255, 0, 0])), Some("image/png"))?;

    assert_eq!(outcome.response.prediction.result, GOLDEN_LABEL);
    assert_eq!(outcome.response.prediction.confidence, GOLDEN_CONFIDENCE);
    assert!(!outcome.explanation_degraded);
    assert_eq!(outcome.composite.format, OverlayFormat::Png);

    let overlay = image::load_from_memory(&outcome.composite.bytes)
        .expect("overlay decodes")
        .to_rgb8();
    assert_eq!(overlay.dimensions(), (64, 48));
    for pixel in overlay.pixels() {
        assert!(
            channel_distance(pixel.0, GOLDEN_OVERLAY) <= 2,
            "pixel {:?} too far from {:?}",
            pixel.0,
            GOLDEN_OVERLAY
        );
    }
    Ok(())
}

#[test]
fn test_golden_response_carries_overlay_bytes() -> Result<()> {
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());
    let outcome = pipeline.predict_bytes(&png(&solid(20, 20, [255, 0, 0])), None)?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&outcome.response.superimposed_image)
        .expect("valid base64");
    assert_eq!(decoded, outcome.composite.bytes);

    let body = serde_json::to_value(&outcome.response).expect("serializes");
    assert_eq!(
        body["prediction"],
        json!({ "result": GOLDEN_LABEL, "confidence": GOLDEN_CONFIDENCE })
    );
    Ok(())
}

#[test]
fn test_golden_jpeg_round_trip() -> Result<()> {
    let model_dir = reference_model_dir();
    let config = ServiceConfig::builder()
        .model_dir(model_dir.path())
        .occlusion_window(8)
        .occlusion_stride(8)
        .build()?;
    let pipeline = PredictionPipeline::new(load_model(model_dir.path()), &config)?;

    let outcome = pipeline.predict_bytes(&jpeg(&solid(48, 48, [255, 0, 0])), Some("image/jpeg"))?;
    assert_eq!(outcome.response.prediction.result, GOLDEN_LABEL);

    let overlay = image::load_from_memory(&outcome.composite.bytes)
        .expect("overlay decodes")
        .to_rgb8();
    assert_eq!(overlay.dimensions(), (48, 48));
    let center = overlay.get_pixel(24, 24).0;
    assert!(center[0] > 150, "red channel too low: {center:?}");
    assert!(center[1] < 40 && center[2] < 40, "overlay not red: {center:?}");
    Ok(())
}

#[test]
fn test_output_dimensions_match_input_for_both_resize_policies() -> Result<()> {
    for policy in ["stretch", "letterbox"] {
        let model_dir = reference_model_dir_with(json!({ "resize": policy }));
        let pipeline = golden_pipeline(model_dir.path());

        for (width, height) in [(64, 48), (17, 91), (200, 33), (32, 32)] {
            let outcome = pipeline.predict_bytes(&png(&two_tone(width, height)), None)?;
            assert_eq!(
                (outcome.composite.width, outcome.composite.height),
                (width, height),
                "{policy} {width}x{height}"
            );

            let overlay = image::load_from_memory(&outcome.composite.bytes)
                .expect("overlay decodes");
            assert_eq!((overlay.width(), overlay.height()), (width, height));

            let confidence = outcome.prediction.confidence;
            assert!((0.0..=1.0).contains(&confidence));
            assert!(["benign", "malignant"].contains(&outcome.prediction.label.as_str()));
        }
    }
    Ok(())
}

#[test]
fn test_identical_input_gives_identical_output() -> Result<()> {
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());
    let bytes = png(&two_tone(57, 43));

    let first = pipeline.predict_bytes(&bytes, None)?;
    let second = pipeline.predict_bytes(&bytes, None)?;

    assert_eq!(first.prediction, second.prediction);
    assert_eq!(first.composite.bytes, second.composite.bytes);
    assert_eq!(first.response, second.response);
    assert_ne!(first.request_id, second.request_id);
    Ok(())
}

#[test]
fn test_single_pixel_image() -> Result<()> {
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());

    let outcome = pipeline.predict_bytes(&png(&solid(1, 1, [255, 0, 0])), None)?;
    assert_eq!(outcome.prediction.label, GOLDEN_LABEL);
    assert_eq!((outcome.composite.width, outcome.composite.height), (1, 1));
    Ok(())
}

#[test]
fn test_benign_image() -> Result<()> {
    // Black input normalizes to -1 everywhere: malignant logit -1, benign 0
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());

    let outcome = pipeline.predict_bytes(&png(&solid(40, 40, [0, 0, 0])), None)?;
    assert_eq!(outcome.response.prediction.result, "benign");
    assert_eq!(outcome.response.prediction.confidence, GOLDEN_CONFIDENCE);
    Ok(())
}

#[test]
fn test_confidence_decimals_follow_config() -> Result<()> {
    let model_dir = reference_model_dir();
    let config = ServiceConfig::builder()
        .model_dir(model_dir.path())
        .confidence_decimals(2)
        .occlusion_window(16)
        .occlusion_stride(16)
        .build()?;
    let pipeline = load_pipeline(&config)?;

    let outcome = pipeline.predict_bytes(&png(&solid(10, 10, [255, 0, 0])), None)?;
    assert_eq!(outcome.response.prediction.confidence, "0.73");
    Ok(())
}

#[tokio::test]
async fn test_predict_from_reader() -> Result<()> {
    let model_dir = reference_model_dir();
    let pipeline = load_pipeline(&golden_config(model_dir.path()))?;

    let reader = std::io::Cursor::new(png(&solid(12, 12, [255, 0, 0])));
    let outcome = predict_from_reader(reader, &pipeline).await?;
    assert_eq!(outcome.response.prediction.confidence, GOLDEN_CONFIDENCE);
    Ok(())
}

#[test]
fn test_concurrent_pipelines_share_one_model() {
    let model_dir = reference_model_dir();
    let pipeline = golden_pipeline(model_dir.path());
    let bytes = png(&solid(30, 30, [255, 0, 0]));

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                let bytes = &bytes;
                scope.spawn(move || pipeline.predict_bytes(bytes, None))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect()
    });

    for result in results {
        let outcome = result.expect("prediction");
        assert_eq!(outcome.response.prediction.confidence, GOLDEN_CONFIDENCE);
    }
}
