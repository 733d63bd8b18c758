use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lesionscope::{
    config::ExplanationConfig, ImageDecoder, ImagePreprocessor, OcclusionExplainer,
    OverlayFormat, PredictionPipeline, ServiceConfig,
};

#[path = "../tests/common/mod.rs"]
mod common;

const SIZES: [(u32, u32); 3] = [(64, 64), (480, 360), (1024, 768)];

fn pipeline_for(
    model_dir: &std::path::Path,
    window: u32,
    stride: u32,
    format: OverlayFormat,
) -> PredictionPipeline {
    let config = ServiceConfig::builder()
        .model_dir(model_dir)
        .occlusion_window(window)
        .occlusion_stride(stride)
        .overlay_format(format)
        .build()
        .expect("valid config");
    PredictionPipeline::new(common::load_model(model_dir), &config).expect("pipeline")
}

fn bench_full_pipeline(c: &mut Criterion) {
    let model_dir = common::reference_model_dir();
    let mut group = c.benchmark_group("full_pipeline");

    for format in [OverlayFormat::Jpeg, OverlayFormat::Png] {
        let pipeline = pipeline_for(model_dir.path(), 8, 4, format);
        for (width, height) in SIZES {
            let upload = common::jpeg(&common::two_tone(width, height));
            group.bench_with_input(
                BenchmarkId::new(format.to_string(), format!("{width}x{height}")),
                &upload,
                |b, upload| {
                    b.iter(|| {
                        pipeline
                            .predict_bytes(black_box(upload), Some("image/jpeg"))
                            .expect("prediction")
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_occlusion_stride(c: &mut Criterion) {
    let model_dir = common::reference_model_dir();
    let model = common::load_model(model_dir.path());
    let image = ImageDecoder::decode(&common::png(&common::two_tone(256, 256)), None)
        .expect("decode");
    let input = ImagePreprocessor::preprocess(&image, &model.manifest().preprocessing)
        .expect("preprocess");
    let prediction = model.predict(&input).expect("predict");

    let mut group = c.benchmark_group("occlusion");
    for stride in [2u32, 4, 8] {
        let explainer = OcclusionExplainer::new(&ExplanationConfig { window: 8, stride })
            .expect("explainer");
        group.bench_with_input(BenchmarkId::new("stride", stride), &stride, |b, _| {
            b.iter(|| {
                explainer
                    .explain(&model, black_box(&input), &prediction)
                    .expect("explain")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_pipeline, bench_occlusion_stride);
criterion_main!(benches);
