use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use mia_ai::pattern::PatternAnalyzer;
use mia_ai::stream::analytics::compute_batch_analytics;
use mia_ai::strategy::{ExponentialSmoothing, Forecaster, LinearRegression};
use mia_ai::{
    AnalyticsTag, EngineConfig, ForecastOptions, ForecastOrchestrator, SequenceModelConfig,
    StreamAnalyticsConfig, Strategy,
};
use mia_core::TimeSeries;

fn noisy_weekly(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let week = [0.0, 4.0, 9.0, 14.0, 9.0, 4.0, 1.0][i % 7];
            200.0 + 0.8 * i as f64 + week + ((i * 37) % 11) as f64 * 0.3
        })
        .collect()
}

fn bench_stateless_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("stateless_strategies");

    for len in [32usize, 256, 2048] {
        let series = TimeSeries::new(noisy_weekly(len)).unwrap();
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("linear", len), &series, |b, s| {
            b.iter(|| LinearRegression.forecast(black_box(s), 7).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("smoothing", len), &series, |b, s| {
            b.iter(|| ExponentialSmoothing::default().forecast(black_box(s), 7).unwrap())
        });
    }

    group.finish();
}

fn bench_pattern_analysis(c: &mut Criterion) {
    let analyzer = PatternAnalyzer::new();
    let mut group = c.benchmark_group("pattern_analysis");

    for len in [64usize, 512] {
        let values = noisy_weekly(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, v| {
            b.iter(|| analyzer.analyze(black_box(v)))
        });
    }

    group.finish();
}

fn bench_cached_sequence_model(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orch = ForecastOrchestrator::new(EngineConfig::default().with_sequence(SequenceModelConfig {
        epochs: 20,
        ..SequenceModelConfig::default()
    }));
    let values = noisy_weekly(120);
    let options = ForecastOptions::default();

    // Train once outside the measurement; iterations hit the cache.
    rt.block_on(orch.predict_with(&values, &options, Strategy::SequenceModel));

    c.bench_function("sequence_model_cached_predict", |b| {
        b.iter(|| {
            rt.block_on(orch.predict_with(black_box(&values), &options, Strategy::SequenceModel))
        })
    });
}

fn bench_batch_analytics(c: &mut Criterion) {
    let config = StreamAnalyticsConfig::default();
    let tags = [
        AnalyticsTag::Mean,
        AnalyticsTag::Trend,
        AnalyticsTag::Anomaly,
        AnalyticsTag::Volatility,
        AnalyticsTag::Seasonal,
        AnalyticsTag::Forecast,
    ]
    .into_iter()
    .collect();
    let values = noisy_weekly(config.batch_size);

    c.bench_function("batch_analytics_all_tags", |b| {
        b.iter(|| compute_batch_analytics(&tags, black_box(&values), &config))
    });
}

criterion_group!(
    benches,
    bench_stateless_strategies,
    bench_pattern_analysis,
    bench_cached_sequence_model,
    bench_batch_analytics
);
criterion_main!(benches);
