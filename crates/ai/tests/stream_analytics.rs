use std::sync::Arc;
use std::time::Duration;

use mia_ai::{
    AnalyticsTag, StreamAnalytics, StreamAnalyticsConfig, StreamConfig, TrendDirection,
};
use mia_core::{DataPoint, StreamId};
use mia_observability::LogFormat;

fn init_logging() {
    mia_observability::init_with(LogFormat::Pretty, "mia_ai=debug");
}

fn id(name: &str) -> StreamId {
    StreamId::new(name).unwrap()
}

fn engine(interval: Duration) -> Arc<StreamAnalytics> {
    init_logging();
    Arc::new(
        StreamAnalytics::new(StreamAnalyticsConfig::default().with_batch_interval(interval)).unwrap(),
    )
}

fn feed(engine: &StreamAnalytics, stream: &StreamId, values: impl IntoIterator<Item = f64>) {
    for v in values {
        engine.add_data_point(stream, DataPoint::now(v)).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn scheduler_processes_every_active_stream() {
    let engine = engine(Duration::from_secs(2));
    let mut batches = engine.subscribe_batches();

    for name in ["a", "b", "idle"] {
        engine.initialize_stream(id(name), StreamConfig::default()).unwrap();
    }
    feed(&engine, &id("a"), [1.0, 2.0, 3.0]);
    feed(&engine, &id("b"), [5.0, 5.0, 8.0]);

    assert!(engine.start_batch_processing());
    assert!(engine.is_batch_processing());

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let first = batches.recv().await.unwrap();
    let second = batches.recv().await.unwrap();
    assert_eq!(first.stream_id, id("a"));
    assert_eq!(first.analytics.mean, Some(2.0));
    assert_eq!(second.stream_id, id("b"));
    assert_eq!(second.analytics.mean, Some(6.0));
    assert!(batches.try_recv().is_err(), "empty streams produce no batch");

    let status = engine.stream_status(&id("a")).unwrap();
    assert_eq!(status.total_batches, 1);
    assert!(status.last_batch_at.is_some());

    assert!(engine.stop_batch_processing());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.stream_status(&id("a")).unwrap().total_batches, 1);
    assert!(!engine.is_batch_processing());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_refused() {
    let engine = engine(Duration::from_secs(1));
    assert!(engine.start_batch_processing());
    assert!(!engine.start_batch_processing());

    assert!(engine.stop_batch_processing());
    assert!(!engine.stop_batch_processing());

    // Restart after stop works.
    assert!(engine.start_batch_processing());
    assert!(engine.stop_batch_processing());
}

#[tokio::test(start_paused = true)]
async fn stopped_streams_are_skipped_by_the_scheduler() {
    let engine = engine(Duration::from_secs(1));
    engine.initialize_stream(id("live"), StreamConfig::default()).unwrap();
    engine.initialize_stream(id("done"), StreamConfig::default()).unwrap();
    feed(&engine, &id("live"), [1.0, 2.0]);
    feed(&engine, &id("done"), [1.0, 2.0]);
    engine.stop_stream(&id("done")).unwrap();

    engine.start_batch_processing();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    engine.stop_batch_processing();

    let status = engine.get_all_stream_status();
    assert_eq!(status[&id("live")].total_batches, 3);
    assert_eq!(status[&id("done")].total_batches, 0);
}

#[tokio::test]
async fn full_analytics_batch() {
    init_logging();
    let engine = StreamAnalytics::default();
    let s = id("sensor");
    engine
        .initialize_stream(
            s.clone(),
            StreamConfig::default().with_analytics([
                AnalyticsTag::Mean,
                AnalyticsTag::Trend,
                AnalyticsTag::Anomaly,
                AnalyticsTag::Volatility,
                AnalyticsTag::Optimization,
                AnalyticsTag::Prediction,
                AnalyticsTag::Seasonal,
                AnalyticsTag::Forecast,
            ]),
        )
        .unwrap();
    feed(&engine, &s, (0..24).map(|i| 100.0 + 2.0 * i as f64));

    let batch = engine.process_batch(&s).unwrap();
    let a = &batch.analytics;
    assert_eq!(batch.batch_size, 24);
    assert_eq!(a.trend.unwrap().direction, TrendDirection::Increasing);
    assert!(a.anomalies.as_ref().unwrap().is_empty());
    assert!(a.volatility.unwrap() > 0.0);
    assert!(a.optimization.is_some());
    assert_eq!(a.prediction.unwrap().trend, TrendDirection::Increasing);
    assert_eq!(a.seasonal.as_ref().unwrap().components.len(), 12);

    let forecast = a.forecast.as_ref().unwrap();
    assert_eq!(forecast.forecast.len(), 7);
    assert!((forecast.forecast[0] - 146.0 * 1.01).abs() < 1e-9);
    assert!(forecast.forecast.windows(2).all(|w| w[1] > w[0]));
}

#[tokio::test]
async fn realtime_trend_change_is_reported() {
    init_logging();
    let engine = StreamAnalytics::default();
    let s = id("flip");
    engine
        .initialize_stream(
            s.clone(),
            StreamConfig::default().with_analytics([AnalyticsTag::Trend, AnalyticsTag::Realtime]),
        )
        .unwrap();

    feed(&engine, &s, [10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 18.0, 16.0, 14.0]);
    let signals = engine.add_data_point(&s, DataPoint::now(12.0)).unwrap();

    let change = signals.trend_change.unwrap();
    assert_eq!(change.old_direction, TrendDirection::Increasing);
    assert_eq!(change.new_direction, TrendDirection::Decreasing);
    assert!(signals.anomaly.is_none());
}

#[tokio::test]
async fn reinitializing_resets_the_buffer() {
    init_logging();
    let engine = StreamAnalytics::default();
    let s = id("reset");
    engine.initialize_stream(s.clone(), StreamConfig::default()).unwrap();
    feed(&engine, &s, [1.0, 2.0, 3.0]);

    engine
        .initialize_stream(s.clone(), StreamConfig::default().with_buffer_size(2))
        .unwrap();
    let status = engine.stream_status(&s).unwrap();
    assert_eq!(status.buffered, 0);
    assert_eq!(status.total_received, 0);
    assert_eq!(status.capacity, 2);
}
