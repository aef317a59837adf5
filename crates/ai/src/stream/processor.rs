use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use mia_core::{DataPoint, StreamId};

use super::analytics::{
    AnalyticsTag, BatchAnalytics, RealtimeSignals, compute_batch_analytics, realtime_anomaly,
    trend_change,
};
use super::buffer::StreamBuffer;
use super::scheduler::BatchScheduler;
use crate::config::StreamAnalyticsConfig;
use crate::result::ForecastError;

/// Per-stream settings chosen at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub buffer_size: usize,
    pub analytics: BTreeSet<AnalyticsTag>,
    pub batch_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&StreamAnalyticsConfig::default())
    }
}

impl From<&StreamAnalyticsConfig> for StreamConfig {
    fn from(cfg: &StreamAnalyticsConfig) -> Self {
        Self {
            buffer_size: cfg.default_buffer_size,
            analytics: [AnalyticsTag::Mean, AnalyticsTag::Trend].into_iter().collect(),
            batch_size: cfg.batch_size,
        }
    }
}

impl StreamConfig {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_analytics(mut self, tags: impl IntoIterator<Item = AnalyticsTag>) -> Self {
        self.analytics = tags.into_iter().collect();
        self
    }

    fn validate(&self) -> Result<(), ForecastError> {
        if self.buffer_size == 0 {
            return Err(ForecastError::InvalidOptions("buffer_size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidOptions("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Active,
    Stopped,
}

/// Snapshot of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub buffered: usize,
    pub capacity: usize,
    pub total_received: u64,
    pub last_received_at: Option<DateTime<Utc>>,
    pub analytics: Vec<AnalyticsTag>,
    pub created_at: DateTime<Utc>,
    pub total_batches: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

impl StreamStatus {
    pub fn is_active(&self) -> bool {
        self.state == StreamState::Active
    }
}

/// Output of one batch, also published to batch subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub stream_id: StreamId,
    /// Points the batch covered.
    pub batch_size: usize,
    pub analytics: BatchAnalytics,
    pub timestamp: DateTime<Utc>,
    pub total_batches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMetrics {
    pub total_streams: usize,
    pub active_streams: usize,
    pub total_received: u64,
    /// Points received per stream.
    pub processing_rate: f64,
    /// Share of active streams; `0.0` without streams.
    pub health: f64,
}

#[derive(Debug)]
struct StreamEntry {
    config: StreamConfig,
    state: StreamState,
    buffer: StreamBuffer,
    total_received: u64,
    last_received_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    total_batches: u64,
    last_batch_at: Option<DateTime<Utc>>,
}

impl StreamEntry {
    fn new(config: StreamConfig) -> Self {
        Self {
            buffer: StreamBuffer::new(config.buffer_size),
            config,
            state: StreamState::Active,
            total_received: 0,
            last_received_at: None,
            created_at: Utc::now(),
            total_batches: 0,
            last_batch_at: None,
        }
    }

    fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.state,
            buffered: self.buffer.len(),
            capacity: self.buffer.capacity(),
            total_received: self.total_received,
            last_received_at: self.last_received_at,
            analytics: self.config.analytics.iter().copied().collect(),
            created_at: self.created_at,
            total_batches: self.total_batches,
            last_batch_at: self.last_batch_at,
        }
    }

    fn wants(&self, tag: AnalyticsTag) -> bool {
        self.config.analytics.contains(&tag)
    }
}

type Entry = Arc<Mutex<StreamEntry>>;

fn lock_entry(entry: &Entry) -> MutexGuard<'_, StreamEntry> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of realtime streams with buffered batch analytics.
///
/// Each stream sits behind its own mutex: ingestion and batch processing for
/// one stream are serialized, different streams never contend.
#[derive(Debug)]
pub struct StreamAnalytics {
    config: StreamAnalyticsConfig,
    streams: RwLock<HashMap<StreamId, Entry>>,
    batches: broadcast::Sender<BatchResult>,
    scheduler: Mutex<Option<BatchScheduler>>,
}

impl Default for StreamAnalytics {
    fn default() -> Self {
        Self::with_valid_config(StreamAnalyticsConfig::default())
    }
}

impl StreamAnalytics {
    /// Refuses configs that [`StreamAnalyticsConfig::validate`] rejects.
    pub fn new(config: StreamAnalyticsConfig) -> Result<Self, ForecastError> {
        config
            .validate()
            .map_err(|err| ForecastError::Config(format!("{err:#}")))?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: StreamAnalyticsConfig) -> Self {
        let (batches, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            streams: RwLock::new(HashMap::new()),
            batches,
            scheduler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamAnalyticsConfig {
        &self.config
    }

    /// Settings a stream gets when the caller has no preference.
    pub fn default_stream_config(&self) -> StreamConfig {
        StreamConfig::from(&self.config)
    }

    fn entry(&self, id: &StreamId) -> Option<Entry> {
        let streams = self.streams.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        streams.get(id).cloned()
    }

    fn entries(&self) -> Vec<(StreamId, Entry)> {
        let streams = self.streams.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        streams.iter().map(|(id, e)| (id.clone(), Arc::clone(e))).collect()
    }

    /// Register (or re-register, discarding the old buffer) a stream.
    pub fn initialize_stream(&self, id: StreamId, config: StreamConfig) -> Result<(), ForecastError> {
        config.validate()?;

        let analytics: Vec<&str> = config.analytics.iter().map(AnalyticsTag::as_str).collect();
        tracing::info!(
            stream_id = id.as_str(),
            buffer_size = config.buffer_size,
            analytics = ?analytics,
            "stream initialized"
        );

        let entry = Arc::new(Mutex::new(StreamEntry::new(config)));
        let mut streams = self.streams.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if streams.insert(id.clone(), entry).is_some() {
            tracing::warn!(stream_id = id.as_str(), "stream re-initialized, previous buffer dropped");
        }
        Ok(())
    }

    /// Append a point to an active stream and run its realtime checks.
    pub fn add_data_point(&self, id: &StreamId, point: DataPoint) -> Result<RealtimeSignals, ForecastError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| ForecastError::StreamNotFound(id.clone()))?;
        let mut stream = lock_entry(&entry);

        if stream.state == StreamState::Stopped {
            return Err(ForecastError::StreamStopped(id.clone()));
        }
        if !point.value.is_finite() {
            return Err(ForecastError::NonFiniteValue {
                index: stream.total_received as usize,
            });
        }

        let mut signals = RealtimeSignals::default();
        if stream.wants(AnalyticsTag::Realtime) {
            signals = self.realtime_signals(&stream, point.value);
        }

        stream.buffer.push(point);
        stream.total_received += 1;
        stream.last_received_at = Some(point.timestamp);

        if stream.wants(AnalyticsTag::Realtime) && stream.wants(AnalyticsTag::Trend) {
            let recent = stream.buffer.recent_values(self.config.realtime_trend_window);
            if recent.len() >= self.config.realtime_trend_window {
                signals.trend_change = trend_change(&recent);
            }
        }

        if let Some(anomaly) = &signals.anomaly {
            tracing::warn!(
                stream_id = id.as_str(),
                value = anomaly.value,
                mean = anomaly.mean,
                deviation = anomaly.deviation,
                "realtime anomaly"
            );
        }
        if let Some(change) = &signals.trend_change {
            tracing::info!(
                stream_id = id.as_str(),
                from = change.old_direction.as_str(),
                to = change.new_direction.as_str(),
                strength = change.strength,
                "trend change"
            );
        }

        Ok(signals)
    }

    /// Anomaly check of a new value against the points buffered before it.
    fn realtime_signals(&self, stream: &StreamEntry, value: f64) -> RealtimeSignals {
        let window = self.config.realtime_anomaly_window;
        let anomaly = if stream.wants(AnalyticsTag::Anomaly) && stream.buffer.len() >= window {
            realtime_anomaly(&stream.buffer.recent_values(window), value, self.config.anomaly_sigma)
        } else {
            None
        };
        RealtimeSignals {
            anomaly,
            trend_change: None,
        }
    }

    /// Compute the configured analytics over the newest `batch_size` points.
    ///
    /// `None` for unknown or stopped streams and for empty buffers.
    pub fn process_batch(&self, id: &StreamId) -> Option<BatchResult> {
        let entry = self.entry(id)?;
        let result = {
            let mut stream = lock_entry(&entry);
            if stream.state == StreamState::Stopped || stream.buffer.is_empty() {
                return None;
            }

            let values = stream.buffer.recent_values(stream.config.batch_size);
            let analytics = compute_batch_analytics(&stream.config.analytics, &values, &self.config);
            let now = Utc::now();
            stream.total_batches += 1;
            stream.last_batch_at = Some(now);

            BatchResult {
                stream_id: id.clone(),
                batch_size: values.len(),
                analytics,
                timestamp: now,
                total_batches: stream.total_batches,
            }
        };

        tracing::debug!(
            stream_id = id.as_str(),
            batch_size = result.batch_size,
            total_batches = result.total_batches,
            "batch processed"
        );

        // No subscribers is fine.
        let _ = self.batches.send(result.clone());
        Some(result)
    }

    /// One batch for every active stream, in stream id order.
    pub fn process_all_batches(&self) -> Vec<BatchResult> {
        let mut ids: Vec<StreamId> = self.entries().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids.iter().filter_map(|id| self.process_batch(id)).collect()
    }

    /// Receive every batch result produced from now on.
    pub fn subscribe_batches(&self) -> broadcast::Receiver<BatchResult> {
        self.batches.subscribe()
    }

    pub fn stream_status(&self, id: &StreamId) -> Option<StreamStatus> {
        self.entry(id).map(|e| lock_entry(&e).status())
    }

    pub fn get_all_stream_status(&self) -> BTreeMap<StreamId, StreamStatus> {
        self.entries()
            .into_iter()
            .map(|(id, e)| {
                let status = lock_entry(&e).status();
                (id, status)
            })
            .collect()
    }

    /// Move a stream to `stopped`. Its buffer is kept for inspection.
    pub fn stop_stream(&self, id: &StreamId) -> Result<(), ForecastError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| ForecastError::StreamNotFound(id.clone()))?;
        lock_entry(&entry).state = StreamState::Stopped;
        tracing::info!(stream_id = id.as_str(), "stream stopped");
        Ok(())
    }

    pub fn remove_stream(&self, id: &StreamId) -> bool {
        let mut streams = self.streams.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = streams.remove(id).is_some();
        if removed {
            tracing::info!(stream_id = id.as_str(), "stream removed");
        }
        removed
    }

    pub fn clear_all_streams(&self) {
        let mut streams = self.streams.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = streams.len();
        streams.clear();
        tracing::info!(count, "all streams cleared");
    }

    pub fn realtime_metrics(&self) -> RealtimeMetrics {
        let statuses = self.get_all_stream_status();
        let total_streams = statuses.len();
        let active_streams = statuses.values().filter(|s| s.is_active()).count();
        let total_received: u64 = statuses.values().map(|s| s.total_received).sum();

        RealtimeMetrics {
            total_streams,
            active_streams,
            total_received,
            processing_rate: total_received as f64 / total_streams.max(1) as f64,
            health: if total_streams == 0 {
                0.0
            } else {
                active_streams as f64 / total_streams as f64
            },
        }
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Option<BatchScheduler>> {
        self.scheduler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start periodic batch processing for all streams.
    ///
    /// Returns `false` (and changes nothing) if it is already running or if
    /// there is no tokio runtime to run it on.
    pub fn start_batch_processing(self: &Arc<Self>) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("batch processing needs a tokio runtime, not started");
            return false;
        };
        let mut scheduler = self.lock_scheduler();
        if scheduler.as_ref().is_some_and(BatchScheduler::is_running) {
            tracing::warn!("batch processing already running");
            return false;
        }
        *scheduler = Some(BatchScheduler::start(
            &runtime,
            Arc::downgrade(self),
            self.config.batch_interval,
        ));
        true
    }

    /// Stop periodic batch processing. Returns whether it was running.
    pub fn stop_batch_processing(&self) -> bool {
        match self.lock_scheduler().take() {
            Some(scheduler) => {
                let was_running = scheduler.is_running();
                scheduler.stop();
                was_running
            }
            None => false,
        }
    }

    pub fn is_batch_processing(&self) -> bool {
        self.lock_scheduler()
            .as_ref()
            .is_some_and(BatchScheduler::is_running)
    }
}
