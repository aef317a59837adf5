//! Owner of trained model state.
//!
//! A trained handle exists at most once per `(kind, key)`. Training for a
//! slot runs under an async mutex held for the whole run, so concurrent
//! first requests for the same slot wait for one trainer instead of racing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mia_core::{ModelKey, TimeSeries};

use crate::config::EngineConfig;
use crate::result::ForecastError;
use crate::strategy::{FeedForwardNet, FitSummary, MinMaxScaler, RecurrentRegressor, TrainedRegressor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SequenceModel,
    NeuralNet,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SequenceModel => "sequence_model",
            ModelKind::NeuralNet => "neural_net",
        }
    }
}

impl core::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainedModel {
    SequenceModel(RecurrentRegressor),
    NeuralNet(FeedForwardNet),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub final_loss: f64,
    pub samples: usize,
    pub trained_at: DateTime<Utc>,
}

impl TrainingReport {
    fn from_fit(fit: FitSummary) -> Self {
        Self {
            epochs: fit.epochs,
            final_loss: fit.final_loss,
            samples: fit.samples,
            trained_at: Utc::now(),
        }
    }
}

/// Trained weights plus the scaler fitted on the training series.
///
/// Immutable once built; replacing a model means invalidating its slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    kind: ModelKind,
    key: ModelKey,
    model: TrainedModel,
    scaler: MinMaxScaler,
    report: TrainingReport,
}

impl ModelHandle {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    pub fn regressor(&self) -> &dyn TrainedRegressor {
        match &self.model {
            TrainedModel::SequenceModel(m) => m,
            TrainedModel::NeuralNet(m) => m,
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            kind: self.kind,
            key: self.key.clone(),
            lookback: self.regressor().lookback(),
            parameters: self.regressor().parameter_count(),
            scaler: self.scaler,
            report: self.report.clone(),
        }
    }
}

/// Serializable summary of a cached model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub kind: ModelKind,
    pub key: ModelKey,
    pub lookback: usize,
    pub parameters: usize,
    pub scaler: MinMaxScaler,
    pub report: TrainingReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Completed training runs.
    pub trainings: u64,
    /// `ensure_trained` calls answered from the cache.
    pub hits: u64,
    pub invalidations: u64,
}

/// Fit the scaler and train one model synchronously.
pub fn train_handle(
    kind: ModelKind,
    key: ModelKey,
    values: &[f64],
    config: &EngineConfig,
) -> Result<ModelHandle, ForecastError> {
    let scaler = MinMaxScaler::fit(values)?;
    let normalized = scaler.normalize_all(values);

    let (model, fit) = match kind {
        ModelKind::SequenceModel => {
            let (m, fit) = RecurrentRegressor::train(&normalized, &config.sequence)?;
            (TrainedModel::SequenceModel(m), fit)
        }
        ModelKind::NeuralNet => {
            let (m, fit) = FeedForwardNet::train(&normalized, &config.neural)?;
            (TrainedModel::NeuralNet(m), fit)
        }
    };

    Ok(ModelHandle {
        kind,
        key,
        model,
        scaler,
        report: TrainingReport::from_fit(fit),
    })
}

type SlotKey = (ModelKind, ModelKey);
type TrainingLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
pub struct ModelCache {
    config: EngineConfig,
    models: Mutex<HashMap<SlotKey, Arc<ModelHandle>>>,
    /// Per-slot training locks, present only while some caller holds one.
    training: Mutex<HashMap<SlotKey, TrainingLock>>,
    trainings: AtomicU64,
    hits: AtomicU64,
    invalidations: AtomicU64,
}

impl ModelCache {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            models: Mutex::new(HashMap::new()),
            training: Mutex::new(HashMap::new()),
            trainings: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_models(&self) -> MutexGuard<'_, HashMap<SlotKey, Arc<ModelHandle>>> {
        self.models.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_training(&self) -> MutexGuard<'_, HashMap<SlotKey, TrainingLock>> {
        self.training.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self, kind: ModelKind, key: &ModelKey) -> Option<Arc<ModelHandle>> {
        let handle = self.lock_models().get(&(kind, key.clone())).cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = kind.as_str(), key = key.as_str(), "model cache hit");
        Some(handle)
    }

    fn training_lock(&self, kind: ModelKind, key: &ModelKey) -> TrainingLock {
        Arc::clone(self.lock_training().entry((kind, key.clone())).or_default())
    }

    /// Drop the training lock entry once its last user is done with it.
    ///
    /// Clones are only taken under the map mutex, so a strong count of 2
    /// (map + `lock`) means no other caller holds or waits on it.
    fn release_training_lock(&self, kind: ModelKind, key: &ModelKey, lock: TrainingLock) {
        let mut training = self.lock_training();
        let slot = (kind, key.clone());
        let unused = training
            .get(&slot)
            .is_some_and(|mapped| Arc::ptr_eq(mapped, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            training.remove(&slot);
        }
    }

    /// Return the cached handle for `(kind, key)`, training it from `series`
    /// first if there is none.
    ///
    /// Training runs on the blocking pool and is bounded by the configured
    /// deadline. Concurrent first calls for one slot wait for a single
    /// trainer. A failed or timed-out run caches nothing.
    pub async fn ensure_trained(
        &self,
        kind: ModelKind,
        key: &ModelKey,
        series: &TimeSeries,
    ) -> Result<Arc<ModelHandle>, ForecastError> {
        if let Some(handle) = self.cached(kind, key) {
            return Ok(handle);
        }

        let lock = self.training_lock(kind, key);
        let outcome = {
            let _guard = lock.lock().await;
            match self.cached(kind, key) {
                Some(handle) => Ok(handle),
                None => self.train(kind, key, series).await,
            }
        };
        self.release_training_lock(kind, key, lock);
        outcome
    }

    async fn train(
        &self,
        kind: ModelKind,
        key: &ModelKey,
        series: &TimeSeries,
    ) -> Result<Arc<ModelHandle>, ForecastError> {
        let deadline = self.config.training_deadline;
        let values = series.values().to_vec();
        let config = self.config.clone();
        let train_key = key.clone();
        let started = Instant::now();

        tracing::info!(
            kind = kind.as_str(),
            key = key.as_str(),
            points = values.len(),
            "training model"
        );

        let task = tokio::task::spawn_blocking(move || train_handle(kind, train_key, &values, &config));

        let handle = match tokio::time::timeout(deadline, task).await {
            Err(_) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    key = key.as_str(),
                    deadline_ms = deadline.as_millis() as u64,
                    "model training exceeded its deadline"
                );
                return Err(ForecastError::TrainingTimedOut(deadline));
            }
            Ok(Err(join_err)) => {
                tracing::error!(
                    kind = kind.as_str(),
                    key = key.as_str(),
                    error = %join_err,
                    "model training task aborted"
                );
                return Err(ForecastError::training(format!("training task aborted: {join_err}")));
            }
            Ok(Ok(Err(err))) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    key = key.as_str(),
                    error = %err,
                    "model training failed"
                );
                return Err(err);
            }
            Ok(Ok(Ok(handle))) => Arc::new(handle),
        };

        tracing::info!(
            kind = kind.as_str(),
            key = key.as_str(),
            epochs = handle.report().epochs,
            final_loss = handle.report().final_loss,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model trained"
        );

        self.lock_models().insert((kind, key.clone()), Arc::clone(&handle));
        self.trainings.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Cached handle for `(kind, key)`, without training.
    pub fn get(&self, kind: ModelKind, key: &ModelKey) -> Option<Arc<ModelHandle>> {
        self.lock_models().get(&(kind, key.clone())).cloned()
    }

    pub fn info(&self, kind: ModelKind, key: &ModelKey) -> Option<ModelInfo> {
        self.get(kind, key).map(|h| h.info())
    }

    /// Drop the model for `(kind, key)`. Returns whether one was cached.
    ///
    /// Handles already returned to callers stay valid until they are dropped.
    /// A training run in flight for the slot is not cancelled: its model is
    /// cached when it completes, and callers waiting on it still get it.
    pub fn invalidate(&self, kind: ModelKind, key: &ModelKey) -> bool {
        let removed = self.lock_models().remove(&(kind, key.clone())).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::info!(kind = kind.as_str(), key = key.as_str(), "model invalidated");
        }
        removed
    }

    /// Drop every model of `kind`. Returns how many were removed.
    pub fn invalidate_all(&self, kind: ModelKind) -> usize {
        let mut models = self.lock_models();
        let before = models.len();
        models.retain(|(k, _), _| *k != kind);
        let removed = before - models.len();
        drop(models);

        self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        tracing::info!(kind = kind.as_str(), removed, "model kind invalidated");
        removed
    }

    /// Keys with a cached model of `kind`, sorted.
    pub fn keys(&self, kind: ModelKind) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self
            .lock_models()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            trainings: self.trainings.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Slots with a training lock outstanding.
    pub fn pending_trainings(&self) -> usize {
        self.lock_training().len()
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
