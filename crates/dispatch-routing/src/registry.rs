//! Endpoint registry.
//!
//! The set of endpoints sits behind a coarse [`RwLock`] that only
//! administrative calls take for writing. Each endpoint additionally lives in
//! its own [`Mutex`] so concurrent routing decisions and health passes
//! serialize their statistics updates per endpoint.

use chrono::{DateTime, Utc};
use dispatch_core::{AIModel, DispatchError, DispatchResult, ModelStatus, ModelUpdate};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared handle to one endpoint
pub type ModelHandle = Arc<Mutex<AIModel>>;

/// Registry of known endpoints, in registration order
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<Vec<ModelHandle>>,
}

impl ModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole registry, e.g. with a persisted collection.
    ///
    /// Later duplicates of an id are dropped.
    pub fn replace_all(&self, models: Vec<AIModel>) {
        let mut handles: Vec<ModelHandle> = Vec::with_capacity(models.len());
        for mut model in models {
            if handles.iter().any(|h| h.lock().id == model.id) {
                continue;
            }
            model.seed_response_time();
            handles.push(Arc::new(Mutex::new(model)));
        }
        *self.models.write() = handles;
    }

    /// Register a new endpoint
    pub fn insert(&self, mut model: AIModel) -> DispatchResult<AIModel> {
        model.validate()?;
        model.seed_response_time();
        let mut models = self.models.write();
        if models.iter().any(|h| h.lock().id == model.id) {
            return Err(DispatchError::DuplicateModel(model.id));
        }
        models.push(Arc::new(Mutex::new(model.clone())));
        Ok(model)
    }

    /// Apply an administrative update
    pub fn update(
        &self,
        model_id: &str,
        update: ModelUpdate,
        at: DateTime<Utc>,
    ) -> DispatchResult<AIModel> {
        let handle = self
            .handle(model_id)
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;
        let mut model = handle.lock();
        update.apply(&mut model, at)?;
        Ok(model.clone())
    }

    /// Remove an endpoint, returning its last state
    pub fn remove(&self, model_id: &str) -> DispatchResult<AIModel> {
        let mut models = self.models.write();
        let index = models
            .iter()
            .position(|h| h.lock().id == model_id)
            .ok_or_else(|| DispatchError::ModelNotFound(model_id.to_string()))?;
        let handle = models.remove(index);
        let model = handle.lock().clone();
        Ok(model)
    }

    /// Handle to one endpoint
    #[must_use]
    pub fn handle(&self, model_id: &str) -> Option<ModelHandle> {
        self.models
            .read()
            .iter()
            .find(|h| h.lock().id == model_id)
            .map(Arc::clone)
    }

    /// Handles to every endpoint, in registration order
    #[must_use]
    pub fn handles(&self) -> Vec<ModelHandle> {
        self.models.read().iter().map(Arc::clone).collect()
    }

    /// Copy of one endpoint
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<AIModel> {
        self.handle(model_id).map(|h| h.lock().clone())
    }

    /// Whether an endpoint is registered
    #[must_use]
    pub fn contains(&self, model_id: &str) -> bool {
        self.handle(model_id).is_some()
    }

    /// Copies of every endpoint, in registration order
    #[must_use]
    pub fn snapshot(&self) -> Vec<AIModel> {
        self.models.read().iter().map(|h| h.lock().clone()).collect()
    }

    /// Copies of every active endpoint
    #[must_use]
    pub fn active(&self) -> Vec<AIModel> {
        self.snapshot()
            .into_iter()
            .filter(|m| m.status == ModelStatus::Active)
            .collect()
    }

    /// Copies of the listed endpoints, in list order. Unknown ids are skipped.
    #[must_use]
    pub fn resolve(&self, model_ids: &[String]) -> Vec<AIModel> {
        model_ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Mutate one endpoint under its lock
    pub fn with_model<R>(&self, model_id: &str, f: impl FnOnce(&mut AIModel) -> R) -> Option<R> {
        let handle = self.handle(model_id)?;
        let mut model = handle.lock();
        Some(f(&mut model))
    }

    /// Number of registered endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Whether no endpoint is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
