//! Target-aggregation layer.
//!
//! A `ServiceBundle` holds one concrete service instance per target
//! label and routes `start(target)`/`stop(target)` calls to the right
//! one. Instances are registered and removed through explicit
//! `bind`/`unbind` calls; dispatching to a label with no binding is a
//! hard error, never a silent fallback.

use std::collections::HashMap;

use log::info;

use crate::configuration::types::TargetLabel;
use crate::error_handling::types::{DispatchError, TestCaseError};
use crate::generator::Generator;
use crate::recorder::Recorder;

pub struct ServiceBundle<S> {
    name: String,
    targets: HashMap<TargetLabel, S>,
}

impl<S> ServiceBundle<S> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            targets: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the implementation for one target, replacing any
    /// previous binding for that label.
    pub fn bind(&mut self, target: TargetLabel, service: S) {
        info!("Bound {} implementation for target {}", self.name, target);
        self.targets.insert(target, service);
    }

    /// Removes a target's implementation; subsequent dispatches to that
    /// label are hard errors again.
    pub fn unbind(&mut self, target: TargetLabel) -> Option<S> {
        info!("Unbound {} implementation for target {}", self.name, target);
        self.targets.remove(&target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, target: TargetLabel) -> Result<&S, DispatchError> {
        self.targets
            .get(&target)
            .ok_or_else(|| DispatchError::UnknownTarget {
                bundle: self.name.clone(),
                target: target.to_string(),
            })
    }

    pub fn get_mut(&mut self, target: TargetLabel) -> Result<&mut S, DispatchError> {
        self.targets
            .get_mut(&target)
            .ok_or_else(|| DispatchError::UnknownTarget {
                bundle: self.name.clone(),
                target: target.to_string(),
            })
    }
}

impl ServiceBundle<Generator> {
    pub async fn start(&mut self, target: TargetLabel) -> Result<(), TestCaseError> {
        self.get_mut(target)?
            .start()
            .await
            .map_err(TestCaseError::from)
    }

    /// Generator stop is always best-effort; only an unknown target is
    /// an error here.
    pub async fn stop(&mut self, target: TargetLabel) -> Result<(), DispatchError> {
        self.get_mut(target)?.stop().await;
        Ok(())
    }
}

impl ServiceBundle<Recorder> {
    pub async fn start(&mut self, target: TargetLabel) -> Result<(), TestCaseError> {
        self.get_mut(target)?
            .start()
            .await
            .map_err(TestCaseError::from)
    }

    pub async fn stop(&mut self, target: TargetLabel) -> Result<(), TestCaseError> {
        self.get_mut(target)?
            .stop()
            .await
            .map_err(TestCaseError::from)
    }
}
