//! Applies asynchronous platform reports to instances

use kiln_core::{CoreError, DetailPatch, InstanceId, RequestIndex};
use std::sync::Arc;
use thiserror::Error;

use crate::store::{InstanceStore, StoreError};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid report: {0}")]
    Invalid(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Target of the internal callback surface.
///
/// Reports address one instance id and never touch the document version, so
/// redelivered or reordered reports are safe to apply.
#[derive(Clone)]
pub struct DetailReconciler {
    store: Arc<dyn InstanceStore>,
}

impl DetailReconciler {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    pub async fn update_detail(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        patch: DetailPatch,
    ) -> Result<()> {
        index.validate()?;
        let patch = patch.normalized();
        patch.validate()?;

        self.store.update_detail(index, id, &patch).await?;

        tracing::debug!("reconciled {} of {}: {:?}", id, index, patch);
        Ok(())
    }
}
