use async_trait::async_trait;
use kiln_core::{DetailPatch, Instance, InstanceId, JobHandle, RequestIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{IndexDocument, InstanceStore, Result, Snapshot, StoreError};

/// In-memory implementation of InstanceStore
#[derive(Clone, Default)]
pub struct InMemoryInstanceStore {
    documents: Arc<RwLock<HashMap<RequestIndex, IndexDocument>>>,
}

impl InMemoryInstanceStore {
    /// Create a new in-memory instance store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole document, for inspection
    pub async fn document(&self, index: &RequestIndex) -> Option<IndexDocument> {
        self.documents.read().await.get(index).cloned()
    }

    async fn with_instance<F>(&self, index: &RequestIndex, id: &InstanceId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Instance) + Send,
    {
        let mut documents = self.documents.write().await;
        let instance = documents
            .get_mut(index)
            .and_then(|doc| doc.instance_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(instance);
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn find_instances(&self, index: &RequestIndex) -> Result<Snapshot> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(index)
            .map(IndexDocument::snapshot)
            .unwrap_or_default())
    }

    async fn find_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance> {
        let documents = self.documents.read().await;
        documents
            .get(index)
            .and_then(|doc| doc.instances.iter().find(|i| &i.id == id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(
        &self,
        index: &RequestIndex,
        instance: Instance,
        version: Option<u64>,
    ) -> Result<Instance> {
        let mut documents = self.documents.write().await;

        let current = documents.get(index).map(|doc| doc.version);
        match (current, version) {
            (Some(current), Some(expected)) if current == expected => {}
            (_, Some(expected)) => {
                return Err(StoreError::VersionConflict {
                    index: index.to_string(),
                    expected,
                });
            }
            (Some(_), None) => return Err(StoreError::DocumentExists(index.to_string())),
            (None, None) => {}
        }

        let doc = documents
            .entry(index.clone())
            .or_insert_with(|| IndexDocument::new(index.clone()));
        doc.instances.push(instance.clone());
        doc.version += 1;
        Ok(instance)
    }

    async fn update_detail(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        patch: &DetailPatch,
    ) -> Result<()> {
        self.with_instance(index, id, |instance| patch.apply(&mut instance.detail))
            .await
    }

    async fn save_job(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        job: &JobHandle,
    ) -> Result<()> {
        self.with_instance(index, id, |instance| instance.job = Some(job.clone()))
            .await
    }

    async fn remove_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(index)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let before = doc.instances.len();
        doc.instances.retain(|i| &i.id != id);
        if doc.instances.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> RequestIndex {
        RequestIndex::inference("alice", "p1", "abc").unwrap()
    }

    #[tokio::test]
    async fn test_insert_creates_document_lazily() {
        let store = InMemoryInstanceStore::new();
        let snapshot = store.find_instances(&index()).await.unwrap();
        assert!(snapshot.instances.is_empty());
        assert_eq!(snapshot.version, None);

        let created = store
            .insert(&index(), Instance::pending(json!({}), 1), None)
            .await
            .unwrap();

        let snapshot = store.find_instances(&index()).await.unwrap();
        assert_eq!(snapshot.version, Some(1));
        assert_eq!(snapshot.instances, vec![created]);
    }

    #[tokio::test]
    async fn test_insert_rejects_stale_version() {
        let store = InMemoryInstanceStore::new();
        store
            .insert(&index(), Instance::pending(json!({}), 1), None)
            .await
            .unwrap();

        let again = store
            .insert(&index(), Instance::pending(json!({}), 2), None)
            .await;
        assert!(matches!(again, Err(StoreError::DocumentExists(_))));

        let stale = store
            .insert(&index(), Instance::pending(json!({}), 2), Some(0))
            .await;
        assert!(matches!(stale, Err(StoreError::VersionConflict { .. })));

        store
            .insert(&index(), Instance::pending(json!({}), 2), Some(1))
            .await
            .unwrap();
        let snapshot = store.find_instances(&index()).await.unwrap();
        assert_eq!(snapshot.version, Some(2));
        assert_eq!(snapshot.instances.len(), 2);
    }

    #[tokio::test]
    async fn test_detail_patch_does_not_bump_version() {
        let store = InMemoryInstanceStore::new();
        let created = store
            .insert(&index(), Instance::pending(json!({}), 1), None)
            .await
            .unwrap();

        let patch = DetailPatch::ready("https://x", 3600);
        store
            .update_detail(&index(), &created.id, &patch)
            .await
            .unwrap();
        store
            .update_detail(&index(), &created.id, &patch)
            .await
            .unwrap();

        let snapshot = store.find_instances(&index()).await.unwrap();
        assert_eq!(snapshot.version, Some(1));
        let stored = &snapshot.instances[0];
        assert_eq!(stored.detail.access_url.as_deref(), Some("https://x"));
        assert_eq!(stored.detail.expiry, 3600);
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let store = InMemoryInstanceStore::new();
        let missing = InstanceId::new();
        assert!(matches!(
            store.find_instance(&index(), &missing).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store
                .update_detail(&index(), &missing, &DetailPatch::failed("x"))
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_job_and_remove() {
        let store = InMemoryInstanceStore::new();
        let created = store
            .insert(&index(), Instance::pending(json!({}), 1), None)
            .await
            .unwrap();

        let job = JobHandle::new("http://platform", "job-1");
        store.save_job(&index(), &created.id, &job).await.unwrap();
        let stored = store.find_instance(&index(), &created.id).await.unwrap();
        assert_eq!(stored.job, Some(job));

        store.remove_instance(&index(), &created.id).await.unwrap();
        assert!(store.remove_instance(&index(), &created.id).await.is_err());

        let doc = store.document(&index()).await.unwrap();
        assert!(doc.instances.is_empty());
        assert_eq!(doc.version, 1);
    }
}
