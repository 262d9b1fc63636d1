use async_trait::async_trait;
use kiln_core::{DetailPatch, Instance, InstanceId, JobHandle, RequestIndex};

use super::Result;

/// Instances of one index together with the document version they were read at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub instances: Vec<Instance>,
    /// `None` when no document exists for the index yet
    pub version: Option<u64>,
}

/// Persistence unit: every instance ever created for one index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub index: RequestIndex,
    pub instances: Vec<Instance>,
    /// Incremented by each creation, never by detail patches
    pub version: u64,
}

impl IndexDocument {
    pub fn new(index: RequestIndex) -> Self {
        Self {
            index,
            instances: Vec::new(),
            version: 0,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            instances: self.instances.clone(),
            version: Some(self.version),
        }
    }

    pub fn instance_mut(&mut self, id: &InstanceId) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| &i.id == id)
    }
}

/// Repository of index documents.
///
/// Creation is the only version-checked mutation. Detail patches, job handles
/// and removals address a single instance id and ignore the version.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Read all instances of an index in creation order
    async fn find_instances(&self, index: &RequestIndex) -> Result<Snapshot>;

    /// Read one instance
    async fn find_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance>;

    /// Append an instance if the document is still at `version`.
    ///
    /// `None` means the caller saw no document, in which case the document is
    /// created. Losing either race yields a conflict error.
    async fn insert(
        &self,
        index: &RequestIndex,
        instance: Instance,
        version: Option<u64>,
    ) -> Result<Instance>;

    /// Patch the detail fields of one instance
    async fn update_detail(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        patch: &DetailPatch,
    ) -> Result<()>;

    /// Record the platform job of one instance
    async fn save_job(&self, index: &RequestIndex, id: &InstanceId, job: &JobHandle)
    -> Result<()>;

    /// Drop one instance from its document
    async fn remove_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<()>;
}
