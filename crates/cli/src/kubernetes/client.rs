use async_trait::async_trait;
use kube::{
    api::{Api, PostParams},
    Client,
};

use crate::{crd::TaskRun, Error, Result};

/// Read access to TaskRun resources. The execution monitor re-fetches the
/// run while diagnosing a failed pod; tests substitute their own
/// implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunFetcher: Send + Sync {
    async fn get_run(&self, name: &str) -> Result<TaskRun>;
}

/// Typed TaskRun operations against the cluster.
pub struct TaskRunClient {
    runs: Api<TaskRun>,
}

impl TaskRunClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            runs: Api::namespaced(client, namespace),
        }
    }

    /// Creates the TaskRun and returns it with its server-assigned name.
    pub async fn create(&self, run: &TaskRun) -> Result<TaskRun> {
        self.runs
            .create(&PostParams::default(), run)
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))
    }
}

#[async_trait]
impl RunFetcher for TaskRunClient {
    async fn get_run(&self, name: &str) -> Result<TaskRun> {
        self.runs
            .get(name)
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))
    }
}
