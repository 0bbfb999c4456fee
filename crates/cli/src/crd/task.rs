use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named, reusable definition of work the operator can execute. A Task by
/// itself does nothing; each execution is requested through a TaskRun
/// referencing it by name.
#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[kube(group = "anvil.io", version = "v1alpha1", kind = "Task", namespaced)]
pub struct TaskSpec {
    /// Container image the task runs in
    pub image: String,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments passed to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables set on the task's containers
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Seconds the operator allows a run of this task to execute before
    /// failing it
    #[serde(rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}
