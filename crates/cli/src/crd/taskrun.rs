use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One triggered execution of a Task. Created with a generated name so every
/// run carries a unique, stable identity from the moment of submission.
#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[kube(
    group = "anvil.io",
    version = "v1alpha1",
    kind = "TaskRun",
    namespaced,
    status = "TaskRunStatus"
)]
pub struct TaskRunSpec {
    /// Name of the Task this run executes
    #[serde(rename = "taskName")]
    pub task_name: String,

    /// Requested lifecycle state; set to Canceled to stop the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskRunRequestedState>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub enum TaskRunRequestedState {
    Canceled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct TaskRunStatus {
    /// Current phase: Pending, Running, Succeeded, Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Start time
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// Completion time
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub condition_type: String,

    /// True, False or Unknown
    pub status: String,

    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskRun {
    /// Whether the user explicitly asked for this run to be canceled.
    pub fn is_canceled(&self) -> bool {
        self.spec.state == Some(TaskRunRequestedState::Canceled)
    }
}
