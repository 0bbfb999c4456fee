pub mod monitor;

use std::sync::Arc;

use futures::FutureExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{api::WatchParams, Client, ResourceExt};
use tracing::debug;

use crate::{
    crd::{TaskRun, TaskRunSpec},
    kubernetes::TaskRunClient,
    output::Output,
    tail::{LogTail, LogTailer},
    watch::PodWatcher,
    Error, Result,
};

use monitor::RunMonitor;

/// Label the operator puts on a run's pods naming the originating Task.
const TASK_NAME_LABEL: &str = "anvil.io/task-name";
/// Label naming the exact TaskRun a pod executes.
const RUN_NAME_LABEL: &str = "anvil.io/run-name";

/// Creates TaskRuns and optionally follows them to completion.
pub struct Runner {
    client: Client,
    namespace: String,
    output: Output,
}

impl Runner {
    pub fn new(client: Client, namespace: String, output: Output) -> Self {
        Self {
            client,
            namespace,
            output,
        }
    }

    /// Creates a TaskRun for the named Task. When `follow` is set, watches
    /// the run's pod to completion while streaming its container logs;
    /// otherwise returns as soon as the run is accepted. Returns the
    /// server-assigned run name.
    pub async fn execute(&self, task_name: &str, follow: bool) -> Result<String> {
        if task_name.is_empty() {
            return Err(Error::Validation("task name is not informed".to_string()));
        }

        let runs = Arc::new(TaskRunClient::new(self.client.clone(), &self.namespace));
        let tail = Arc::new(LogTail::new(self.client.clone(), self.output.clone()));
        let monitor = Arc::new(RunMonitor::new(
            runs.clone(),
            tail.clone(),
            self.output.clone(),
        ));

        // Watch events can be delivered as soon as the watch is established,
        // racing the rest of session setup. Hold the session lock until just
        // before the blocking start below.
        let mut session = monitor.lock_session().await;

        // generateName gives every run a unique server-assigned identity
        let run = TaskRun {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", task_name)),
                ..Default::default()
            },
            spec: TaskRunSpec {
                task_name: task_name.to_string(),
                state: None,
            },
            status: None,
        };
        let created = runs.create(&run).await?;
        let run_name = created.name_any();

        if !follow {
            self.output.write(&format!(
                "TaskRun created \"{}\" for task \"{}\"\n",
                run_name, task_name
            ))?;
            return Ok(run_name);
        }

        session.run_name = Some(run_name.clone());

        // scope the watch to exactly this run's pods, including the
        // generated run name
        let selector = format!(
            "{}={},{}={}",
            TASK_NAME_LABEL, task_name, RUN_NAME_LABEL, run_name
        );
        debug!("watching pods matching {}", selector);
        let watch_params = WatchParams::default().labels(&selector);
        let mut watcher = PodWatcher::new(self.client.clone(), watch_params, &self.namespace);
        session.watcher = Some(watcher.handle());

        let handler_monitor = monitor.clone();
        watcher.with_on_pod_modified(Box::new(move |pod| {
            let monitor = handler_monitor.clone();
            async move { monitor.on_pod_event(pod).await }.boxed()
        }));

        // No session mutation happens past this point outside the event
        // handler's own critical sections.
        drop(session);

        let result = watcher.start().await;
        // the watch can end with an error before the monitor had a chance to
        // stop the tails; a repeated stop is a no-op
        tail.stop();
        result.map(|_| run_name)
    }
}
