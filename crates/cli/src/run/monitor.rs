use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    crd::TaskRun, kubernetes::RunFetcher, output::Output, tail::LogTailer, watch::WatcherHandle,
    Error, Result,
};

/// Grace period between observing a Running pod and attaching to its
/// container logs, so the container processes have actually started.
const TAIL_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Why a Failed-phase pod ended up failed, in precedence order: an explicit
/// cancel outranks a deletion, and either outranks a plain failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Canceled { run_name: String },
    RunDeleted { run_name: String },
    PodDeleted { pod_name: String },
    PodFailed { pod_name: String },
}

/// Classifies a Failed-phase observation. `run` is the re-fetched TaskRun,
/// or None when the fetch failed and only the observed pod is available.
pub fn classify_failure(run: Option<&TaskRun>, pod: &Pod) -> FailureCause {
    match run {
        Some(run) if run.is_canceled() => FailureCause::Canceled {
            run_name: run.name_any(),
        },
        Some(run) if run.metadata.deletion_timestamp.is_some() => FailureCause::RunDeleted {
            run_name: run.name_any(),
        },
        _ if pod.metadata.deletion_timestamp.is_some() => FailureCause::PodDeleted {
            pod_name: pod.name_any(),
        },
        _ => FailureCause::PodFailed {
            pod_name: pod.name_any(),
        },
    }
}

/// Mutable state of one monitoring session. Everything in here is read and
/// written only under the RunMonitor session lock.
pub struct Session {
    /// Server-assigned name of the TaskRun being followed, recorded during
    /// setup for the terminal-reason re-fetch
    pub(crate) run_name: Option<String>,
    /// Stop handle of the pod watch driving this session
    pub(crate) watcher: Option<WatcherHandle>,
    /// Containers whose log tail has been started; a name enters this map
    /// at most once per session
    tail_started: HashMap<String, bool>,
}

/// Reacts to pod lifecycle events for a single TaskRun: starts container
/// log tails exactly once, decides when and why the run is over, and shuts
/// the watch and the tails down together.
pub struct RunMonitor {
    session: Mutex<Session>,
    runs: Arc<dyn RunFetcher>,
    tail: Arc<dyn LogTailer>,
    output: Output,
}

impl RunMonitor {
    pub fn new(runs: Arc<dyn RunFetcher>, tail: Arc<dyn LogTailer>, output: Output) -> Self {
        Self {
            session: Mutex::new(Session {
                run_name: None,
                watcher: None,
                tail_started: HashMap::new(),
            }),
            runs,
            tail,
            output,
        }
    }

    /// Takes the session lock. The orchestrator holds this across setup so
    /// that watch events delivered during initialization wait for a fully
    /// recorded session.
    pub(crate) async fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Reacts to one observed pod modification. Invocations may overlap on
    /// the transport side; the session lock serializes them here.
    pub async fn on_pod_event(&self, pod: Pod) -> Result<()> {
        let mut session = self.session.lock().await;

        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("");
        match phase {
            "Running" => {
                // give container processes a moment to start before attaching
                tokio::time::sleep(TAIL_GRACE_PERIOD).await;
                self.tail_logs(&mut session, &pod);
                Ok(())
            }
            "Failed" => {
                let fetched = match session.run_name.as_deref() {
                    Some(name) => self.runs.get_run(name).await,
                    None => Err(Error::Internal(
                        "no TaskRun recorded for this session".to_string(),
                    )),
                };
                let cause = classify_failure(fetched.as_ref().ok(), &pod);
                let message = match &cause {
                    FailureCause::Canceled { run_name } => {
                        format!("TaskRun '{}' has been canceled.\n", run_name)
                    }
                    FailureCause::RunDeleted { run_name } => {
                        format!("TaskRun '{}' has been deleted.\n", run_name)
                    }
                    FailureCause::PodDeleted { pod_name } => {
                        format!("Pod '{}' has been deleted.\n", pod_name)
                    }
                    FailureCause::PodFailed { pod_name } => {
                        format!("Pod '{}' has failed!\n", pod_name)
                    }
                };
                self.output.write(&message)?;
                self.stop(&session);
                match cause {
                    FailureCause::PodFailed { pod_name } => Err(Error::PodFailed(pod_name)),
                    // the deleted-pod fallback still surfaces the fetch error
                    // that forced it, if there was one
                    FailureCause::PodDeleted { .. } => fetched.map(|_| ()),
                    _ => Ok(()),
                }
            }
            "Succeeded" => {
                self.output
                    .write(&format!("Pod '{}' has succeeded!\n", pod.name_any()))?;
                self.stop(&session);
                Ok(())
            }
            other => {
                self.output.write(&format!(
                    "Pod '{}' is in state {:?}...\n",
                    pod.name_any(),
                    other
                ))?;
                // image pull and init failures can park a pod in Pending
                // forever instead of moving it to Failed
                for condition in pod
                    .status
                    .as_ref()
                    .and_then(|s| s.conditions.as_deref())
                    .unwrap_or_default()
                {
                    if condition.type_ == "Initialized" || condition.type_ == "ContainersReady" {
                        if condition.status == "Unknown" {
                            return Err(Error::PodNotReady(
                                condition.message.clone().unwrap_or_default(),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Starts tailing every container of the pod not already being tailed:
    /// init containers first, then regular containers, in declared order.
    /// Callers hold the session lock.
    fn tail_logs(&self, session: &mut Session, pod: &Pod) {
        let namespace = pod.namespace().unwrap_or_default();
        let pod_name = pod.name_any();
        let spec = match &pod.spec {
            Some(spec) => spec,
            None => return,
        };
        let containers = spec
            .init_containers
            .iter()
            .flatten()
            .chain(spec.containers.iter());
        for container in containers {
            if session.tail_started.contains_key(&container.name) {
                continue;
            }
            session.tail_started.insert(container.name.clone(), true);
            self.tail.start(&namespace, &pod_name, &container.name);
        }
    }

    /// Stops log tailing and the pod watch. Reached from one terminal branch
    /// per session; both collaborators treat a repeated stop as a no-op.
    fn stop(&self, session: &Session) {
        self.tail.stop();
        if let Some(watcher) = &session.watcher {
            watcher.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TaskRunRequestedState, TaskRunSpec};
    use crate::kubernetes::client::MockRunFetcher;
    use crate::output::testing::{buffer_output, SharedBuffer};
    use crate::tail::MockLogTailer;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use serde_json::json;

    const RUN_NAME: &str = "demo-xk2f9";
    const POD_NAME: &str = "demo-xk2f9-pod";

    fn pod(phase: &str) -> Pod {
        pod_with(phase, false)
    }

    fn pod_with(phase: &str, deleted: bool) -> Pod {
        let mut metadata = json!({ "name": POD_NAME, "namespace": "default" });
        if deleted {
            metadata["deletionTimestamp"] = json!("2026-08-07T12:00:00Z");
        }
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": metadata,
            "spec": {
                "initContainers": [
                    { "name": "setup", "image": "busybox" }
                ],
                "containers": [
                    { "name": "step-one", "image": "busybox" },
                    { "name": "step-two", "image": "busybox" }
                ]
            },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    fn task_run(canceled: bool, deleted: bool) -> TaskRun {
        let mut run = TaskRun {
            metadata: ObjectMeta {
                name: Some(RUN_NAME.to_string()),
                ..Default::default()
            },
            spec: TaskRunSpec {
                task_name: "demo".to_string(),
                state: canceled.then_some(TaskRunRequestedState::Canceled),
            },
            status: None,
        };
        if deleted {
            run.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
        run
    }

    struct Harness {
        monitor: Arc<RunMonitor>,
        handle: WatcherHandle,
        buffer: SharedBuffer,
    }

    async fn harness(fetcher: MockRunFetcher, tailer: MockLogTailer) -> Harness {
        let (output, buffer) = buffer_output();
        let monitor = Arc::new(RunMonitor::new(Arc::new(fetcher), Arc::new(tailer), output));
        let handle = WatcherHandle::new();
        {
            let mut session = monitor.session.lock().await;
            session.run_name = Some(RUN_NAME.to_string());
            session.watcher = Some(handle.clone());
        }
        Harness {
            monitor,
            handle,
            buffer,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_running_events_start_each_tail_once() {
        let mut tailer = MockLogTailer::new();
        let mut seq = Sequence::new();
        for container in ["setup", "step-one", "step-two"] {
            tailer
                .expect_start()
                .with(eq("default"), eq(POD_NAME), eq(container))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }
        let h = harness(MockRunFetcher::new(), tailer).await;

        h.monitor.on_pod_event(pod("Running")).await.unwrap();
        h.monitor.on_pod_event(pod("Running")).await.unwrap();

        assert!(!h.handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_running_events_do_not_double_start() {
        let mut tailer = MockLogTailer::new();
        tailer.expect_start().times(3).return_const(());
        let h = harness(MockRunFetcher::new(), tailer).await;

        let (first, second) = tokio::join!(
            h.monitor.on_pod_event(pod("Running")),
            h.monitor.on_pod_event(pod("Running")),
        );

        first.unwrap();
        second.unwrap();
    }

    #[tokio::test]
    async fn succeeded_pod_reports_and_stops() {
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().times(1).return_const(());
        let h = harness(MockRunFetcher::new(), tailer).await;

        h.monitor.on_pod_event(pod("Succeeded")).await.unwrap();

        assert_eq!(
            h.buffer.contents(),
            format!("Pod '{}' has succeeded!\n", POD_NAME)
        );
        assert!(h.handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_emits_one_success_and_one_shutdown() {
        let mut tailer = MockLogTailer::new();
        tailer.expect_start().times(3).return_const(());
        tailer.expect_stop().times(1).return_const(());
        let h = harness(MockRunFetcher::new(), tailer).await;

        h.monitor.on_pod_event(pod("Pending")).await.unwrap();
        h.monitor.on_pod_event(pod("Running")).await.unwrap();
        h.monitor.on_pod_event(pod("Running")).await.unwrap();
        h.monitor.on_pod_event(pod("Succeeded")).await.unwrap();

        let out = h.buffer.contents();
        assert!(out.starts_with(&format!("Pod '{}' is in state \"Pending\"...\n", POD_NAME)));
        assert_eq!(out.matches("has succeeded!").count(), 1);
        assert!(h.handle.is_stopped());
    }

    #[tokio::test]
    async fn failed_pod_with_canceled_run_reports_cancellation() {
        let mut fetcher = MockRunFetcher::new();
        let run = task_run(true, false);
        fetcher
            .expect_get_run()
            .with(eq(RUN_NAME))
            .times(1)
            .returning(move |_| Ok(run.clone()));
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().return_const(());
        let h = harness(fetcher, tailer).await;

        assert!(h.monitor.on_pod_event(pod("Failed")).await.is_ok());

        assert_eq!(
            h.buffer.contents(),
            format!("TaskRun '{}' has been canceled.\n", RUN_NAME)
        );
        assert!(h.handle.is_stopped());
    }

    #[tokio::test]
    async fn failed_pod_with_deleted_run_reports_deletion() {
        let mut fetcher = MockRunFetcher::new();
        let run = task_run(false, true);
        fetcher
            .expect_get_run()
            .returning(move |_| Ok(run.clone()));
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().return_const(());
        let h = harness(fetcher, tailer).await;

        assert!(h.monitor.on_pod_event(pod("Failed")).await.is_ok());

        assert_eq!(
            h.buffer.contents(),
            format!("TaskRun '{}' has been deleted.\n", RUN_NAME)
        );
    }

    #[tokio::test]
    async fn failed_pod_with_deletion_marker_reports_pod_deletion() {
        let mut fetcher = MockRunFetcher::new();
        let run = task_run(false, false);
        fetcher
            .expect_get_run()
            .returning(move |_| Ok(run.clone()));
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().return_const(());
        let h = harness(fetcher, tailer).await;

        assert!(h
            .monitor
            .on_pod_event(pod_with("Failed", true))
            .await
            .is_ok());

        assert_eq!(
            h.buffer.contents(),
            format!("Pod '{}' has been deleted.\n", POD_NAME)
        );
    }

    #[tokio::test]
    async fn failed_pod_without_explanation_is_an_error() {
        let mut fetcher = MockRunFetcher::new();
        let run = task_run(false, false);
        fetcher
            .expect_get_run()
            .returning(move |_| Ok(run.clone()));
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().times(1).return_const(());
        let h = harness(fetcher, tailer).await;

        let err = h.monitor.on_pod_event(pod("Failed")).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("task pod '{}' has failed", POD_NAME)
        );
        assert_eq!(
            h.buffer.contents(),
            format!("Pod '{}' has failed!\n", POD_NAME)
        );
        assert!(h.handle.is_stopped());
    }

    #[tokio::test]
    async fn fetch_error_with_deleted_pod_surfaces_the_fetch_error() {
        let mut fetcher = MockRunFetcher::new();
        fetcher
            .expect_get_run()
            .returning(|_| Err(Error::Kubernetes("connection refused".to_string())));
        let mut tailer = MockLogTailer::new();
        tailer.expect_stop().return_const(());
        let h = harness(fetcher, tailer).await;

        let err = h
            .monitor
            .on_pod_event(pod_with("Failed", true))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kubernetes(_)));
        assert_eq!(
            h.buffer.contents(),
            format!("Pod '{}' has been deleted.\n", POD_NAME)
        );
    }

    #[tokio::test]
    async fn unknown_readiness_condition_fails_fast() {
        let h = harness(MockRunFetcher::new(), MockLogTailer::new()).await;
        let pending: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": POD_NAME, "namespace": "default" },
            "spec": {
                "containers": [{ "name": "step-one", "image": "busybox" }]
            },
            "status": {
                "phase": "Pending",
                "conditions": [
                    { "type": "ContainersReady", "status": "Unknown", "message": "ImagePullBackOff" }
                ]
            }
        }))
        .unwrap();

        let err = h.monitor.on_pod_event(pending).await.unwrap_err();

        assert_eq!(err.to_string(), "ImagePullBackOff");
        assert!(h
            .buffer
            .contents()
            .contains("is in state \"Pending\"..."));
    }

    #[tokio::test]
    async fn true_readiness_condition_is_not_an_error() {
        let h = harness(MockRunFetcher::new(), MockLogTailer::new()).await;
        let pending: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": POD_NAME, "namespace": "default" },
            "spec": {
                "containers": [{ "name": "step-one", "image": "busybox" }]
            },
            "status": {
                "phase": "Pending",
                "conditions": [
                    { "type": "Initialized", "status": "True" }
                ]
            }
        }))
        .unwrap();

        assert!(h.monitor.on_pod_event(pending).await.is_ok());
    }

    #[test]
    fn cancellation_outranks_deletion() {
        let run = task_run(true, true);
        let cause = classify_failure(Some(&run), &pod_with("Failed", true));
        assert!(matches!(cause, FailureCause::Canceled { .. }));
    }

    #[test]
    fn run_deletion_outranks_pod_deletion() {
        let run = task_run(false, true);
        let cause = classify_failure(Some(&run), &pod_with("Failed", true));
        assert!(matches!(cause, FailureCause::RunDeleted { .. }));
    }

    #[test]
    fn fetch_failure_falls_back_to_the_pod_marker() {
        assert!(matches!(
            classify_failure(None, &pod_with("Failed", true)),
            FailureCause::PodDeleted { .. }
        ));
        assert!(matches!(
            classify_failure(None, &pod("Failed")),
            FailureCause::PodFailed { .. }
        ));
    }
}
