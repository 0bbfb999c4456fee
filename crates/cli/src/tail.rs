use std::sync::Mutex;

use futures::{AsyncBufReadExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, LogParams},
    Client,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::output::Output;

/// Starts and stops per-container log streams. Suppressing duplicate starts
/// is the caller's responsibility; start here always opens a new stream.
#[cfg_attr(test, mockall::automock)]
pub trait LogTailer: Send + Sync {
    fn start(&self, namespace: &str, pod_name: &str, container: &str);
    fn stop(&self);
}

/// LogTailer backed by the cluster's log endpoint. Each start spawns a task
/// that follows one container's log stream onto the shared output.
pub struct LogTail {
    client: Client,
    output: Output,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LogTail {
    pub fn new(client: Client, output: Output) -> Self {
        Self {
            client,
            output,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

impl LogTailer for LogTail {
    fn start(&self, namespace: &str, pod_name: &str, container: &str) {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod_name = pod_name.to_string();
        let container = container.to_string();
        let output = self.output.clone();
        let task = tokio::spawn(async move {
            let params = LogParams {
                container: Some(container.clone()),
                follow: true,
                ..LogParams::default()
            };
            let stream = match pods.log_stream(&pod_name, &params).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(
                        "failed to open log stream for {}/{}: {}",
                        pod_name, container, e
                    );
                    return;
                }
            };
            let mut lines = stream.lines();
            loop {
                match lines.try_next().await {
                    Ok(Some(line)) => {
                        if output.write(&format!("[{}] {}\n", container, line)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        debug!("log stream for {}/{} closed: {}", pod_name, container, e);
                        return;
                    }
                }
            }
        });
        self.tasks.lock().unwrap().push(task);
    }

    fn stop(&self) {
        // abort is a no-op for tasks that already finished, so a second stop
        // is safe
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
