use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::{future::BoxFuture, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, WatchEvent, WatchParams},
    Client, ResourceExt,
};
use tokio::sync::Notify;
use tracing::debug;

use crate::{Error, Result};

/// Callback invoked for every observed pod modification.
pub type PodModifiedHandler = Box<dyn Fn(Pod) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Clonable stop handle for a running pod watch.
#[derive(Clone)]
pub struct WatcherHandle {
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub(crate) fn new() -> Self {
        Self {
            stop: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Unblocks the watch loop. Repeated stops are no-ops.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a stop issued before the loop
        // reaches its next await is not lost
        self.stop.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Watches pods matching a label selector and feeds every modification to
/// the registered handler. start blocks the calling task until stop is
/// invoked, the handler returns an error, or the watch ends abnormally.
pub struct PodWatcher {
    pods: Api<Pod>,
    watch_params: WatchParams,
    on_pod_modified: Option<PodModifiedHandler>,
    handle: WatcherHandle,
}

impl PodWatcher {
    pub fn new(client: Client, watch_params: WatchParams, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            watch_params,
            on_pod_modified: None,
            handle: WatcherHandle::new(),
        }
    }

    pub fn with_on_pod_modified(&mut self, handler: PodModifiedHandler) {
        self.on_pod_modified = Some(handler);
    }

    pub fn handle(&self) -> WatcherHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Blocks until stop is invoked or the watch terminates. Returns the
    /// last observed pod, if any. Server-side watch timeouts are transparent
    /// here; the watch is re-established from the last seen resource
    /// version.
    pub async fn start(&self) -> Result<Option<Pod>> {
        let mut version = "0".to_string();
        let mut last_pod: Option<Pod> = None;
        while !self.handle.is_stopped() {
            let mut stream = self
                .pods
                .watch(&self.watch_params, &version)
                .await
                .map_err(|e| Error::Kubernetes(e.to_string()))?
                .boxed();
            loop {
                let event = tokio::select! {
                    _ = self.handle.stop.notified() => return Ok(last_pod),
                    event = stream.try_next() => {
                        event.map_err(|e| Error::Kubernetes(e.to_string()))?
                    }
                };
                let pod = match event {
                    // the first observation of a pod that existed before the
                    // watch began arrives as Added; treat it like a
                    // modification
                    Some(WatchEvent::Added(pod)) | Some(WatchEvent::Modified(pod)) => pod,
                    Some(WatchEvent::Deleted(pod)) => {
                        debug!("pod {} deleted", pod.name_any());
                        continue;
                    }
                    Some(WatchEvent::Bookmark(bookmark)) => {
                        version = bookmark.metadata.resource_version.clone();
                        continue;
                    }
                    Some(WatchEvent::Error(e)) => {
                        return Err(Error::Kubernetes(e.to_string()));
                    }
                    // server closed the stream; re-establish from the last
                    // seen version
                    None => break,
                };
                if let Some(rv) = pod.resource_version() {
                    version = rv;
                }
                if let Some(handler) = &self.on_pod_modified {
                    handler(pod.clone()).await?;
                }
                last_pod = Some(pod);
                if self.handle.is_stopped() {
                    return Ok(last_pod);
                }
            }
        }
        Ok(last_pod)
    }
}
