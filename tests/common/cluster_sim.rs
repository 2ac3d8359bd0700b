// In-memory Kubernetes backend for integration tests
// Serves scripted pod lookups and exec outputs, and records mutations

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use parking_lot::Mutex;

use scyllactl::backend::{ClusterBackend, ExecOutput};
use scyllactl::crd::ScyllaCluster;
use scyllactl::error::{CtlError, ResourceKind, Result};

/// Outcome of one scripted exec: stdout on success, stderr on failure.
pub type ExecScript = std::result::Result<String, String>;

/// A recorded service patch.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPatch {
    pub namespace: String,
    pub service: String,
    pub patch: serde_json::Value,
}

#[derive(Default)]
struct State {
    clusters: HashMap<(String, String), ScyllaCluster>,
    pods: Vec<Pod>,
    services: Vec<Service>,
    pod_lookups: HashMap<String, VecDeque<Option<Pod>>>,
    exec_scripts: HashMap<String, VecDeque<ExecScript>>,
    exec_calls: Vec<String>,
    pod_lookup_calls: Vec<String>,
    patches: Vec<RecordedPatch>,
    list_failure: Option<String>,
    pod_lookup_failures: HashMap<String, (usize, u16, String)>,
}

/// Scripted stand-in for the Kubernetes API.
///
/// Scripts are queues whose last entry repeats forever once reached.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

fn api_error(code: u16, reason: &str, message: impl Into<String>) -> CtlError {
    CtlError::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn matches_selector(labels: &std::collections::BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cluster(&self, sc: ScyllaCluster) {
        let key = (sc.namespace().unwrap_or_default(), sc.name_any());
        self.state.lock().clusters.insert(key, sc);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.state.lock().pods.push(pod);
    }

    pub fn add_service(&self, service: Service) {
        self.state.lock().services.push(service);
    }

    pub fn remove_service(&self, name: &str) {
        self.state.lock().services.retain(|s| s.name_any() != name);
    }

    /// Answers for successive `get_pod` calls on `name`.
    ///
    /// Without a script, lookups fall back to the listed pods.
    pub fn script_pod(&self, name: &str, lookups: Vec<Option<Pod>>) {
        self.state
            .lock()
            .pod_lookups
            .insert(name.to_string(), lookups.into());
    }

    /// Answers for successive exec calls in `pod`.
    pub fn script_exec(&self, pod: &str, outputs: Vec<ExecScript>) {
        self.state
            .lock()
            .exec_scripts
            .insert(pod.to_string(), outputs.into());
    }

    /// Fail every `get_pod` call on `name` from the `from`-th one on (1-based)
    /// with an API error of status `code`.
    pub fn fail_pod_lookups(&self, name: &str, from: usize, code: u16, reason: &str) {
        self.state
            .lock()
            .pod_lookup_failures
            .insert(name.to_string(), (from, code, reason.to_string()));
    }

    /// Make pod and service listing fail.
    pub fn fail_listing(&self, message: &str) {
        self.state.lock().list_failure = Some(message.to_string());
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.state.lock().patches.clone()
    }

    /// Pods commands were executed in, in call order.
    pub fn exec_calls(&self) -> Vec<String> {
        self.state.lock().exec_calls.clone()
    }

    pub fn pod_lookup_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .pod_lookup_calls
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state
            .lock()
            .services
            .iter()
            .find(|s| s.name_any() == name)
            .cloned()
    }
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ScyllaCluster>> {
        let state = self.state.lock();
        Ok(state
            .clusters
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let state = self.state.lock();
        if let Some(message) = &state.list_failure {
            return Err(api_error(500, "InternalError", message.clone()));
        }
        Ok(state
            .pods
            .iter()
            .filter(|p| p.namespace().as_deref() == Some(namespace))
            .filter(|p| matches_selector(p.labels(), selector))
            .cloned()
            .collect())
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        let state = self.state.lock();
        if let Some(message) = &state.list_failure {
            return Err(api_error(500, "InternalError", message.clone()));
        }
        Ok(state
            .services
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace))
            .filter(|s| matches_selector(s.labels(), selector))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let mut state = self.state.lock();
        state.pod_lookup_calls.push(name.to_string());
        let calls = state.pod_lookup_calls.iter().filter(|n| n.as_str() == name).count();
        if let Some((from, code, reason)) = state.pod_lookup_failures.get(name) {
            if calls >= *from {
                return Err(api_error(*code, reason, format!("pods \"{}\" is {}", name, reason)));
            }
        }
        if let Some(queue) = state.pod_lookups.get_mut(name) {
            return Ok(next_scripted(queue).flatten());
        }
        Ok(state
            .pods
            .iter()
            .find(|p| p.name_any() == name && p.namespace().as_deref() == Some(namespace))
            .cloned())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let state = self.state.lock();
        Ok(state
            .services
            .iter()
            .find(|s| s.name_any() == name && s.namespace().as_deref() == Some(namespace))
            .cloned())
    }

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service> {
        let mut state = self.state.lock();
        state.patches.push(RecordedPatch {
            namespace: namespace.to_string(),
            service: name.to_string(),
            patch: patch.clone(),
        });

        let service = state
            .services
            .iter_mut()
            .find(|s| s.name_any() == name && s.namespace().as_deref() == Some(namespace))
            .ok_or_else(|| CtlError::not_found(ResourceKind::Service, name))?;

        if let Some(labels) = patch["metadata"]["labels"].as_object() {
            let current = service.labels_mut();
            for (key, value) in labels {
                match value.as_str() {
                    Some(v) => {
                        current.insert(key.clone(), v.to_string());
                    }
                    None => {
                        current.remove(key);
                    }
                }
            }
        }
        Ok(service.clone())
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
        _command: &[&str],
    ) -> Result<ExecOutput> {
        let mut state = self.state.lock();
        state.exec_calls.push(pod.to_string());

        let scripted = state
            .exec_scripts
            .get_mut(pod)
            .and_then(next_scripted)
            .unwrap_or_else(|| Err("error: unable to upgrade connection".to_string()));

        match scripted {
            Ok(stdout) => Ok(ExecOutput {
                stdout,
                stderr: String::new(),
            }),
            Err(stderr) => Err(CtlError::Execution {
                pod: pod.to_string(),
                message: "command terminated with non-zero exit code".to_string(),
                stderr,
            }),
        }
    }
}
