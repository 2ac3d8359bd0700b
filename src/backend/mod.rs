//! Access to the Kubernetes objects and exec transport.
//!
//! Operations only talk to the cluster through [`ClusterBackend`], which keeps
//! them testable against an in-memory implementation.

mod kubernetes;

pub use self::kubernetes::KubeBackend;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};

use crate::crd::ScyllaCluster;
use crate::error::Result;

/// Captured output of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Read and mutate the cluster's Kubernetes objects.
///
/// Lookups by name return `Ok(None)` when the object does not exist; only
/// transport and API failures are errors. Implementations must be safe to
/// share between concurrent operations.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ScyllaCluster>>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Apply a JSON merge patch to a service.
    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service>;

    /// Run a non-interactive command in a container.
    ///
    /// A non-zero exit or transport failure is returned as
    /// [`CtlError::Execution`](crate::error::CtlError::Execution) carrying the
    /// captured stderr.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[&str],
    ) -> Result<ExecOutput>;
}
