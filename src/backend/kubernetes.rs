//! [`ClusterBackend`] over a live Kubernetes API server.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, AttachParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::{ClusterBackend, ExecOutput};
use crate::crd::ScyllaCluster;
use crate::error::{CtlError, Result};

/// Backend using a `kube` client.
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the given kubeconfig, or the default discovery chain
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster service account).
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    CtlError::Config(format!("failed to read kubeconfig {:?}: {}", path, e))
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| CtlError::Config(format!("invalid kubeconfig: {}", e)))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ScyllaCluster>> {
        let api: Api<ScyllaCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let lp = ListParams::default().labels(selector);
        Ok(self.pods(namespace).list(&lp).await?.items)
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<Service>> {
        let lp = ListParams::default().labels(selector);
        Ok(self.services(namespace).list(&lp).await?.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.pods(namespace).get_opt(name).await?)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.services(namespace).get_opt(name).await?)
    }

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service> {
        let pp = PatchParams::default();
        let svc = self
            .services(namespace)
            .patch(name, &pp, &Patch::Merge(patch))
            .await?;
        debug!(service = %name, "Service patched");
        Ok(svc)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[&str],
    ) -> Result<ExecOutput> {
        let failure = |message: String, stderr: String| CtlError::Execution {
            pod: pod.to_string(),
            message,
            stderr,
        };

        let ap = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        debug!(pod = %pod, container = %container, command = ?command, "Executing command");
        let mut process = self
            .pods(namespace)
            .exec(pod, command.iter().copied(), &ap)
            .await
            .map_err(|e| failure(e.to_string(), String::new()))?;

        let stdout = process.stdout();
        let stderr = process.stderr();
        let status = process.take_status();

        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let stdout = stdout.map_err(|e| failure(e.to_string(), String::new()))?;
        let stderr = stderr.map_err(|e| failure(e.to_string(), String::new()))?;

        if let Some(status) = status {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    let message = status
                        .message
                        .unwrap_or_else(|| "command failed".to_string());
                    return Err(failure(message, stderr));
                }
            }
        }

        process
            .join()
            .await
            .map_err(|e| failure(e.to_string(), stderr.clone()))?;

        Ok(ExecOutput { stdout, stderr })
    }
}

async fn read_stream<R>(stream: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = String::new();
    if let Some(mut stream) = stream {
        stream.read_to_string(&mut buf).await?;
    }
    Ok(buf)
}
