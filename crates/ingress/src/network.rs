//! Tunnel network discovery.
//!
//! When a container does not name its tunnel network with
//! `cf_watcher.cf_network`, [`DockerNetworkResolver`] looks at every network
//! the container is attached to and picks the first one that also hosts the
//! tunnel egress container (recognized by an image-name token, `cloudflared`
//! by default).

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::docker::DockerClient;
use crate::error::IngressError;

/// Finds the network that connects a container to the tunnel egress point.
pub trait NetworkResolver: Send + Sync + 'static {
    /// Returns the first of `networks` hosting a tunnel egress container.
    ///
    /// `Ok(None)` means no candidate network qualifies.
    fn find_tunnel_network(
        &self,
        networks: &[String],
    ) -> impl Future<Output = Result<Option<String>, IngressError>> + Send;
}

/// Resolver backed by the Docker API.
pub struct DockerNetworkResolver<D: DockerClient> {
    docker: Arc<D>,
    image_token: String,
}

impl<D: DockerClient> DockerNetworkResolver<D> {
    pub fn new(docker: Arc<D>, image_token: impl Into<String>) -> Self {
        Self {
            docker,
            image_token: image_token.into(),
        }
    }
}

impl<D: DockerClient> NetworkResolver for DockerNetworkResolver<D> {
    async fn find_tunnel_network(
        &self,
        networks: &[String],
    ) -> Result<Option<String>, IngressError> {
        // Sorted so the pick does not depend on the runtime's map ordering
        let mut candidates: Vec<&String> = networks.iter().collect();
        candidates.sort();

        for network in candidates {
            let containers = match self.docker.list_network_containers(network).await {
                Ok(containers) => containers,
                Err(e) => {
                    warn!(network = %network, error = %e, "failed to list containers for network");
                    continue;
                }
            };

            if let Some(tunnel) = containers
                .iter()
                .find(|c| c.image.contains(&self.image_token))
            {
                info!(
                    network = %network,
                    tunnel_container = %tunnel.name,
                    "found tunnel egress container in network"
                );
                return Ok(Some(network.clone()));
            }
            debug!(network = %network, "no tunnel egress container in network");
        }

        Ok(None)
    }
}

/// Resolver with a fixed answer, counting how often it was asked.
#[cfg(test)]
pub struct StaticNetworkResolver {
    answer: Result<Option<String>, String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StaticNetworkResolver {
    pub fn none() -> Self {
        Self {
            answer: Ok(None),
            calls: Default::default(),
        }
    }

    pub fn found(network: &str) -> Self {
        Self {
            answer: Ok(Some(network.to_owned())),
            calls: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Err("resolver must not be called".to_owned()),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl NetworkResolver for StaticNetworkResolver {
    async fn find_tunnel_network(
        &self,
        _networks: &[String],
    ) -> Result<Option<String>, IngressError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.answer.clone().map_err(IngressError::DockerApi)
    }
}
