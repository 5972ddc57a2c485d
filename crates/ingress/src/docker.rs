//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────────┐
//! │    Reconciler    │   │ DockerNetworkResolver │
//! └────────┬─────────┘   └───────────┬───────────┘
//!          │                         │
//!          ▼                         ▼
//!        ┌─────────────────────────────┐
//!        │     DockerClient (trait)    │
//!        └─────────────────────────────┘
//!               │              │
//!               ▼              ▼
//!          ┌─────────┐     ┌──────┐
//!          │ Bollard │     │ Mock │
//!          └────┬────┘     └──────┘
//!               │
//!               ▼
//!         Docker Daemon
//! ```
//!
//! # Container Reference Validation
//!
//! Methods that accept a container reference validate it before calling Docker:
//! - Must be 1-128 characters
//! - Must start with an ASCII letter or digit
//! - Must contain only ASCII letters, digits, `_`, `.` or `-`
//!
//! This admits full IDs, ID prefixes and container names, and rejects anything
//! that could alter the request path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bollard::models::{EventMessage, EventMessageTypeEnum};
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::IngressError;
use crate::event::{EventKind, LifecycleEvent};

const MAX_CONTAINER_REF_LEN: usize = 128;

/// Validates a container ID or name to prevent injection into request paths.
fn validate_container_ref(reference: &str) -> Result<(), IngressError> {
    if reference.is_empty() || reference.len() > MAX_CONTAINER_REF_LEN {
        return Err(IngressError::DockerApi(format!(
            "invalid container reference: length {} (must be 1-{MAX_CONTAINER_REF_LEN})",
            reference.len()
        )));
    }
    let mut chars = reference.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(IngressError::DockerApi(
            "invalid container reference: contains unsupported characters".to_owned(),
        ));
    }
    Ok(())
}

/// Everything the engine needs to know about one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Full container ID
    pub id: String,
    /// Name without the leading `/`
    pub name: String,
    /// Container labels (`Config.Labels`)
    pub labels: HashMap<String, String>,
    /// Names of attached networks, sorted
    pub networks: Vec<String>,
}

/// Short listing entry used by network discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Trait abstracting Docker API operations.
///
/// All Docker API calls go through this trait, enabling testability via mocking.
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async contexts.
///
/// # Error Handling
///
/// - **404 errors**: Converted to `IngressError::ContainerNotFound`
/// - **Connection errors**: Wrapped as `IngressError::DockerConnection`
/// - **Event stream errors**: Wrapped as `IngressError::EventStream`
/// - **Everything else**: Wrapped as `IngressError::DockerApi`
pub trait DockerClient: Send + Sync + 'static {
    /// Inspects a container, returning its labels and network attachments.
    ///
    /// # Errors
    ///
    /// - `IngressError::ContainerNotFound`: Container does not exist (404)
    /// - `IngressError::DockerApi`: Invalid reference or other API errors
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerDetails, IngressError>> + Send;

    /// Lists all containers (running or not) attached to `network`.
    ///
    /// An unknown network yields an empty list.
    fn list_network_containers(
        &self,
        network: &str,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, IngressError>> + Send;

    /// Subscribes to container lifecycle events.
    ///
    /// The stream ends when the daemon closes it; an `Err` item is fatal for
    /// the consumer.
    fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, IngressError>>;

    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `IngressError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), IngressError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Communicates with the Docker daemon via a Unix socket (or the platform's
/// default transport). Internally uses `Arc<bollard::Docker>` for cheap sharing.
///
/// # Connection Management
///
/// - Connection timeout: 120 seconds
/// - API version: Default (auto-negotiated)
///
/// # Examples
///
/// ```ignore
/// use cfwatcher_ingress::BollardDockerClient;
///
/// let client = BollardDockerClient::connect_local()?;
/// let client = BollardDockerClient::connect_with_socket("/run/docker.sock")?;
/// # Ok::<(), cfwatcher_ingress::IngressError>(())
/// ```
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `IngressError::DockerConnection` if the connection fails.
    pub fn connect_local() -> Result<Self, IngressError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            IngressError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    ///
    /// # Errors
    ///
    /// Returns `IngressError::DockerConnection` if the connection fails.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, IngressError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    IngressError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket_path`, or to the local default when it is empty.
    pub fn connect(socket_path: &str) -> Result<Self, IngressError> {
        if socket_path.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket_path)
        }
    }
}

impl DockerClient for BollardDockerClient {
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, IngressError> {
        validate_container_ref(id)?;

        let details = self
            .docker
            .inspect_container(id, None::<bollard::container::InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => IngressError::ContainerNotFound(id.to_owned()),
                other => IngressError::DockerApi(format!("inspect container failed: {other}")),
            })?;

        let labels = details
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();

        let mut networks: Vec<String> = details
            .network_settings
            .and_then(|s| s.networks)
            .map(|n| n.into_keys().collect())
            .unwrap_or_default();
        networks.sort();

        Ok(ContainerDetails {
            id: details.id.unwrap_or_else(|| id.to_owned()),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            labels,
            networks,
        })
    }

    async fn list_network_containers(
        &self,
        network: &str,
    ) -> Result<Vec<ContainerSummary>, IngressError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert("network".to_owned(), vec![network.to_owned()]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| IngressError::DockerApi(format!("list containers failed: {e}")))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
            })
            .collect())
    }

    fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, IngressError>> {
        use bollard::system::EventsOptions;

        // Server-side filter; the reconciler still checks kind and action.
        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), vec!["container".to_owned()]);
        filters.insert("event".to_owned(), vec!["start".to_owned()]);
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        self.docker
            .events(Some(options))
            .map(|item| {
                item.map(lifecycle_event)
                    .map_err(|e| IngressError::EventStream(format!("docker events failed: {e}")))
            })
            .boxed()
    }

    async fn ping(&self) -> Result<(), IngressError> {
        self.docker
            .ping()
            .await
            .map_err(|e| IngressError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

fn lifecycle_event(message: EventMessage) -> LifecycleEvent {
    let kind = match message.typ {
        Some(EventMessageTypeEnum::CONTAINER) => EventKind::Container,
        Some(EventMessageTypeEnum::NETWORK) => EventKind::Network,
        Some(EventMessageTypeEnum::IMAGE) => EventKind::Image,
        Some(EventMessageTypeEnum::VOLUME) => EventKind::Volume,
        Some(other) => EventKind::Other(format!("{other:?}").to_lowercase()),
        None => EventKind::Other("unknown".to_owned()),
    };

    let (actor_id, actor_name) = match message.actor {
        Some(actor) => (
            actor.id.unwrap_or_default(),
            actor.attributes.and_then(|mut attrs| attrs.remove("name")),
        ),
        None => (String::new(), None),
    };

    LifecycleEvent {
        kind,
        action: message.action.unwrap_or_default(),
        actor_id,
        actor_name,
    }
}

/// 테스트용 Mock Docker 클라이언트
///
/// 설정 가능한 응답을 반환하여 Docker 없이도 테스트할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    /// inspect_container 대상 컨테이너 목록
    pub containers: Vec<ContainerDetails>,
    /// 네트워크별 연결된 컨테이너
    pub networks: HashMap<String, Vec<ContainerSummary>>,
    /// events()가 내보낼 항목 (Err는 스트림 에러)
    pub events: Vec<Result<LifecycleEvent, String>>,
    /// inspect_container 호출 횟수
    pub inspect_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockDockerClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테스트용 컨테이너를 추가합니다.
    pub fn with_container(mut self, container: ContainerDetails) -> Self {
        self.containers.push(container);
        self
    }

    /// 네트워크와 연결된 컨테이너를 등록합니다.
    pub fn with_network(mut self, network: &str, containers: Vec<ContainerSummary>) -> Self {
        self.networks.insert(network.to_owned(), containers);
        self
    }

    /// 이벤트 스트림 항목을 설정합니다.
    pub fn with_events(mut self, events: Vec<Result<LifecycleEvent, String>>) -> Self {
        self.events = events;
        self
    }

    pub fn inspect_calls(&self) -> usize {
        self.inspect_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, IngressError> {
        self.inspect_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        validate_container_ref(id)?;
        self.containers
            .iter()
            .find(|c| c.id == id || c.name == id)
            .cloned()
            .ok_or_else(|| IngressError::ContainerNotFound(id.to_owned()))
    }

    async fn list_network_containers(
        &self,
        network: &str,
    ) -> Result<Vec<ContainerSummary>, IngressError> {
        Ok(self.networks.get(network).cloned().unwrap_or_default())
    }

    fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, IngressError>> {
        let items: Vec<_> = self
            .events
            .iter()
            .cloned()
            .map(|item| item.map_err(IngressError::EventStream))
            .collect();
        futures::stream::iter(items).boxed()
    }

    async fn ping(&self) -> Result<(), IngressError> {
        Ok(())
    }
}
