//! Container lifecycle events.
//!
//! [`LifecycleEvent`] is the runtime-agnostic view of a Docker event message
//! consumed by the [`Watcher`](crate::watcher::Watcher). Only events whose
//! kind is [`EventKind::Container`] and whose action is `start` trigger a
//! reconciliation; everything else is reported as skipped.
//!
//! # Examples
//!
//! ```
//! use cfwatcher_ingress::{EventKind, LifecycleEvent};
//!
//! let event = LifecycleEvent::container_start("abc123def456");
//! assert!(event.is_container_start());
//!
//! let other = LifecycleEvent::new(EventKind::Network, "connect", "f00d");
//! assert!(!other.is_container_start());
//! ```

use std::fmt;

/// Docker action that triggers reconciliation.
pub const ACTION_START: &str = "start";

/// Kind of object a lifecycle event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// 컨테이너 이벤트
    Container,
    /// 네트워크 이벤트
    Network,
    /// 이미지 이벤트
    Image,
    /// 볼륨 이벤트
    Volume,
    /// 그 밖의 이벤트 (원본 타입명 보존)
    Other(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Network => write!(f, "network"),
            Self::Image => write!(f, "image"),
            Self::Volume => write!(f, "volume"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// A single lifecycle event from the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// 이벤트 대상 종류
    pub kind: EventKind,
    /// 액션 (`start`, `die`, `connect` ...)
    pub action: String,
    /// 대상 객체 ID (컨테이너 이벤트라면 컨테이너 ID)
    pub actor_id: String,
    /// 대상 이름 (Docker가 actor attributes로 제공하는 경우)
    pub actor_name: Option<String>,
}

impl LifecycleEvent {
    /// Creates an event without an actor name.
    pub fn new(kind: EventKind, action: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            actor_id: actor_id.into(),
            actor_name: None,
        }
    }

    /// Shorthand for a `container/start` event.
    pub fn container_start(container_id: impl Into<String>) -> Self {
        Self::new(EventKind::Container, ACTION_START, container_id)
    }

    /// Attaches the actor name reported by the runtime.
    pub fn with_actor_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = Some(name.into());
        self
    }

    /// Returns `true` for the only event that triggers reconciliation.
    pub fn is_container_start(&self) -> bool {
        self.kind == EventKind::Container && self.action == ACTION_START
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} actor={}", self.kind, self.action, self.actor_id)?;
        if let Some(name) = &self.actor_name {
            write!(f, " name={name}")?;
        }
        Ok(())
    }
}
