//! cf-watcher 공통 크레이트
//!
//! 설정([`config`]), 에러([`error`]), 메트릭 이름([`metrics`])을
//! 워크스페이스의 다른 크레이트와 공유합니다.

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CfWatcherError, ConfigError};

// 설정
pub use config::{CfWatcherConfig, CloudflareConfig, DockerConfig, GeneralConfig, MetricsConfig};
