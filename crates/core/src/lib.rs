//! Failstorm 공통 크레이트
//!
//! 노드 제어기, 시나리오 엔진, CLI가 공유하는 도메인 타입, 에러 분류,
//! 설정 구조체, 메트릭 이름을 제공합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ErrorKind, FailstormError};

// 설정
pub use config::FailstormConfig;

// 도메인 타입
pub use types::{
    Expectation, HealthState, InstanceObservation, LifecycleState, ManagedInstance, Role,
};
