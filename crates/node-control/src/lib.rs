//! # failstorm-node-control
//!
//! 클러스터 인스턴스의 생명주기를 제어하고 상태 변화를 검증합니다.
//!
//! - [`RuntimeClient`]: 런타임 제어 인터페이스 (stop/start/inspect/logs/ping)
//! - [`BollardRuntimeClient`]: Docker 기반 구현
//! - [`NodeController`]: 요청 후 폴링으로 상태를 검증하는 제어기
//! - [`InstanceRegistry`]: 제어기가 단독으로 갱신하는 인스턴스 상태 목록

pub mod controller;
pub mod error;
pub mod registry;
pub mod runtime;

pub use controller::{ControllerSettings, NodeController};
pub use error::NodeControlError;
pub use registry::InstanceRegistry;
pub use runtime::{BollardRuntimeClient, RuntimeClient, filter_lines, validate_instance_name};
