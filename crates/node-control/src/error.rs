//! 노드 제어 에러 타입
//!
//! [`NodeControlError`]는 런타임 제어 채널 실패와 상태 검증 기한 초과를
//! 구분합니다. "할 수 없음"과 "제때 일어나지 않음"은 호출자가 다르게
//! 처리해야 하므로 [`NodeControlError::kind`]로 분류를 제공합니다.

use std::time::Duration;

use failstorm_core::error::ErrorKind;
use failstorm_core::types::InstanceObservation;

/// 노드 제어 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum NodeControlError {
    /// 런타임 제어 채널에 도달할 수 없음
    #[error("control channel unavailable: {0}")]
    ControlUnavailable(String),

    /// 런타임이 요청을 명시적으로 거부함
    #[error("runtime rejected {action} on '{instance}': {reason}")]
    Runtime {
        /// 대상 인스턴스
        instance: String,
        /// 요청한 액션
        action: &'static str,
        /// 거부 사유
        reason: String,
    },

    /// 인스턴스가 레지스트리 또는 런타임에 존재하지 않음
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// 요청한 상태가 기한 내에 관측되지 않음
    #[error(
        "instance '{instance}' did not reach {expected} within {waited:?} (last observed {observed})"
    )]
    LifecycleTimeout {
        /// 대상 인스턴스
        instance: String,
        /// 기대한 상태
        expected: &'static str,
        /// 마지막 관측값
        observed: InstanceObservation,
        /// 실제 대기 시간
        waited: Duration,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl NodeControlError {
    /// 스텝 기록용 에러 분류를 반환합니다.
    ///
    /// 기한 초과만 `LifecycleTimeout`이고, 나머지는 모두 제어 불가로 분류됩니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LifecycleTimeout { .. } => ErrorKind::LifecycleTimeout,
            Self::ControlUnavailable(_)
            | Self::Runtime { .. }
            | Self::InstanceNotFound(_)
            | Self::Config { .. } => ErrorKind::ControlUnavailable,
        }
    }
}
