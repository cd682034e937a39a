//! 에러 타입 -- 하네스 공통 에러 정의

/// Failstorm 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FailstormError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스텝에 기록되는 에러 분류
///
/// 치명적 분류(`ControlUnavailable`, `LifecycleTimeout`)는 실행을 중단시키고,
/// 나머지는 스텝 경계에서 결과로 흡수됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 런타임 제어 채널에 도달할 수 없음 (치명적)
    ControlUnavailable,
    /// 요청한 생명주기 상태가 기한 내에 관측되지 않음 (치명적)
    LifecycleTimeout,
    /// 데이터 플레인 호출이 가드 기한을 초과함
    ProbeTimeout,
    /// 데이터 플레인 호출이 명시적 에러를 반환함
    ProbeError,
    /// must-fail 단계의 프로브가 성공함
    UnexpectedSuccess,
}

impl ErrorKind {
    /// 실행 전체를 중단시키는 분류인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ControlUnavailable | Self::LifecycleTimeout)
    }

    /// 출력용 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlUnavailable => "control_unavailable",
            Self::LifecycleTimeout => "lifecycle_timeout",
            Self::ProbeTimeout => "probe_timeout",
            Self::ProbeError => "probe_error",
            Self::UnexpectedSuccess => "unexpected_success",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
