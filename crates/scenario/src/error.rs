//! 시나리오 에러 타입
//!
//! - [`DataPlaneError`]: 데이터 플레인 호출 실패. 스텝 경계에서 결과로 흡수됩니다.
//! - [`ScenarioError`]: 시나리오 정의/로딩/보고서 저장 실패. 실행 전에 반환됩니다.

use failstorm_core::error::ErrorKind;

/// 데이터 플레인 클라이언트 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataPlaneError {
    /// 전송 계층 실패 (연결 거부, 리셋 등)
    #[error("transport error: {0}")]
    Transport(String),

    /// 클라이언트 측 요청 타임아웃
    #[error("client timeout: {0}")]
    Timeout(String),

    /// 서버가 에러 코드를 반환함
    #[error("server error {code}: {message}")]
    Server {
        /// 응답 코드
        code: i64,
        /// 응답 메시지
        message: String,
    },

    /// 응답 해석 실패
    #[error("decode error: {0}")]
    Decode(String),

    /// 요청 구성 불가
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 결과를 전달하기 전에 실행 태스크가 사라짐
    #[error("probe task aborted")]
    Aborted,
}

impl DataPlaneError {
    /// 스텝 기록용 에러 분류
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProbeError
    }
}

impl From<reqwest::Error> for DataPlaneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// 시나리오 정의/실행 준비 에러
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// 알 수 없는 시나리오 이름
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    /// 시나리오 파일 로딩 실패
    #[error("scenario load error: {path}: {reason}")]
    Load {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 시나리오 정의 검증 실패
    #[error("invalid scenario '{scenario}': {reason}")]
    Invalid {
        /// 시나리오 이름
        scenario: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 시나리오가 관리 대상이 아닌 인스턴스를 참조함
    #[error("scenario references unmanaged instance '{0}'")]
    UnknownInstance(String),

    /// 보고서 직렬화 실패
    #[error("report serialization failed: {0}")]
    Serialize(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
