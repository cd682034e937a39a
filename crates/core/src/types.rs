//! 도메인 타입 -- 하네스 전역에서 사용되는 공통 타입
//!
//! 노드 제어기, 시나리오 엔진, CLI가 공유하는 인스턴스 모델을 정의합니다.
//! 상태 값은 모두 enum으로 표현되며 `Unknown`은 "값이 없음"이 아니라
//! 명시적인 상태입니다.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 클러스터 내 인스턴스의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// 클라이언트 요청을 받는 프록시
    Proxy,
    /// 코디네이터 (root/data/query/index coord)
    Coordinator,
    /// 검색을 담당하는 쿼리 워커
    QueryWorker,
    /// 데이터 적재 워커
    DataWorker,
    /// 인덱스 빌드 워커
    IndexWorker,
    /// 메타데이터 저장소 (etcd 등)
    MetadataStore,
    /// 오브젝트 저장소 (minio 등)
    ObjectStore,
    /// 메시지 브로커 (kafka, pulsar 등)
    MessageBroker,
}

impl Role {
    /// 모든 역할을 선언 순서대로 반환합니다.
    pub const ALL: [Role; 8] = [
        Role::Proxy,
        Role::Coordinator,
        Role::QueryWorker,
        Role::DataWorker,
        Role::IndexWorker,
        Role::MetadataStore,
        Role::ObjectStore,
        Role::MessageBroker,
    ];

    /// 설정/출력에서 사용하는 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Coordinator => "coordinator",
            Self::QueryWorker => "query-worker",
            Self::DataWorker => "data-worker",
            Self::IndexWorker => "index-worker",
            Self::MetadataStore => "metadata-store",
            Self::ObjectStore => "object-store",
            Self::MessageBroker => "message-broker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// 관측된 생명주기 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// 실행 중
    Running,
    /// 정지됨 (exited, dead, created 포함)
    Stopped,
    /// 시작 중 (restarting)
    Starting,
    /// 정지 중 (removing)
    Stopping,
    /// 관측되지 않았거나 분류할 수 없음
    #[default]
    Unknown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// 관측된 헬스 상태 (생명주기 상태와 독립)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// 준비 완료
    Healthy,
    /// 헬스 체크 실패 또는 아직 준비되지 않음
    Unhealthy,
    /// 헬스 체크가 없거나 관측 불가
    #[default]
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// 런타임에서 한 번 관측한 인스턴스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceObservation {
    /// 생명주기 상태
    pub lifecycle: LifecycleState,
    /// 헬스 상태
    pub health: HealthState,
}

impl InstanceObservation {
    /// 새 관측값을 생성합니다.
    pub fn new(lifecycle: LifecycleState, health: HealthState) -> Self {
        Self { lifecycle, health }
    }

    /// 실행 중이고 헬스 조건을 만족하는지 확인합니다.
    ///
    /// `unknown_is_healthy`가 참이면 헬스 체크가 없는 인스턴스도
    /// 실행 중이기만 하면 정상으로 간주합니다.
    pub fn is_ready(&self, unknown_is_healthy: bool) -> bool {
        self.lifecycle == LifecycleState::Running
            && match self.health {
                HealthState::Healthy => true,
                HealthState::Unknown => unknown_is_healthy,
                HealthState::Unhealthy => false,
            }
    }
}

impl fmt::Display for InstanceObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.lifecycle, self.health)
    }
}

/// 하네스가 제어하는 인스턴스 레코드
///
/// 상태 필드는 노드 제어기만 갱신하며, 항상 런타임 관측값에서 유래합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedInstance {
    /// 논리 이름 (예: "milvus-querynode1")
    pub name: String,
    /// 역할
    pub role: Role,
    /// 마지막으로 검증된 생명주기 상태
    pub lifecycle: LifecycleState,
    /// 마지막으로 검증된 헬스 상태
    pub health: HealthState,
    /// 마지막 관측 시각 (관측 전이면 None)
    pub observed_at: Option<SystemTime>,
}

impl ManagedInstance {
    /// 아직 관측되지 않은 인스턴스를 생성합니다.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            lifecycle: LifecycleState::Unknown,
            health: HealthState::Unknown,
            observed_at: None,
        }
    }

    /// 현재 레코드를 관측값 형태로 반환합니다.
    pub fn observation(&self) -> InstanceObservation {
        InstanceObservation::new(self.lifecycle, self.health)
    }
}

impl fmt::Display for ManagedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {}/{}",
            self.name, self.role, self.lifecycle, self.health
        )
    }
}

/// 시나리오 단계의 프로브 기대 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    /// 유효하고 비어 있지 않은 결과로 완료되어야 함
    MustSucceed,
    /// 기한 초과 또는 에러로 끝나야 함
    MustFail,
    /// 어느 쪽이든 허용, 지연 시간만 기록
    DegradedOk,
}

impl Expectation {
    /// 설정/출력에서 사용하는 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MustSucceed => "must-succeed",
            Self::MustFail => "must-fail",
            Self::DegradedOk => "degraded-ok",
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expectation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "must-succeed" => Ok(Self::MustSucceed),
            "must-fail" => Ok(Self::MustFail),
            "degraded-ok" => Ok(Self::DegradedOk),
            other => Err(format!("unknown expectation '{other}'")),
        }
    }
}
