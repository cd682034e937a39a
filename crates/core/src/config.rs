//! 설정 관리 -- failstorm.toml 파싱 및 런타임 설정
//!
//! [`FailstormConfig`]는 하네스 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FAILSTORM_TIMEOUTS_STOP_SECS=45` 형식)
//! 3. 설정 파일 (`failstorm.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), failstorm_core::error::FailstormError> {
//! use failstorm_core::config::FailstormConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FailstormConfig::load("failstorm.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FailstormConfig::parse("[probe]\nrecord_count = 20")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FailstormError};
use crate::types::{Expectation, Role};

/// 설정 상한값 상수
const MAX_LIFECYCLE_TIMEOUT_SECS: u64 = 3600;
const MAX_PROBE_DEADLINE_SECS: u64 = 600;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_STABILITY_THRESHOLD: u32 = 10;
const MAX_RECORD_COUNT: usize = 10_000;
const MAX_TOP_K: usize = 16_384;
const MAX_VECTOR_DIM: usize = 32_768;
const MAX_IN_FLIGHT: usize = 64;
const MAX_SETTLE_SECS: u64 = 600;
const MAX_KEY_PREFIX_SEED_LEN: usize = 24;

/// Failstorm 통합 설정
///
/// `failstorm.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailstormConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 역할별 인스턴스 이름
    #[serde(default)]
    pub instances: InstancesConfig,
    /// 생명주기/프로브 타임아웃
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// 헬스 폴링 설정
    #[serde(default)]
    pub health: HealthConfig,
    /// 데이터 플레인 클라이언트 설정
    #[serde(default)]
    pub data_plane: DataPlaneConfig,
    /// 프로브 설정
    #[serde(default)]
    pub probe: ProbeConfig,
    /// 시나리오 실행 설정
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl FailstormConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FailstormError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FailstormError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FailstormError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FailstormError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FailstormError> {
        toml::from_str(toml_str).map_err(|e| {
            FailstormError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FAILSTORM_{SECTION}_{FIELD}`
    /// 예: `FAILSTORM_DATA_PLANE_URI=http://milvus:19530`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FAILSTORM_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FAILSTORM_GENERAL_LOG_FORMAT");

        // Runtime
        override_string(
            &mut self.runtime.docker_socket,
            "FAILSTORM_RUNTIME_DOCKER_SOCKET",
        );
        override_u64(
            &mut self.runtime.stop_grace_secs,
            "FAILSTORM_RUNTIME_STOP_GRACE_SECS",
        );
        override_u64(
            &mut self.runtime.request_timeout_secs,
            "FAILSTORM_RUNTIME_REQUEST_TIMEOUT_SECS",
        );

        // Instances
        override_csv(&mut self.instances.proxy, "FAILSTORM_INSTANCES_PROXY");
        override_csv(
            &mut self.instances.coordinator,
            "FAILSTORM_INSTANCES_COORDINATOR",
        );
        override_csv(
            &mut self.instances.query_worker,
            "FAILSTORM_INSTANCES_QUERY_WORKER",
        );
        override_csv(
            &mut self.instances.data_worker,
            "FAILSTORM_INSTANCES_DATA_WORKER",
        );
        override_csv(
            &mut self.instances.index_worker,
            "FAILSTORM_INSTANCES_INDEX_WORKER",
        );
        override_csv(
            &mut self.instances.metadata_store,
            "FAILSTORM_INSTANCES_METADATA_STORE",
        );
        override_csv(
            &mut self.instances.object_store,
            "FAILSTORM_INSTANCES_OBJECT_STORE",
        );
        override_csv(
            &mut self.instances.message_broker,
            "FAILSTORM_INSTANCES_MESSAGE_BROKER",
        );

        // Timeouts
        override_u64(&mut self.timeouts.stop_secs, "FAILSTORM_TIMEOUTS_STOP_SECS");
        override_u64(
            &mut self.timeouts.start_secs,
            "FAILSTORM_TIMEOUTS_START_SECS",
        );
        override_u64(
            &mut self.timeouts.wait_healthy_secs,
            "FAILSTORM_TIMEOUTS_WAIT_HEALTHY_SECS",
        );
        override_u64(
            &mut self.timeouts.probe_deadline_secs,
            "FAILSTORM_TIMEOUTS_PROBE_DEADLINE_SECS",
        );

        // Health
        override_u64(
            &mut self.health.poll_interval_ms,
            "FAILSTORM_HEALTH_POLL_INTERVAL_MS",
        );
        override_u32(
            &mut self.health.stability_threshold,
            "FAILSTORM_HEALTH_STABILITY_THRESHOLD",
        );
        override_bool(
            &mut self.health.unknown_health_is_healthy,
            "FAILSTORM_HEALTH_UNKNOWN_HEALTH_IS_HEALTHY",
        );

        // Data plane
        override_string(&mut self.data_plane.uri, "FAILSTORM_DATA_PLANE_URI");
        override_string(
            &mut self.data_plane.database,
            "FAILSTORM_DATA_PLANE_DATABASE",
        );
        override_string(
            &mut self.data_plane.collection,
            "FAILSTORM_DATA_PLANE_COLLECTION",
        );
        override_string(&mut self.data_plane.token, "FAILSTORM_DATA_PLANE_TOKEN");
        override_u64(
            &mut self.data_plane.client_timeout_secs,
            "FAILSTORM_DATA_PLANE_CLIENT_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.data_plane.vector_dim,
            "FAILSTORM_DATA_PLANE_VECTOR_DIM",
        );

        // Probe
        override_usize(
            &mut self.probe.record_count,
            "FAILSTORM_PROBE_RECORD_COUNT",
        );
        override_usize(&mut self.probe.top_k, "FAILSTORM_PROBE_TOP_K");
        override_string(
            &mut self.probe.key_prefix_seed,
            "FAILSTORM_PROBE_KEY_PREFIX_SEED",
        );
        override_usize(
            &mut self.probe.max_in_flight,
            "FAILSTORM_PROBE_MAX_IN_FLIGHT",
        );

        // Scenario
        override_u64(
            &mut self.scenario.settle_secs,
            "FAILSTORM_SCENARIO_SETTLE_SECS",
        );
        override_expectation(
            &mut self.scenario.both_down_expectation,
            "FAILSTORM_SCENARIO_BOTH_DOWN_EXPECTATION",
        );
        override_usize(&mut self.scenario.log_tail, "FAILSTORM_SCENARIO_LOG_TAIL");
        override_csv(
            &mut self.scenario.log_keywords,
            "FAILSTORM_SCENARIO_LOG_KEYWORDS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FailstormError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        check_range(
            "runtime.request_timeout_secs",
            self.runtime.request_timeout_secs,
            1,
            MAX_LIFECYCLE_TIMEOUT_SECS,
        )?;
        check_range(
            "runtime.stop_grace_secs",
            self.runtime.stop_grace_secs,
            0,
            MAX_LIFECYCLE_TIMEOUT_SECS,
        )?;

        check_range(
            "timeouts.stop_secs",
            self.timeouts.stop_secs,
            1,
            MAX_LIFECYCLE_TIMEOUT_SECS,
        )?;
        check_range(
            "timeouts.start_secs",
            self.timeouts.start_secs,
            1,
            MAX_LIFECYCLE_TIMEOUT_SECS,
        )?;
        check_range(
            "timeouts.wait_healthy_secs",
            self.timeouts.wait_healthy_secs,
            1,
            MAX_LIFECYCLE_TIMEOUT_SECS,
        )?;
        check_range(
            "timeouts.probe_deadline_secs",
            self.timeouts.probe_deadline_secs,
            1,
            MAX_PROBE_DEADLINE_SECS,
        )?;

        check_range(
            "health.poll_interval_ms",
            self.health.poll_interval_ms,
            1,
            MAX_POLL_INTERVAL_MS,
        )?;
        check_range(
            "health.stability_threshold",
            u64::from(self.health.stability_threshold),
            1,
            u64::from(MAX_STABILITY_THRESHOLD),
        )?;

        if self.data_plane.uri.is_empty() {
            return Err(invalid("data_plane.uri", "must not be empty".to_owned()));
        }
        if !(self.data_plane.uri.starts_with("http://")
            || self.data_plane.uri.starts_with("https://"))
        {
            return Err(invalid(
                "data_plane.uri",
                "must start with http:// or https://".to_owned(),
            ));
        }
        if self.data_plane.collection.is_empty() {
            return Err(invalid(
                "data_plane.collection",
                "must not be empty".to_owned(),
            ));
        }
        check_range(
            "data_plane.client_timeout_secs",
            self.data_plane.client_timeout_secs,
            1,
            MAX_PROBE_DEADLINE_SECS,
        )?;
        check_range(
            "data_plane.vector_dim",
            self.data_plane.vector_dim as u64,
            1,
            MAX_VECTOR_DIM as u64,
        )?;

        check_range(
            "probe.record_count",
            self.probe.record_count as u64,
            1,
            MAX_RECORD_COUNT as u64,
        )?;
        check_range("probe.top_k", self.probe.top_k as u64, 1, MAX_TOP_K as u64)?;
        check_range(
            "probe.max_in_flight",
            self.probe.max_in_flight as u64,
            1,
            MAX_IN_FLIGHT as u64,
        )?;
        let seed = &self.probe.key_prefix_seed;
        if seed.is_empty()
            || seed.len() > MAX_KEY_PREFIX_SEED_LEN
            || !seed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(invalid(
                "probe.key_prefix_seed",
                format!("must be 1-{MAX_KEY_PREFIX_SEED_LEN} ASCII alphanumeric characters"),
            ));
        }

        check_range(
            "scenario.settle_secs",
            self.scenario.settle_secs,
            0,
            MAX_SETTLE_SECS,
        )?;

        let mut seen = std::collections::HashSet::new();
        for (role, names) in self.instances.iter() {
            for name in names {
                if name.trim().is_empty() {
                    return Err(invalid(
                        &format!("instances.{}", role.as_str().replace('-', "_")),
                        "instance names must not be empty".to_owned(),
                    ));
                }
                if !seen.insert(name.as_str()) {
                    return Err(invalid(
                        &format!("instances.{}", role.as_str().replace('-', "_")),
                        format!("instance '{name}' is listed more than once"),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Docker 소켓 경로 (빈 문자열이면 플랫폼 기본값)
    pub docker_socket: String,
    /// 정지 요청 시 SIGKILL 전 대기 시간 (초)
    pub stop_grace_secs: u64,
    /// 런타임 API 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            stop_grace_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// 역할별 인스턴스(컨테이너) 이름
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    pub proxy: Vec<String>,
    pub coordinator: Vec<String>,
    pub query_worker: Vec<String>,
    pub data_worker: Vec<String>,
    pub index_worker: Vec<String>,
    pub metadata_store: Vec<String>,
    pub object_store: Vec<String>,
    pub message_broker: Vec<String>,
}

impl Default for InstancesConfig {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| (*s).to_owned()).collect();
        Self {
            proxy: names(&["milvus-proxy"]),
            coordinator: names(&[
                "milvus-rootcoord",
                "milvus-datacoord",
                "milvus-querycoord",
                "milvus-indexcoord",
            ]),
            query_worker: names(&["milvus-querynode1", "milvus-querynode2"]),
            data_worker: names(&["milvus-datanode1", "milvus-datanode2"]),
            index_worker: names(&["milvus-indexnode1", "milvus-indexnode2"]),
            metadata_store: names(&["milvus-etcd"]),
            object_store: names(&["milvus-minio"]),
            message_broker: names(&["milvus-kafka"]),
        }
    }
}

impl InstancesConfig {
    /// 역할에 해당하는 인스턴스 이름 목록을 반환합니다.
    pub fn for_role(&self, role: Role) -> &[String] {
        match role {
            Role::Proxy => &self.proxy,
            Role::Coordinator => &self.coordinator,
            Role::QueryWorker => &self.query_worker,
            Role::DataWorker => &self.data_worker,
            Role::IndexWorker => &self.index_worker,
            Role::MetadataStore => &self.metadata_store,
            Role::ObjectStore => &self.object_store,
            Role::MessageBroker => &self.message_broker,
        }
    }

    /// (역할, 이름 목록) 쌍을 역할 선언 순서대로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &[String])> {
        Role::ALL.into_iter().map(|role| (role, self.for_role(role)))
    }

    /// 모든 (이름, 역할) 쌍을 반환합니다.
    pub fn all(&self) -> Vec<(String, Role)> {
        self.iter()
            .flat_map(|(role, names)| names.iter().map(move |n| (n.clone(), role)))
            .collect()
    }
}

/// 타임아웃 설정 (초)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// stop 검증 타임아웃
    pub stop_secs: u64,
    /// start 검증 타임아웃 (헬스 안정화 포함)
    pub start_secs: u64,
    /// wait_healthy 타임아웃
    pub wait_healthy_secs: u64,
    /// 프로브 가드 기한
    pub probe_deadline_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            stop_secs: 30,
            start_secs: 60,
            wait_healthy_secs: 120,
            probe_deadline_secs: 60,
        }
    }
}

impl TimeoutsConfig {
    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn wait_healthy(&self) -> Duration {
        Duration::from_secs(self.wait_healthy_secs)
    }

    pub fn probe_deadline(&self) -> Duration {
        Duration::from_secs(self.probe_deadline_secs)
    }
}

/// 헬스 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 상태 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 안정화로 인정하는 연속 정상 관측 횟수 (N)
    pub stability_threshold: u32,
    /// 헬스 체크가 없는 인스턴스를 정상으로 간주할지 여부
    pub unknown_health_is_healthy: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            stability_threshold: 2,
            unknown_health_is_healthy: true,
        }
    }
}

impl HealthConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 데이터 플레인 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPlaneConfig {
    /// REST 엔드포인트
    pub uri: String,
    /// 데이터베이스 이름
    pub database: String,
    /// 프로브 컬렉션 이름
    pub collection: String,
    /// 인증 토큰 (빈 문자열이면 인증 없음)
    pub token: String,
    /// 클라이언트 측 요청 타임아웃 (초), 가드 기한과 별개
    pub client_timeout_secs: u64,
    /// 벡터 차원
    pub vector_dim: usize,
}

impl Default for DataPlaneConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:19530".to_owned(),
            database: "default".to_owned(),
            collection: "failstorm_probe".to_owned(),
            token: String::new(),
            client_timeout_secs: 30,
            vector_dim: 2048,
        }
    }
}

impl DataPlaneConfig {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

/// 프로브 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// insert 프로브당 레코드 수
    pub record_count: usize,
    /// search 프로브 top_k
    pub top_k: usize,
    /// 키 접두어 네임스페이스 (실행마다 고유 nonce가 뒤에 붙음)
    pub key_prefix_seed: String,
    /// 동시에 진행 중일 수 있는 프로브 최대 수 (가드 풀 크기)
    pub max_in_flight: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            record_count: 10,
            top_k: 10,
            key_prefix_seed: "fs".to_owned(),
            max_in_flight: 4,
        }
    }
}

/// 시나리오 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// 생명주기 변경 후 프로브 전 대기 시간 (초)
    pub settle_secs: u64,
    /// 두 노드 모두 정지 단계의 기대 결과 (복제 배치에 따라 조정)
    pub both_down_expectation: Expectation,
    /// 실패 스텝에 첨부할 로그 줄 수
    pub log_tail: usize,
    /// 로그 필터 키워드 (대소문자 무시, 하나라도 포함되면 선택)
    pub log_keywords: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            settle_secs: 5,
            both_down_expectation: Expectation::MustFail,
            log_tail: 50,
            log_keywords: vec![
                "error".to_owned(),
                "panic".to_owned(),
                "fail".to_owned(),
            ],
        }
    }
}

impl ScenarioConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

// --- 검증 헬퍼 ---

fn invalid(field: &str, reason: String) -> FailstormError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), FailstormError> {
    if value < min || value > max {
        return Err(invalid(field, format!("must be {min}-{max}")));
    }
    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_expectation(target: &mut Expectation, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<Expectation>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse expectation from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
