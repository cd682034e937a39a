//! 시나리오 정의 -- 단계, 생명주기 변경, 프로브, 기본 제공 시나리오
//!
//! [`ScenarioDefinition`]은 이름이 붙은 [`PhaseSpec`]의 순서 있는 목록입니다.
//! 각 단계는 생명주기 변경 → 프로브 → 기대 결과 분류 순서로 실행됩니다.
//!
//! 정의 안의 인스턴스 이름 `node-a`, `node-b`는 자리표시자이며
//! [`ScenarioDefinition::resolve`]에서 설정된 첫 두 쿼리 워커로 치환됩니다.
//! `@query-worker`처럼 `@`로 시작하는 이름은 해당 역할의 인스턴스 전체로
//! 펼쳐집니다.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use failstorm_core::config::InstancesConfig;
use failstorm_core::types::{Expectation, Role};

use crate::error::ScenarioError;

/// 시나리오 파일 최대 크기 (1 MB)
const MAX_SCENARIO_FILE_SIZE: u64 = 1024 * 1024;

/// 시나리오당 최대 단계 수
const MAX_PHASES: usize = 64;

/// 단계 이름 최대 길이 (레코드 ID 길이 제한 내에 들어가야 함)
const MAX_PHASE_NAME_LEN: usize = 48;

/// 첫 번째 쿼리 워커 자리표시자
pub const NODE_A: &str = "node-a";
/// 두 번째 쿼리 워커 자리표시자
pub const NODE_B: &str = "node-b";

/// 역할 그룹 자리표시자 접두어 (`@query-worker` 등)
pub const ROLE_GROUP_PREFIX: char = '@';

/// 기본 제공 시나리오 이름
pub const BUILTIN_SCENARIOS: [&str; 4] = ["bidirectional", "failover", "cascading", "chaos"];

/// `chaos` 시나리오의 무작위 재시작 라운드 수
const CHAOS_ROUNDS: usize = 5;

/// `chaos` 시나리오의 degraded-ok 프로브 최소 성공률 (%)
pub const CHAOS_MIN_SUCCESS_PERCENT: u8 = 80;

/// `chaos` 시나리오가 재시작 대상으로 삼는 워커 그룹
const WORKER_GROUPS: [&str; 3] = ["@query-worker", "@data-worker", "@index-worker"];

/// 단계 진입 시 수행하는 생명주기 변경
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum LifecycleMutation {
    /// 정지 후 `stopped` 검증
    Stop { instances: Vec<String> },
    /// 시작 후 안정적 정상 상태 검증
    Start { instances: Vec<String> },
    /// 정지 후 시작
    Restart { instances: Vec<String> },
    /// 후보 중 하나를 실행 키 접두어로 시드한 난수로 골라 재시작
    RestartRandom { instances: Vec<String> },
    /// 모든 인스턴스가 안정적으로 정상이 될 때까지 대기
    WaitHealthy { instances: Vec<String> },
}

impl LifecycleMutation {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Stop { .. } => "stop",
            Self::Start { .. } => "start",
            Self::Restart { .. } => "restart",
            Self::RestartRandom { .. } => "restart-random",
            Self::WaitHealthy { .. } => "wait-healthy",
        }
    }

    pub fn instances(&self) -> &[String] {
        match self {
            Self::Stop { instances }
            | Self::Start { instances }
            | Self::Restart { instances }
            | Self::RestartRandom { instances }
            | Self::WaitHealthy { instances } => instances,
        }
    }

    fn instances_mut(&mut self) -> &mut Vec<String> {
        match self {
            Self::Stop { instances }
            | Self::Start { instances }
            | Self::Restart { instances }
            | Self::RestartRandom { instances }
            | Self::WaitHealthy { instances } => instances,
        }
    }
}

impl fmt::Display for LifecycleMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action(), self.instances().join(","))
    }
}

/// 생명주기 변경 후 실행하는 데이터 플레인 프로브
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProbeSpec {
    /// 단계 키로 결정적 레코드를 적재 (None이면 설정값 사용)
    Insert {
        #[serde(default)]
        records: Option<usize>,
    },
    /// 이번 실행의 레코드 범위에서 top-k 검색 (None이면 설정값 사용)
    Search {
        #[serde(default)]
        top_k: Option<usize>,
    },
    /// 이전 단계들이 적재한 레코드가 모두 조회되는지 확인 (빈 목록이면 전체)
    Verify {
        #[serde(default)]
        phases: Vec<String>,
    },
}

impl ProbeSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Search { .. } => "search",
            Self::Verify { .. } => "verify",
        }
    }
}

/// 시나리오 단계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// 단계 이름 (`[a-z0-9_]`, 레코드 ID에 포함됨)
    pub name: String,
    /// 설명
    #[serde(default)]
    pub description: String,
    /// 필수 단계 여부 (실패 시 판정 fail)
    #[serde(default)]
    pub mandatory: bool,
    /// 순서대로 수행할 생명주기 변경
    #[serde(default)]
    pub mutations: Vec<LifecycleMutation>,
    /// 프로브
    pub probe: ProbeSpec,
    /// 기대 결과
    pub expectation: Expectation,
}

impl PhaseSpec {
    fn new(name: &str, description: &str, probe: ProbeSpec, expectation: Expectation) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            mandatory: false,
            mutations: Vec::new(),
            probe,
            expectation,
        }
    }

    fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    fn mutate(mut self, mutation: LifecycleMutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// 이 단계의 생명주기 변경이 건드리는 인스턴스 (중복 제거, 순서 유지)
    pub fn touched_instances(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.mutations
            .iter()
            .flat_map(|m| m.instances().iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }
}

/// 시나리오 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// 시나리오 이름
    pub name: String,
    /// 설명
    #[serde(default)]
    pub description: String,
    /// degraded-ok 단계 프로브의 최소 완료율 (%). 미달이면 판정 partial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_percent: Option<u8>,
    /// 순서 있는 단계 목록
    pub phases: Vec<PhaseSpec>,
}

impl ScenarioDefinition {
    /// 정의의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            scenario: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("scenario name cannot be empty".to_owned()));
        }
        if self.phases.is_empty() {
            return Err(invalid("scenario has no phases".to_owned()));
        }
        if self.phases.len() > MAX_PHASES {
            return Err(invalid(format!(
                "too many phases: {} (max: {MAX_PHASES})",
                self.phases.len()
            )));
        }
        if !self.phases.iter().any(|p| p.mandatory) {
            return Err(invalid("at least one phase must be mandatory".to_owned()));
        }
        if let Some(percent) = self.min_success_percent.filter(|p| *p > 100) {
            return Err(invalid(format!(
                "min_success_percent must be 0-100, got {percent}"
            )));
        }

        let mut earlier_inserts: HashSet<&str> = HashSet::new();
        let mut names: HashSet<&str> = HashSet::new();
        for phase in &self.phases {
            let name = phase.name.as_str();
            if name.is_empty()
                || name.len() > MAX_PHASE_NAME_LEN
                || !name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(invalid(format!(
                    "phase name '{name}' must be 1-{MAX_PHASE_NAME_LEN} characters of [a-z0-9_]"
                )));
            }
            if !names.insert(name) {
                return Err(invalid(format!("duplicate phase '{name}'")));
            }

            for mutation in &phase.mutations {
                if mutation.instances().is_empty() {
                    return Err(invalid(format!(
                        "phase '{name}': {} without instances",
                        mutation.action()
                    )));
                }
            }

            match &phase.probe {
                ProbeSpec::Insert { records: Some(0) } => {
                    return Err(invalid(format!("phase '{name}': insert of 0 records")));
                }
                ProbeSpec::Search { top_k: Some(0) } => {
                    return Err(invalid(format!("phase '{name}': search with top_k 0")));
                }
                ProbeSpec::Verify { phases } => {
                    if earlier_inserts.is_empty() {
                        return Err(invalid(format!(
                            "phase '{name}': verify requires an earlier insert phase"
                        )));
                    }
                    if let Some(unknown) =
                        phases.iter().find(|p| !earlier_inserts.contains(p.as_str()))
                    {
                        return Err(invalid(format!(
                            "phase '{name}': verify references '{unknown}', which is not an earlier insert phase"
                        )));
                    }
                }
                ProbeSpec::Insert { .. } | ProbeSpec::Search { .. } => {}
            }
            if matches!(phase.probe, ProbeSpec::Insert { .. }) {
                earlier_inserts.insert(name);
            }
        }
        Ok(())
    }

    /// 자리표시자를 실제 인스턴스 이름으로 치환한 정의를 반환합니다.
    ///
    /// `node-a`/`node-b`는 설정된 첫 번째/두 번째 쿼리 워커가 되고,
    /// `@<role>`은 그 역할의 인스턴스 전체로 펼쳐집니다 (중복 제거, 순서 유지).
    /// 펼친 결과가 비어 있는 생명주기 변경은 에러입니다.
    pub fn resolve(&self, instances: &InstancesConfig) -> Result<Self, ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            scenario: self.name.clone(),
            reason,
        };
        let mut resolved = self.clone();
        for phase in &mut resolved.phases {
            for mutation in &mut phase.mutations {
                let mut seen = HashSet::new();
                let mut targets = Vec::new();
                for name in mutation.instances() {
                    let expanded = self.expand(name, instances)?;
                    for target in expanded {
                        if seen.insert(target.clone()) {
                            targets.push(target);
                        }
                    }
                }
                if targets.is_empty() {
                    return Err(invalid(format!(
                        "phase '{}': {} resolves to no instances",
                        phase.name,
                        mutation.action()
                    )));
                }
                *mutation.instances_mut() = targets;
            }
        }
        Ok(resolved)
    }

    /// 인스턴스 이름 하나를 실제 이름 목록으로 펼칩니다.
    fn expand(&self, name: &str, instances: &InstancesConfig) -> Result<Vec<String>, ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            scenario: self.name.clone(),
            reason,
        };

        if let Some(group) = name.strip_prefix(ROLE_GROUP_PREFIX) {
            let role = Role::ALL
                .into_iter()
                .find(|r| r.as_str() == group)
                .ok_or_else(|| invalid(format!("unknown role group '{name}'")))?;
            return Ok(instances.for_role(role).to_vec());
        }

        let index = match name {
            NODE_A => 0,
            NODE_B => 1,
            _ => return Ok(vec![name.to_owned()]),
        };
        let workers = instances.for_role(Role::QueryWorker);
        let target = workers.get(index).ok_or_else(|| {
            invalid(format!(
                "placeholder '{name}' needs at least {} query workers, {} configured",
                index + 1,
                workers.len()
            ))
        })?;
        Ok(vec![target.clone()])
    }

    /// 생명주기 변경이 참조하는 모든 인스턴스 (중복 제거)
    pub fn referenced_instances(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.phases
            .iter()
            .flat_map(|p| p.mutations.iter())
            .flat_map(|m| m.instances().iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }
}

/// 기본 제공 시나리오를 반환합니다.
///
/// `both_down`은 두 쿼리 워커가 모두 정지된 단계의 기대 결과입니다.
pub fn builtin(name: &str, both_down: Expectation) -> Option<ScenarioDefinition> {
    match name {
        "bidirectional" => Some(bidirectional(both_down)),
        "failover" => Some(failover()),
        "cascading" => Some(cascading(both_down)),
        "chaos" => Some(chaos()),
        _ => None,
    }
}

/// 이름으로 기본 제공 시나리오를 찾고, 없으면 에러를 반환합니다.
pub fn find_builtin(name: &str, both_down: Expectation) -> Result<ScenarioDefinition, ScenarioError> {
    builtin(name, both_down).ok_or_else(|| ScenarioError::UnknownScenario(name.to_owned()))
}

fn pair() -> Vec<String> {
    vec![NODE_A.to_owned(), NODE_B.to_owned()]
}

fn one(name: &str) -> Vec<String> {
    vec![name.to_owned()]
}

fn worker_groups() -> Vec<String> {
    WORKER_GROUPS.iter().map(|g| (*g).to_owned()).collect()
}

fn search() -> ProbeSpec {
    ProbeSpec::Search { top_k: None }
}

fn insert() -> ProbeSpec {
    ProbeSpec::Insert { records: None }
}

fn bidirectional(both_down: Expectation) -> ScenarioDefinition {
    use Expectation::MustSucceed;
    use LifecycleMutation::{Start, Stop, WaitHealthy};

    ScenarioDefinition {
        name: "bidirectional".to_owned(),
        description: "Two-node failover in both directions, total outage, full recovery".to_owned(),
        phases: vec![
            PhaseSpec::new("setup", "Both nodes healthy, seed records", insert(), MustSucceed)
                .mandatory()
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new("node_a_down", "Search with node A stopped", search(), MustSucceed)
                .mutate(Stop { instances: one(NODE_A) }),
            PhaseSpec::new(
                "node_a_recovered_node_b_down",
                "Node A back, node B stopped",
                search(),
                MustSucceed,
            )
            .mutate(Start { instances: one(NODE_A) })
            .mutate(Stop { instances: one(NODE_B) }),
            PhaseSpec::new("both_down", "Search with both nodes stopped", search(), both_down)
                .mutate(Stop { instances: one(NODE_A) }),
            PhaseSpec::new("full_recovery", "Both nodes restarted and healthy", search(), MustSucceed)
                .mandatory()
                .mutate(Start { instances: pair() })
                .mutate(WaitHealthy { instances: pair() }),
        ],
        min_success_percent: None,
    }
}

fn failover() -> ScenarioDefinition {
    use Expectation::{DegradedOk, MustSucceed};
    use LifecycleMutation::{Start, Stop, WaitHealthy};

    ScenarioDefinition {
        name: "failover".to_owned(),
        description: "Per-node failover and recovery, writes during outage, durability check"
            .to_owned(),
        phases: vec![
            PhaseSpec::new("setup", "Both nodes healthy, seed records", insert(), MustSucceed)
                .mandatory()
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new("node_a_failover", "Search served by node B", search(), MustSucceed)
                .mutate(Stop { instances: one(NODE_A) }),
            PhaseSpec::new("node_a_recovery", "Node A rejoins", search(), MustSucceed)
                .mutate(Start { instances: one(NODE_A) })
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new("node_b_failover", "Search served by node A", search(), MustSucceed)
                .mutate(Stop { instances: one(NODE_B) }),
            PhaseSpec::new("node_b_recovery", "Node B rejoins", search(), MustSucceed)
                .mutate(Start { instances: one(NODE_B) })
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new("outage_writes", "Inserts while both nodes are down", insert(), DegradedOk)
                .mutate(Stop { instances: pair() }),
            PhaseSpec::new("full_recovery", "Both nodes restarted and healthy", search(), MustSucceed)
                .mandatory()
                .mutate(Start { instances: pair() })
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new(
                "verify_writes",
                "Every acknowledged record is still readable",
                ProbeSpec::Verify { phases: Vec::new() },
                MustSucceed,
            ),
        ],
        min_success_percent: None,
    }
}

fn cascading(both_down: Expectation) -> ScenarioDefinition {
    use Expectation::MustSucceed;
    use LifecycleMutation::{Restart, Start, Stop, WaitHealthy};

    ScenarioDefinition {
        name: "cascading".to_owned(),
        description: "Node A fails, then node B, then staged recovery".to_owned(),
        phases: vec![
            PhaseSpec::new("setup", "Both nodes healthy, seed records", insert(), MustSucceed)
                .mandatory()
                .mutate(WaitHealthy { instances: pair() }),
            PhaseSpec::new("first_failure", "Node A stopped", search(), MustSucceed)
                .mutate(Stop { instances: one(NODE_A) }),
            PhaseSpec::new("cascade", "Node B also stopped, writes attempted", insert(), both_down)
                .mutate(Stop { instances: one(NODE_B) }),
            PhaseSpec::new("partial_recovery", "Node A back alone", search(), MustSucceed)
                .mutate(Start { instances: one(NODE_A) }),
            PhaseSpec::new(
                "full_recovery",
                "Node B back, node A restarted",
                search(),
                MustSucceed,
            )
            .mandatory()
            .mutate(Start { instances: one(NODE_B) })
            .mutate(Restart { instances: one(NODE_A) })
            .mutate(WaitHealthy { instances: pair() }),
        ],
        min_success_percent: None,
    }
}

fn chaos() -> ScenarioDefinition {
    use Expectation::{DegradedOk, MustSucceed};
    use LifecycleMutation::{RestartRandom, WaitHealthy};

    let mut phases = vec![
        PhaseSpec::new("setup", "All workers healthy, seed records", insert(), MustSucceed)
            .mandatory()
            .mutate(WaitHealthy { instances: worker_groups() }),
    ];
    for round in 1..=CHAOS_ROUNDS {
        let probe = if round % 2 == 1 { insert() } else { search() };
        phases.push(
            PhaseSpec::new(
                &format!("chaos_round_{round}"),
                "Restart one randomly drawn worker, then probe",
                probe,
                DegradedOk,
            )
            .mutate(RestartRandom { instances: worker_groups() }),
        );
    }
    phases.push(
        PhaseSpec::new("full_recovery", "All workers healthy again", search(), MustSucceed)
            .mandatory()
            .mutate(WaitHealthy { instances: worker_groups() }),
    );
    phases.push(PhaseSpec::new(
        "verify_writes",
        "Every acknowledged record is still readable",
        ProbeSpec::Verify { phases: Vec::new() },
        MustSucceed,
    ));

    ScenarioDefinition {
        name: "chaos".to_owned(),
        description: "Random worker restarts under load, judged by probe success rate".to_owned(),
        phases,
        min_success_percent: Some(CHAOS_MIN_SUCCESS_PERCENT),
    }
}

/// TOML 파일에서 시나리오를 로드하고 검증합니다.
pub fn load_scenario_from_file(path: &Path) -> Result<ScenarioDefinition, ScenarioError> {
    let load_err = |reason: String| ScenarioError::Load {
        path: path.display().to_string(),
        reason,
    };

    let metadata =
        std::fs::metadata(path).map_err(|e| load_err(format!("failed to read metadata: {e}")))?;
    if metadata.len() > MAX_SCENARIO_FILE_SIZE {
        return Err(load_err(format!(
            "file too large: {} bytes (max: {MAX_SCENARIO_FILE_SIZE})",
            metadata.len()
        )));
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| load_err(format!("failed to read file: {e}")))?;
    let scenario = parse_scenario(&content).map_err(|e| match e {
        ScenarioError::Load { reason, .. } => load_err(reason),
        other => other,
    })?;
    Ok(scenario)
}

/// TOML 문자열에서 시나리오를 파싱하고 검증합니다.
pub fn parse_scenario(content: &str) -> Result<ScenarioDefinition, ScenarioError> {
    let scenario: ScenarioDefinition = toml::from_str(content).map_err(|e| ScenarioError::Load {
        path: "(inline)".to_owned(),
        reason: format!("failed to parse TOML: {e}"),
    })?;
    scenario.validate()?;
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(names: &[&str]) -> InstancesConfig {
        let mut config = InstancesConfig::default();
        config.query_worker = names.iter().map(|n| (*n).to_owned()).collect();
        config
    }

    #[test]
    fn builtins_are_valid() {
        for name in BUILTIN_SCENARIOS {
            let scenario = builtin(name, Expectation::MustFail).unwrap();
            scenario.validate().unwrap();
            assert_eq!(scenario.name, name);
        }
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        assert!(matches!(
            find_builtin("chaos-monkey", Expectation::MustFail),
            Err(ScenarioError::UnknownScenario(_))
        ));
    }

    #[test]
    fn bidirectional_follows_two_node_state_machine() {
        let scenario = builtin("bidirectional", Expectation::MustFail).unwrap();
        let names: Vec<_> = scenario.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "setup",
                "node_a_down",
                "node_a_recovered_node_b_down",
                "both_down",
                "full_recovery"
            ]
        );
        let mandatory: Vec<_> = scenario
            .phases
            .iter()
            .filter(|p| p.mandatory)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(mandatory, vec!["setup", "full_recovery"]);
        assert_eq!(scenario.phases[3].expectation, Expectation::MustFail);
    }

    #[test]
    fn both_down_expectation_is_configurable() {
        let scenario = builtin("bidirectional", Expectation::DegradedOk).unwrap();
        let both_down = scenario.phases.iter().find(|p| p.name == "both_down").unwrap();
        assert_eq!(both_down.expectation, Expectation::DegradedOk);
    }

    #[test]
    fn resolve_maps_placeholders_to_query_workers() {
        let scenario = builtin("bidirectional", Expectation::MustFail).unwrap();
        let resolved = scenario.resolve(&workers(&["qn-1", "qn-2"])).unwrap();
        assert_eq!(resolved.referenced_instances(), vec!["qn-1", "qn-2"]);
        assert_eq!(
            resolved.phases[1].mutations[0],
            LifecycleMutation::Stop {
                instances: vec!["qn-1".to_owned()]
            }
        );
    }

    #[test]
    fn resolve_requires_two_query_workers() {
        let scenario = builtin("failover", Expectation::MustFail).unwrap();
        let err = scenario.resolve(&workers(&["qn-1"])).unwrap_err();
        assert!(err.to_string().contains("node-b"));
    }

    #[test]
    fn resolve_keeps_literal_names() {
        let toml = r#"
name = "literal"
[[phases]]
name = "setup"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "restart", instances = ["milvus-datanode1"] }]
"#;
        let scenario = parse_scenario(toml).unwrap();
        let resolved = scenario.resolve(&workers(&[])).unwrap();
        assert_eq!(resolved.referenced_instances(), vec!["milvus-datanode1"]);
    }

    #[test]
    fn parse_full_toml_scenario() {
        let toml = r#"
name = "custom"
description = "stop one node and verify writes"

[[phases]]
name = "seed"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert", records = 5 }
mutations = [{ action = "wait-healthy", instances = ["node-a", "node-b"] }]

[[phases]]
name = "degraded"
expectation = "degraded-ok"
probe = { kind = "search", top_k = 3 }
mutations = [{ action = "stop", instances = ["node-a"] }]

[[phases]]
name = "check"
mandatory = true
expectation = "must-succeed"
probe = { kind = "verify", phases = ["seed"] }
mutations = [{ action = "start", instances = ["node-a"] }]
"#;
        let scenario = parse_scenario(toml).unwrap();
        assert_eq!(scenario.phases.len(), 3);
        assert_eq!(scenario.phases[0].probe, ProbeSpec::Insert { records: Some(5) });
        assert_eq!(scenario.phases[1].probe, ProbeSpec::Search { top_k: Some(3) });
        assert!(!scenario.phases[1].mandatory);
        assert_eq!(scenario.phases[2].touched_instances(), vec!["node-a"]);
    }

    #[test]
    fn validate_rejects_duplicate_phase_names() {
        let mut scenario = builtin("bidirectional", Expectation::MustFail).unwrap();
        scenario.phases[2].name = "node_a_down".to_owned();
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate phase"));
    }

    #[test]
    fn validate_rejects_bad_phase_name() {
        let mut scenario = builtin("bidirectional", Expectation::MustFail).unwrap();
        scenario.phases[0].name = "Setup Phase".to_owned();
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn validate_requires_a_mandatory_phase() {
        let mut scenario = builtin("cascading", Expectation::MustFail).unwrap();
        for phase in &mut scenario.phases {
            phase.mandatory = false;
        }
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("mandatory"));
    }

    #[test]
    fn validate_rejects_verify_before_insert() {
        let toml = r#"
name = "bad"
[[phases]]
name = "check"
mandatory = true
expectation = "must-succeed"
probe = { kind = "verify" }
"#;
        assert!(matches!(
            parse_scenario(toml),
            Err(ScenarioError::Invalid { .. })
        ));
    }

    #[test]
    fn validate_rejects_verify_of_search_phase() {
        let toml = r#"
name = "bad"
[[phases]]
name = "seed"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }

[[phases]]
name = "look"
expectation = "must-succeed"
probe = { kind = "search" }

[[phases]]
name = "check"
expectation = "must-succeed"
probe = { kind = "verify", phases = ["look"] }
"#;
        let err = parse_scenario(toml).unwrap_err();
        assert!(err.to_string().contains("'look'"));
    }

    #[test]
    fn validate_rejects_empty_mutation_target() {
        let toml = r#"
name = "bad"
[[phases]]
name = "seed"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "stop", instances = [] }]
"#;
        assert!(parse_scenario(toml).is_err());
    }

    #[test]
    fn parse_rejects_unknown_action() {
        let toml = r#"
name = "bad"
[[phases]]
name = "seed"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "pause", instances = ["node-a"] }]
"#;
        assert!(matches!(
            parse_scenario(toml),
            Err(ScenarioError::Load { .. })
        ));
    }

    #[test]
    fn load_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "name = ").unwrap();
        let err = load_scenario_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn load_from_file_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.toml");
        let scenario = builtin("failover", Expectation::MustFail).unwrap();
        std::fs::write(&path, toml::to_string(&scenario).unwrap()).unwrap();

        let loaded = load_scenario_from_file(&path).unwrap();
        assert_eq!(loaded, scenario);
    }

    #[test]
    fn load_from_missing_file_fails() {
        let err = load_scenario_from_file(Path::new("/nonexistent/scenario.toml")).unwrap_err();
        assert!(matches!(err, ScenarioError::Load { .. }));
    }

    #[test]
    fn chaos_restarts_draw_from_every_worker_group() {
        let scenario = builtin("chaos", Expectation::MustFail).unwrap();
        assert_eq!(scenario.min_success_percent, Some(CHAOS_MIN_SUCCESS_PERCENT));
        let rounds: Vec<_> = scenario
            .phases
            .iter()
            .filter(|p| p.name.starts_with("chaos_round_"))
            .collect();
        assert_eq!(rounds.len(), CHAOS_ROUNDS);
        assert!(rounds.iter().all(|p| p.expectation == Expectation::DegradedOk));

        let resolved = scenario.resolve(&InstancesConfig::default()).unwrap();
        let round = resolved.phases.iter().find(|p| p.name == "chaos_round_1").unwrap();
        assert_eq!(
            round.mutations[0],
            LifecycleMutation::RestartRandom {
                instances: vec![
                    "milvus-querynode1".to_owned(),
                    "milvus-querynode2".to_owned(),
                    "milvus-datanode1".to_owned(),
                    "milvus-datanode2".to_owned(),
                    "milvus-indexnode1".to_owned(),
                    "milvus-indexnode2".to_owned(),
                ]
            }
        );
    }

    #[test]
    fn resolve_skips_empty_role_groups() {
        let mut config = workers(&["qn-1", "qn-2"]);
        config.data_worker.clear();
        config.index_worker.clear();

        let scenario = builtin("chaos", Expectation::MustFail).unwrap();
        let resolved = scenario.resolve(&config).unwrap();
        assert_eq!(resolved.referenced_instances(), vec!["qn-1", "qn-2"]);
    }

    #[test]
    fn resolve_deduplicates_overlapping_names() {
        let toml = r#"
name = "overlap"
[[phases]]
name = "setup"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "wait-healthy", instances = ["node-a", "@query-worker"] }]
"#;
        let scenario = parse_scenario(toml).unwrap();
        let resolved = scenario.resolve(&workers(&["qn-1", "qn-2"])).unwrap();
        assert_eq!(resolved.phases[0].mutations[0].instances(), ["qn-1", "qn-2"]);
    }

    #[test]
    fn resolve_rejects_group_without_instances() {
        let toml = r#"
name = "empty_group"
[[phases]]
name = "setup"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "restart-random", instances = ["@index-worker"] }]
"#;
        let scenario = parse_scenario(toml).unwrap();
        let mut config = workers(&["qn-1"]);
        config.index_worker.clear();
        let err = scenario.resolve(&config).unwrap_err();
        assert!(err.to_string().contains("no instances"), "got: {err}");
    }

    #[test]
    fn resolve_rejects_unknown_role_group() {
        let toml = r#"
name = "bad_group"
[[phases]]
name = "setup"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "stop", instances = ["@gpu-worker"] }]
"#;
        let scenario = parse_scenario(toml).unwrap();
        let err = scenario.resolve(&workers(&["qn-1"])).unwrap_err();
        assert!(err.to_string().contains("@gpu-worker"), "got: {err}");
    }

    #[test]
    fn validate_rejects_success_threshold_above_100() {
        let mut scenario = builtin("chaos", Expectation::MustFail).unwrap();
        scenario.min_success_percent = Some(101);
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("min_success_percent"));
    }

    #[test]
    fn chaos_scenario_survives_toml_roundtrip() {
        let scenario = builtin("chaos", Expectation::MustFail).unwrap();
        let parsed = parse_scenario(&toml::to_string(&scenario).unwrap()).unwrap();
        assert_eq!(parsed, scenario);
    }

    #[test]
    fn mutation_display_lists_instances() {
        let m = LifecycleMutation::WaitHealthy {
            instances: vec!["a".to_owned(), "b".to_owned()],
        };
        assert_eq!(m.to_string(), "wait-healthy a,b");
    }
}
