//! 시나리오 실행 기록 -- 스텝, 판정, 프로브 결과 분류
//!
//! 엔진은 실행 중에 [`RunRecorder`]에 스텝을 추가하고, 마지막에
//! [`RunRecorder::finish`]로 읽기 전용 [`ScenarioRun`]을 만듭니다.
//! 판정은 [`Verdict::compute`]가 스텝 목록과 완료율 기준만으로 계산합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use failstorm_core::error::ErrorKind;
use failstorm_core::types::Expectation;

use crate::guard::TimeoutOutcome;
use crate::key::KeyPrefix;

/// 스텝 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 기대 결과와 일치
    Passed,
    /// 기대 결과 위반
    Failed,
    /// degraded-ok: 판정 없이 지연/결과만 기록
    Characterized,
    /// 생명주기 제어 실패로 실행 중단
    Aborted,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Characterized => "characterized",
            Self::Aborted => "aborted",
        }
    }

    /// 판정 계산에서 실패로 취급되는지 여부
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 실행 전체 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Partial,
    Fail,
}

impl Verdict {
    /// 스텝 목록으로 판정을 계산합니다.
    ///
    /// - 중단되었거나 필수 스텝이 실패하면 `Fail`
    /// - 필수가 아닌 스텝만 실패하거나, degraded-ok 프로브 완료율이
    ///   `min_success_percent` 미만이면 `Partial`
    /// - 그 외 `Pass`
    pub fn compute(steps: &[ScenarioStep], aborted: bool, min_success_percent: Option<u8>) -> Self {
        if aborted || steps.iter().any(|s| s.mandatory && s.status.is_failure()) {
            Self::Fail
        } else if steps.iter().any(|s| s.status.is_failure())
            || !DegradedTally::of(steps).meets(min_success_percent)
        {
            Self::Partial
        } else {
            Self::Pass
        }
    }

    /// 여러 판정 중 가장 나쁜 것 (`Fail` > `Partial` > `Pass`, 비어 있으면 `Pass`)
    pub fn worst(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        verdicts
            .into_iter()
            .max_by_key(|v| v.severity())
            .unwrap_or(Self::Pass)
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Partial => 1,
            Self::Fail => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Partial => "partial",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// degraded-ok 스텝의 프로브 완료 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedTally {
    /// 기한 내에 에러 없이 완료된 프로브 수
    pub completed: usize,
    /// degraded-ok 스텝 수
    pub total: usize,
}

impl DegradedTally {
    pub fn of(steps: &[ScenarioStep]) -> Self {
        steps
            .iter()
            .filter(|s| s.status == StepStatus::Characterized)
            .fold(Self::default(), |mut tally, step| {
                tally.total += 1;
                if step.outcome == "completed" && step.error_kind.is_none() {
                    tally.completed += 1;
                }
                tally
            })
    }

    /// 완료율이 기준 이상인지 여부 (기준이 없거나 degraded-ok 스텝이 없으면 true)
    pub fn meets(&self, min_success_percent: Option<u8>) -> bool {
        match min_success_percent {
            Some(min) if self.total > 0 => self.completed * 100 >= usize::from(min) * self.total,
            _ => true,
        }
    }
}

/// 기록된 시나리오 스텝 (기록 후 변경 불가)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// 0부터 시작하는 순서
    pub position: usize,
    /// 단계 이름
    pub phase: String,
    pub description: String,
    /// 수행한 생명주기 변경 (예: `stop milvus-querynode1`)
    pub mutations: Vec<String>,
    /// 프로브 종류 (`insert`/`search`/`verify`, 중단 시 `none`)
    pub probe: String,
    pub expectation: Expectation,
    /// 실제 결과 (`completed`/`timed_out`/`failed`/`not_run`)
    pub outcome: String,
    pub status: StepStatus,
    /// 프로브 지연 (밀리초)
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 결과 요약 (예: `10/10 acknowledged`)
    #[serde(default)]
    pub detail: String,
    /// 삽입/검색/조회된 건수
    #[serde(default)]
    pub result_count: usize,
    /// 실패 스텝에 첨부된 인스턴스 로그
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    pub mandatory: bool,
    pub started_at: DateTime<Utc>,
}

/// 완료된 프로브가 반환한 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeValue {
    /// 삽입 결과
    Inserted {
        /// 요청한 레코드 ID
        ids: Vec<String>,
        /// 서버가 확인한 건수
        acknowledged: usize,
    },
    /// 검색 결과
    Hits {
        returned: usize,
        /// 이번 실행의 접두사가 아닌 결과 수
        foreign: usize,
    },
    /// 검증 결과
    Verified {
        expected: usize,
        missing: Vec<String>,
    },
}

impl ProbeValue {
    /// must-succeed 기준으로 유효하고 비어 있지 않은 결과인지 여부
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Inserted { ids, acknowledged } => !ids.is_empty() && *acknowledged == ids.len(),
            Self::Hits { returned, foreign } => *returned > 0 && *foreign == 0,
            Self::Verified { expected, missing } => *expected > 0 && missing.is_empty(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Inserted { acknowledged, .. } => *acknowledged,
            Self::Hits { returned, .. } => *returned,
            Self::Verified { expected, missing } => expected.saturating_sub(missing.len()),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Inserted { ids, acknowledged } => {
                format!("{acknowledged}/{} acknowledged", ids.len())
            }
            Self::Hits { returned, foreign } if *foreign > 0 => {
                format!("{returned} hits, {foreign} outside run prefix")
            }
            Self::Hits { returned, .. } => format!("{returned} hits"),
            Self::Verified { expected, missing } if missing.is_empty() => {
                format!("{expected}/{expected} records readable")
            }
            Self::Verified { expected, missing } => {
                let shown: Vec<&str> = missing.iter().take(5).map(String::as_str).collect();
                format!(
                    "{}/{expected} records readable, missing: {}",
                    expected - missing.len().min(*expected),
                    shown.join(", ")
                )
            }
        }
    }
}

/// 프로브 결과를 기대 결과에 대해 분류한 값
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: StepStatus,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub detail: String,
    pub result_count: usize,
}

/// 프로브 결과를 단계의 기대 결과로 분류합니다.
pub fn classify(
    expectation: Expectation,
    outcome: &TimeoutOutcome<ProbeValue>,
    deadline_ms: u64,
) -> Classification {
    let (error_kind, error) = match outcome {
        TimeoutOutcome::Completed(_) => (None, None),
        TimeoutOutcome::TimedOut => (
            Some(ErrorKind::ProbeTimeout),
            Some(format!("no result within {deadline_ms}ms")),
        ),
        TimeoutOutcome::Failed(e) => (Some(e.kind()), Some(e.to_string())),
    };
    let (detail, result_count) = match outcome {
        TimeoutOutcome::Completed(value) => (value.detail(), value.count()),
        _ => (String::new(), 0),
    };

    let status = match (expectation, outcome) {
        (Expectation::DegradedOk, _) => StepStatus::Characterized,
        (Expectation::MustSucceed, TimeoutOutcome::Completed(value)) if value.is_valid() => {
            StepStatus::Passed
        }
        (Expectation::MustSucceed, _) => StepStatus::Failed,
        (Expectation::MustFail, TimeoutOutcome::Completed(_)) => StepStatus::Failed,
        (Expectation::MustFail, _) => StepStatus::Passed,
    };

    let (error_kind, error) = match (expectation, outcome) {
        (Expectation::MustSucceed, TimeoutOutcome::Completed(value)) if !value.is_valid() => (
            Some(ErrorKind::ProbeError),
            Some(format!("invalid result: {}", value.detail())),
        ),
        (Expectation::MustFail, TimeoutOutcome::Completed(value)) => (
            Some(ErrorKind::UnexpectedSuccess),
            Some(format!("probe completed while fault was injected: {}", value.detail())),
        ),
        _ => (error_kind, error),
    };

    Classification {
        status,
        error_kind,
        error,
        detail,
        result_count,
    }
}

/// 실행 중인 시나리오의 기록기 (엔진만 사용)
#[derive(Debug)]
pub struct RunRecorder {
    scenario: String,
    key_prefix: KeyPrefix,
    planned_phases: Vec<String>,
    min_success_percent: Option<u8>,
    steps: Vec<ScenarioStep>,
    started_at: DateTime<Utc>,
    abort_reason: Option<String>,
}

impl RunRecorder {
    pub fn new(scenario: &str, key_prefix: KeyPrefix, planned_phases: Vec<String>) -> Self {
        Self {
            scenario: scenario.to_owned(),
            key_prefix,
            planned_phases,
            min_success_percent: None,
            steps: Vec::new(),
            started_at: Utc::now(),
            abort_reason: None,
        }
    }

    /// degraded-ok 프로브 완료율 기준을 설정합니다.
    pub fn with_min_success_percent(mut self, min_success_percent: Option<u8>) -> Self {
        self.min_success_percent = min_success_percent;
        self
    }

    /// 다음 스텝 순서
    pub fn next_position(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[ScenarioStep] {
        &self.steps
    }

    pub fn push(&mut self, step: ScenarioStep) {
        self.steps.push(step);
    }

    /// 중단 스텝을 기록하고 실행을 중단 상태로 표시합니다.
    pub fn abort(&mut self, step: ScenarioStep, reason: String) {
        self.steps.push(step);
        self.abort_reason = Some(reason);
    }

    /// 판정을 계산하고 읽기 전용 실행 결과를 만듭니다.
    pub fn finish(self) -> ScenarioRun {
        let verdict = Verdict::compute(
            &self.steps,
            self.abort_reason.is_some(),
            self.min_success_percent,
        );
        ScenarioRun {
            scenario: self.scenario,
            key_prefix: self.key_prefix,
            planned_phases: self.planned_phases,
            min_success_percent: self.min_success_percent,
            steps: self.steps,
            verdict,
            started_at: self.started_at,
            ended_at: Utc::now(),
            abort_reason: self.abort_reason,
        }
    }
}

/// 완료된 시나리오 실행 (읽기 전용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    scenario: String,
    key_prefix: KeyPrefix,
    planned_phases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_success_percent: Option<u8>,
    steps: Vec<ScenarioStep>,
    verdict: Verdict,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    abort_reason: Option<String>,
}

impl ScenarioRun {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn key_prefix(&self) -> &KeyPrefix {
        &self.key_prefix
    }

    /// 정의된 모든 단계 이름 (실행되지 않은 단계 포함)
    pub fn planned_phases(&self) -> &[String] {
        &self.planned_phases
    }

    pub fn steps(&self) -> &[ScenarioStep] {
        &self.steps
    }

    pub fn min_success_percent(&self) -> Option<u8> {
        self.min_success_percent
    }

    /// degraded-ok 스텝의 프로브 완료 집계
    pub fn degraded(&self) -> DegradedTally {
        DegradedTally::of(&self.steps)
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// 실제로 시도된 데이터 플레인 프로브 수
    pub fn probes_attempted(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Aborted)
            .count()
    }
}
