//! 결과 집계 -- 완료된 실행의 요약과 보고서 파일
//!
//! [`RunSummary::from_run`]은 [`ScenarioRun`]만으로 계산되는 순수 함수이며
//! 별도 상태를 갖지 않습니다. 여러 시나리오를 연달아 실행한 결과는
//! [`SuiteReport`]로 묶이며, 전체 판정은 가장 나쁜 개별 판정입니다.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use failstorm_core::types::Expectation;

use crate::error::ScenarioError;
use crate::run::{DegradedTally, ScenarioRun, StepStatus, Verdict};

/// 단계별 요약 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub position: usize,
    pub phase: String,
    pub mandatory: bool,
    pub expectation: Expectation,
    pub probe: String,
    pub outcome: String,
    pub status: StepStatus,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: String,
}

/// 상태별 스텝 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub passed: usize,
    pub failed: usize,
    pub characterized: usize,
    pub aborted: usize,
}

impl StepCounts {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.characterized + self.aborted
    }
}

/// 실행 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario: String,
    pub key_prefix: String,
    pub verdict: Verdict,
    pub counts: StepCounts,
    /// 실제로 시도된 프로브 수 (중단 스텝 제외)
    pub probes_attempted: usize,
    /// degraded-ok 스텝의 프로브 완료 집계
    pub degraded: DegradedTally,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_percent: Option<u8>,
    pub phases: Vec<PhaseSummary>,
    /// 중단으로 실행되지 않은 단계
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<String>,
    /// RFC 3339
    pub started_at: String,
    /// RFC 3339
    pub ended_at: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunSummary {
    /// 완료된 실행으로부터 요약을 계산합니다.
    pub fn from_run(run: &ScenarioRun) -> Self {
        let mut counts = StepCounts::default();
        for step in run.steps() {
            match step.status {
                StepStatus::Passed => counts.passed += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Characterized => counts.characterized += 1,
                StepStatus::Aborted => counts.aborted += 1,
            }
        }

        let phases = run
            .steps()
            .iter()
            .map(|step| PhaseSummary {
                position: step.position,
                phase: step.phase.clone(),
                mandatory: step.mandatory,
                expectation: step.expectation,
                probe: step.probe.clone(),
                outcome: step.outcome.clone(),
                status: step.status,
                latency_ms: step.latency_ms,
                error: step.error.clone(),
                detail: step.detail.clone(),
            })
            .collect();

        let not_run = run
            .planned_phases()
            .iter()
            .filter(|name| !run.steps().iter().any(|s| &s.phase == *name))
            .cloned()
            .collect();

        let duration_ms = (run.ended_at() - run.started_at())
            .num_milliseconds()
            .max(0)
            .unsigned_abs();

        Self {
            scenario: run.scenario().to_owned(),
            key_prefix: run.key_prefix().to_string(),
            verdict: run.verdict(),
            counts,
            probes_attempted: run.probes_attempted(),
            degraded: run.degraded(),
            min_success_percent: run.min_success_percent(),
            phases,
            not_run,
            started_at: run.started_at().to_rfc3339(),
            ended_at: run.ended_at().to_rfc3339(),
            duration_ms,
            abort_reason: run.abort_reason().map(str::to_owned),
        }
    }
}

/// 파일로 저장하는 보고서 (요약 + 전체 스텝)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub run: ScenarioRun,
}

impl RunReport {
    pub fn new(run: &ScenarioRun) -> Self {
        Self {
            summary: RunSummary::from_run(run),
            run: run.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        serde_json::to_string_pretty(self).map_err(|e| ScenarioError::Serialize(e.to_string()))
    }
}

/// 여러 시나리오 실행을 묶은 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// 개별 판정 중 가장 나쁜 것
    pub verdict: Verdict,
    pub runs: Vec<RunReport>,
}

impl SuiteReport {
    pub fn new(runs: &[ScenarioRun]) -> Self {
        Self {
            verdict: Verdict::worst(runs.iter().map(ScenarioRun::verdict)),
            runs: runs.iter().map(RunReport::new).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        serde_json::to_string_pretty(self).map_err(|e| ScenarioError::Serialize(e.to_string()))
    }
}

/// 보고서를 JSON 파일로 저장합니다.
pub async fn write_report(path: impl AsRef<Path>, run: &ScenarioRun) -> Result<(), ScenarioError> {
    write_json(path.as_ref(), RunReport::new(run).to_json()?).await
}

/// 묶음 보고서를 JSON 파일로 저장합니다.
pub async fn write_suite_report(
    path: impl AsRef<Path>,
    suite: &SuiteReport,
) -> Result<(), ScenarioError> {
    write_json(path.as_ref(), suite.to_json()?).await
}

async fn write_json(path: &Path, json: String) -> Result<(), ScenarioError> {
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), "report written");
    Ok(())
}
