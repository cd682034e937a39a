//! 시나리오 엔진 -- 단계별 장애 주입, 프로브, 결과 기록
//!
//! [`ScenarioEngine`]은 단계를 엄격히 순서대로 실행합니다.
//!
//! 1. 생명주기 변경을 [`NodeController`]로 요청하고 검증합니다.
//!    검증에 실패하면 중단 스텝을 기록하고 실행을 끝냅니다 (판정 `fail`).
//! 2. 안정화 대기 후 데이터 플레인 프로브를 [`TimeoutGuard`]로 실행합니다.
//! 3. 결과를 단계의 기대 결과로 분류하여 스텝으로 기록합니다.
//!    개별 스텝 실패는 실행을 멈추지 않습니다.
//!
//! 인스턴스 레지스트리는 제어기만 갱신하며 엔진은 읽기만 합니다.
//! `restart-random` 대상은 실행 키 접두어로 시드한 난수로 고르며, 스텝에는
//! 실제로 재시작한 인스턴스가 기록됩니다.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::rngs::StdRng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use failstorm_core::config::FailstormConfig;
use failstorm_core::error::ErrorKind;
use failstorm_core::metrics as m;
use failstorm_node_control::{NodeControlError, NodeController, RuntimeClient};

use crate::dataplane::{DataPlaneClient, Record, SearchRequest, deterministic_vector};
use crate::definition::{LifecycleMutation, PhaseSpec, ProbeSpec, ScenarioDefinition};
use crate::error::{DataPlaneError, ScenarioError};
use crate::guard::{TimeoutGuard, TimeoutOutcome};
use crate::key::KeyPrefix;
use crate::run::{ProbeValue, RunRecorder, ScenarioRun, ScenarioStep, StepStatus, classify};

/// 조회 검증 시 기대 건수에 더하는 여유분
const VERIFY_LIMIT_MARGIN: usize = 16;

/// 시나리오 엔진 동작 설정
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 프로브 대상 컬렉션
    pub collection: String,
    pub vector_dim: usize,
    /// insert 프로브 기본 레코드 수
    pub record_count: usize,
    /// search 프로브 기본 top-k
    pub top_k: usize,
    /// 가드 기한
    pub probe_deadline: Duration,
    /// 검색 요청의 클라이언트 측 타임아웃
    pub search_timeout: Duration,
    pub stop_timeout: Duration,
    pub start_timeout: Duration,
    pub wait_healthy_timeout: Duration,
    /// 생명주기 변경 후 프로브 전 대기 시간
    pub settle: Duration,
    /// 실패 스텝에 첨부할 로그 줄 수
    pub log_tail: usize,
    pub log_keywords: Vec<String>,
    pub key_prefix_seed: String,
    /// 동시 실행 프로브 최대 수
    pub max_in_flight: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&FailstormConfig::default())
    }
}

impl EngineSettings {
    /// 통합 설정에서 엔진 설정을 추출합니다.
    pub fn from_config(config: &FailstormConfig) -> Self {
        Self {
            collection: config.data_plane.collection.clone(),
            vector_dim: config.data_plane.vector_dim,
            record_count: config.probe.record_count,
            top_k: config.probe.top_k,
            probe_deadline: config.timeouts.probe_deadline(),
            search_timeout: config.data_plane.client_timeout(),
            stop_timeout: config.timeouts.stop(),
            start_timeout: config.timeouts.start(),
            wait_healthy_timeout: config.timeouts.wait_healthy(),
            settle: config.scenario.settle(),
            log_tail: config.scenario.log_tail,
            log_keywords: config.scenario.log_keywords.clone(),
            key_prefix_seed: config.probe.key_prefix_seed.clone(),
            max_in_flight: config.probe.max_in_flight,
        }
    }
}

/// 생명주기 제어 실패로 인한 중단 사유
struct Abort {
    kind: ErrorKind,
    reason: String,
}

impl From<NodeControlError> for Abort {
    fn from(err: NodeControlError) -> Self {
        Self {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// 시나리오 엔진
pub struct ScenarioEngine<R: RuntimeClient, D: DataPlaneClient> {
    controller: NodeController<R>,
    data_plane: Arc<D>,
    guard: TimeoutGuard,
    settings: EngineSettings,
}

impl<R: RuntimeClient, D: DataPlaneClient> ScenarioEngine<R, D> {
    /// 새 엔진을 생성합니다.
    pub fn new(controller: NodeController<R>, data_plane: Arc<D>, settings: EngineSettings) -> Self {
        let guard = TimeoutGuard::new(settings.max_in_flight);
        Self {
            controller,
            data_plane,
            guard,
            settings,
        }
    }

    /// 제어기 읽기 전용 참조
    pub fn controller(&self) -> &NodeController<R> {
        &self.controller
    }

    /// 시나리오를 끝까지 (또는 생명주기 제어 실패까지) 실행합니다.
    ///
    /// 실행 전 검증(정의 오류, 관리 대상이 아닌 인스턴스)만 `Err`를 반환하며,
    /// 실행이 시작되면 중단되더라도 항상 [`ScenarioRun`]을 반환합니다.
    pub async fn run(&mut self, scenario: &ScenarioDefinition) -> Result<ScenarioRun, ScenarioError> {
        scenario.validate()?;
        if let Some(unknown) = scenario
            .referenced_instances()
            .into_iter()
            .find(|name| !self.controller.registry().contains(name))
        {
            return Err(ScenarioError::UnknownInstance(unknown));
        }

        let prefix = KeyPrefix::generate(&self.settings.key_prefix_seed);
        let planned = scenario.phases.iter().map(|p| p.name.clone()).collect();
        let mut rng = prefix.rng();
        let mut recorder = RunRecorder::new(&scenario.name, prefix.clone(), planned)
            .with_min_success_percent(scenario.min_success_percent);
        // 단계별로 서버가 확인한 레코드 ID
        let mut ledger: BTreeMap<String, Vec<String>> = BTreeMap::new();

        info!(
            scenario = scenario.name.as_str(),
            key_prefix = %prefix,
            phases = scenario.phases.len(),
            "scenario started"
        );

        for phase in &scenario.phases {
            let position = recorder.next_position();
            let started_at = Utc::now();
            info!(position, phase = phase.name.as_str(), "phase started");

            let mut applied = Vec::new();
            if let Err(abort) = self.apply_mutations(phase, &mut rng, &mut applied).await {
                let diagnostics = self.diagnostics(phase, scenario).await;
                warn!(
                    phase = phase.name.as_str(),
                    kind = abort.kind.as_str(),
                    reason = abort.reason.as_str(),
                    "lifecycle change not verified, aborting run"
                );
                let step = ScenarioStep {
                    position,
                    phase: phase.name.clone(),
                    description: phase.description.clone(),
                    mutations: applied,
                    probe: "none".to_owned(),
                    expectation: phase.expectation,
                    outcome: "not_run".to_owned(),
                    status: StepStatus::Aborted,
                    latency_ms: 0,
                    error_kind: Some(abort.kind),
                    error: Some(abort.reason.clone()),
                    detail: String::new(),
                    result_count: 0,
                    diagnostics,
                    mandatory: phase.mandatory,
                    started_at,
                };
                recorder.abort(step, format!("{}: {}", phase.name, abort.reason));
                break;
            }

            if !phase.mutations.is_empty() && !self.settings.settle.is_zero() {
                debug!(settle_ms = millis(self.settings.settle), "settling before probe");
                tokio::time::sleep(self.settings.settle).await;
            }

            let probe_started = Instant::now();
            let outcome = self.probe(phase, &prefix, &ledger).await;
            let latency = probe_started.elapsed();

            metrics::counter!(
                m::PROBES_TOTAL,
                m::LABEL_PROBE_KIND => phase.probe.kind(),
                m::LABEL_OUTCOME => outcome.label()
            )
            .increment(1);
            metrics::histogram!(m::PROBE_DURATION_SECONDS).record(latency.as_secs_f64());

            if let TimeoutOutcome::Completed(ProbeValue::Inserted { ids, acknowledged }) = &outcome {
                if *acknowledged == ids.len() {
                    ledger.insert(phase.name.clone(), ids.clone());
                }
            }

            let class = classify(
                phase.expectation,
                &outcome,
                millis(self.settings.probe_deadline),
            );
            let diagnostics = if class.status == StepStatus::Failed {
                self.diagnostics(phase, scenario).await
            } else {
                Vec::new()
            };

            info!(
                phase = phase.name.as_str(),
                probe = phase.probe.kind(),
                outcome = outcome.label(),
                status = class.status.as_str(),
                latency_ms = millis(latency),
                "phase recorded"
            );

            recorder.push(ScenarioStep {
                position,
                phase: phase.name.clone(),
                description: phase.description.clone(),
                mutations: applied,
                probe: phase.probe.kind().to_owned(),
                expectation: phase.expectation,
                outcome: outcome.label().to_owned(),
                status: class.status,
                latency_ms: millis(latency),
                error_kind: class.error_kind,
                error: class.error,
                detail: class.detail,
                result_count: class.result_count,
                diagnostics,
                mandatory: phase.mandatory,
                started_at,
            });
        }

        let run = recorder.finish();
        metrics::counter!(m::SCENARIO_RUNS_TOTAL, m::LABEL_VERDICT => run.verdict().as_str())
            .increment(1);
        info!(
            scenario = run.scenario(),
            verdict = run.verdict().as_str(),
            steps = run.steps().len(),
            "scenario finished"
        );
        Ok(run)
    }

    /// 단계의 생명주기 변경을 순서대로 적용하고 검증합니다.
    ///
    /// 각 변경은 실행 전에 `applied`에 기록되므로, 중단 시 마지막 항목이
    /// 실패한 변경입니다.
    async fn apply_mutations(
        &mut self,
        phase: &PhaseSpec,
        rng: &mut StdRng,
        applied: &mut Vec<String>,
    ) -> Result<(), Abort> {
        let s = &self.settings;
        let (stop, start, wait) = (s.stop_timeout, s.start_timeout, s.wait_healthy_timeout);

        for mutation in &phase.mutations {
            if !matches!(mutation, LifecycleMutation::RestartRandom { .. }) {
                applied.push(mutation.to_string());
            }
            match mutation {
                LifecycleMutation::Stop { instances } => {
                    for name in instances {
                        self.controller.stop(name, stop).await?;
                    }
                }
                LifecycleMutation::Start { instances } => {
                    for name in instances {
                        self.controller.start(name, start).await?;
                    }
                }
                LifecycleMutation::Restart { instances } => {
                    for name in instances {
                        self.controller.restart(name, stop + start).await?;
                    }
                }
                LifecycleMutation::RestartRandom { instances } => {
                    let index = rng.gen_range(0..instances.len().max(1));
                    let Some(target) = instances.get(index) else {
                        continue;
                    };
                    debug!(
                        instance = target.as_str(),
                        candidates = instances.len(),
                        "restart target drawn"
                    );
                    applied.push(format!("restart {target} (drawn from {})", instances.join(",")));
                    self.controller.restart(target, stop + start).await?;
                }
                LifecycleMutation::WaitHealthy { instances } => {
                    let pending = self.controller.wait_healthy(instances, wait).await?;
                    if !pending.is_empty() {
                        return Err(Abort {
                            kind: ErrorKind::LifecycleTimeout,
                            reason: format!(
                                "instances not healthy after {}ms: {}",
                                millis(wait),
                                pending.join(", ")
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// 단계의 프로브를 가드 기한 안에서 실행합니다.
    async fn probe(
        &self,
        phase: &PhaseSpec,
        prefix: &KeyPrefix,
        ledger: &BTreeMap<String, Vec<String>>,
    ) -> TimeoutOutcome<ProbeValue> {
        let s = &self.settings;
        let dp = Arc::clone(&self.data_plane);
        let collection = s.collection.clone();
        let dim = s.vector_dim;

        match &phase.probe {
            ProbeSpec::Insert { records } => {
                let count = records.unwrap_or(s.record_count);
                let batch: Vec<Record> = (0..count)
                    .map(|i| Record {
                        id: prefix.record_id(&phase.name, i),
                        vector: deterministic_vector(i, dim),
                    })
                    .collect();
                self.guard
                    .run(s.probe_deadline, move || async move {
                        dp.ensure_collection(&collection, dim).await?;
                        let acknowledged = dp.insert(&collection, &batch).await?;
                        let ids = batch.into_iter().map(|r| r.id).collect();
                        Ok::<_, DataPlaneError>(ProbeValue::Inserted { ids, acknowledged })
                    })
                    .await
            }
            ProbeSpec::Search { top_k } => {
                let request = SearchRequest {
                    collection,
                    vector: deterministic_vector(0, dim),
                    top_k: top_k.unwrap_or(s.top_k),
                    id_prefix: prefix.id_prefix(),
                    timeout: s.search_timeout,
                };
                let owner = prefix.clone();
                self.guard
                    .run(s.probe_deadline, move || async move {
                        let hits = dp.search(&request).await?;
                        let foreign = hits.iter().filter(|h| !owner.owns(&h.id)).count();
                        Ok::<_, DataPlaneError>(ProbeValue::Hits {
                            returned: hits.len(),
                            foreign,
                        })
                    })
                    .await
            }
            ProbeSpec::Verify { phases } => {
                let expected: Vec<String> = ledger
                    .iter()
                    .filter(|(name, _)| phases.is_empty() || phases.contains(name))
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect();
                let id_prefix = prefix.id_prefix();
                let limit = expected.len() + VERIFY_LIMIT_MARGIN;
                self.guard
                    .run(s.probe_deadline, move || async move {
                        let found: HashSet<String> = dp
                            .query_ids(&collection, &id_prefix, limit)
                            .await?
                            .into_iter()
                            .collect();
                        let missing = expected
                            .iter()
                            .filter(|id| !found.contains(*id))
                            .cloned()
                            .collect();
                        Ok::<_, DataPlaneError>(ProbeValue::Verified {
                            expected: expected.len(),
                            missing,
                        })
                    })
                    .await
            }
        }
    }

    /// 단계가 건드린 인스턴스(없으면 시나리오 전체)의 필터링된 로그를 수집합니다.
    async fn diagnostics(&self, phase: &PhaseSpec, scenario: &ScenarioDefinition) -> Vec<String> {
        if self.settings.log_tail == 0 {
            return Vec::new();
        }
        let mut targets = phase.touched_instances();
        if targets.is_empty() {
            targets = scenario.referenced_instances();
        }

        let mut lines = Vec::new();
        for name in &targets {
            match self
                .controller
                .logs(name, self.settings.log_tail, &self.settings.log_keywords)
                .await
            {
                Ok(found) => lines.extend(found.into_iter().map(|line| format!("{name}: {line}"))),
                Err(e) => debug!(instance = name.as_str(), error = %e, "log collection skipped"),
            }
        }
        lines
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
