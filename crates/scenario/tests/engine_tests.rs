//! 통합 테스트 -- 시나리오 엔진 전체 흐름
//!
//! 런타임과 데이터 플레인이 같은 클러스터 상태를 공유하는 가짜 구현을 사용합니다.
//! 쿼리 워커가 하나도 실행 중이 아니면 검색이 응답하지 않으므로,
//! 실제 장애 상황과 같이 가드 기한으로만 끝낼 수 있습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use failstorm_core::config::InstancesConfig;
use failstorm_core::error::ErrorKind;
use failstorm_core::types::{Expectation, HealthState, InstanceObservation, LifecycleState};
use failstorm_node_control::{
    ControllerSettings, InstanceRegistry, NodeControlError, NodeController, filter_lines,
};
use failstorm_scenario::{
    DegradedTally, EngineSettings, ScenarioEngine, ScenarioError, ScenarioRun, StepStatus, Verdict,
    builtin, parse_scenario,
};
use rand::Rng;

mod fake {
    use super::*;
    use failstorm_node_control::RuntimeClient;
    use failstorm_scenario::{DataPlaneClient, DataPlaneError, Record, SearchHit, SearchRequest};
    use tokio::sync::Mutex;

    /// 런타임과 데이터 플레인이 공유하는 클러스터 상태
    #[derive(Default)]
    pub struct Cluster {
        pub instances: HashMap<String, InstanceObservation>,
        pub logs: HashMap<String, Vec<String>>,
        /// 저장된 레코드 ID (실행 간에 유지됨)
        pub records: Vec<String>,
        /// 데이터 플레인 호출 수
        pub data_calls: usize,
    }

    pub type Shared = Arc<Mutex<Cluster>>;

    pub fn cluster(names: &[&str]) -> Shared {
        let mut cluster = Cluster::default();
        for name in names {
            cluster.instances.insert(
                (*name).to_owned(),
                InstanceObservation::new(LifecycleState::Running, HealthState::Healthy),
            );
        }
        Arc::new(Mutex::new(cluster))
    }

    pub struct FakeRuntime {
        state: Shared,
        unreachable: bool,
        reject_stop: bool,
        hang_stop: bool,
    }

    impl FakeRuntime {
        pub fn new(state: Shared) -> Self {
            Self {
                state,
                unreachable: false,
                reject_stop: false,
                hang_stop: false,
            }
        }

        pub fn unreachable(mut self) -> Self {
            self.unreachable = true;
            self
        }

        pub fn rejecting_stop(mut self) -> Self {
            self.reject_stop = true;
            self
        }

        pub fn hanging_stop(mut self) -> Self {
            self.hang_stop = true;
            self
        }

        fn reachable(&self) -> Result<(), NodeControlError> {
            if self.unreachable {
                Err(NodeControlError::ControlUnavailable(
                    "connection refused".to_owned(),
                ))
            } else {
                Ok(())
            }
        }

        async fn set(&self, name: &str, obs: InstanceObservation) -> Result<(), NodeControlError> {
            let mut state = self.state.lock().await;
            let slot = state
                .instances
                .get_mut(name)
                .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
            *slot = obs;
            Ok(())
        }
    }

    impl RuntimeClient for FakeRuntime {
        async fn stop(&self, name: &str) -> Result<(), NodeControlError> {
            self.reachable()?;
            if self.hang_stop {
                std::future::pending::<()>().await;
            }
            if self.reject_stop {
                return Err(NodeControlError::Runtime {
                    instance: name.to_owned(),
                    action: "stop",
                    reason: "permission denied".to_owned(),
                });
            }
            self.set(
                name,
                InstanceObservation::new(LifecycleState::Stopped, HealthState::Unknown),
            )
            .await
        }

        async fn start(&self, name: &str) -> Result<(), NodeControlError> {
            self.reachable()?;
            self.set(
                name,
                InstanceObservation::new(LifecycleState::Running, HealthState::Healthy),
            )
            .await
        }

        async fn inspect(&self, name: &str) -> Result<InstanceObservation, NodeControlError> {
            self.reachable()?;
            self.state
                .lock()
                .await
                .instances
                .get(name)
                .copied()
                .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))
        }

        async fn logs(
            &self,
            name: &str,
            tail: usize,
            keywords: &[String],
        ) -> Result<Vec<String>, NodeControlError> {
            self.reachable()?;
            let lines = self.state.lock().await.logs.get(name).cloned().unwrap_or_default();
            let start = lines.len().saturating_sub(tail);
            Ok(filter_lines(lines[start..].to_vec(), keywords))
        }

        async fn ping(&self) -> Result<(), NodeControlError> {
            self.reachable()
        }
    }

    /// 쿼리 워커 상태에 따라 동작하는 데이터 플레인
    pub struct FakeDataPlane {
        state: Shared,
        query_workers: Vec<String>,
        /// 모든 쿼리 워커가 실행 중이어야 검색 성공
        search_needs_all: bool,
    }

    impl FakeDataPlane {
        pub fn new(state: Shared, query_workers: &[&str]) -> Self {
            Self {
                state,
                query_workers: query_workers.iter().map(|n| (*n).to_owned()).collect(),
                search_needs_all: false,
            }
        }

        pub fn search_needs_all_workers(mut self) -> Self {
            self.search_needs_all = true;
            self
        }

        async fn running_workers(&self) -> usize {
            let state = self.state.lock().await;
            self.query_workers
                .iter()
                .filter(|w| {
                    state
                        .instances
                        .get(w.as_str())
                        .is_some_and(|o| o.lifecycle == LifecycleState::Running)
                })
                .count()
        }

        /// 실행 중인 쿼리 워커가 생길 때까지 응답하지 않음
        async fn wait_for_worker(&self) {
            while self.running_workers().await == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        async fn count_call(&self) {
            self.state.lock().await.data_calls += 1;
        }
    }

    impl DataPlaneClient for FakeDataPlane {
        async fn ensure_collection(&self, _collection: &str, _dim: usize) -> Result<(), DataPlaneError> {
            self.count_call().await;
            Ok(())
        }

        async fn insert(&self, _collection: &str, records: &[Record]) -> Result<usize, DataPlaneError> {
            self.count_call().await;
            let mut state = self.state.lock().await;
            state.records.extend(records.iter().map(|r| r.id.clone()));
            Ok(records.len())
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, DataPlaneError> {
            self.count_call().await;
            self.wait_for_worker().await;
            if self.search_needs_all && self.running_workers().await < self.query_workers.len() {
                return Err(DataPlaneError::Server {
                    code: 503,
                    message: "channel checker: shard leader unavailable".to_owned(),
                });
            }
            let state = self.state.lock().await;
            Ok(state
                .records
                .iter()
                .filter(|id| id.starts_with(&request.id_prefix))
                .take(request.top_k)
                .map(|id| SearchHit {
                    id: id.clone(),
                    distance: 0.0,
                })
                .collect())
        }

        async fn query_ids(
            &self,
            _collection: &str,
            id_prefix: &str,
            limit: usize,
        ) -> Result<Vec<String>, DataPlaneError> {
            self.count_call().await;
            self.wait_for_worker().await;
            let state = self.state.lock().await;
            Ok(state
                .records
                .iter()
                .filter(|id| id.starts_with(id_prefix))
                .take(limit)
                .cloned()
                .collect())
        }
    }
}

use fake::{FakeDataPlane, FakeRuntime};

const NODE_A: &str = "node-A";
const NODE_B: &str = "node-B";

fn instances() -> InstancesConfig {
    InstancesConfig {
        proxy: Vec::new(),
        coordinator: Vec::new(),
        query_worker: vec![NODE_A.to_owned(), NODE_B.to_owned()],
        data_worker: Vec::new(),
        index_worker: Vec::new(),
        metadata_store: Vec::new(),
        object_store: Vec::new(),
        message_broker: Vec::new(),
    }
}

fn engine_settings() -> EngineSettings {
    EngineSettings {
        collection: "probe".to_owned(),
        vector_dim: 4,
        record_count: 5,
        top_k: 3,
        probe_deadline: Duration::from_secs(60),
        search_timeout: Duration::from_secs(30),
        stop_timeout: Duration::from_secs(30),
        start_timeout: Duration::from_secs(60),
        wait_healthy_timeout: Duration::from_secs(120),
        settle: Duration::from_secs(1),
        log_tail: 20,
        log_keywords: vec!["error".to_owned()],
        key_prefix_seed: "fs".to_owned(),
        max_in_flight: 4,
    }
}

fn engine(runtime: FakeRuntime, data_plane: FakeDataPlane) -> ScenarioEngine<FakeRuntime, FakeDataPlane> {
    let settings = ControllerSettings {
        poll_interval: Duration::from_millis(100),
        stability_threshold: 2,
        unknown_health_is_healthy: true,
        request_timeout: Duration::from_secs(5),
    };
    let controller = NodeController::new(
        Arc::new(runtime),
        InstanceRegistry::from_config(&instances()),
        settings,
    )
    .unwrap();
    ScenarioEngine::new(controller, Arc::new(data_plane), engine_settings())
}

async fn run_builtin(
    engine: &mut ScenarioEngine<FakeRuntime, FakeDataPlane>,
    name: &str,
    both_down: Expectation,
) -> ScenarioRun {
    let scenario = builtin(name, both_down)
        .unwrap()
        .resolve(&instances())
        .unwrap();
    engine.run(&scenario).await.unwrap()
}

fn step<'a>(run: &'a ScenarioRun, phase: &str) -> &'a failstorm_scenario::ScenarioStep {
    run.steps().iter().find(|s| s.phase == phase).unwrap()
}

#[tokio::test(start_paused = true)]
async fn bidirectional_failover_passes() {
    // Given: 두 쿼리 워커 모두 정상
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    // When
    let started = tokio::time::Instant::now();
    let run = run_builtin(&mut engine, "bidirectional", Expectation::MustFail).await;

    // Then: 모든 단계가 기대대로 분류되고 판정 pass
    assert_eq!(run.verdict(), Verdict::Pass);
    assert_eq!(run.steps().len(), 5);
    assert!(run.steps().iter().all(|s| s.status == StepStatus::Passed));

    let setup = step(&run, "setup");
    assert_eq!(setup.probe, "insert");
    assert_eq!(setup.result_count, 5);

    let node_a_down = step(&run, "node_a_down");
    assert_eq!(node_a_down.outcome, "completed");
    assert!(node_a_down.result_count >= 1);
    assert_eq!(node_a_down.mutations, vec![format!("stop {NODE_A}")]);

    // 두 워커 모두 정지: 검색이 응답하지 않으므로 기한 초과로 must-fail 통과
    let both_down = step(&run, "both_down");
    assert_eq!(both_down.outcome, "timed_out");
    assert_eq!(both_down.error_kind, Some(ErrorKind::ProbeTimeout));
    assert!(both_down.latency_ms >= 60_000);
    assert!(both_down.latency_ms < 61_000);

    let recovery = step(&run, "full_recovery");
    assert_eq!(recovery.outcome, "completed");
    assert!(started.elapsed() < Duration::from_secs(120));

    // 실행이 끝나면 두 워커 모두 실행 중으로 기록됨
    for name in [NODE_A, NODE_B] {
        let inst = engine.controller().registry().get(name).unwrap();
        assert_eq!(inst.lifecycle, LifecycleState::Running);
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_runtime_aborts_without_probes() {
    // Given: 런타임 제어 채널에 연결할 수 없음
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)).unreachable(),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    // When
    let run = run_builtin(&mut engine, "bidirectional", Expectation::MustFail).await;

    // Then: 첫 단계에서 중단, 프로브 0회
    assert_eq!(run.verdict(), Verdict::Fail);
    assert!(run.is_aborted());
    assert_eq!(run.steps().len(), 1);
    let terminal = &run.steps()[0];
    assert_eq!(terminal.status, StepStatus::Aborted);
    assert_eq!(terminal.error_kind, Some(ErrorKind::ControlUnavailable));
    assert_eq!(terminal.outcome, "not_run");
    assert_eq!(run.probes_attempted(), 0);
    assert_eq!(state.lock().await.data_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_first_stop_aborts_run() {
    // Given: 첫 단계가 곧바로 node-a를 정지하는 시나리오, 런타임은 정지 거부
    let scenario = parse_scenario(
        r#"
name = "stop-first"

[[phases]]
name = "node_a_down"
mandatory = true
expectation = "must-succeed"
probe = { kind = "search" }
mutations = [{ action = "stop", instances = ["node-a"] }]

[[phases]]
name = "recovery"
mandatory = true
expectation = "must-succeed"
probe = { kind = "search" }
mutations = [{ action = "start", instances = ["node-a"] }]
"#,
    )
    .unwrap()
    .resolve(&instances())
    .unwrap();

    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)).rejecting_stop(),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    // When
    let run = engine.run(&scenario).await.unwrap();

    // Then
    assert_eq!(run.verdict(), Verdict::Fail);
    assert_eq!(run.steps().len(), 1);
    assert_eq!(
        run.steps()[0].error_kind,
        Some(ErrorKind::ControlUnavailable)
    );
    assert!(run.abort_reason().unwrap().contains("permission denied"));
    assert_eq!(state.lock().await.data_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_stop_aborts_with_lifecycle_timeout() {
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)).hanging_stop(),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    let run = run_builtin(&mut engine, "bidirectional", Expectation::MustFail).await;

    // setup은 통과, node_a_down에서 정지가 검증되지 않아 중단
    assert_eq!(run.verdict(), Verdict::Fail);
    assert_eq!(run.steps().len(), 2);
    assert_eq!(run.steps()[0].status, StepStatus::Passed);
    let aborted = &run.steps()[1];
    assert_eq!(aborted.phase, "node_a_down");
    assert_eq!(aborted.status, StepStatus::Aborted);
    assert_eq!(aborted.error_kind, Some(ErrorKind::LifecycleTimeout));
}

#[tokio::test(start_paused = true)]
async fn both_down_can_be_characterized_instead_of_failed() {
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    let run = run_builtin(&mut engine, "bidirectional", Expectation::DegradedOk).await;

    assert_eq!(run.verdict(), Verdict::Pass);
    let both_down = step(&run, "both_down");
    assert_eq!(both_down.status, StepStatus::Characterized);
    assert_eq!(both_down.expectation, Expectation::DegradedOk);
    assert!(both_down.latency_ms >= 60_000);
}

#[tokio::test(start_paused = true)]
async fn intermediate_failure_gives_partial_with_diagnostics() {
    // Given: 워커 하나라도 빠지면 검색이 에러를 반환하는 클러스터
    let state = fake::cluster(&[NODE_A, NODE_B]);
    state.lock().await.logs.insert(
        NODE_A.to_owned(),
        vec![
            "segment loaded".to_owned(),
            "ERROR shard leader lost".to_owned(),
        ],
    );
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]).search_needs_all_workers(),
    );

    // When
    let run = run_builtin(&mut engine, "bidirectional", Expectation::MustFail).await;

    // Then: 필수 단계는 통과, 중간 단계 실패로 partial
    assert_eq!(run.verdict(), Verdict::Partial);
    assert_eq!(step(&run, "setup").status, StepStatus::Passed);
    assert_eq!(step(&run, "full_recovery").status, StepStatus::Passed);

    let node_a_down = step(&run, "node_a_down");
    assert_eq!(node_a_down.status, StepStatus::Failed);
    assert_eq!(node_a_down.error_kind, Some(ErrorKind::ProbeError));
    assert_eq!(
        node_a_down.diagnostics,
        vec![format!("{NODE_A}: ERROR shard leader lost")]
    );
    assert!(!run.is_aborted());
}

#[tokio::test(start_paused = true)]
async fn back_to_back_runs_do_not_observe_each_other() {
    // Given: 레코드 저장소를 공유하는 같은 클러스터
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    // When: failover 시나리오를 연속 두 번 실행
    let first = run_builtin(&mut engine, "failover", Expectation::MustFail).await;
    let second = run_builtin(&mut engine, "failover", Expectation::MustFail).await;

    // Then
    assert_ne!(first.key_prefix(), second.key_prefix());
    for run in [&first, &second] {
        assert_eq!(run.verdict(), Verdict::Pass);
        // 검색 결과에 다른 실행의 레코드가 섞이지 않음 (섞이면 must-succeed 실패)
        assert!(
            run.steps()
                .iter()
                .filter(|s| s.probe == "search")
                .all(|s| s.status == StepStatus::Passed)
        );
        // setup 5건 + 장애 중 적재 5건이 모두 조회됨
        let verify = step(run, "verify_writes");
        assert_eq!(verify.status, StepStatus::Passed);
        assert_eq!(verify.result_count, 10);
    }

    let records = state.lock().await.records.clone();
    assert_eq!(records.len(), 20);
    let first_owned = records.iter().filter(|id| first.key_prefix().owns(id)).count();
    let second_owned = records.iter().filter(|id| second.key_prefix().owns(id)).count();
    assert_eq!((first_owned, second_owned), (10, 10));
}

#[tokio::test(start_paused = true)]
async fn unmanaged_instance_is_rejected_before_run() {
    let scenario = parse_scenario(
        r#"
name = "foreign"

[[phases]]
name = "setup"
mandatory = true
expectation = "must-succeed"
probe = { kind = "insert" }
mutations = [{ action = "stop", instances = ["milvus-rootcoord"] }]
"#,
    )
    .unwrap();

    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    let err = engine.run(&scenario).await.unwrap_err();
    assert!(matches!(err, ScenarioError::UnknownInstance(name) if name == "milvus-rootcoord"));
    assert_eq!(state.lock().await.data_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn chaos_restart_targets_replay_from_key_prefix() {
    // Given: 두 쿼리 워커만 있는 클러스터 (데이터/인덱스 워커 그룹은 비어 있음)
    let state = fake::cluster(&[NODE_A, NODE_B]);
    let mut engine = engine(
        FakeRuntime::new(Arc::clone(&state)),
        FakeDataPlane::new(Arc::clone(&state), &[NODE_A, NODE_B]),
    );

    // When
    let run = run_builtin(&mut engine, "chaos", Expectation::MustFail).await;

    // Then: 모든 라운드가 완료되어 기준 80%를 넘김
    assert_eq!(run.verdict(), Verdict::Pass);
    assert_eq!(run.min_success_percent(), Some(80));
    assert_eq!(run.degraded(), DegradedTally { completed: 5, total: 5 });

    // 같은 접두어로 시드한 난수가 같은 재시작 대상을 재현함
    let candidates = [NODE_A, NODE_B];
    let mut rng = run.key_prefix().rng();
    for round in 1..=5 {
        let expected = candidates[rng.gen_range(0..candidates.len())];
        let recorded = step(&run, &format!("chaos_round_{round}"));
        assert_eq!(
            recorded.mutations,
            vec![format!("restart {expected} (drawn from {NODE_A},{NODE_B})")]
        );
    }

    // setup + 홀수 라운드(1, 3, 5)에서 적재한 레코드가 모두 조회됨
    let verify = step(&run, "verify_writes");
    assert_eq!(verify.status, StepStatus::Passed);
    assert_eq!(verify.result_count, 20);
    for name in [NODE_A, NODE_B] {
        let inst = engine.controller().registry().get(name).unwrap();
        assert_eq!(inst.lifecycle, LifecycleState::Running);
    }
}
