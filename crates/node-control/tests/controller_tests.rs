//! 통합 테스트 -- 노드 제어기 생명주기 검증
//!
//! 점진적으로 상태가 바뀌는 런타임, 응답하지 않는 런타임을 사용하여
//! 요청 → 폴링 → 검증 흐름과 기한 처리를 확인합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use failstorm_core::config::InstancesConfig;
use failstorm_core::error::ErrorKind;
use failstorm_core::types::{HealthState, InstanceObservation, LifecycleState};
use failstorm_node_control::{
    ControllerSettings, InstanceRegistry, NodeControlError, NodeController, RuntimeClient,
};

mod fake {
    use super::*;
    use tokio::sync::Mutex;

    /// 상태 전이가 몇 번의 관측에 걸쳐 진행되는 런타임
    pub struct GradualRuntime {
        states: Arc<Mutex<HashMap<String, Progress>>>,
        /// 전이 완료까지 필요한 inspect 횟수
        steps: u32,
        /// stop 요청이 응답하지 않음
        hang_on_stop: bool,
    }

    struct Progress {
        observation: InstanceObservation,
        target: Option<InstanceObservation>,
        remaining: u32,
    }

    impl GradualRuntime {
        pub fn new(steps: u32) -> Self {
            Self {
                states: Arc::new(Mutex::new(HashMap::new())),
                steps,
                hang_on_stop: false,
            }
        }

        pub fn hanging_stop(mut self) -> Self {
            self.hang_on_stop = true;
            self
        }

        pub async fn add(&self, name: &str, observation: InstanceObservation) {
            self.states.lock().await.insert(
                name.to_owned(),
                Progress {
                    observation,
                    target: None,
                    remaining: 0,
                },
            );
        }

        async fn begin(
            &self,
            name: &str,
            transitional: InstanceObservation,
            target: InstanceObservation,
        ) -> Result<(), NodeControlError> {
            let mut states = self.states.lock().await;
            let p = states
                .get_mut(name)
                .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
            p.observation = transitional;
            p.target = Some(target);
            p.remaining = self.steps;
            Ok(())
        }
    }

    impl RuntimeClient for GradualRuntime {
        async fn stop(&self, name: &str) -> Result<(), NodeControlError> {
            if self.hang_on_stop {
                std::future::pending::<()>().await;
            }
            self.begin(
                name,
                InstanceObservation::new(LifecycleState::Stopping, HealthState::Unhealthy),
                InstanceObservation::new(LifecycleState::Stopped, HealthState::Unknown),
            )
            .await
        }

        async fn start(&self, name: &str) -> Result<(), NodeControlError> {
            self.begin(
                name,
                InstanceObservation::new(LifecycleState::Starting, HealthState::Unhealthy),
                InstanceObservation::new(LifecycleState::Running, HealthState::Healthy),
            )
            .await
        }

        async fn inspect(&self, name: &str) -> Result<InstanceObservation, NodeControlError> {
            let mut states = self.states.lock().await;
            let p = states
                .get_mut(name)
                .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
            if let Some(target) = p.target {
                if p.remaining == 0 {
                    p.observation = target;
                    p.target = None;
                } else {
                    p.remaining -= 1;
                }
            }
            Ok(p.observation)
        }

        async fn logs(
            &self,
            _name: &str,
            _tail: usize,
            _keywords: &[String],
        ) -> Result<Vec<String>, NodeControlError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), NodeControlError> {
            Ok(())
        }
    }

    /// inspect마다 미리 정한 관측을 차례로 돌려주는 런타임 (마지막 관측은 반복)
    pub struct ScriptedRuntime {
        scripts: Mutex<HashMap<String, Vec<InstanceObservation>>>,
    }

    impl ScriptedRuntime {
        pub fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
            }
        }

        pub async fn script(&self, name: &str, observations: Vec<InstanceObservation>) {
            self.scripts
                .lock()
                .await
                .insert(name.to_owned(), observations);
        }
    }

    impl RuntimeClient for ScriptedRuntime {
        async fn stop(&self, _name: &str) -> Result<(), NodeControlError> {
            Ok(())
        }

        async fn start(&self, _name: &str) -> Result<(), NodeControlError> {
            Ok(())
        }

        async fn inspect(&self, name: &str) -> Result<InstanceObservation, NodeControlError> {
            let mut scripts = self.scripts.lock().await;
            let script = scripts
                .get_mut(name)
                .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                script
                    .first()
                    .copied()
                    .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))
            }
        }

        async fn logs(
            &self,
            _name: &str,
            _tail: usize,
            _keywords: &[String],
        ) -> Result<Vec<String>, NodeControlError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), NodeControlError> {
            Ok(())
        }
    }
}

use fake::{GradualRuntime, ScriptedRuntime};

fn instances(names: &[&str]) -> InstancesConfig {
    InstancesConfig {
        proxy: Vec::new(),
        coordinator: Vec::new(),
        query_worker: names.iter().map(|n| (*n).to_owned()).collect(),
        data_worker: Vec::new(),
        index_worker: Vec::new(),
        metadata_store: Vec::new(),
        object_store: Vec::new(),
        message_broker: Vec::new(),
    }
}

fn settings() -> ControllerSettings {
    ControllerSettings {
        poll_interval: Duration::from_millis(200),
        stability_threshold: 2,
        unknown_health_is_healthy: true,
        request_timeout: Duration::from_secs(5),
    }
}

fn running() -> InstanceObservation {
    InstanceObservation::new(LifecycleState::Running, HealthState::Healthy)
}

#[tokio::test(start_paused = true)]
async fn gradual_stop_is_verified_after_transition() {
    // Given: 정지에 3번의 관측이 필요한 런타임
    let runtime = Arc::new(GradualRuntime::new(3));
    runtime.add("node-a", running()).await;
    let registry = InstanceRegistry::from_config(&instances(&["node-a"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    // When
    ctl.stop("node-a", Duration::from_secs(30)).await.unwrap();

    // Then
    let status = ctl.status("node-a").await.unwrap();
    assert_eq!(status.lifecycle, LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn gradual_start_needs_stable_health() {
    let runtime = Arc::new(GradualRuntime::new(2));
    runtime
        .add(
            "node-a",
            InstanceObservation::new(LifecycleState::Stopped, HealthState::Unknown),
        )
        .await;
    let registry = InstanceRegistry::from_config(&instances(&["node-a"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    let started = tokio::time::Instant::now();
    ctl.start("node-a", Duration::from_secs(30)).await.unwrap();

    // starting 2회 + healthy 2회 연속 관측, 그 사이 3번의 폴링 간격
    assert!(started.elapsed() >= Duration::from_millis(600));
    let inst = ctl.registry().get("node-a").unwrap();
    assert_eq!(inst.lifecycle, LifecycleState::Running);
    assert_eq!(inst.health, HealthState::Healthy);
}

#[tokio::test(start_paused = true)]
async fn stop_slower_than_deadline_times_out() {
    let runtime = Arc::new(GradualRuntime::new(50));
    runtime.add("node-a", running()).await;
    let registry = InstanceRegistry::from_config(&instances(&["node-a"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    let err = ctl
        .stop("node-a", Duration::from_secs(2))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LifecycleTimeout);
    assert_eq!(
        ctl.registry().get("node-a").unwrap().lifecycle,
        LifecycleState::Stopping
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_stop_request_is_bounded_by_deadline() {
    // Given: stop 요청이 영원히 응답하지 않는 런타임
    let runtime = Arc::new(GradualRuntime::new(0).hanging_stop());
    runtime.add("node-a", running()).await;
    let registry = InstanceRegistry::from_config(&instances(&["node-a"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    // When
    let started = tokio::time::Instant::now();
    let err = ctl
        .stop("node-a", Duration::from_secs(3))
        .await
        .unwrap_err();

    // Then: 기한 내에 LifecycleTimeout으로 반환
    assert!(started.elapsed() <= Duration::from_secs(3) + Duration::from_millis(50));
    assert!(matches!(
        err,
        NodeControlError::LifecycleTimeout {
            expected: "stopped",
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn restart_uses_single_budget() {
    let runtime = Arc::new(GradualRuntime::new(1));
    runtime.add("node-a", running()).await;
    runtime.add("node-b", running()).await;
    let registry = InstanceRegistry::from_config(&instances(&["node-a", "node-b"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    ctl.restart("node-a", Duration::from_secs(10)).await.unwrap();

    let pending = ctl
        .wait_healthy(
            &["node-a".to_owned(), "node-b".to_owned()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_healthy_notices_instance_lost_after_stabilizing() {
    // Given: qn-1은 2회 정상 후 정지, qn-2는 3회 비정상 후 정상 (N=2)
    let unhealthy = InstanceObservation::new(LifecycleState::Running, HealthState::Unhealthy);
    let stopped = InstanceObservation::new(LifecycleState::Stopped, HealthState::Unknown);
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime
        .script("qn-1", vec![running(), running(), stopped])
        .await;
    runtime
        .script("qn-2", vec![unhealthy, unhealthy, unhealthy, running()])
        .await;
    let registry = InstanceRegistry::from_config(&instances(&["qn-1", "qn-2"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    // When
    let pending = ctl
        .wait_healthy(&["qn-1".to_owned(), "qn-2".to_owned()], Duration::from_secs(3))
        .await
        .unwrap();

    // Then: 정지한 qn-1이 미완료로 보고되고 레지스트리도 최신 관측을 가짐
    assert_eq!(pending, vec!["qn-1".to_owned()]);
    assert_eq!(
        ctl.registry().get("qn-1").unwrap().lifecycle,
        LifecycleState::Stopped
    );
    assert_eq!(
        ctl.registry().get("qn-2").unwrap().health,
        HealthState::Healthy
    );
}

#[tokio::test(start_paused = true)]
async fn wait_healthy_requires_stability_in_same_round() {
    // Given: qn-1이 한 번 흔들린 뒤 회복
    let unhealthy = InstanceObservation::new(LifecycleState::Running, HealthState::Unhealthy);
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime
        .script("qn-1", vec![running(), running(), unhealthy, running()])
        .await;
    runtime
        .script("qn-2", vec![unhealthy, unhealthy, running()])
        .await;
    let registry = InstanceRegistry::from_config(&instances(&["qn-1", "qn-2"]));
    let mut ctl = NodeController::new(Arc::clone(&runtime), registry, settings()).unwrap();

    // When
    let started = tokio::time::Instant::now();
    let pending = ctl
        .wait_healthy(&["qn-1".to_owned(), "qn-2".to_owned()], Duration::from_secs(10))
        .await
        .unwrap();

    // Then: 라운드 5에서야 두 인스턴스 모두 연속 2회 정상 (폴링 간격 4회)
    assert!(pending.is_empty());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "elapsed {elapsed:?}");
}
