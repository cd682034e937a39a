//! 노드 제어기 -- 생명주기 변경 요청과 상태 검증
//!
//! [`NodeController`]는 런타임에 stop/start 요청을 보낸 뒤, 기한 내에서 고정
//! 간격으로 상태를 폴링하여 요청한 상태가 실제로 관측될 때까지 기다립니다.
//! 레지스트리의 상태는 항상 새로 관측한 값으로만 갱신되며, 요청이 수락되었다는
//! 사실만으로는 갱신되지 않습니다.
//!
//! # 검증 기준
//! - stop: `stopped` 관측 1회
//! - start: `running` + 정상 헬스를 N회 연속 관측 (flapping 방지)
//! - restart: stop 성공 후 남은 기한으로 start

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use failstorm_core::config::FailstormConfig;
use failstorm_core::metrics as m;
use failstorm_core::types::{HealthState, InstanceObservation, LifecycleState, ManagedInstance};

use crate::error::NodeControlError;
use crate::registry::InstanceRegistry;
use crate::runtime::RuntimeClient;

/// 노드 제어기 동작 설정
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// 상태 폴링 간격
    pub poll_interval: Duration,
    /// 안정화로 인정하는 연속 정상 관측 횟수
    pub stability_threshold: u32,
    /// 헬스 체크가 없는 인스턴스를 정상으로 간주할지 여부
    pub unknown_health_is_healthy: bool,
    /// 런타임 단일 호출(inspect, logs, ping) 타임아웃
    pub request_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stability_threshold: 2,
            unknown_health_is_healthy: true,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ControllerSettings {
    /// 통합 설정에서 제어기 설정을 추출합니다.
    pub fn from_config(config: &FailstormConfig) -> Self {
        Self {
            poll_interval: config.health.poll_interval(),
            stability_threshold: config.health.stability_threshold,
            unknown_health_is_healthy: config.health.unknown_health_is_healthy,
            request_timeout: Duration::from_secs(config.runtime.request_timeout_secs),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NodeControlError> {
        if self.poll_interval.is_zero() {
            return Err(NodeControlError::Config {
                field: "poll_interval".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.stability_threshold == 0 {
            return Err(NodeControlError::Config {
                field: "stability_threshold".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(NodeControlError::Config {
                field: "request_timeout".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Stop,
    Start,
    Restart,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Restart => "restart",
        }
    }
}

/// 노드 제어기
///
/// 인스턴스 레지스트리의 유일한 쓰기 주체입니다. 시나리오 엔진은
/// [`registry()`](Self::registry)로 읽기 전용 참조만 얻습니다.
pub struct NodeController<R: RuntimeClient> {
    runtime: Arc<R>,
    registry: InstanceRegistry,
    settings: ControllerSettings,
}

impl<R: RuntimeClient> NodeController<R> {
    /// 새 노드 제어기를 생성합니다.
    pub fn new(
        runtime: Arc<R>,
        registry: InstanceRegistry,
        settings: ControllerSettings,
    ) -> Result<Self, NodeControlError> {
        settings.validate()?;
        Ok(Self {
            runtime,
            registry,
            settings,
        })
    }

    /// 레지스트리 읽기 전용 참조
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// 런타임 제어 채널 연결을 확인합니다.
    pub async fn check_control(&self) -> Result<(), NodeControlError> {
        match tokio::time::timeout(self.settings.request_timeout, self.runtime.ping()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(NodeControlError::ControlUnavailable(format!(
                "ping timed out after {:?}",
                self.settings.request_timeout
            ))),
        }
    }

    /// 인스턴스를 새로 관측합니다 (캐시 없음).
    pub async fn status(&mut self, name: &str) -> Result<InstanceObservation, NodeControlError> {
        self.ensure_registered(name)?;
        self.observe(name).await
    }

    /// 등록된 모든 인스턴스를 새로 관측하고 레지스트리 스냅샷을 반환합니다.
    ///
    /// 런타임에 존재하지 않는 인스턴스는 `unknown/unknown`으로 기록됩니다.
    pub async fn status_all(&mut self) -> Result<Vec<ManagedInstance>, NodeControlError> {
        let names: Vec<String> = self.registry.iter().map(|i| i.name.clone()).collect();
        for name in &names {
            match self.observe(name).await {
                Ok(_) => {}
                Err(NodeControlError::InstanceNotFound(_)) => {
                    warn!(instance = name.as_str(), "instance not found in runtime");
                    self.registry.record(
                        name,
                        InstanceObservation::new(LifecycleState::Unknown, HealthState::Unknown),
                        SystemTime::now(),
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.registry.iter().cloned().collect())
    }

    /// 인스턴스를 정지하고 `stopped`가 관측될 때까지 기다립니다.
    ///
    /// 실패 시 레지스트리에는 마지막으로 관측한 상태가 남으며,
    /// `stopped`로 기록되지 않습니다.
    pub async fn stop(&mut self, name: &str, timeout: Duration) -> Result<(), NodeControlError> {
        self.ensure_registered(name)?;
        let started = Instant::now();
        let deadline = started + timeout;
        info!(instance = name, timeout_ms = millis(timeout), "stopping instance");

        let result = async {
            self.request(name, Action::Stop, started, deadline).await?;
            self.wait_for(name, "stopped", 1, started, deadline, |obs| {
                obs.lifecycle == LifecycleState::Stopped
            })
            .await
        }
        .await;

        self.finish(name, Action::Stop, started, result.map(|_| ()))
    }

    /// 인스턴스를 시작하고 N회 연속 정상 관측될 때까지 기다립니다.
    ///
    /// 이미 실행 중이고 정상이면 헬스 재확인 1회 외에는 아무것도 하지 않습니다.
    pub async fn start(&mut self, name: &str, timeout: Duration) -> Result<(), NodeControlError> {
        self.ensure_registered(name)?;
        let started = Instant::now();
        let deadline = started + timeout;
        let unknown_ok = self.settings.unknown_health_is_healthy;
        let threshold = self.settings.stability_threshold;
        info!(instance = name, timeout_ms = millis(timeout), "starting instance");

        let result = async {
            let current = self.observe(name).await?;
            if current.is_ready(unknown_ok) {
                debug!(instance = name, "instance already running and ready");
                return Ok(());
            }
            if !matches!(
                current.lifecycle,
                LifecycleState::Running | LifecycleState::Starting
            ) {
                self.request(name, Action::Start, started, deadline).await?;
            }
            self.wait_for(name, "running/healthy", threshold, started, deadline, |obs| {
                obs.is_ready(unknown_ok)
            })
            .await
            .map(|_| ())
        }
        .await;

        self.finish(name, Action::Start, started, result)
    }

    /// stop 후 남은 기한으로 start를 수행합니다.
    ///
    /// stop이 실패하면 start를 시도하지 않습니다.
    pub async fn restart(&mut self, name: &str, timeout: Duration) -> Result<(), NodeControlError> {
        let started = Instant::now();
        let result = async {
            self.stop(name, timeout).await?;
            let remaining = timeout.saturating_sub(started.elapsed());
            self.start(name, remaining).await
        }
        .await;
        self.finish(name, Action::Restart, started, result)
    }

    /// 모든 인스턴스가 안정적으로 정상이 될 때까지 기다립니다.
    ///
    /// 매 라운드마다 모든 인스턴스를 다시 관측하며, 같은 라운드에서 모든
    /// 연속 정상 횟수가 N 이상일 때만 성공합니다.
    /// 기한까지 안정화되지 않은 인스턴스 이름 목록을 반환합니다 (빈 목록 = 성공).
    pub async fn wait_healthy(
        &mut self,
        names: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>, NodeControlError> {
        for name in names {
            self.ensure_registered(name)?;
        }
        let started = Instant::now();
        let deadline = started + timeout;
        let unknown_ok = self.settings.unknown_health_is_healthy;
        let threshold = self.settings.stability_threshold;
        let mut streaks = vec![0u32; names.len()];

        info!(
            instances = names.len(),
            timeout_ms = millis(timeout),
            "waiting for instances to become healthy"
        );

        loop {
            for (name, streak) in names.iter().zip(streaks.iter_mut()) {
                let obs = self.observe(name).await?;
                if obs.is_ready(unknown_ok) {
                    *streak += 1;
                } else {
                    *streak = 0;
                }
            }

            let pending: Vec<String> = names
                .iter()
                .zip(&streaks)
                .filter(|(_, streak)| **streak < threshold)
                .map(|(name, _)| name.clone())
                .collect();
            if pending.is_empty() {
                info!(
                    elapsed_ms = millis(started.elapsed()),
                    "all instances healthy"
                );
                return Ok(pending);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(pending = ?pending, "instances still unhealthy at deadline");
                return Ok(pending);
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// 인스턴스 로그의 마지막 `tail`줄 중 키워드가 포함된 줄을 반환합니다.
    pub async fn logs(
        &self,
        name: &str,
        tail: usize,
        keywords: &[String],
    ) -> Result<Vec<String>, NodeControlError> {
        match tokio::time::timeout(
            self.settings.request_timeout,
            self.runtime.logs(name, tail, keywords),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(NodeControlError::ControlUnavailable(format!(
                "logs '{name}' timed out after {:?}",
                self.settings.request_timeout
            ))),
        }
    }

    fn ensure_registered(&self, name: &str) -> Result<(), NodeControlError> {
        if self.registry.contains(name) {
            Ok(())
        } else {
            Err(NodeControlError::InstanceNotFound(format!(
                "'{name}' is not a managed instance"
            )))
        }
    }

    fn last_observation(&self, name: &str) -> InstanceObservation {
        self.registry
            .get(name)
            .map(ManagedInstance::observation)
            .unwrap_or(InstanceObservation::new(
                LifecycleState::Unknown,
                HealthState::Unknown,
            ))
    }

    /// 런타임에서 한 번 관측하고 레지스트리에 기록합니다.
    async fn observe(&mut self, name: &str) -> Result<InstanceObservation, NodeControlError> {
        metrics::counter!(m::LIFECYCLE_POLLS_TOTAL).increment(1);
        let obs = match tokio::time::timeout(
            self.settings.request_timeout,
            self.runtime.inspect(name),
        )
        .await
        {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(NodeControlError::ControlUnavailable(format!(
                    "inspect '{name}' timed out after {:?}",
                    self.settings.request_timeout
                )));
            }
        };
        self.registry.record(name, obs, SystemTime::now());
        debug!(instance = name, observed = %obs, "observed instance");
        Ok(obs)
    }

    /// 남은 기한 안에서 stop/start 요청을 보냅니다.
    async fn request(
        &self,
        name: &str,
        action: Action,
        started: Instant,
        deadline: Instant,
    ) -> Result<(), NodeControlError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let result = match action {
            Action::Stop => tokio::time::timeout(remaining, self.runtime.stop(name)).await,
            Action::Start | Action::Restart => {
                tokio::time::timeout(remaining, self.runtime.start(name)).await
            }
        };
        match result {
            Ok(accepted) => accepted,
            Err(_elapsed) => Err(NodeControlError::LifecycleTimeout {
                instance: name.to_owned(),
                expected: match action {
                    Action::Stop => "stopped",
                    Action::Start | Action::Restart => "running/healthy",
                },
                observed: self.last_observation(name),
                waited: started.elapsed(),
            }),
        }
    }

    /// 조건을 `required`회 연속 만족할 때까지 고정 간격으로 폴링합니다.
    async fn wait_for(
        &mut self,
        name: &str,
        expected: &'static str,
        required: u32,
        started: Instant,
        deadline: Instant,
        satisfied: impl Fn(&InstanceObservation) -> bool,
    ) -> Result<InstanceObservation, NodeControlError> {
        let mut consecutive = 0u32;
        loop {
            let obs = self.observe(name).await?;
            if satisfied(&obs) {
                consecutive += 1;
                if consecutive >= required {
                    return Ok(obs);
                }
            } else {
                consecutive = 0;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(NodeControlError::LifecycleTimeout {
                    instance: name.to_owned(),
                    expected,
                    observed: obs,
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    fn finish(
        &self,
        name: &str,
        action: Action,
        started: Instant,
        result: Result<(), NodeControlError>,
    ) -> Result<(), NodeControlError> {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            m::LIFECYCLE_OPS_TOTAL,
            m::LABEL_ACTION => action.as_str(),
            m::LABEL_RESULT => outcome
        )
        .increment(1);

        match &result {
            Ok(()) => info!(
                instance = name,
                action = action.as_str(),
                elapsed_ms = millis(started.elapsed()),
                "lifecycle change verified"
            ),
            Err(e) => warn!(
                instance = name,
                action = action.as_str(),
                error = %e,
                "lifecycle change not verified"
            ),
        }
        result
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
