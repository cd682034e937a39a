//! Container runtime abstraction for lifecycle control.
//!
//! The [`RuntimeClient`] trait is the node lifecycle control interface the
//! controller consumes. Production code uses [`BollardRuntimeClient`]; unit
//! tests use `MockRuntimeClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐
//! │ NodeController │
//! └───────┬────────┘
//!         │
//!         ▼
//!  ┌──────────────┐
//!  │RuntimeClient │ (trait)
//!  └──────────────┘
//!       │     │
//!       ▼     ▼
//!  ┌───────┐ ┌────┐
//!  │Bollard│ │Mock│
//!  └───┬───┘ └────┘
//!      │
//!      ▼
//!  Docker Daemon
//! ```
//!
//! # Instance Name Validation
//!
//! Every method that takes an instance name validates it before calling the
//! runtime: 1-128 characters, first character alphanumeric, the rest
//! alphanumeric or one of `_`, `.`, `-`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use failstorm_core::types::{HealthState, InstanceObservation, LifecycleState};
use futures::StreamExt;

use crate::error::NodeControlError;

const MAX_INSTANCE_NAME_LEN: usize = 128;

/// Validates a container name before it reaches the runtime API.
pub fn validate_instance_name(name: &str) -> Result<(), NodeControlError> {
    if name.is_empty() || name.len() > MAX_INSTANCE_NAME_LEN {
        return Err(NodeControlError::InstanceNotFound(format!(
            "invalid instance name: length {} (must be 1-{MAX_INSTANCE_NAME_LEN})",
            name.len()
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok {
        return Err(NodeControlError::InstanceNotFound(format!(
            "invalid instance name: '{name}'"
        )));
    }
    Ok(())
}

/// Keeps lines containing any keyword (case-insensitive).
///
/// An empty keyword list keeps every line.
pub fn filter_lines(lines: Vec<String>, keywords: &[String]) -> Vec<String> {
    if keywords.is_empty() {
        return lines;
    }
    let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    lines
        .into_iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            needles.iter().any(|k| lower.contains(k.as_str()))
        })
        .collect()
}

/// Trait abstracting the container runtime's lifecycle operations.
///
/// # Error Handling
///
/// - **404**: `NodeControlError::InstanceNotFound`
/// - **304** (already in the requested state): treated as success
/// - **Transport failures**: `NodeControlError::ControlUnavailable`
/// - **Other rejections**: `NodeControlError::Runtime`
pub trait RuntimeClient: Send + Sync + 'static {
    /// Requests the runtime to stop an instance.
    ///
    /// Returning `Ok` only means the request was accepted; callers verify
    /// the resulting state with [`inspect`](Self::inspect).
    fn stop(&self, name: &str) -> impl Future<Output = Result<(), NodeControlError>> + Send;

    /// Requests the runtime to start an instance.
    fn start(&self, name: &str) -> impl Future<Output = Result<(), NodeControlError>> + Send;

    /// Observes the current lifecycle and health state of an instance.
    fn inspect(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<InstanceObservation, NodeControlError>> + Send;

    /// Returns the last `tail` log lines, filtered by `keywords`.
    fn logs(
        &self,
        name: &str,
        tail: usize,
        keywords: &[String],
    ) -> impl Future<Output = Result<Vec<String>, NodeControlError>> + Send;

    /// Checks runtime connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), NodeControlError>> + Send;
}

/// Production runtime client using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for sharing across async tasks.
///
/// ```ignore
/// use failstorm_node_control::BollardRuntimeClient;
///
/// let client = BollardRuntimeClient::connect_local(Duration::from_secs(120))?
///     .with_stop_grace(Duration::from_secs(10));
/// client.stop("milvus-querynode1").await?;
/// # Ok::<(), failstorm_node_control::NodeControlError>(())
/// ```
pub struct BollardRuntimeClient {
    docker: Arc<bollard::Docker>,
    stop_grace: Duration,
}

impl BollardRuntimeClient {
    /// Connects using the platform's default local socket.
    pub fn connect_local(request_timeout: Duration) -> Result<Self, NodeControlError> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| {
                NodeControlError::ControlUnavailable(format!("failed to connect to docker: {e}"))
            })?
            .with_timeout(request_timeout);
        Ok(Self {
            docker: Arc::new(docker),
            stop_grace: Duration::from_secs(10),
        })
    }

    /// Connects using a specific socket path.
    pub fn connect_with_socket(
        socket_path: &str,
        request_timeout: Duration,
    ) -> Result<Self, NodeControlError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            request_timeout.as_secs(),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            NodeControlError::ControlUnavailable(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
            stop_grace: Duration::from_secs(10),
        })
    }

    /// Connects to `socket_path`, or the local defaults when it is empty.
    pub fn connect(socket_path: &str, request_timeout: Duration) -> Result<Self, NodeControlError> {
        if socket_path.is_empty() {
            Self::connect_local(request_timeout)
        } else {
            Self::connect_with_socket(socket_path, request_timeout)
        }
    }

    /// Sets the grace period the runtime waits before killing a stopping instance.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Maps a bollard error for an instance-level request.
///
/// `Ok(())` means the runtime reported the instance already in the
/// requested state.
fn map_request_error(
    err: bollard::errors::Error,
    name: &str,
    action: &'static str,
) -> Result<(), NodeControlError> {
    use bollard::errors::Error as BollardError;

    match err {
        BollardError::DockerResponseServerError { status_code, .. } if status_code == 304 => {
            Ok(())
        }
        BollardError::DockerResponseServerError { status_code, .. } if status_code == 404 => {
            Err(NodeControlError::InstanceNotFound(name.to_owned()))
        }
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Err(NodeControlError::Runtime {
            instance: name.to_owned(),
            action,
            reason: format!("{status_code}: {message}"),
        }),
        other => Err(NodeControlError::ControlUnavailable(format!(
            "{action} '{name}' failed: {other}"
        ))),
    }
}

fn lifecycle_from_status(status: Option<bollard::models::ContainerStateStatusEnum>) -> LifecycleState {
    use bollard::models::ContainerStateStatusEnum as S;

    match status {
        Some(S::RUNNING) => LifecycleState::Running,
        Some(S::EXITED | S::DEAD | S::CREATED) => LifecycleState::Stopped,
        Some(S::RESTARTING) => LifecycleState::Starting,
        Some(S::REMOVING) => LifecycleState::Stopping,
        Some(S::PAUSED | S::EMPTY) | None => LifecycleState::Unknown,
    }
}

fn health_from_status(status: Option<bollard::models::HealthStatusEnum>) -> HealthState {
    use bollard::models::HealthStatusEnum as H;

    match status {
        Some(H::HEALTHY) => HealthState::Healthy,
        Some(H::UNHEALTHY | H::STARTING) => HealthState::Unhealthy,
        Some(H::NONE | H::EMPTY) | None => HealthState::Unknown,
    }
}

impl RuntimeClient for BollardRuntimeClient {
    async fn stop(&self, name: &str) -> Result<(), NodeControlError> {
        validate_instance_name(name)?;

        use bollard::container::StopContainerOptions;

        let t = i64::try_from(self.stop_grace.as_secs()).unwrap_or(i64::MAX);
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_request_error(e, name, "stop"),
        }
    }

    async fn start(&self, name: &str) -> Result<(), NodeControlError> {
        validate_instance_name(name)?;

        use bollard::container::StartContainerOptions;

        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_request_error(e, name, "start"),
        }
    }

    async fn inspect(&self, name: &str) -> Result<InstanceObservation, NodeControlError> {
        validate_instance_name(name)?;

        let details = match self.docker.inspect_container(name, None).await {
            Ok(details) => details,
            Err(e) => {
                map_request_error(e, name, "inspect")?;
                // 304 on inspect is not meaningful; report nothing observed
                return Ok(InstanceObservation::new(
                    LifecycleState::Unknown,
                    HealthState::Unknown,
                ));
            }
        };

        let state = details.state.unwrap_or_default();
        let lifecycle = lifecycle_from_status(state.status);
        let health = health_from_status(state.health.and_then(|h| h.status));
        Ok(InstanceObservation::new(lifecycle, health))
    }

    async fn logs(
        &self,
        name: &str,
        tail: usize,
        keywords: &[String],
    ) -> Result<Vec<String>, NodeControlError> {
        validate_instance_name(name)?;

        use bollard::container::LogsOptions;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let output = match chunk {
                Ok(output) => output,
                Err(e) => {
                    map_request_error(e, name, "logs")?;
                    break;
                }
            };
            let bytes = output.into_bytes();
            let text = String::from_utf8_lossy(&bytes);
            lines.extend(
                text.lines()
                    .map(str::trim_end)
                    .filter(|l| !l.is_empty())
                    .map(str::to_owned),
            );
        }

        Ok(filter_lines(lines, keywords))
    }

    async fn ping(&self) -> Result<(), NodeControlError> {
        self.docker
            .ping()
            .await
            .map_err(|e| NodeControlError::ControlUnavailable(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 런타임 클라이언트
///
/// 인스턴스 상태를 메모리에 보관하고, stop/start 요청에 따라 상태를 전이시킵니다.
/// start 이후의 헬스 변화는 `with_start_health`로 미리 정한 순서대로 관측됩니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntimeClient {
    instances: tokio::sync::Mutex<std::collections::HashMap<String, MockInstance>>,
    calls: tokio::sync::Mutex<Vec<String>>,
    unreachable: bool,
    stuck_stop: bool,
}

#[cfg(test)]
#[derive(Default)]
struct MockInstance {
    observation: Option<InstanceObservation>,
    start_health: Vec<HealthState>,
    pending_health: std::collections::VecDeque<HealthState>,
    logs: Vec<String>,
}

#[cfg(test)]
impl MockRuntimeClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 상태를 가진 인스턴스를 추가합니다.
    pub fn with_instance(mut self, name: &str, observation: InstanceObservation) -> Self {
        self.instances
            .get_mut()
            .entry(name.to_owned())
            .or_default()
            .observation = Some(observation);
        self
    }

    /// start 이후 inspect마다 차례로 관측될 헬스 상태를 설정합니다.
    ///
    /// 목록이 소진되면 마지막 값이 유지됩니다.
    pub fn with_start_health(mut self, name: &str, sequence: Vec<HealthState>) -> Self {
        self.instances
            .get_mut()
            .entry(name.to_owned())
            .or_default()
            .start_health = sequence;
        self
    }

    /// 인스턴스 로그를 설정합니다.
    pub fn with_logs(mut self, name: &str, lines: &[&str]) -> Self {
        self.instances
            .get_mut()
            .entry(name.to_owned())
            .or_default()
            .logs = lines.iter().map(|l| (*l).to_owned()).collect();
        self
    }

    /// 모든 호출이 제어 채널 불가로 실패하도록 설정합니다.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// stop 요청은 수락하지만 인스턴스가 실제로 멈추지 않도록 설정합니다.
    pub fn with_stuck_stop(mut self) -> Self {
        self.stuck_stop = true;
        self
    }

    /// 지금까지 받은 요청 목록 ("stop:name", "start:name")
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    fn check_reachable(&self) -> Result<(), NodeControlError> {
        if self.unreachable {
            return Err(NodeControlError::ControlUnavailable(
                "mock runtime unreachable".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
impl RuntimeClient for MockRuntimeClient {
    async fn stop(&self, name: &str) -> Result<(), NodeControlError> {
        self.check_reachable()?;
        self.calls.lock().await.push(format!("stop:{name}"));
        let mut instances = self.instances.lock().await;
        let inst = instances
            .get_mut(name)
            .filter(|i| i.observation.is_some())
            .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
        if !self.stuck_stop {
            inst.observation = Some(InstanceObservation::new(
                LifecycleState::Stopped,
                HealthState::Unknown,
            ));
            inst.pending_health.clear();
        }
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), NodeControlError> {
        self.check_reachable()?;
        self.calls.lock().await.push(format!("start:{name}"));
        let mut instances = self.instances.lock().await;
        let inst = instances
            .get_mut(name)
            .filter(|i| i.observation.is_some())
            .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
        inst.pending_health = inst.start_health.iter().copied().collect();
        let first = inst.pending_health.front().copied().unwrap_or(HealthState::Healthy);
        inst.observation = Some(InstanceObservation::new(LifecycleState::Running, first));
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<InstanceObservation, NodeControlError> {
        self.check_reachable()?;
        let mut instances = self.instances.lock().await;
        let inst = instances
            .get_mut(name)
            .filter(|i| i.observation.is_some())
            .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
        if let Some(health) = inst.pending_health.pop_front() {
            if let Some(obs) = inst.observation.as_mut() {
                obs.health = health;
            }
        }
        inst.observation
            .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))
    }

    async fn logs(
        &self,
        name: &str,
        tail: usize,
        keywords: &[String],
    ) -> Result<Vec<String>, NodeControlError> {
        self.check_reachable()?;
        let instances = self.instances.lock().await;
        let inst = instances
            .get(name)
            .ok_or_else(|| NodeControlError::InstanceNotFound(name.to_owned()))?;
        let skip = inst.logs.len().saturating_sub(tail);
        let lines = inst.logs.iter().skip(skip).cloned().collect();
        Ok(filter_lines(lines, keywords))
    }

    async fn ping(&self) -> Result<(), NodeControlError> {
        self.check_reachable()
    }
}
