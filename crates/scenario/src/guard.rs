//! 기한 보호 실행기
//!
//! [`TimeoutGuard`]는 데이터 플레인 호출을 별도 태스크에서 실행하고, 호출자는
//! 최대 기한까지만 기다립니다. 기한이 지나면 호출자는 즉시 `TimedOut`을 받고,
//! 진행 중인 호출은 강제로 종료되지 않은 채 계속 실행되다가 결과가 도착하면
//! 폐기됩니다.
//!
//! # 동시성
//! 동시에 실행 중인 호출 수는 세마포어로 제한됩니다. 허가는 실제 호출이 끝날
//! 때 반환되므로, 멈춘 호출이 쌓여도 태스크 수가 무한히 늘지 않습니다. 빈 슬롯을
//! 기한 내에 얻지 못하면 그 호출도 `TimedOut`입니다.
//!
//! # 결과 유일성
//! 결과는 oneshot 채널 하나로만 전달되므로 호출당 정확히 하나의
//! [`TimeoutOutcome`]이 만들어집니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use failstorm_core::metrics as m;

use crate::error::DataPlaneError;

/// 기한 보호 호출의 결과
#[derive(Debug)]
pub enum TimeoutOutcome<T> {
    /// 기한 내에 값을 반환함
    Completed(T),
    /// 기한 초과 (슬롯 대기 포함)
    TimedOut,
    /// 기한 내에 명시적 에러를 반환함
    Failed(DataPlaneError),
}

impl<T> TimeoutOutcome<T> {
    /// 메트릭/출력용 고정 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// 크기가 제한된 기한 보호 실행기
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    slots: Arc<Semaphore>,
    max_in_flight: usize,
}

impl TimeoutGuard {
    /// 동시 실행 최대 `max_in_flight`개의 실행기를 생성합니다 (최소 1).
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// 현재 비어 있는 슬롯 수
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// `op`가 만든 future를 별도 태스크에서 실행하고 최대 `deadline`까지 기다립니다.
    pub async fn run<F, Fut, T>(&self, deadline: Duration, op: F) -> TimeoutOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DataPlaneError>> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();

        let permit =
            match tokio::time::timeout(deadline, Arc::clone(&self.slots).acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => return TimeoutOutcome::Failed(DataPlaneError::Aborted),
                Err(_elapsed) => {
                    warn!(
                        max_in_flight = self.max_in_flight,
                        "no free probe slot before deadline"
                    );
                    return TimeoutOutcome::TimedOut;
                }
            };

        let (tx, rx) = oneshot::channel();
        let call = op();
        tokio::spawn(async move {
            let result = call.await;
            drop(permit);
            if tx.send(result).is_err() {
                metrics::counter!(m::PROBE_RESULTS_DISCARDED_TOTAL).increment(1);
                debug!("probe finished after deadline, result discarded");
            }
        });

        let remaining = deadline.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, rx).await {
            Ok(Ok(Ok(value))) => TimeoutOutcome::Completed(value),
            Ok(Ok(Err(e))) => TimeoutOutcome::Failed(e),
            Ok(Err(_recv)) => TimeoutOutcome::Failed(DataPlaneError::Aborted),
            Err(_elapsed) => TimeoutOutcome::TimedOut,
        }
    }
}
