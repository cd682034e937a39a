//! 메트릭 상수
//!
//! 모든 메트릭 이름과 레이블 키를 중앙에서 정의합니다.
//! 각 크레이트는 이 상수로 `metrics::counter!()`, `metrics::histogram!()`을 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `failstorm_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

/// 생명주기 액션 레이블 키 (stop, start, restart)
pub const LABEL_ACTION: &str = "action";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 프로브 종류 레이블 키 (insert, search, verify)
pub const LABEL_PROBE_KIND: &str = "kind";

/// 프로브 결과 레이블 키 (completed, timed_out, failed)
pub const LABEL_OUTCOME: &str = "outcome";

/// 노드 제어: 생명주기 요청 수 (counter, labels: action, result)
pub const LIFECYCLE_OPS_TOTAL: &str = "failstorm_lifecycle_ops_total";

/// 노드 제어: 상태 폴링 수 (counter)
pub const LIFECYCLE_POLLS_TOTAL: &str = "failstorm_lifecycle_polls_total";

/// 가드 실행기: 프로브 수 (counter, labels: kind, outcome)
pub const PROBES_TOTAL: &str = "failstorm_probes_total";

/// 가드 실행기: 프로브 지연 시간 (histogram, 초)
pub const PROBE_DURATION_SECONDS: &str = "failstorm_probe_duration_seconds";

/// 가드 실행기: 기한 초과 후 폐기된 결과 수 (counter)
pub const PROBE_RESULTS_DISCARDED_TOTAL: &str = "failstorm_probe_results_discarded_total";

/// 시나리오: 완료된 실행 수 (counter, label: verdict)
pub const SCENARIO_RUNS_TOTAL: &str = "failstorm_scenario_runs_total";

/// 판정 레이블 키 (pass, partial, fail)
pub const LABEL_VERDICT: &str = "verdict";
