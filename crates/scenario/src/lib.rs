//! # failstorm-scenario
//!
//! 장애 주입 시나리오를 실행하고 결과를 집계합니다.
//!
//! - [`ScenarioEngine`]: 단계별 생명주기 변경 → 프로브 → 분류
//! - [`TimeoutGuard`]: 데이터 플레인 호출의 기한 보호 실행기
//! - [`DataPlaneClient`]: insert/search/query 인터페이스와 Milvus REST 구현
//! - [`RunSummary`]: 완료된 실행의 요약
//! - [`SuiteReport`]: 여러 시나리오 실행의 묶음 보고서

pub mod dataplane;
pub mod definition;
pub mod engine;
pub mod error;
pub mod guard;
pub mod key;
pub mod report;
pub mod run;

pub use dataplane::{DataPlaneClient, MilvusRestClient, Record, SearchHit, SearchRequest};
pub use definition::{
    BUILTIN_SCENARIOS, LifecycleMutation, PhaseSpec, ProbeSpec, ScenarioDefinition, builtin,
    find_builtin, load_scenario_from_file, parse_scenario,
};
pub use engine::{EngineSettings, ScenarioEngine};
pub use error::{DataPlaneError, ScenarioError};
pub use guard::{TimeoutGuard, TimeoutOutcome};
pub use key::KeyPrefix;
pub use report::{
    PhaseSummary, RunReport, RunSummary, StepCounts, SuiteReport, write_report, write_suite_report,
};
pub use run::{DegradedTally, ScenarioRun, ScenarioStep, StepStatus, Verdict};
