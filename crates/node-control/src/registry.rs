//! 인스턴스 레지스트리
//!
//! [`InstanceRegistry`]는 하네스가 제어하는 인스턴스 목록과 마지막으로 검증된
//! 상태를 보관합니다. 갱신 메서드는 크레이트 내부 전용이므로 노드 제어기만
//! 상태를 기록할 수 있고, 다른 컴포넌트는 읽기 전용 참조만 얻습니다.

use std::collections::BTreeMap;
use std::time::SystemTime;

use failstorm_core::config::InstancesConfig;
use failstorm_core::types::{InstanceObservation, ManagedInstance, Role};

/// 이름순으로 정렬된 인스턴스 레지스트리
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<String, ManagedInstance>,
}

impl InstanceRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정의 역할별 인스턴스 목록으로 레지스트리를 구성합니다.
    ///
    /// 모든 인스턴스는 관측 전 상태(`unknown/unknown`)로 시작합니다.
    pub fn from_config(config: &InstancesConfig) -> Self {
        let mut registry = Self::new();
        for (name, role) in config.all() {
            registry.register(ManagedInstance::new(name, role));
        }
        registry
    }

    /// 이름으로 인스턴스를 조회합니다.
    pub fn get(&self, name: &str) -> Option<&ManagedInstance> {
        self.instances.get(name)
    }

    /// 등록 여부를 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// 모든 인스턴스를 이름순으로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedInstance> {
        self.instances.values()
    }

    /// 특정 역할의 인스턴스 목록을 반환합니다.
    pub fn by_role(&self, role: Role) -> Vec<&ManagedInstance> {
        self.instances.values().filter(|i| i.role == role).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub(crate) fn register(&mut self, instance: ManagedInstance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    /// 새로 관측한 상태를 기록합니다. 등록되지 않은 이름은 무시합니다.
    pub(crate) fn record(&mut self, name: &str, observation: InstanceObservation, at: SystemTime) {
        if let Some(instance) = self.instances.get_mut(name) {
            instance.lifecycle = observation.lifecycle;
            instance.health = observation.health;
            instance.observed_at = Some(at);
        }
    }
}
