//! 실행별 고유 키 접두어
//!
//! 프로브 레코드 ID는 `{seed}_{nonce}_{phase}_{index}` 형식입니다.
//! nonce는 실행마다 새로 생성되므로 연속 실행 간에 레코드가 충돌하지 않고,
//! 검색/조회도 이 접두어로 필터링되어 다른 실행의 데이터를 관측하지 않습니다.
//!
//! 무작위 장애 대상도 접두어로 시드한 난수로 고르므로, 같은 접두어는 항상
//! 같은 대상 순서를 재현합니다.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 한 번의 시나리오 실행에 할당된 키 접두어
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// 시드 뒤에 새 nonce를 붙여 접두어를 생성합니다.
    pub fn generate(seed: &str) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self(format!("{seed}_{}", &nonce[..NONCE_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 이 실행의 레코드 ID가 공통으로 갖는 접두어 (`{prefix}_`)
    pub fn id_prefix(&self) -> String {
        format!("{}_", self.0)
    }

    /// 단계별 레코드 ID
    pub fn record_id(&self, phase: &str, index: usize) -> String {
        format!("{}_{phase}_{index}", self.0)
    }

    /// 접두어 문자열의 FNV-1a 해시 (프로세스/플랫폼 간 안정적)
    pub fn seed(&self) -> u64 {
        self.0.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
    }

    /// 이 접두어로 시드한 난수 생성기
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed())
    }

    /// 이 실행이 만든 레코드 ID인지 확인합니다.
    pub fn owns(&self, id: &str) -> bool {
        id.strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
