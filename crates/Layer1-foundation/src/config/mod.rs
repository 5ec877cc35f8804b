//! Config - 통합 설정 관리
//!
//! - `relay.rs` - RelayConfig 통합 설정 (실행 표면, 타임아웃, 목록 미리보기)
//!   and ConfigOverlay, one layered config file

mod relay;

pub use relay::{
    ConfigOverlay, PtyOverlay, PtySettings, RelayConfig, SurfaceKind, RELAY_CONFIG_FILE,
};
