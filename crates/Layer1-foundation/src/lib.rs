//! # relay-foundation
//!
//! Foundation layer for ShellRelay:
//! - Error: 중앙 에러 타입 (`Error`, `Result`)
//! - Storage: JsonStore (글로벌/프로젝트 설정 파일)
//! - Config: RelayConfig (실행 표면, 준비 대기 타임아웃, 미리보기 길이)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    ConfigOverlay, PtyOverlay, PtySettings, RelayConfig, SurfaceKind, RELAY_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, APP_DIR_NAME};
