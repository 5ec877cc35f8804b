//! Storage module for ShellRelay
//!
//! - `json`: JSON - 범용 파일 저장/로드 (설정 파일)

mod json;

// JSON Storage (범용)
pub use json::{JsonStore, APP_DIR_NAME};
