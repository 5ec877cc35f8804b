//! Error types for ShellRelay
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ShellRelay 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    /// Unreadable, unwritable or invalid configuration (path included)
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 실행 표면 (terminal / process) 관련
    // ========================================================================
    /// No execution surface could be obtained at all
    #[error("No execution surface available: {0}")]
    SurfaceUnavailable(String),

    /// A channel was obtained but never reported readiness in time
    #[error("execution surface not available")]
    SurfaceNotReady,

    /// Failure while starting or reading from a channel
    #[error("Execution surface error: {0}")]
    Surface(String),

    // ========================================================================
    // 요청 검증
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// 호출자 실수나 환경 문제로, 그대로 돌려주면 되는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::SurfaceUnavailable(_))
    }

    /// 실행 표면 에러 생성 헬퍼
    pub fn surface(message: impl std::fmt::Display) -> Self {
        Error::Surface(message.to_string())
    }

    /// Short machine-readable kind, used by the wire protocol
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::SurfaceUnavailable(_) => "surface_unavailable",
            Error::SurfaceNotReady => "surface_not_ready",
            Error::Surface(_) => "surface",
            Error::InvalidInput(_) => "invalid_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_message() {
        assert_eq!(
            Error::SurfaceNotReady.to_string(),
            "execution surface not available"
        );
        assert_eq!(Error::SurfaceNotReady.kind(), "surface_not_ready");
    }

    #[test]
    fn test_user_facing() {
        assert!(Error::InvalidInput("empty".into()).is_user_facing());
        assert!(Error::SurfaceUnavailable("none".into()).is_user_facing());
        assert!(!Error::surface("read failed").is_user_facing());
        assert!(!Error::Config("bad file".into()).is_user_facing());
    }

    #[test]
    fn test_surface_helper() {
        let err = Error::surface(format!("channel {} closed", 7));
        assert_eq!(err.kind(), "surface");
        assert_eq!(err.to_string(), "Execution surface error: channel 7 closed");
    }
}
