//! Relay Config - 통합 설정
//!
//! 실행 표면 종류, 준비 대기 타임아웃, 목록 미리보기 길이 등을 관리합니다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 설정 파일명
pub const RELAY_CONFIG_FILE: &str = "relay.json";

// ============================================================================
// Surface Kind
// ============================================================================

/// Where submitted commands are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    /// Pseudo-terminal per task; interrupt is a Ctrl-C keystroke
    Pty,
    /// Plain child process per task; interrupt is SIGINT
    #[default]
    Process,
}

impl SurfaceKind {
    /// 문자열에서 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pty" | "terminal" => Some(Self::Pty),
            "process" | "local" => Some(Self::Process),
            _ => None,
        }
    }
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceKind::Pty => write!(f, "pty"),
            SurfaceKind::Process => write!(f, "process"),
        }
    }
}

// ============================================================================
// PTY Settings
// ============================================================================

/// PTY 크기 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtySettings {
    #[serde(default = "default_rows")]
    pub rows: u16,

    #[serde(default = "default_cols")]
    pub cols: u16,
}

impl Default for PtySettings {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
        }
    }
}

// ============================================================================
// Relay Config (통합)
// ============================================================================

/// ShellRelay 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// 실행 표면 종류
    #[serde(default)]
    pub surface: SurfaceKind,

    /// 명령 실행에 사용할 쉘 (None이면 $SHELL 또는 /bin/sh)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// 채널 준비 대기 시간 (ms)
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    /// 목록에서 보여줄 명령어 미리보기 길이 (문자 수)
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,

    /// PTY 크기
    #[serde(default)]
    pub pty: PtySettings,

    /// PTY 출력에서 ANSI escape 제거
    #[serde(default = "default_true")]
    pub strip_ansi: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            surface: SurfaceKind::default(),
            shell: None,
            readiness_timeout_ms: default_readiness_timeout_ms(),
            preview_length: default_preview_length(),
            pty: PtySettings::default(),
            strip_ansi: true,
        }
    }
}

// ============================================================================
// Config Overlay (부분 설정)
// ============================================================================

/// One configuration file as written: only the keys it actually sets.
///
/// Layers are applied in order (global, then project); a key a layer leaves
/// out keeps the value from below, a key it sets always wins, even when the
/// value equals the default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverlay {
    pub surface: Option<SurfaceKind>,
    pub shell: Option<String>,
    pub readiness_timeout_ms: Option<u64>,
    pub preview_length: Option<usize>,
    pub pty: Option<PtyOverlay>,
    pub strip_ansi: Option<bool>,
}

/// PTY 크기 중 설정된 값만
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyOverlay {
    pub rows: Option<u16>,
    pub cols: Option<u16>,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Ok(global) = JsonStore::global() {
            layers.push(global);
        }
        if let Ok(project) = JsonStore::current_project() {
            layers.push(project);
        }
        Self::load_layers(&layers)
    }

    /// Defaults, then each store's `relay.json` in order (later wins)
    pub fn load_layers(layers: &[JsonStore]) -> Result<Self> {
        let mut config = Self::new();

        for store in layers {
            if let Some(overlay) = store.read::<ConfigOverlay>(RELAY_CONFIG_FILE)? {
                debug!("Applying config from {}", store.dir().display());
                config.apply(overlay);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 지정한 파일에서 로드 (병합 없음)
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid config path: {}", path.display())))?;

        let config: RelayConfig = JsonStore::at(dir).read_required(filename)?;
        config.validate()?;
        Ok(config)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        JsonStore::current_project()?.write(RELAY_CONFIG_FILE, self)
    }

    /// 설정 파일 하나를 덮어씀 (설정된 키만)
    pub fn apply(&mut self, overlay: ConfigOverlay) {
        if let Some(surface) = overlay.surface {
            self.surface = surface;
        }
        if let Some(shell) = overlay.shell {
            self.shell = Some(shell);
        }
        if let Some(ms) = overlay.readiness_timeout_ms {
            self.readiness_timeout_ms = ms;
        }
        if let Some(len) = overlay.preview_length {
            self.preview_length = len;
        }
        if let Some(pty) = overlay.pty {
            self.pty.rows = pty.rows.unwrap_or(self.pty.rows);
            self.pty.cols = pty.cols.unwrap_or(self.pty.cols);
        }
        if let Some(strip) = overlay.strip_ansi {
            self.strip_ansi = strip;
        }
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.preview_length == 0 {
            return Err(Error::Config("previewLength must be at least 1".to_string()));
        }
        if self.pty.rows == 0 || self.pty.cols == 0 {
            return Err(Error::Config("pty size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    /// 실제로 사용할 쉘 실행 파일
    pub fn resolved_shell(&self) -> String {
        if let Some(shell) = &self.shell {
            return shell.clone();
        }
        if cfg!(windows) {
            "powershell".to_string()
        } else {
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
        }
    }

    // Builder methods
    pub fn surface(mut self, surface: SurfaceKind) -> Self {
        self.surface = surface;
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn readiness_timeout_ms(mut self, ms: u64) -> Self {
        self.readiness_timeout_ms = ms;
        self
    }
}

fn default_readiness_timeout_ms() -> u64 {
    2000
}

fn default_preview_length() -> usize {
    50
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    120
}

fn default_true() -> bool {
    true
}
