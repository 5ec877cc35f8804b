//! JSON 파일 저장소
//!
//! 설정 디렉토리 하나에 대한 읽기/쓰기. 모든 에러는 파일 경로를 포함한
//! `Error::Config`로 돌려줍니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// 글로벌/프로젝트 설정 디렉토리 이름
pub const APP_DIR_NAME: &str = "shellrelay";

/// Directory of JSON files (global `~/.config/shellrelay/` or a project's
/// `.shellrelay/`)
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Store rooted at an explicit directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 글로벌 설정 (~/.config/shellrelay/)
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|base| Self::at(base.join(APP_DIR_NAME)))
            .ok_or_else(|| Error::Config("no user configuration directory".to_string()))
    }

    /// 프로젝트 설정 (<root>/.shellrelay/)
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::at(root.as_ref().join(format!(".{}", APP_DIR_NAME)))
    }

    /// 현재 디렉토리를 프로젝트 루트로 사용
    pub fn current_project() -> Result<Self> {
        std::env::current_dir()
            .map(Self::project)
            .map_err(|e| Error::Config(format!("cannot resolve current directory: {}", e)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn contains(&self, file: &str) -> bool {
        self.path_of(file).is_file()
    }

    /// Read `file`; a missing file is `Ok(None)`, a broken one is an error
    pub fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path_of(file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(config_error("read", &path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| config_error("parse", &path, e))
    }

    /// Read `file`, which must exist
    pub fn read_required<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        self.read(file)?.ok_or_else(|| {
            Error::Config(format!("{} does not exist", self.path_of(file).display()))
        })
    }

    /// Write `value` as pretty JSON. The file is replaced by rename, so a
    /// reader never sees it half written.
    pub fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| config_error("create", &self.dir, e))?;

        let path = self.path_of(file);
        let staging = self.path_of(&format!(".{}.tmp", file));
        let mut bytes =
            serde_json::to_vec_pretty(value).map_err(|e| config_error("encode", &path, e))?;
        bytes.push(b'\n');

        std::fs::write(&staging, bytes).map_err(|e| config_error("write", &staging, e))?;
        std::fs::rename(&staging, &path).map_err(|e| config_error("replace", &path, e))
    }
}

fn config_error(action: &str, path: &Path, cause: impl std::fmt::Display) -> Error {
    Error::Config(format!("failed to {} {}: {}", action, path.display(), cause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_creates_dir_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::at(dir.path().join("nested"));
        let sample = Sample {
            name: "relay".to_string(),
            count: 3,
        };

        store.write("sample.json", &sample).unwrap();

        assert!(store.contains("sample.json"));
        assert!(!store.contains(".sample.json.tmp"));
        let loaded: Sample = store.read_required("sample.json").unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::at(dir.path());

        let loaded: Option<Sample> = store.read("missing.json").unwrap();
        assert!(loaded.is_none());

        let err = store.read_required::<Sample>("missing.json").unwrap_err();
        assert!(err.to_string().contains("missing.json does not exist"));
    }

    #[test]
    fn test_broken_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = JsonStore::at(dir.path());

        match store.read::<Sample>("bad.json") {
            Err(Error::Config(message)) => {
                assert!(message.starts_with("failed to parse"));
                assert!(message.contains("bad.json"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_project_dir() {
        let store = JsonStore::project("/tmp/work");
        assert_eq!(store.dir(), Path::new("/tmp/work/.shellrelay"));
        assert_eq!(
            store.path_of("relay.json"),
            Path::new("/tmp/work/.shellrelay/relay.json")
        );
    }
}
