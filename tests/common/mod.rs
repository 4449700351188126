#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::Url;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use typst_gateway::config::ServerConfig;
use typst_gateway::typst::{
    CompileError, TypstCompiler, DATA_FILE_NAME, OUTPUT_FILE_NAME, SOURCE_FILE_NAME,
};
use typst_gateway::AppState;

/// Create a directory bucket holding `files` and return it with its `file://` URL.
pub fn setup_test_bucket(files: &[(&str, &[u8])]) -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("failed to create bucket dir");
    for (key, contents) in files {
        let path = dir.path().join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create key dir");
        }
        std::fs::write(&path, contents).expect("failed to write object");
    }
    let url = Url::from_directory_path(dir.path())
        .expect("bucket dir is absolute")
        .to_string();
    (dir, url)
}

/// What the fake compiler does with a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Emit a deterministic "PDF" built from the inputs.
    Echo,
    /// Fail like typst does on a syntax error.
    Reject,
}

/// Stand-in for typst that never leaves the process.
pub struct FakeCompiler {
    behavior: FakeBehavior,
    executable: &'static str,
    calls: AtomicUsize,
}

impl FakeCompiler {
    pub fn echo() -> Self {
        Self::new(FakeBehavior::Echo, "sh")
    }

    pub fn rejecting() -> Self {
        Self::new(FakeBehavior::Reject, "sh")
    }

    /// Reports an executable that cannot exist on `PATH`.
    pub fn missing() -> Self {
        Self::new(FakeBehavior::Echo, "typst-gateway-missing-compiler")
    }

    fn new(behavior: FakeBehavior, executable: &'static str) -> Self {
        Self {
            behavior,
            executable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub const FAKE_DIAGNOSTIC: &str = "error: expected expression\n  ┌─ main.typ:1:2";

#[async_trait]
impl TypstCompiler for FakeCompiler {
    async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            FakeBehavior::Reject => Err(CompileError::Failed(FAKE_DIAGNOSTIC.to_string())),
            FakeBehavior::Echo => {
                let mut pdf = b"%PDF-1.7\n".to_vec();
                pdf.extend(std::fs::read(work_dir.join(SOURCE_FILE_NAME)).map_err(CompileError::ReadOutput)?);
                if let Ok(data) = std::fs::read(work_dir.join(DATA_FILE_NAME)) {
                    pdf.extend_from_slice(b"\n%data\n");
                    pdf.extend(data);
                }
                std::fs::write(work_dir.join(OUTPUT_FILE_NAME), pdf).map_err(CompileError::ReadOutput)?;
                Ok(())
            }
        }
    }

    fn executable(&self) -> &str {
        self.executable
    }
}

pub fn test_state(bucket_url: &str, compiler: Arc<dyn TypstCompiler>) -> AppState {
    AppState::new(ServerConfig::new(bucket_url), compiler)
}
