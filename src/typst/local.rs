//! Compiler backed by a locally installed `typst` binary.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use super::{combined_output, CompileError, TypstCompiler, OUTPUT_FILE_NAME, SOURCE_FILE_NAME};

/// Runs `typst compile main.typ output.pdf` inside the workspace.
#[derive(Debug, Clone)]
pub struct LocalTypstCompiler {
    binary: String,
}

impl LocalTypstCompiler {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for LocalTypstCompiler {
    fn default() -> Self {
        Self::new("typst")
    }
}

#[async_trait]
impl TypstCompiler for LocalTypstCompiler {
    async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
        let source_path = work_dir.join(SOURCE_FILE_NAME);
        let output_path = work_dir.join(OUTPUT_FILE_NAME);

        // The child dies with the request if the client goes away mid-compile.
        let output = Command::new(&self.binary)
            .arg("compile")
            .arg(&source_path)
            .arg(&output_path)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CompileError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompileError::Failed(combined_output(&output)));
        }

        Ok(())
    }

    fn executable(&self) -> &str {
        &self.binary
    }
}
