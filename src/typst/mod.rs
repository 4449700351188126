//! Typst compilation.
//!
//! Handles the low-level details of laying out a private workspace, invoking a
//! compiler against it, and reading back the produced PDF. The compiler itself is
//! pluggable through [`TypstCompiler`]:
//! - `local` - the `typst` binary on this host
//! - `container` - typst inside a throwaway, network-less container

pub mod container;
pub mod local;
pub mod lookup;

pub use container::ContainerTypstCompiler;
pub use local::LocalTypstCompiler;
pub use lookup::find_executable;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::io;
use std::path::Path;
use std::process::Output;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Name of the Typst source file in the work directory.
pub const SOURCE_FILE_NAME: &str = "main.typ";
/// Name of the compiled PDF in the work directory.
pub const OUTPUT_FILE_NAME: &str = "output.pdf";
/// Name of the JSON data file in the work directory.
pub const DATA_FILE_NAME: &str = "data.json";

/// Owner read/write only; templates and data may be sensitive.
#[cfg(unix)]
const FILE_PERMISSIONS: u32 = 0o600;
const WORKSPACE_PREFIX: &str = "typst-";

/// Errors that can occur while compiling a document.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to create temp dir: {0}")]
    TempDir(#[source] io::Error),
    #[error("failed to marshal data: {0}")]
    MarshalData(#[source] serde_json::Error),
    #[error("failed to write data file: {0}")]
    WriteData(#[source] io::Error),
    #[error("failed to write source file: {0}")]
    WriteSource(#[source] io::Error),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The compiler rejected the source. Holds its diagnostics verbatim.
    #[error("compile failed: {0}")]
    Failed(String),
    #[error("container {step} failed: {output}")]
    Container { step: &'static str, output: String },
    #[error("failed to read output PDF: {0}")]
    ReadOutput(#[source] io::Error),
}

/// A strategy for compiling the Typst workspace in `work_dir`.
///
/// Implementations read `work_dir/main.typ` (and `work_dir/data.json` when present)
/// and must leave the result at `work_dir/output.pdf`.
#[async_trait]
pub trait TypstCompiler: Send + Sync {
    async fn compile(&self, work_dir: &Path) -> Result<(), CompileError>;

    /// Program that has to be resolvable on `PATH` for this compiler to work.
    fn executable(&self) -> &str;
}

/// Compile `source` (plus optional `data`) into a PDF using `compiler`.
///
/// Everything happens inside a fresh temporary directory that is removed before
/// returning, whatever the outcome.
pub async fn compile_typst_with(
    compiler: &dyn TypstCompiler,
    source: &[u8],
    data: Option<&Map<String, Value>>,
) -> Result<Vec<u8>, CompileError> {
    let workspace = tempfile::Builder::new()
        .prefix(WORKSPACE_PREFIX)
        .tempdir()
        .map_err(CompileError::TempDir)?;
    debug!("Created workspace {}", workspace.path().display());

    let result = compile_in(compiler, workspace.path(), source, data).await;

    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!("Failed to remove workspace {}: {}", path.display(), e);
    }

    result
}

async fn compile_in(
    compiler: &dyn TypstCompiler,
    work_dir: &Path,
    source: &[u8],
    data: Option<&Map<String, Value>>,
) -> Result<Vec<u8>, CompileError> {
    if let Some(data) = data {
        let data_bytes = serde_json::to_vec_pretty(data).map_err(CompileError::MarshalData)?;
        write_private(&work_dir.join(DATA_FILE_NAME), &data_bytes)
            .await
            .map_err(CompileError::WriteData)?;
    }

    write_private(&work_dir.join(SOURCE_FILE_NAME), source)
        .await
        .map_err(CompileError::WriteSource)?;

    compiler.compile(work_dir).await?;

    fs::read(work_dir.join(OUTPUT_FILE_NAME))
        .await
        .map_err(CompileError::ReadOutput)
}

async fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_PERMISSIONS);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await
}

/// Stdout followed by stderr, the way a terminal would show them.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Copies the inputs into the "PDF" so tests can see what the compiler saw.
    struct EchoCompiler {
        seen_dir: Mutex<Option<PathBuf>>,
    }

    impl EchoCompiler {
        fn new() -> Self {
            Self {
                seen_dir: Mutex::new(None),
            }
        }

        fn seen_dir(&self) -> PathBuf {
            self.seen_dir.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl TypstCompiler for EchoCompiler {
        async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
            *self.seen_dir.lock().unwrap() = Some(work_dir.to_path_buf());

            let mut pdf = b"%PDF-1.7\n".to_vec();
            pdf.extend(std::fs::read(work_dir.join(SOURCE_FILE_NAME)).unwrap());
            if let Ok(data) = std::fs::read(work_dir.join(DATA_FILE_NAME)) {
                pdf.extend_from_slice(b"\n--data--\n");
                pdf.extend(data);
            }
            std::fs::write(work_dir.join(OUTPUT_FILE_NAME), pdf).unwrap();
            Ok(())
        }

        fn executable(&self) -> &str {
            "echo"
        }
    }

    struct RejectingCompiler {
        seen_dir: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl TypstCompiler for RejectingCompiler {
        async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
            *self.seen_dir.lock().unwrap() = Some(work_dir.to_path_buf());
            Err(CompileError::Failed(
                "error: unclosed delimiter\n  ┌─ main.typ:1:9".to_string(),
            ))
        }

        fn executable(&self) -> &str {
            "typst"
        }
    }

    /// Exits successfully without producing anything.
    #[derive(Default)]
    struct SilentCompiler {
        seen_dir: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl TypstCompiler for SilentCompiler {
        async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
            *self.seen_dir.lock().unwrap() = Some(work_dir.to_path_buf());
            Ok(())
        }

        fn executable(&self) -> &str {
            "true"
        }
    }

    /// Never finishes, like a compiler stuck on a runaway template.
    #[derive(Default)]
    struct HangingCompiler {
        seen_dir: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl TypstCompiler for HangingCompiler {
        async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
            *self.seen_dir.lock().unwrap() = Some(work_dir.to_path_buf());
            std::future::pending::<()>().await;
            Ok(())
        }

        fn executable(&self) -> &str {
            "typst"
        }
    }

    #[tokio::test]
    async fn test_compile_without_data() {
        let compiler = EchoCompiler::new();
        let pdf = compile_typst_with(&compiler, b"= Hello", None).await.unwrap();

        assert_eq!(pdf, b"%PDF-1.7\n= Hello");
        assert!(!compiler.seen_dir().exists(), "workspace should be removed");
    }

    #[tokio::test]
    async fn test_compile_writes_indented_data_file() {
        let compiler = EchoCompiler::new();
        let data = json!({ "title": "Invoice" });
        let pdf = compile_typst_with(&compiler, b"#let d = json(\"data.json\")", data.as_object())
            .await
            .unwrap();

        let text = String::from_utf8(pdf).unwrap();
        assert!(text.ends_with("--data--\n{\n  \"title\": \"Invoice\"\n}"));
    }

    #[tokio::test]
    async fn test_empty_data_still_writes_file() {
        let compiler = EchoCompiler::new();
        let data = Map::new();
        let pdf = compile_typst_with(&compiler, b"", Some(&data)).await.unwrap();

        let text = String::from_utf8(pdf).unwrap();
        assert!(text.ends_with("--data--\n{}"));
    }

    #[tokio::test]
    async fn test_compiler_failure_is_verbatim_and_cleans_up() {
        let compiler = RejectingCompiler {
            seen_dir: Mutex::new(None),
        };
        let err = compile_typst_with(&compiler, b"#let x = (", None)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "compile failed: error: unclosed delimiter\n  ┌─ main.typ:1:9"
        );
        let seen = compiler.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!seen.exists(), "workspace should be removed on failure");
    }

    #[tokio::test]
    async fn test_missing_output_is_read_error() {
        let compiler = SilentCompiler::default();
        let err = compile_typst_with(&compiler, b"= Hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::ReadOutput(_)));
        assert!(err.to_string().starts_with("failed to read output PDF"));

        let seen = compiler.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!seen.exists(), "workspace should be removed after a read error");
    }

    #[tokio::test]
    async fn test_cancelled_compilation_removes_workspace() {
        let compiler = HangingCompiler::default();
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            compile_typst_with(&compiler, b"= Hello", None),
        )
        .await;
        assert!(outcome.is_err(), "compiler should still be running");

        let seen = compiler.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!seen.exists(), "workspace should be removed when the request is dropped");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_inputs_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        struct ModeCheck;

        #[async_trait]
        impl TypstCompiler for ModeCheck {
            async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
                for name in [SOURCE_FILE_NAME, DATA_FILE_NAME] {
                    let mode = std::fs::metadata(work_dir.join(name))
                        .unwrap()
                        .permissions()
                        .mode();
                    assert_eq!(mode & 0o777, 0o600, "{name} has mode {mode:o}");
                }
                std::fs::write(work_dir.join(OUTPUT_FILE_NAME), b"%PDF").unwrap();
                Ok(())
            }

            fn executable(&self) -> &str {
                "mode-check"
            }
        }

        let data = json!({ "secret": true });
        let pdf = compile_typst_with(&ModeCheck, b"= Private", data.as_object())
            .await
            .unwrap();
        assert_eq!(pdf, b"%PDF");
    }

    #[tokio::test]
    async fn test_each_compilation_gets_its_own_workspace() {
        let first = EchoCompiler::new();
        let second = EchoCompiler::new();

        let (a, b) = tokio::join!(
            compile_typst_with(&first, b"= One", None),
            compile_typst_with(&second, b"= Two", None)
        );

        assert_eq!(a.unwrap(), b"%PDF-1.7\n= One");
        assert_eq!(b.unwrap(), b"%PDF-1.7\n= Two");
        assert_ne!(first.seen_dir(), second.seen_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_combined_output_orders_stdout_first() {
        use std::os::unix::process::ExitStatusExt;

        let output = Output {
            status: std::process::ExitStatus::from_raw(256),
            stdout: b"compiling main.typ\n".to_vec(),
            stderr: b"error: unknown variable".to_vec(),
        };
        assert_eq!(
            combined_output(&output),
            "compiling main.typ\nerror: unknown variable"
        );
    }
}
