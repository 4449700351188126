//! Compiler that runs typst inside a throwaway container.
//!
//! The workspace is never bind-mounted; inputs are copied in and `output.pdf` is
//! copied back out, so the container only ever sees this one compilation.

use async_trait::async_trait;
use log::{debug, warn};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

use super::{combined_output, CompileError, TypstCompiler, OUTPUT_FILE_NAME, SOURCE_FILE_NAME};

/// Where the workspace lives inside the container.
const CONTAINER_WORK_DIR: &str = "/work";
/// Label put on every container this service creates.
const CONTAINER_LABEL: &str = "typst-gateway.compile=1";

#[derive(Debug, Clone)]
pub struct ContainerTypstCompiler {
    runtime: String,
    image: String,
}

impl ContainerTypstCompiler {
    /// `runtime` is a docker-compatible CLI such as `docker` or `podman`.
    pub fn new(runtime: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
        }
    }

    fn create_args(&self) -> Vec<String> {
        vec![
            "create".to_string(),
            "--network".to_string(),
            "none".to_string(),
            "--label".to_string(),
            CONTAINER_LABEL.to_string(),
            "--entrypoint".to_string(),
            "typst".to_string(),
            self.image.clone(),
            "compile".to_string(),
            format!("{CONTAINER_WORK_DIR}/{SOURCE_FILE_NAME}"),
            format!("{CONTAINER_WORK_DIR}/{OUTPUT_FILE_NAME}"),
        ]
    }

    async fn exec<I, S>(&self, args: I) -> Result<Output, CompileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.runtime)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CompileError::Spawn {
                program: self.runtime.clone(),
                source,
            })
    }

    /// Run a runtime subcommand that is expected to succeed.
    async fn step<I, S>(&self, step: &'static str, args: I) -> Result<Output, CompileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.exec(args).await?;
        if !output.status.success() {
            return Err(CompileError::Container {
                step,
                output: combined_output(&output),
            });
        }
        Ok(output)
    }

    async fn compile_in_container(&self, id: &str, work_dir: &Path) -> Result<(), CompileError> {
        // "<dir>/." copies the directory contents rather than the directory itself.
        let mut inputs = OsString::from(work_dir.as_os_str());
        inputs.push("/.");
        let inside = format!("{id}:{CONTAINER_WORK_DIR}");
        self.step(
            "copy-in",
            [OsStr::new("cp"), inputs.as_os_str(), OsStr::new(&inside)],
        )
        .await?;

        let run = self.exec(["start", "-a", id]).await?;
        if !run.status.success() {
            return Err(CompileError::Failed(combined_output(&run)));
        }

        let produced = format!("{id}:{CONTAINER_WORK_DIR}/{OUTPUT_FILE_NAME}");
        let local = work_dir.join(OUTPUT_FILE_NAME);
        self.step(
            "copy-out",
            [OsStr::new("cp"), OsStr::new(&produced), local.as_os_str()],
        )
        .await?;

        Ok(())
    }
}

/// Removes a created container once it goes out of scope.
///
/// [`ContainerGuard::remove`] removes it inline. If the guard is dropped instead
/// (the compile future was cancelled), removal is spawned onto the runtime.
struct ContainerGuard {
    runtime: String,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: &str, id: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            id: Some(id.to_string()),
        }
    }

    /// Disarmed only after `rm` finishes, so cancelling this still cleans up.
    async fn remove(mut self) {
        if let Some(id) = self.id.as_deref() {
            remove_container(&self.runtime, id).await;
        }
        self.id = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let runtime = std::mem::take(&mut self.runtime);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Compilation in container {} was cancelled; removing it", id);
                handle.spawn(async move { remove_container(&runtime, &id).await });
            }
            Err(_) => {
                let status = std::process::Command::new(&runtime)
                    .args(["rm", "-f", &id])
                    .status();
                if let Err(e) = status {
                    warn!("Failed to remove container {}: {}", id, e);
                }
            }
        }
    }
}

async fn remove_container(runtime: &str, id: &str) {
    match Command::new(runtime).args(["rm", "-f", id]).output().await {
        Ok(output) if output.status.success() => debug!("Removed container {}", id),
        Ok(output) => warn!(
            "Failed to remove container {}: {}",
            id,
            combined_output(&output).trim()
        ),
        Err(e) => warn!("Failed to remove container {}: {}", id, e),
    }
}

#[async_trait]
impl TypstCompiler for ContainerTypstCompiler {
    async fn compile(&self, work_dir: &Path) -> Result<(), CompileError> {
        let created = self.step("create", self.create_args()).await?;
        let id = String::from_utf8_lossy(&created.stdout).trim().to_string();
        if id.is_empty() {
            return Err(CompileError::Container {
                step: "create",
                output: "runtime printed no container id".to_string(),
            });
        }
        debug!("Created container {} from {}", id, self.image);

        let guard = ContainerGuard::new(&self.runtime, &id);
        let result = self.compile_in_container(&id, work_dir).await;
        guard.remove().await;
        result
    }

    fn executable(&self) -> &str {
        &self.runtime
    }
}
