//! `PATH` resolution for compiler executables.

use std::env;
use std::path::{Path, PathBuf};

/// Locate `name` the way a shell would.
///
/// Names containing a path separator are checked as-is; bare names are searched
/// for in every `PATH` entry. Only regular files (executable ones on unix) match.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    let exe = path.with_extension("exe");
    path.is_file() || exe.is_file()
}
