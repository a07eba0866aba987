use std::env;
use std::fs::{self, read_dir};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{error, trace};

/// Directories searched for executables, in order.
pub const DEFAULT_SEARCH_PATH: [&str; 4] = ["/bin", "/usr/bin", "/usr/local/bin", "/sbin"];

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolves a command name to an executable. Names starting with `.` are
/// looked up relative to `cwd`; everything else only on `search_path`.
pub fn find_executable(name: &str, search_path: &[PathBuf], cwd: &Path) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.starts_with('.') {
        let candidate = cwd.join(name);
        return is_executable(&candidate).then_some(candidate);
    }
    if name.contains('/') {
        // Absolute or nested names are not searched.
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }
    search_path
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Entry names of `dir` starting with `prefix`, in directory order.
/// A missing directory yields nothing.
pub fn entries_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    let list = match read_dir(dir) {
        Ok(list) => list,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                error!("shellgibi: read_dir error: {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };
    let mut names = Vec::new();
    for entry in list.flatten() {
        if let Ok(name) = entry.file_name().into_string() {
            if name.starts_with(prefix) {
                names.push(name);
            }
        }
    }
    trace!("{} entries of {} match {:?}", names.len(), dir.display(), prefix);
    names
}

pub fn current_dir() -> String {
    match env::current_dir() {
        Ok(dir) => dir.to_string_lossy().into_owned(),
        Err(e) => {
            error!("shellgibi: PROMPT: env current_dir error: {}", e);
            String::new()
        }
    }
}
