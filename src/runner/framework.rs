//! Framework installation discovery.
//!
//! Child agents need to know where the framework installation lives, and
//! the parent may itself have been launched from an unusual working
//! directory. Resolution walks a fixed candidate chain and the first hit
//! wins, so the answer is deterministic for a given environment:
//!
//! 1. `CONDUCTOR_FRAMEWORK_PATH` environment variable
//! 2. `CONDUCTOR_LIB_PATH` environment variable (legacy name)
//! 3. Ancestors of the starting directory containing the
//!    `.conductor-framework` marker file
//! 4. A `conductor-framework` directory next to the running executable
//! 5. The per-user data directory (`<data_local_dir>/conductor/framework`)
//! 6. The system location `/usr/local/share/conductor/framework`
//! 7. The starting directory itself, as a last resort
//!
//! The resolved path is propagated to children via
//! `CONDUCTOR_FRAMEWORK_PATH`, so a delegation chain agrees on one
//! installation no matter where each process was spawned from.

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the framework installation.
pub const FRAMEWORK_PATH_ENV: &str = "CONDUCTOR_FRAMEWORK_PATH";

/// Legacy environment variable honored for backward compatibility.
pub const LIB_PATH_ENV: &str = "CONDUCTOR_LIB_PATH";

/// Marker file identifying a directory as a framework installation.
pub const FRAMEWORK_MARKER: &str = ".conductor-framework";

/// Directory name checked next to the executable and under data dirs.
const FRAMEWORK_DIR_NAME: &str = "conductor-framework";

/// Resolve the framework installation path starting from `start`.
///
/// Never fails: when no candidate matches, `start` itself is returned so
/// delegation can proceed with a best-effort path.
pub fn resolve_framework_path(start: &Path) -> PathBuf {
    if let Some(path) = env_candidate(FRAMEWORK_PATH_ENV) {
        debug!(path = %path.display(), source = FRAMEWORK_PATH_ENV, "framework path from environment");
        return path;
    }

    if let Some(path) = env_candidate(LIB_PATH_ENV) {
        debug!(path = %path.display(), source = LIB_PATH_ENV, "framework path from legacy environment");
        return path;
    }

    for dir in start.ancestors() {
        if dir.join(FRAMEWORK_MARKER).is_file() {
            debug!(path = %dir.display(), "framework path from marker file");
            return dir.to_path_buf();
        }
    }

    if let Some(path) = exe_sibling() {
        debug!(path = %path.display(), "framework path next to executable");
        return path;
    }

    if let Some(data_dir) = dirs::data_local_dir() {
        let candidate = data_dir.join("conductor").join("framework");
        if candidate.is_dir() {
            debug!(path = %candidate.display(), "framework path from user data directory");
            return candidate;
        }
    }

    let system = PathBuf::from("/usr/local/share/conductor/framework");
    if system.is_dir() {
        debug!(path = %system.display(), "framework path from system location");
        return system;
    }

    debug!(path = %start.display(), "no framework installation found, using starting directory");
    start.to_path_buf()
}

fn env_candidate(var: &str) -> Option<PathBuf> {
    let value = env::var(var).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn exe_sibling() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    let candidate = exe.parent()?.join(FRAMEWORK_DIR_NAME);
    candidate.is_dir().then_some(candidate)
}
