//! Orchestration mode detection.
//!
//! Delegation is controlled by marker lines in `CONDUCTOR.md` files. The
//! detector checks an ordered list of marker sources and the first source
//! that yields a marker decides the mode; when no source has one,
//! delegation defaults to enabled.
//!
//! # Marker Format
//!
//! A marker is a line whose trimmed content is exactly one of:
//!
//! ```text
//! ORCHESTRATION: DISABLED
//! ORCHESTRATION: ENABLED
//! ```
//!
//! Matching is case-sensitive. When one document contains both lines, the
//! disable marker wins. `ENABLED` is a legacy marker: it selects
//! [`OrchestrationMode::LegacyFallback`] rather than plain enabled, so the
//! decision records that an explicit legacy opt-in was found.
//!
//! Sources are injected rather than hard-wired, so tests (and embedders)
//! can detect against fixed files instead of the process's filesystem
//! surroundings. [`OrchestrationDetector::with_default_sources`] builds the
//! conventional chain: project tree (upward search), then user config,
//! then system config.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Marker file name looked for in each scope.
pub const MARKER_FILE: &str = "CONDUCTOR.md";

/// How many parent directories the project-scope search climbs.
pub const UPWARD_SEARCH_DEPTH: usize = 3;

const DISABLE_LINE: &str = "ORCHESTRATION: DISABLED";
const ENABLE_LINE: &str = "ORCHESTRATION: ENABLED";

/// A marker found in a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Enabled,
    Disabled,
}

/// Resolved delegation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationMode {
    /// Delegation active (the default).
    Enabled,
    /// Delegation explicitly disabled; tasks run on the fallback path.
    Disabled,
    /// Delegation active via a legacy explicit enable marker.
    LegacyFallback,
}

impl OrchestrationMode {
    /// Whether this mode delegates to subprocesses.
    pub fn delegates(&self) -> bool {
        matches!(
            self,
            OrchestrationMode::Enabled | OrchestrationMode::LegacyFallback
        )
    }
}

impl fmt::Display for OrchestrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestrationMode::Enabled => "enabled",
            OrchestrationMode::Disabled => "disabled",
            OrchestrationMode::LegacyFallback => "legacy_fallback",
        };
        write!(f, "{}", s)
    }
}

/// The detector's verdict: the mode plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationDecision {
    pub mode: OrchestrationMode,
    /// Human-readable provenance, e.g. `"explicit disable marker (project scope)"`.
    pub source: String,
}

/// One place a marker document may live.
pub trait MarkerSource: Send + Sync {
    /// Scope name used in decision provenance ("project", "user", "system").
    fn scope(&self) -> &str;

    /// Read this source's marker, `Ok(None)` when absent.
    fn read_marker(&self) -> io::Result<Option<Marker>>;
}

/// Parse a marker document. Disable wins when both lines are present.
fn parse_marker(content: &str) -> Option<Marker> {
    let mut found = None;
    for line in content.lines() {
        match line.trim() {
            DISABLE_LINE => return Some(Marker::Disabled),
            ENABLE_LINE => found = Some(Marker::Enabled),
            _ => {}
        }
    }
    found
}

fn read_marker_file(path: &Path) -> io::Result<Option<Marker>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(parse_marker(&content))
}

/// Marker source backed by a single file path.
pub struct FileMarkerSource {
    scope: String,
    path: PathBuf,
}

impl FileMarkerSource {
    pub fn new(scope: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            scope: scope.into(),
            path: path.into(),
        }
    }
}

impl MarkerSource for FileMarkerSource {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn read_marker(&self) -> io::Result<Option<Marker>> {
        read_marker_file(&self.path)
    }
}

/// Marker source that searches a directory and its parents for the marker
/// file, nearest directory first.
pub struct UpwardMarkerSource {
    scope: String,
    start: PathBuf,
    max_depth: usize,
}

impl UpwardMarkerSource {
    pub fn new(scope: impl Into<String>, start: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            scope: scope.into(),
            start: start.into(),
            max_depth,
        }
    }
}

impl MarkerSource for UpwardMarkerSource {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn read_marker(&self) -> io::Result<Option<Marker>> {
        // Start directory plus up to max_depth parents.
        let mut dir = Some(self.start.as_path());
        for _ in 0..=self.max_depth {
            let Some(current) = dir else { break };
            if let Some(marker) = read_marker_file(&current.join(MARKER_FILE))? {
                debug!(dir = %current.display(), "found orchestration marker");
                return Ok(Some(marker));
            }
            dir = current.parent();
        }
        Ok(None)
    }
}

/// Resolves the delegation mode from an ordered chain of marker sources.
pub struct OrchestrationDetector {
    sources: Vec<Box<dyn MarkerSource>>,
}

impl OrchestrationDetector {
    pub fn new(sources: Vec<Box<dyn MarkerSource>>) -> Self {
        Self { sources }
    }

    /// The conventional source chain, most specific scope first:
    /// project tree upward from `start`, then the user config directory,
    /// then the system config directory.
    pub fn with_default_sources(start: impl Into<PathBuf>) -> Self {
        let mut sources: Vec<Box<dyn MarkerSource>> = vec![Box::new(UpwardMarkerSource::new(
            "project",
            start,
            UPWARD_SEARCH_DEPTH,
        ))];

        if let Some(config_dir) = dirs::config_dir() {
            sources.push(Box::new(FileMarkerSource::new(
                "user",
                config_dir.join("conductor").join(MARKER_FILE),
            )));
        }

        sources.push(Box::new(FileMarkerSource::new(
            "system",
            PathBuf::from("/etc/conductor").join(MARKER_FILE),
        )));

        Self::new(sources)
    }

    /// Resolve the current mode.
    ///
    /// Evaluated on every call so marker edits take effect without a
    /// restart. Unreadable sources are logged and treated as absent; the
    /// first source with a marker decides.
    pub fn detect(&self) -> OrchestrationDecision {
        for source in &self.sources {
            let marker = match source.read_marker() {
                Ok(marker) => marker,
                Err(e) => {
                    warn!(scope = source.scope(), error = %e, "marker source unreadable, skipping");
                    continue;
                }
            };

            match marker {
                Some(Marker::Disabled) => {
                    return OrchestrationDecision {
                        mode: OrchestrationMode::Disabled,
                        source: format!("explicit disable marker ({} scope)", source.scope()),
                    };
                }
                Some(Marker::Enabled) => {
                    return OrchestrationDecision {
                        mode: OrchestrationMode::LegacyFallback,
                        source: format!("legacy enable marker ({} scope)", source.scope()),
                    };
                }
                None => {}
            }
        }

        OrchestrationDecision {
            mode: OrchestrationMode::Enabled,
            source: "default, no configuration found".to_string(),
        }
    }
}
