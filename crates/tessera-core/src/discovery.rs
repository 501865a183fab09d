//! Project file discovery
//!
//! A project is a directory holding `tessera.kdl` (or `.tessera/tessera.kdl`);
//! extra declaration files live under `resources/**/*.kdl`.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Root declaration file name
pub const ROOT_FILE: &str = "tessera.kdl";

/// Per-project working directory (state, lock, settings)
pub const PROJECT_DIR: &str = ".tessera";

/// Environment variable pointing at the project root
pub const PROJECT_ROOT_ENV: &str = "TESSERA_PROJECT_ROOT";

/// Files found in a project
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// Root file (tessera.kdl)
    pub root: Option<PathBuf>,
    /// Resource files (resources/**/*.kdl), sorted
    pub resources: Vec<PathBuf>,
}

impl DiscoveredFiles {
    /// Every file in load order
    pub fn all(&self) -> Vec<PathBuf> {
        self.root
            .iter()
            .chain(self.resources.iter())
            .cloned()
            .collect()
    }
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(PROJECT_DIR).join(ROOT_FILE).exists()
}

/// Locate the project root
///
/// 1. `TESSERA_PROJECT_ROOT`
/// 2. walking up from the current directory
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking TESSERA_PROJECT_ROOT");
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// Walk up from `start_dir` looking for a root file
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(ConfigError::ProjectRootNotFound(start_dir.to_path_buf()))
}

/// Discover declaration files under a project root
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles::default();

    let root_file = project_root.join(ROOT_FILE);
    let hidden_root_file = project_root.join(PROJECT_DIR).join(ROOT_FILE);
    if root_file.exists() {
        debug!(file = %root_file.display(), "Found root file");
        discovered.root = Some(root_file);
    } else if hidden_root_file.exists() {
        debug!(file = %hidden_root_file.display(), "Found root file in .tessera/");
        discovered.root = Some(hidden_root_file);
    }

    let pattern = project_root.join("resources").join("**").join("*.kdl");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid glob pattern: {}", e)))?;
    for entry in entries {
        match entry {
            Ok(path) => discovered.resources.push(path),
            Err(e) => {
                return Err(ConfigError::IoError {
                    path: e.path().to_path_buf(),
                    message: e.error().to_string(),
                });
            }
        }
    }
    discovered.resources.sort();

    info!(
        root = discovered.root.is_some(),
        resources = discovered.resources.len(),
        "File discovery complete"
    );
    Ok(discovered)
}
