//! Project loader
//!
//! Discovery, parsing, variable expansion and graph building in one pass.

use crate::discovery::{discover_files, find_project_root};
use crate::error::{ConfigError, Result};
use crate::graph::ResourceGraph;
use crate::model::Declaration;
use crate::parser::parse_kdl_file;
use crate::template::{Variables, apply_env_overrides, expand_variables};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    /// Files read, in load order
    pub files: Vec<PathBuf>,
    pub variables: Variables,
    pub graph: ResourceGraph,
}

/// Find the project root from the current directory and load it
#[instrument]
pub fn load_project() -> Result<Project> {
    let project_root = find_project_root()?;
    load_project_from_root(&project_root)
}

/// Load every declaration under `project_root`
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<Project> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root)?;
    let files = discovered.all();
    if files.is_empty() {
        return Err(ConfigError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    debug!("Step 2: Parsing declaration files");
    let mut declarations: Vec<Declaration> = Vec::new();
    let mut variables = Variables::new();
    for file in &files {
        let parsed = parse_kdl_file(file).map_err(|e| match e {
            ConfigError::Io(io) => ConfigError::IoError {
                path: file.clone(),
                message: io.to_string(),
            },
            other => other,
        })?;
        debug!(
            file = %file.display(),
            resources = parsed.declarations.len(),
            "Parsed file"
        );
        variables.extend(parsed.variables);
        declarations.extend(parsed.declarations);
    }

    debug!("Step 3: Expanding variables");
    apply_env_overrides(&mut variables);
    for decl in &mut declarations {
        expand_variables(decl, &variables)?;
    }

    debug!("Step 4: Building resource graph");
    let graph = ResourceGraph::build(declarations)?;
    info!(
        resources = graph.len(),
        edges = graph.edges().len(),
        "Project loaded successfully"
    );

    Ok(Project {
        root: project_root.to_path_buf(),
        files,
        variables,
        graph,
    })
}
