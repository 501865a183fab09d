//! Tessera core
//!
//! Declarations, the KDL front end, and the resource graph builder.
//!
//! ```text
//! tessera.kdl + resources/**/*.kdl
//!         │  discovery + parser
//!         ▼
//!   Vec<Declaration>  ──  ${var.x} expansion
//!         │  graph builder (references + depends_on)
//!         ▼
//!   ResourceGraph (DAG)
//! ```

pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

pub use discovery::{
    DiscoveredFiles, PROJECT_DIR, ROOT_FILE, discover_files, find_project_root,
    find_project_root_from,
};
pub use error::{ConfigError, Result};
pub use graph::{DependencyEdge, ResourceGraph, ResourceNode};
pub use loader::{Project, load_project, load_project_from_root};
pub use model::{Attributes, Declaration, Reference, extract_references, resolve_value};
pub use parser::{ParsedDocument, parse_kdl_file, parse_kdl_string};
