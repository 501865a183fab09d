#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Two local resources with a reference and an explicit dependency
pub const BASIC_PROJECT: &str = r#"
variables {
    greeting "hello"
}

resource "local_directory" "data" {
    path "out/data"
}

resource "local_file" "motd" {
    path "${local_directory.data.path}/motd.txt"
    content "${var.greeting} world"
    depends_on "local_directory.data"
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_config(content: &str) -> Self {
        let project = Self::new();
        project.write_root_kdl(content);
        project
    }

    pub fn write_root_kdl(&self, content: &str) {
        fs::write(self.root.path().join("tessera.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_resource_file(&self, name: &str, content: &str) {
        let dir = self.root.path().join("resources");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.kdl", name)), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn file(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    #[allow(dead_code)]
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.file(relative)).unwrap()
    }

    /// `tessera` run inside the project, isolated from user settings
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tessera").unwrap();
        cmd.current_dir(self.root.path())
            .env("TESSERA_CONFIG_DIR", self.config_dir())
            .env("NO_COLOR", "1")
            .env_remove("TESSERA_PROJECT_ROOT")
            .env_remove("TESSERA_PARALLELISM")
            .env_remove("TESSERA_REFRESH")
            .env_remove("TESSERA_LOCK_TIMEOUT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn config_dir(&self) -> PathBuf {
        self.root.path().join(".user-config")
    }

    #[allow(dead_code)]
    pub fn state(&self) -> serde_json::Value {
        let path = self.file(".tessera/state.json");
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }
}
