use colored::Colorize;
use std::path::Path;
use tessera_core::{PROJECT_DIR, ROOT_FILE};

const TEMPLATE: &str = r#"// Tessera project
//
// Resources are declared as `resource "<type>" "<name>"` and addressed as
// `<type>.<name>`. Reference another resource's attribute with
// `${<type>.<name>.<attribute>}`.

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

/// Scaffold a project in `dir` if needed, then validate it
pub async fn handle(dir: &Path) -> anyhow::Result<()> {
    let root_file = dir.join(ROOT_FILE);
    let nested_root_file = dir.join(PROJECT_DIR).join(ROOT_FILE);

    if root_file.exists() || nested_root_file.exists() {
        println!("{}", "Project already initialized.".blue());
    } else {
        std::fs::create_dir_all(dir)?;
        std::fs::write(&root_file, TEMPLATE)?;
        println!(
            "{} {}",
            "✓ Created".green(),
            root_file.display().to_string().cyan()
        );
    }
    std::fs::create_dir_all(dir.join(PROJECT_DIR))?;

    let project = tessera_core::load_project_from_root(dir)?;
    println!();
    println!("Configuration files:");
    for file in &project.files {
        println!("  • {}", file.display().to_string().cyan());
    }
    println!(
        "{} {} resources, {} dependencies",
        "✓ Configuration is valid:".green().bold(),
        project.graph.len(),
        project.graph.edges().len()
    );
    println!();
    println!("Next: {} to preview changes", "tessera plan".cyan());
    Ok(())
}
