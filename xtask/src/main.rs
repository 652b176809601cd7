//! Development tasks for callrecorder
//!
//! Usage:
//!   cargo xtask dist    Release binary and man page in target/dist

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const BINARY: &str = "callrecorder";
const MAN_PAGE: &str = "callrecorder.1";

fn main() -> ExitCode {
    let task = env::args().nth(1);

    let result = match task.as_deref() {
        Some("dist") => dist(),
        None | Some("help" | "--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            print_help();
            Err(anyhow::anyhow!("Unknown command: {}", other))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
callrecorder development tasks

Usage: cargo xtask <COMMAND>

Commands:
  dist    Build the release binary and man page into target/dist
"#
    );
}

/// Workspace root, one level above the xtask crate
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

/// Most recently rendered man page under target/release/build
fn find_man_page(release_dir: &Path) -> anyhow::Result<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(release_dir.join("build"))? {
        let dir = entry?.path();
        let is_ours = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&format!("{}-", BINARY)));
        let page = dir.join("out/man").join(MAN_PAGE);
        if !is_ours || !page.exists() {
            continue;
        }
        let modified = fs::metadata(&page)?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, page));
        }
    }
    newest
        .map(|(_, page)| page)
        .ok_or_else(|| anyhow::anyhow!("{} was not generated", MAN_PAGE))
}

/// Build the release binary with its man page and collect both
fn dist() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building release binary...");
    let status = Command::new("cargo")
        .args(["build", "--release", "--package", BINARY])
        .env("CALLRECORDER_GEN_MANPAGES", "1")
        .current_dir(&root)
        .status()?;
    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let release_dir = root.join("target/release");
    let binary = release_dir.join(BINARY);
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    let man_page = find_man_page(&release_dir)?;

    let dist_dir = root.join("target/dist");
    fs::create_dir_all(dist_dir.join("man"))?;
    fs::copy(&binary, dist_dir.join(BINARY))?;
    fs::copy(&man_page, dist_dir.join("man").join(MAN_PAGE))?;

    println!("==> Wrote {:?}", dist_dir);
    Ok(())
}
