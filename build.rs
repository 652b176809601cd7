//! Renders the callrecorder man page from the CLI definition
//!
//! Only runs when CALLRECORDER_GEN_MANPAGES is set. `cargo xtask dist`
//! sets it and collects the page from `$OUT_DIR/man`.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io::Error;
use std::path::PathBuf;

include!("src/cli.rs");

const ENVIRONMENT: &str = "\
ENVIRONMENT:
  CALLRECORDER_OUTPUT_ROOT            working directory root
  CALLRECORDER_WAIT_FOR_FILES_SECS    packaging wait for open files
  CALLRECORDER_UPLOAD_BACKEND         directory, http or disabled
  CALLRECORDER_UPLOAD_TARGET          library folder or upload URL
  CALLRECORDER_UPLOAD_TOKEN           bearer token for the http backend
  RUST_LOG                            log filter, replaces -v and -q";

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=CALLRECORDER_GEN_MANPAGES");

    if env::var_os("CALLRECORDER_GEN_MANPAGES").is_none() {
        return Ok(());
    }
    let Some(out_dir) = env::var_os("OUT_DIR") else {
        return Ok(());
    };

    let man_dir = PathBuf::from(out_dir).join("man");
    fs::create_dir_all(&man_dir)?;

    // one page; the subcommands are short enough to live in it
    let cmd = Cli::command().after_long_help(ENVIRONMENT);
    let mut page = Vec::new();
    Man::new(cmd).render(&mut page)?;
    fs::write(man_dir.join("callrecorder.1"), page)?;

    Ok(())
}
