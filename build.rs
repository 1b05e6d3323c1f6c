//! Renders the `kiln.1` man page into `OUT_DIR` from the clap definition.

use std::env;
use std::fs;
use std::io::{self, Write};

use camino::Utf8PathBuf;
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

fn out_dir() -> io::Result<Utf8PathBuf> {
    let raw = env::var("OUT_DIR")
        .map_err(|err| io::Error::new(io::ErrorKind::NotFound, format!("OUT_DIR: {err}")))?;
    Ok(Utf8PathBuf::from(raw))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;
    fs::write(out_dir()?.join("kiln.1"), page)?;
    Ok(())
}
