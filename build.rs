//! Build script rendering man pages for `hvac-bridge` and its subcommands.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn render(man: &Man, path: PathBuf) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    man.render(&mut buf)?;
    fs::write(path, buf)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    render(&Man::new(cmd.clone()), out_dir.join("hvac-bridge.1"))?;
    for sub in cmd.get_subcommands() {
        let page = format!("hvac-bridge-{}", sub.get_name());
        let man = Man::new(sub.clone()).title(page.to_uppercase());
        render(&man, out_dir.join(format!("{page}.1")))?;
    }

    Ok(())
}
