use std::env;
use std::fs;

use anyhow::{Context, Result};
use lem_formats::GroundFile;

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .context("usage: ground_dump <GROUNDnO.DAT>")?;
    let bytes = fs::read(&path).with_context(|| format!("reading {path}"))?;
    let ground = GroundFile::parse(&bytes).with_context(|| format!("parsing {path}"))?;
    println!("{}", serde_json::to_string_pretty(&ground)?);
    Ok(())
}
