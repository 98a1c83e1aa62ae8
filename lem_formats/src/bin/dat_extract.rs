use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use lem_formats::DatFile;
use log::info;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Decompress every chunk of Lemmings DAT containers", version)]
struct Args {
    /// DAT container to extract (may be passed multiple times)
    #[arg(long = "dat", value_name = "PATH", conflicts_with = "root")]
    dats: Vec<PathBuf>,

    /// Directory containing DAT containers (recursively scanned when --dat is not used)
    #[arg(long = "root", value_name = "DIR", conflicts_with = "dats")]
    root: Option<PathBuf>,

    /// Destination directory for the decompressed chunks
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let dats = resolve_dat_paths(&args);
    if dats.is_empty() {
        bail!("no DAT containers to extract");
    }

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for dat_path in dats {
        let dat = DatFile::open(&dat_path)?;
        extract_container(&dat, &args.dest, args.overwrite)?;
    }

    Ok(())
}

fn resolve_dat_paths(args: &Args) -> Vec<PathBuf> {
    let mut dats = Vec::new();

    if !args.dats.is_empty() {
        dats.extend(args.dats.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let is_dat = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dat"));
            if entry.file_type().is_file() && is_dat {
                dats.push(entry.into_path());
            }
        }
    }

    dats.sort();
    dats.dedup();
    dats
}

fn extract_container(dat: &DatFile, dest_root: &Path, overwrite: bool) -> Result<()> {
    let stem = dat
        .path()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_ascii_uppercase())
        .unwrap_or_else(|| "DAT".to_string());

    let mut extracted = 0usize;
    for index in 0..dat.headers().len() {
        let dest_path = dest_root.join(format!("{stem}.chunk{index}.bin"));
        if dest_path.exists() && !overwrite {
            info!("skipping existing {}", dest_path.display());
            continue;
        }

        let data = dat.decompress_chunk(index)?;
        fs::write(&dest_path, &data)
            .with_context(|| format!("writing {}", dest_path.display()))?;
        extracted += 1;
    }

    println!(
        "Extracted {} of {} chunks from {} into {}",
        extracted,
        dat.headers().len(),
        dat.path().display(),
        dest_root.display()
    );

    Ok(())
}
