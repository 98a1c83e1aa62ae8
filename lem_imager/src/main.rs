mod cli;

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use lem_formats::level::{Level, read_levels};
use lem_render::{LevelImager, RenderConfig, load_render_config};
use log::info;
use serde::Serialize;

use crate::cli::Args;

#[derive(Debug, Serialize)]
struct RenderedEntry {
    source: PathBuf,
    index: usize,
    name: String,
    ground_id: u16,
    special_id: u16,
    image: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    let mut config = match args.config.as_ref() {
        Some(path) => load_render_config(path)?,
        None => RenderConfig::default(),
    };
    if args.effects {
        config.effect_boundaries = true;
    }

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating {}", args.dest.display()))?;

    let mut imager = LevelImager::new(&args.data, config);
    let mut entries = Vec::new();
    for source in &args.levels {
        let levels = load_levels(source)?;
        let selected = select_levels(&levels, args.level)
            .with_context(|| format!("selecting levels from {}", source.display()))?;
        for (index, level) in selected {
            let rendered = imager
                .render(level)
                .with_context(|| format!("rendering level {index} of {}", source.display()))?;
            let image = args.dest.join(image_name(source, index));
            rendered.write_png(&image)?;
            println!("{} -> {}", level.display_name(), image.display());
            entries.push(RenderedEntry {
                source: source.clone(),
                index,
                name: level.display_name(),
                ground_id: level.ground_id,
                special_id: level.special_id,
                image,
            });
        }
    }

    info!(
        "rendered {} levels with {} ground sets loaded",
        entries.len(),
        imager.cached_grounds()
    );

    if let Some(path) = args.manifest.as_ref() {
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(path, json).with_context(|| format!("writing manifest {}", path.display()))?;
    }
    Ok(())
}

fn load_levels(path: &Path) -> Result<Vec<Level>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    read_levels(&mut reader).with_context(|| format!("reading levels from {}", path.display()))
}

fn select_levels(levels: &[Level], only: Option<usize>) -> Result<Vec<(usize, &Level)>> {
    match only {
        None => Ok(levels.iter().enumerate().collect()),
        Some(index) => match levels.get(index) {
            Some(level) => Ok(vec![(index, level)]),
            None => bail!("level {index} requested but only {} present", levels.len()),
        },
    }
}

/// `LEVEL003.DAT`, level 5 -> `level003_05.png`
fn image_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "level".to_string());
    format!("{stem}_{index:02}.png")
}
