use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Render Lemmings level files to PNG images", version)]
pub struct Args {
    /// Game data directory holding GROUNDnO.DAT, VGAGRn.DAT and VGASPECn.DAT
    #[arg(long)]
    pub data: PathBuf,

    /// Level containers (LEVEL00n.DAT) to render
    #[arg(long, num_args = 1.., required = true)]
    pub levels: Vec<PathBuf>,

    /// Directory the PNG images are written to
    #[arg(long)]
    pub dest: PathBuf,

    /// Optional render preset JSON (effect_boundaries, missing_sprites, recolor)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Outline metal areas and object trigger areas
    #[arg(long)]
    pub effects: bool,

    /// Only render the level at this index within each container
    #[arg(long)]
    pub level: Option<usize>,

    /// When set, write a JSON summary of every rendered image
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}
