use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lem_formats::ground::{GroundFile, VgaGround, VgaSpecial};
use lem_formats::level::Level;
use log::{debug, info};

use crate::compositor::Compositor;
use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::framebuffer::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::palette::{LevelPalette, write_png};

/// Largest ground or special id; ids map to the file name characters
/// `'0'..='~'`.
pub const MAX_ASSET_ID: u16 = (b'~' - b'0') as u16;

/// A finished level image: palette indices plus the palette to show them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLevel {
    pub indexed: Vec<u8>,
    pub palette: LevelPalette,
}

impl RenderedLevel {
    pub fn width(&self) -> u32 {
        CANVAS_WIDTH as u32
    }

    pub fn height(&self) -> u32 {
        CANVAS_HEIGHT as u32
    }

    pub fn rgb(&self) -> Vec<u8> {
        self.palette.expand(&self.indexed)
    }

    pub fn write_png(&self, path: &Path) -> Result<()> {
        write_png(path, self.width(), self.height(), &self.indexed, &self.palette)
    }
}

/// Renders levels against the graphics files of one game data directory.
/// Decoded ground sets are kept for later levels that share them.
#[derive(Debug)]
pub struct LevelImager {
    data_dir: PathBuf,
    config: RenderConfig,
    grounds: BTreeMap<u16, VgaGround>,
}

impl LevelImager {
    pub fn new(data_dir: impl Into<PathBuf>, config: RenderConfig) -> Self {
        LevelImager {
            data_dir: data_dir.into(),
            config,
            grounds: BTreeMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cached_grounds(&self) -> usize {
        self.grounds.len()
    }

    pub fn render(&mut self, level: &Level) -> Result<RenderedLevel> {
        if level.ground_id > MAX_ASSET_ID {
            return Err(RenderError::GroundId(level.ground_id).into());
        }
        let special = match level.special_id {
            0 => None,
            id if id - 1 > MAX_ASSET_ID => return Err(RenderError::SpecialId(id).into()),
            id => Some(self.load_special(id - 1)?),
        };

        if !self.grounds.contains_key(&level.ground_id) {
            let ground = self.load_ground(level.ground_id)?;
            self.grounds.insert(level.ground_id, ground);
        }
        let Some(ground) = self.grounds.get(&level.ground_id) else {
            bail!("ground set {} was not cached", level.ground_id);
        };

        let palette = LevelPalette::assemble(&ground.colors, special.as_ref());
        let mut compositor = Compositor::new(self.config);
        let indexed = compositor.render(ground, special.as_ref(), level)?;

        info!(
            "rendered level \"{}\" (ground {}, special {})",
            level.display_name(),
            level.ground_id,
            level.special_id
        );
        Ok(RenderedLevel { indexed, palette })
    }

    fn load_ground(&self, id: u16) -> Result<VgaGround> {
        let tag = id_char(id);
        let meta_path = self.resolve(&format!("GROUND{tag}O.DAT"))?;
        let bytes =
            fs::read(&meta_path).with_context(|| format!("reading {}", meta_path.display()))?;
        let ground = GroundFile::parse(&bytes)
            .with_context(|| format!("parsing {}", meta_path.display()))?;

        let graphics_path = self.resolve(&format!("VGAGR{tag}.DAT"))?;
        let mut reader = open(&graphics_path)?;
        let vga = VgaGround::decode(&mut reader, &ground)
            .with_context(|| format!("decoding {}", graphics_path.display()))?;
        debug!("loaded ground set {id} from {}", graphics_path.display());
        Ok(vga)
    }

    fn load_special(&self, index: u16) -> Result<VgaSpecial> {
        let path = self.resolve(&format!("VGASPEC{}.DAT", id_char(index)))?;
        let mut reader = open(&path)?;
        VgaSpecial::decode(&mut reader).with_context(|| format!("decoding {}", path.display()))
    }

    /// Find `name` in the data directory, ignoring case.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let exact = self.data_dir.join(name);
        if exact.is_file() {
            return Ok(exact);
        }
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("listing {}", self.data_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                return Ok(entry.path());
            }
        }
        bail!("{name} not found in {}", self.data_dir.display())
    }
}

fn id_char(id: u16) -> char {
    char::from(b'0' + id as u8)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}
