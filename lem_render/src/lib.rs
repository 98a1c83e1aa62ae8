pub mod compositor;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod imager;
pub mod overlay;
pub mod palette;

pub use compositor::{Compositor, ObjectBlend, PieceBlend, blit_object, blit_piece, blit_special, merge_planes};
pub use config::{MissingSpritePolicy, RecolorRule, RenderConfig, load_render_config};
pub use error::RenderError;
pub use framebuffer::{CANVAS_HEIGHT, CANVAS_WIDTH, Framebuffer, MASK_BIT};
pub use imager::{LevelImager, RenderedLevel};
pub use palette::{LevelPalette, write_png};
