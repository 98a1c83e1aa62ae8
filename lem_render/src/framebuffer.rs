pub use lem_formats::MASK_BIT;

pub const CANVAS_WIDTH: usize = 1600;
pub const CANVAS_HEIGHT: usize = 160;

/// One level-sized render plane. Pixels use the sprite encoding: colour in
/// the low nibble, opacity in bit 7.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pixels: Vec<u8>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("opaque", &self.opaque_count())
            .finish()
    }
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: vec![0; CANVAS_WIDTH * CANVAS_HEIGHT],
        }
    }

    /// Index of `(x, y)`, or `None` when it falls off the canvas.
    #[inline]
    pub fn index(x: i32, y: i32) -> Option<usize> {
        let x = usize::try_from(x).ok().filter(|&x| x < CANVAS_WIDTH)?;
        let y = usize::try_from(y).ok().filter(|&y| y < CANVAS_HEIGHT)?;
        Some(y * CANVAS_WIDTH + x)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        Self::index(x, y).map(|index| self.pixels[index])
    }

    pub fn set(&mut self, x: i32, y: i32, value: u8) -> bool {
        match Self::index(x, y) {
            Some(index) => {
                self.pixels[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn is_opaque(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_some_and(|pixel| pixel & MASK_BIT != 0)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn opaque_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p & MASK_BIT != 0).count()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }
}
