/// Packs 8-bit channels into RGB565.
pub const fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

pub const BLACK: u16 = 0;

/// RGB565 pixel buffer, row 0 at the top.
#[derive(Clone, Debug)]
pub struct PixelSurface {
    width: usize,
    height: usize,
    stride: usize,
    pixels: Vec<u16>,
}

impl PixelSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_stride(width, height, width)
    }

    /// Surface whose rows are `stride` pixels apart (`stride >= width`).
    pub fn with_stride(width: usize, height: usize, stride: usize) -> Self {
        let stride = stride.max(width);
        Self {
            width,
            height,
            stride,
            pixels: vec![BLACK; stride * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Offset of `(x, y)` with `y` counted up from the bottom of a plot
    /// `max_y` rows tall.
    #[inline]
    pub fn offset_from_bottom(&self, x: usize, y: usize, max_y: usize) -> usize {
        (max_y - y - 1) * self.stride + x
    }

    #[inline]
    pub fn set(&mut self, x: usize, row: usize, colour: u16) {
        if x < self.width && row < self.height {
            self.pixels[row * self.stride + x] = colour;
        }
    }

    pub fn get(&self, x: usize, row: usize) -> u16 {
        self.pixels[row * self.stride + x]
    }

    pub fn fill(&mut self, colour: u16) {
        self.pixels.fill(colour);
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    /// Raw pixel bytes in native endianness, stride padding included.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Copies `other` into this surface with its top-left corner at `row`.
    pub fn blit_rows(&mut self, other: &PixelSurface, row: usize) {
        for r in 0..other.height.min(self.height.saturating_sub(row)) {
            let width = other.width.min(self.width);
            let src = &other.pixels[r * other.stride..r * other.stride + width];
            let start = (row + r) * self.stride;
            self.pixels[start..start + width].copy_from_slice(src);
        }
    }
}
