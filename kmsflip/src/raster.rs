//! Software rasterization into XRGB8888 buffers
//!
//! Everything is clipped to the canvas; out-of-range coordinates are dropped
//! silently.

/// 24-bit color, stored as XRGB8888.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_xrgb(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Writable view of one pixel buffer.
pub struct Canvas<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> Canvas<'a> {
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32, stride: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn pixels(&self) -> &[u8] {
        self.pixels
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        let offset = y as usize * self.stride as usize + x as usize * 4;
        (offset + 4 <= self.pixels.len()).then_some(offset)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        let offset = self.offset(x, y)?;
        let bytes = self.pixels[offset..offset + 4].try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    pub fn plot(&mut self, x: i32, y: i32, color: Color) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset..offset + 4].copy_from_slice(&color.to_xrgb().to_ne_bytes());
        }
    }

    /// Fill the visible rows; stride padding is left alone.
    pub fn fill(&mut self, color: Color) {
        let row_bytes = self.width as usize * 4;
        let pixel = color.to_xrgb().to_ne_bytes();
        for row in self
            .pixels
            .chunks_mut(self.stride as usize)
            .take(self.height as usize)
        {
            let end = row_bytes.min(row.len());
            for px in row[..end].chunks_exact_mut(4) {
                px.copy_from_slice(&pixel);
            }
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Bresenham line, both end points included.
    pub fn draw_line(&mut self, from: Point, to: Point, color: Color) {
        let dx = (to.x - from.x).abs();
        let sx = if from.x < to.x { 1 } else { -1 };
        let dy = -(to.y - from.y).abs();
        let sy = if from.y < to.y { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (from.x, from.y);

        loop {
            self.plot(x, y, color);
            if x == to.x && y == to.y {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Bresenham ellipse outline with semi-axes `a` (x) and `b` (y).
    pub fn draw_ellipse(&mut self, center: Point, a: i32, b: i32, color: Color) {
        let (a, b) = (i64::from(a.abs()), i64::from(b.abs()));
        let (a2, b2) = (a * a, b * b);
        let (mut dx, mut dy) = (0i64, b);
        let mut err = b2 - (2 * b - 1) * a2;

        let plot4 = |canvas: &mut Self, dx: i64, dy: i64| {
            let (dx, dy) = (dx as i32, dy as i32);
            canvas.plot(center.x + dx, center.y + dy, color);
            canvas.plot(center.x - dx, center.y + dy, color);
            canvas.plot(center.x - dx, center.y - dy, color);
            canvas.plot(center.x + dx, center.y - dy, color);
        };

        loop {
            plot4(self, dx, dy);
            let e2 = 2 * err;
            if e2 < (2 * dx + 1) * b2 {
                dx += 1;
                err += (2 * dx + 1) * b2;
            }
            if e2 > -(2 * dy - 1) * a2 {
                dy -= 1;
                err -= (2 * dy - 1) * a2;
            }
            if dy < 0 {
                break;
            }
        }

        // Flat ellipses stop early; finish the tips.
        while dx < a {
            dx += 1;
            plot4(self, dx, 0);
        }
    }
}
