//! Times-table animation
//!
//! `points` points are spread evenly on a circle and point `i` is joined to
//! point `floor(i * step) mod points`. `step` starts at 2 and grows a little
//! every frame, so the figure morphs through cardioid, nephroid and beyond.
//! The line color wanders one channel at a time.

use std::f64::consts::TAU;

use crate::raster::{Canvas, Color, Point};

const START_STEP: f64 = 2.0;
const STEP_INCREMENT: f64 = 0.005;
/// Largest per-frame change of the red, green and blue channels.
const CHANNEL_DRIFT: [u8; 3] = [20, 10, 5];

/// Bounce a channel up and down, reversing when it would wrap.
#[derive(Debug, Clone, Copy)]
struct Channel {
    value: u8,
    rising: bool,
}

impl Channel {
    fn advance(&mut self, delta: u8) {
        let next = if self.rising {
            self.value.checked_add(delta)
        } else {
            self.value.checked_sub(delta)
        };
        match next {
            Some(value) => self.value = value,
            None => self.rising = !self.rising,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimesTable {
    points: u32,
    step: f64,
    channels: [Channel; 3],
    rng: u64,
}

impl TimesTable {
    /// New animation; `seed` picks the starting color and its drift.
    pub fn new(points: u32, seed: u64) -> Self {
        let mut table = Self {
            points: points.max(1),
            step: START_STEP,
            channels: [Channel {
                value: 0,
                rising: true,
            }; 3],
            rng: seed | 1,
        };
        let start = [(); 3].map(|_| (table.next_random() % 0xff) as u8);
        for (channel, value) in table.channels.iter_mut().zip(start) {
            channel.value = value;
        }
        table
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn color(&self) -> Color {
        let [r, g, b] = self.channels.map(|c| c.value);
        Color::rgb(r, g, b)
    }

    /// xorshift64
    fn next_random(&mut self) -> u64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        x
    }

    fn vertex(&self, center: Point, radius: f64, index: u32) -> Point {
        let angle = TAU / f64::from(self.points) * f64::from(index);
        Point::new(
            center.x + (radius * angle.cos()) as i32,
            center.y + (radius * angle.sin()) as i32,
        )
    }

    /// Paint the current frame over the whole canvas, then advance.
    pub fn draw_frame(&mut self, canvas: &mut Canvas<'_>) {
        for (i, max) in CHANNEL_DRIFT.into_iter().enumerate() {
            let delta = (self.next_random() % u64::from(max)) as u8;
            self.channels[i].advance(delta);
        }
        let color = self.color();

        let center = Point::new(
            (canvas.width() / 2) as i32,
            (canvas.height() / 2) as i32,
        );
        let radius = canvas.width().min(canvas.height()) * 2 / 5;

        canvas.clear();
        canvas.draw_ellipse(center, radius as i32, radius as i32, color);
        for i in 0..self.points {
            let target = (f64::from(i) * self.step) as u64 % u64::from(self.points);
            let from = self.vertex(center, f64::from(radius), i);
            let to = self.vertex(center, f64::from(radius), target as u32);
            canvas.draw_line(from, to, color);
        }

        self.step += STEP_INCREMENT;
    }
}
