use std::ops;

use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct FloatImageContent {
    width: usize,
    height: usize,
    /// Row-major pixel data in linear RGB format.
    pixels: Vec<FloatPixel>,
}

impl FloatImageContent {
    pub fn with_extent(width: usize, height: usize) -> Self {
        let pixel_count = width * height;
        let pixels = vec![FloatPixel::zero(); pixel_count];
        Self { width, height, pixels }
    }

    pub fn from_fn<F: FnMut(usize, usize) -> FloatPixel>(width: usize, height: usize, mut f: F) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    /// Returns `None` if `pixels` does not hold exactly `width * height` entries.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<FloatPixel>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self { width, height, pixels })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn extent(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[FloatPixel] {
        &self.pixels
    }

    pub fn get_at(&self, x: usize, y: usize) -> FloatPixel {
        let index = y * self.width + x;
        if x < self.width && index < self.pixels.len() {
            self.pixels[index]
        } else {
            panic!("Attempted to get pixel at ({}, {}) out of bounds for image of size {}x{}", x, y, self.width, self.height);
        }
    }

    pub fn set_at(&mut self, x: usize, y: usize, pixel: FloatPixel) {
        let index = y * self.width + x;
        if x < self.width && index < self.pixels.len() {
            self.pixels[index] = pixel;
        } else {
            panic!("Attempted to set pixel at ({}, {}) out of bounds for image of size {}x{}", x, y, self.width, self.height);
        }
    }

    /// Applies `f` to every pixel. Pixels are independent, so the work is spread over the rayon pool.
    pub fn map<F: Fn(FloatPixel) -> FloatPixel + Sync>(&self, f: F) -> Self {
        let pixels = self.pixels.par_iter().map(|p| f(*p)).collect();
        Self { width: self.width, height: self.height, pixels }
    }

    /// Combines two images of the same extent pixel by pixel.
    /// Returns `None` when the extents differ.
    pub fn zip_map<F: Fn(FloatPixel, FloatPixel) -> FloatPixel + Sync>(&self, other: &Self, f: F) -> Option<Self> {
        if self.extent() != other.extent() {
            return None;
        }

        let pixels = self.pixels
            .par_iter()
            .zip(other.pixels.par_iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        Some(Self { width: self.width, height: self.height, pixels })
    }
}

/// A pixel with 4 elements for 16-byte alignment.
/// The last element is alpha; it only matters for gain maps, where it is pinned to 1.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatPixel {
    inner: [f32; 4],
}

impl From<[f32; 3]> for FloatPixel {
    fn from(inner: [f32; 3]) -> Self {
        Self { inner: [inner[0], inner[1], inner[2], 0.0] }
    }
}

impl ops::Index<usize> for FloatPixel {
    type Output = f32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.inner[index]
    }
}

impl ops::IndexMut<usize> for FloatPixel {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.inner[index]
    }
}

impl ops::Add for FloatPixel {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(
            self.inner[0] + other.inner[0],
            self.inner[1] + other.inner[1],
            self.inner[2] + other.inner[2],
        )
    }
}

impl ops::Sub for FloatPixel {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(
            self.inner[0] - other.inner[0],
            self.inner[1] - other.inner[1],
            self.inner[2] - other.inner[2],
        )
    }
}

impl ops::Mul<f32> for FloatPixel {
    type Output = Self;

    fn mul(self, scalar: f32) -> Self::Output {
        Self::new(
            self.inner[0] * scalar,
            self.inner[1] * scalar,
            self.inner[2] * scalar,
        )
    }
}

impl ops::Div for FloatPixel {
    type Output = Self;

    fn div(self, other: Self) -> Self::Output {
        Self::new(
            self.inner[0] / other.inner[0],
            self.inner[1] / other.inner[1],
            self.inner[2] / other.inner[2],
        )
    }
}

impl FloatPixel {
    pub const fn zero() -> Self {
        Self { inner: [0.0, 0.0, 0.0, 0.0] }
    }

    pub const fn one() -> Self {
        Self { inner: [1.0, 1.0, 1.0, 0.0] }
    }

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { inner: [r, g, b, 0.0] }
    }

    pub const fn splat(v: f32) -> Self {
        Self { inner: [v, v, v, 0.0] }
    }

    #[inline]
    pub fn rgb(&self) -> [f32; 3] {
        [self.inner[0], self.inner[1], self.inner[2]]
    }

    #[inline]
    pub fn r(&self) -> f32 {
        self.inner[0]
    }

    #[inline]
    pub fn g(&self) -> f32 {
        self.inner[1]
    }

    #[inline]
    pub fn b(&self) -> f32 {
        self.inner[2]
    }

    #[inline]
    pub fn a(&self) -> f32 {
        self.inner[3]
    }

    #[inline]
    pub fn with_alpha(mut self, a: f32) -> Self {
        self.inner[3] = a;
        self
    }

    #[inline]
    pub fn max_component(&self) -> f32 {
        self.inner[0].max(self.inner[1]).max(self.inner[2])
    }

    #[inline]
    pub fn min_component(&self) -> f32 {
        self.inner[0].min(self.inner[1]).min(self.inner[2])
    }

    /// Channel-wise maximum.
    #[inline]
    pub fn max(&self, other: &Self) -> Self {
        Self::new(
            self.inner[0].max(other.inner[0]),
            self.inner[1].max(other.inner[1]),
            self.inner[2].max(other.inner[2]),
        )
    }

    /// Channel-wise minimum.
    #[inline]
    pub fn min(&self, other: &Self) -> Self {
        Self::new(
            self.inner[0].min(other.inner[0]),
            self.inner[1].min(other.inner[1]),
            self.inner[2].min(other.inner[2]),
        )
    }

    /// Clamps every channel into `[lo, hi]`. NaN lands on `lo`, so the result is always in range.
    #[inline]
    pub fn clamp(&self, lo: f32, hi: f32) -> Self {
        self.map(|c| if c.is_nan() { lo } else { c.clamp(lo, hi) })
    }

    #[inline]
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Self {
        Self::new(f(self.inner[0]), f(self.inner[1]), f(self.inner[2]))
    }
}
