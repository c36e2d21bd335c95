use std::sync::Arc;

use glam::Vec4;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Pixel layout of a working texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Rgba32,
    /// Alpha is always stored as fully opaque.
    Rgb24,
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Rgba32 => write!(f, "rgba32"),
            PixelFormat::Rgb24 => write!(f, "rgb24"),
        }
    }
}

/// Content identity of a texture (the GUID of its source asset).
///
/// Procedurally generated textures carry [`TextureId::EMPTY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureId(String);

impl TextureId {
    pub const EMPTY: TextureId = TextureId(String::new());

    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A texture shared between materials, bundles and atlases.
///
/// Shared instances are read-only; clone the inner texture before mutating.
pub type SharedTexture = Arc<WorkingTexture>;

/// CPU-side pixel buffer used throughout a build pass.
///
/// Cloning copies the pixel storage but keeps `name` and `id`, so a clone
/// still deduplicates against its source.
#[derive(Debug, Clone)]
pub struct WorkingTexture {
    pub name: String,
    pub id: TextureId,
    pub format: PixelFormat,
    /// Linear (true) or gamma (false) color space.
    pub linear: bool,
    pub pixels: RgbaImage,
}

impl WorkingTexture {
    /// Allocate a cleared texture without a content identity.
    pub fn new(name: impl Into<String>, format: PixelFormat, width: u32, height: u32, linear: bool) -> Self {
        let clear = match format {
            PixelFormat::Rgba32 => Rgba([0, 0, 0, 0]),
            PixelFormat::Rgb24 => Rgba([0, 0, 0, 255]),
        };
        Self {
            name: name.into(),
            id: TextureId::EMPTY,
            format,
            linear,
            pixels: RgbaImage::from_pixel(width, height, clear),
        }
    }

    /// Wrap decoded image data loaded from a source asset.
    pub fn from_image(name: impl Into<String>, id: TextureId, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            id,
            format: PixelFormat::Rgba32,
            linear: false,
            pixels,
        }
    }

    /// Flat-colored RGB texture, used for default fillers.
    pub fn solid(name: impl Into<String>, width: u32, height: u32, color: Vec4, linear: bool) -> Self {
        let mut texture = Self::new(name, PixelFormat::Rgb24, width, height, linear);
        let px = to_rgba8(color, PixelFormat::Rgb24);
        for p in texture.pixels.pixels_mut() {
            *p = px;
        }
        texture
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Pixel as normalized RGBA.
    pub fn get_pixel(&self, x: u32, y: u32) -> Vec4 {
        let p = self.pixels.get_pixel(x, y).0;
        Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        self.pixels.put_pixel(x, y, to_rgba8(color, self.format));
    }

    /// Multiply every pixel by `tint`, channel by channel.
    pub fn apply_tint(&mut self, tint: Vec4) {
        let format = self.format;
        for p in self.pixels.pixels_mut() {
            let c = Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0;
            *p = to_rgba8(c * tint, format);
        }
    }

    /// Copy of this texture whose largest side is at most `limit` pixels.
    ///
    /// Aspect ratio is preserved; neither side drops below one pixel.
    pub fn downsampled(&self, limit: u32) -> WorkingTexture {
        let (w, h) = self.dimensions();
        let (tw, th) = fit_within(w, h, limit);
        if (tw, th) == (w, h) {
            return self.clone();
        }
        self.resized(tw, th)
    }

    /// Copy of this texture resampled to exactly `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> WorkingTexture {
        let pixels = if self.dimensions() == (width, height) {
            self.pixels.clone()
        } else {
            imageops::resize(&self.pixels, width.max(1), height.max(1), FilterType::Triangle)
        };
        WorkingTexture {
            name: self.name.clone(),
            id: self.id.clone(),
            format: self.format,
            linear: self.linear,
            pixels,
        }
    }
}

/// Scale `(w, h)` down so the larger side is at most `limit`.
pub(crate) fn fit_within(w: u32, h: u32, limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let largest = w.max(h);
    if largest <= limit {
        return (w.max(1), h.max(1));
    }
    let scale = limit as f64 / largest as f64;
    let tw = ((w as f64 * scale).round() as u32).clamp(1, limit);
    let th = ((h as f64 * scale).round() as u32).clamp(1, limit);
    (tw, th)
}

fn to_rgba8(color: Vec4, format: PixelFormat) -> Rgba<u8> {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    let alpha = match format {
        PixelFormat::Rgba32 => c.w as u8,
        PixelFormat::Rgb24 => 255,
    };
    Rgba([c.x as u8, c.y as u8, c.z as u8, alpha])
}
