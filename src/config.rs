use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HlodError, Result};
use crate::types::PixelFormat;

/// Atlas sizes accepted for `pack_texture_size`.
pub const PACK_TEXTURE_SIZES: [u32; 5] = [256, 512, 1024, 2048, 4096];

/// Per-texture limits accepted for `limit_texture_size`.
pub const LIMIT_TEXTURE_SIZES: [u32; 6] = [32, 64, 128, 256, 512, 1024];

/// Semantic type of a texture channel; selects the default filler texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingType {
    White,
    Black,
    Normal,
}

impl std::fmt::Display for PackingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackingType::White => write!(f, "white"),
            PackingType::Black => write!(f, "black"),
            PackingType::Normal => write!(f, "normal"),
        }
    }
}

/// Maps a source material slot to a slot on the combined material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub input_name: String,
    pub output_name: String,
    pub packing: PackingType,
}

impl ChannelDescriptor {
    pub fn new(input_name: impl Into<String>, output_name: impl Into<String>, packing: PackingType) -> Self {
        Self {
            input_name: input_name.into(),
            output_name: output_name.into(),
            packing,
        }
    }
}

/// Texture batching parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Edge length of each atlas in pixels.
    pub pack_texture_size: u32,
    /// Largest edge a single source texture may keep inside an atlas.
    pub limit_texture_size: u32,
    pub format: PixelFormat,
    pub allow_rotation: bool,
    /// Identity of an existing material to reuse for combined output.
    pub material_template: Option<String>,
    pub enable_tint_color: bool,
    pub tint_color_name: String,
    pub channels: Vec<ChannelDescriptor>,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            pack_texture_size: 1024,
            limit_texture_size: 128,
            format: PixelFormat::Rgba32,
            allow_rotation: false,
            material_template: None,
            enable_tint_color: false,
            tint_color_name: String::new(),
            channels: vec![ChannelDescriptor::new("_MainTex", "_MainTex", PackingType::White)],
        }
    }
}

impl BatcherConfig {
    /// Slot that UV remapping and tint baking operate on.
    pub fn main_channel(&self) -> &ChannelDescriptor {
        &self.channels[0]
    }

    pub fn validate(&self) -> Result<()> {
        if !PACK_TEXTURE_SIZES.contains(&self.pack_texture_size) {
            return Err(HlodError::Config(format!(
                "pack_texture_size {} is not one of {:?}",
                self.pack_texture_size, PACK_TEXTURE_SIZES
            )));
        }
        if !LIMIT_TEXTURE_SIZES.contains(&self.limit_texture_size) {
            return Err(HlodError::Config(format!(
                "limit_texture_size {} is not one of {:?}",
                self.limit_texture_size, LIMIT_TEXTURE_SIZES
            )));
        }
        if self.channels.is_empty() {
            return Err(HlodError::Config("at least one texture channel is required".into()));
        }
        if let Some(ch) = self.channels.iter().find(|c| c.input_name.is_empty() || c.output_name.is_empty()) {
            return Err(HlodError::Config(format!(
                "channel '{}' -> '{}' has an empty slot name",
                ch.input_name, ch.output_name
            )));
        }
        if self.enable_tint_color && self.tint_color_name.is_empty() {
            return Err(HlodError::Config(
                "tint color is enabled but no tint property is named".into(),
            ));
        }
        Ok(())
    }
}

/// Mesh simplification parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifierConfig {
    pub enabled: bool,
    /// Fraction of the original unique vertices to keep, in [0, 1].
    pub vertex_amount: f32,
    pub lock_border: bool,
    /// Relative error budget handed to the engine.
    pub target_error: f32,
}

impl Default for SimplifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vertex_amount: 1.0,
            lock_border: true,
            target_error: 0.01,
        }
    }
}

impl SimplifierConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vertex_amount) {
            return Err(HlodError::Config(format!(
                "vertex_amount {} must lie in [0, 1]",
                self.vertex_amount
            )));
        }
        if !self.target_error.is_finite() || self.target_error < 0.0 {
            return Err(HlodError::Config(format!(
                "target_error {} must be a non-negative number",
                self.target_error
            )));
        }
        Ok(())
    }

    /// Resolve the engine's vertex budget from a unique vertex count.
    pub fn target_vertex_count(&self, unique_vertices: usize) -> usize {
        (self.vertex_amount as f64 * unique_vertices as f64).round() as usize
    }
}

/// Simplification cache parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory backing the file asset store.
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("hlod-cache"),
        }
    }
}

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batcher: BatcherConfig,
    pub simplifier: SimplifierConfig,
    pub cache: CacheConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.batcher.validate()?;
        self.simplifier.validate()
    }

    /// Parse and validate a JSON options record.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
