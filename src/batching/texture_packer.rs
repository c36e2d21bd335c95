use std::collections::HashMap;
use std::ops::Index;

use glam::Vec2;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{HlodError, Result};
use crate::types::texture::fit_within;
use crate::types::{PixelFormat, SharedTexture, TextureId, WorkingTexture};

/// Border replicated around every placed texture to stop filtering bleed.
pub const BLEED_PADDING: u32 = 2;

static EMPTY_ID: TextureId = TextureId::EMPTY;

/// Identifies a build group registered with the packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

/// Identifies an atlas produced by a pack pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub usize);

/// The textures of one material, one entry per configured channel.
///
/// Entry 0 is the main texture: its name keys the atlas region shared by
/// every channel of the bundle.
#[derive(Debug, Clone, Default)]
pub struct MaterialTexture {
    textures: Vec<SharedTexture>,
}

impl MaterialTexture {
    pub fn new(textures: Vec<SharedTexture>) -> Self {
        Self { textures }
    }

    pub fn push(&mut self, texture: SharedTexture) {
        self.textures.push(texture);
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn get(&self, channel: usize) -> Option<&SharedTexture> {
        self.textures.get(channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedTexture> {
        self.textures.iter()
    }

    pub fn main(&self) -> Option<&SharedTexture> {
        self.textures.first()
    }

    /// Name of the main texture, empty for an empty bundle.
    pub fn name(&self) -> &str {
        self.main().map(|t| t.name.as_str()).unwrap_or("")
    }

    /// Content identity of the main texture.
    pub fn id(&self) -> &TextureId {
        self.main().map(|t| &t.id).unwrap_or(&EMPTY_ID)
    }

    /// Two bundles are the same content when both identity and name of
    /// their main textures match.
    pub fn same_content(&self, other: &MaterialTexture) -> bool {
        self.id() == other.id() && self.name() == other.name()
    }
}

impl Index<usize> for MaterialTexture {
    type Output = SharedTexture;

    fn index(&self, channel: usize) -> &SharedTexture {
        &self.textures[channel]
    }
}

/// Normalized placement of one texture inside an atlas image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasRegion {
    pub min: Vec2,
    pub max: Vec2,
    /// Texture was stored transposed.
    pub rotated: bool,
}

impl AtlasRegion {
    pub fn x_min(&self) -> f32 {
        self.min.x
    }

    pub fn y_min(&self) -> f32 {
        self.min.y
    }

    pub fn x_max(&self) -> f32 {
        self.max.x
    }

    pub fn y_max(&self) -> f32 {
        self.max.y
    }

    /// Map a texture-local UV (0..1) into atlas space.
    pub fn map(&self, uv: Vec2) -> Vec2 {
        let local = if self.rotated { Vec2::new(uv.y, uv.x) } else { uv };
        self.min + (self.max - self.min) * local
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// One packed atlas: an image per channel plus the region of every texture.
#[derive(Debug, Clone)]
pub struct TextureAtlas {
    pub id: AtlasId,
    /// Packed images, one per channel, in channel order.
    pub textures: Vec<WorkingTexture>,
    /// Atlas holds groups that overflowed the configured size.
    pub overflow: bool,
    regions: HashMap<String, AtlasRegion>,
    groups: Vec<GroupId>,
}

impl TextureAtlas {
    /// Region of the texture called `name`.
    pub fn get_uv(&self, name: &str) -> Option<AtlasRegion> {
        self.regions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &AtlasRegion)> {
        self.regions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Pixel size of the packed images.
    pub fn size(&self) -> (u32, u32) {
        self.textures.first().map(|t| t.dimensions()).unwrap_or((0, 0))
    }
}

/// A distinct texture bundle known to the packer, keyed by main-texture name.
struct SourceEntry {
    name: String,
    bundle: MaterialTexture,
}

struct PendingGroup {
    id: GroupId,
    /// Indices into `TexturePacker::sources`, without duplicates.
    sources: Vec<usize>,
}

/// A source bundle downsampled to the per-texture limit.
struct Prepared {
    width: u32,
    height: u32,
    channels: Vec<RgbaImage>,
    linear: Vec<bool>,
}

/// A free rectangle in the guillotine packer.
#[derive(Debug, Clone, Copy)]
struct FreeRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// Placement of one source inside an atlas bin.
#[derive(Debug, Clone, Copy)]
struct Placement {
    source: usize,
    /// Top-left of the padded region, in pixels.
    x: u32,
    y: u32,
    /// Content size before rotation.
    w: u32,
    h: u32,
    rotated: bool,
}

impl Placement {
    /// Content size as laid out in the atlas.
    fn laid_out(&self) -> (u32, u32) {
        if self.rotated { (self.h, self.w) } else { (self.w, self.h) }
    }

    fn right(&self) -> u32 {
        self.x + self.laid_out().0 + BLEED_PADDING * 2
    }

    fn bottom(&self) -> u32 {
        self.y + self.laid_out().1 + BLEED_PADDING * 2
    }
}

/// Packing state of one atlas while groups are being assigned.
struct AtlasBin {
    size: u32,
    free: Vec<FreeRect>,
    placements: Vec<Placement>,
    placed: HashMap<usize, usize>,
    groups: Vec<GroupId>,
    overflow: bool,
}

impl AtlasBin {
    fn new(size: u32) -> Self {
        Self {
            size,
            free: vec![FreeRect {
                x: 0,
                y: 0,
                w: size,
                h: size,
            }],
            placements: Vec::new(),
            placed: HashMap::new(),
            groups: Vec::new(),
            overflow: false,
        }
    }

    /// Place every item not already on this bin, all or nothing.
    ///
    /// Items are `(source, width, height)`. Sources already placed keep
    /// their existing rectangle.
    fn try_insert(&mut self, items: &[(usize, u32, u32)], allow_rotation: bool) -> bool {
        let mut pending: Vec<(usize, u32, u32)> = items
            .iter()
            .filter(|(source, _, _)| !self.placed.contains_key(source))
            .copied()
            .collect();

        // Largest first; ties broken by area then registration order
        pending.sort_by(|a, b| {
            let max_a = a.1.max(a.2);
            let max_b = b.1.max(b.2);
            max_b
                .cmp(&max_a)
                .then_with(|| (b.1 * b.2).cmp(&(a.1 * a.2)))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut free = self.free.clone();
        let mut placements = Vec::with_capacity(pending.len());

        for (source, w, h) in pending {
            let total_w = w + BLEED_PADDING * 2;
            let total_h = h + BLEED_PADDING * 2;

            let Some(fit) = find_bssf(&free, total_w, total_h, allow_rotation) else {
                return false;
            };

            let rect = free.remove(fit.rect_idx);
            let (used_w, used_h) = if fit.rotated {
                (total_h, total_w)
            } else {
                (total_w, total_h)
            };
            guillotine_split(&mut free, &rect, used_w, used_h);

            placements.push(Placement {
                source,
                x: rect.x,
                y: rect.y,
                w,
                h,
                rotated: fit.rotated,
            });
        }

        self.free = free;
        for p in placements {
            self.placed.insert(p.source, self.placements.len());
            self.placements.push(p);
        }
        true
    }

    /// Smallest power-of-two edge containing every placement.
    fn used_size(&self) -> u32 {
        let extent = self
            .placements
            .iter()
            .map(|p| p.right().max(p.bottom()))
            .max()
            .unwrap_or(1);
        extent.next_power_of_two().min(self.size).max(extent).max(1)
    }
}

struct BssfResult {
    rect_idx: usize,
    rotated: bool,
}

/// Best short side fit over the free list, optionally trying the transposed size.
fn find_bssf(free_rects: &[FreeRect], w: u32, h: u32, allow_rotation: bool) -> Option<BssfResult> {
    let mut best: Option<BssfResult> = None;
    let mut best_short_side = u32::MAX;

    for (i, rect) in free_rects.iter().enumerate() {
        if rect.w >= w && rect.h >= h {
            let short_side = (rect.w - w).min(rect.h - h);
            if short_side < best_short_side {
                best_short_side = short_side;
                best = Some(BssfResult {
                    rect_idx: i,
                    rotated: false,
                });
            }
        }
        if allow_rotation && w != h && rect.w >= h && rect.h >= w {
            let short_side = (rect.w - h).min(rect.h - w);
            if short_side < best_short_side {
                best_short_side = short_side;
                best = Some(BssfResult {
                    rect_idx: i,
                    rotated: true,
                });
            }
        }
    }

    best
}

fn guillotine_split(free_rects: &mut Vec<FreeRect>, rect: &FreeRect, w: u32, h: u32) {
    let right_w = rect.w - w;
    let below_h = rect.h - h;

    if right_w > 0 {
        free_rects.push(FreeRect {
            x: rect.x + w,
            y: rect.y,
            w: right_w,
            h,
        });
    }

    if below_h > 0 {
        free_rects.push(FreeRect {
            x: rect.x,
            y: rect.y + h,
            w: rect.w,
            h: below_h,
        });
    }
}

/// Packs the textures of many build groups into shared atlases.
///
/// Groups are registered with [`add_texture_group`](Self::add_texture_group),
/// then [`pack`](Self::pack) assigns every group to exactly one atlas. Region
/// lookups are only valid once `pack` has returned.
#[derive(Default)]
pub struct TexturePacker {
    sources: Vec<SourceEntry>,
    by_name: HashMap<String, usize>,
    groups: Vec<PendingGroup>,
    atlases: Vec<TextureAtlas>,
    group_atlas: HashMap<GroupId, AtlasId>,
    overflowed: Vec<GroupId>,
    packed: bool,
}

impl TexturePacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bundles that must end up on the same atlas as `group`.
    ///
    /// Bundles are keyed by main-texture name; the first bundle registered
    /// under a name is the one packed.
    pub fn add_texture_group(&mut self, group: GroupId, textures: Vec<MaterialTexture>) -> Result<()> {
        if self.packed {
            return Err(HlodError::Packing(format!(
                "group {} registered after packing completed",
                group.0
            )));
        }
        if self.groups.iter().any(|g| g.id == group) {
            return Err(HlodError::Packing(format!("group {} registered twice", group.0)));
        }

        let mut sources = Vec::with_capacity(textures.len());
        for bundle in textures {
            if bundle.is_empty() {
                warn!(group = group.0, "Skipping empty texture bundle");
                continue;
            }
            let name = bundle.name().to_string();
            let idx = match self.by_name.get(&name) {
                Some(&idx) => {
                    if self.sources[idx].bundle.id() != bundle.id() {
                        debug!(
                            name = %name,
                            kept = %self.sources[idx].bundle.id(),
                            dropped = %bundle.id(),
                            "Texture name already registered with different content"
                        );
                    }
                    idx
                }
                None => {
                    self.sources.push(SourceEntry {
                        name: name.clone(),
                        bundle,
                    });
                    self.by_name.insert(name, self.sources.len() - 1);
                    self.sources.len() - 1
                }
            };
            if !sources.contains(&idx) {
                sources.push(idx);
            }
        }

        self.groups.push(PendingGroup { id: group, sources });
        Ok(())
    }

    /// Pack every registered group into one or more atlases.
    ///
    /// Textures larger than `texture_limit` are downsampled first. A group
    /// that cannot fit an empty `atlas_size` atlas is an overflow: it gets a
    /// fallback atlas of its own with its textures shrunk until they fit.
    pub fn pack(&mut self, format: PixelFormat, atlas_size: u32, texture_limit: u32, allow_rotation: bool) -> Result<()> {
        if self.packed {
            return Err(HlodError::Packing("pack called twice on the same packer".into()));
        }
        if atlas_size == 0 || texture_limit == 0 {
            return Err(HlodError::Packing(format!(
                "atlas size ({atlas_size}) and texture limit ({texture_limit}) must be positive"
            )));
        }

        let prepared: Vec<Prepared> = self
            .sources
            .par_iter()
            .map(|s| prepare(&s.bundle, texture_limit))
            .collect();

        let mut bins: Vec<AtlasBin> = Vec::new();
        for group in &self.groups {
            let items: Vec<(usize, u32, u32)> = group
                .sources
                .iter()
                .map(|&s| (s, prepared[s].width, prepared[s].height))
                .collect();

            let existing = bins
                .iter_mut()
                .position(|bin| !bin.overflow && bin.try_insert(&items, allow_rotation));

            let bin_idx = match existing {
                Some(idx) => idx,
                None => {
                    let mut bin = AtlasBin::new(atlas_size);
                    if !bin.try_insert(&items, allow_rotation) {
                        warn!(
                            group = group.id.0,
                            textures = items.len(),
                            atlas_size,
                            "Packing overflow, emitting group to a fallback atlas"
                        );
                        bin = pack_overflow(&items, atlas_size, allow_rotation);
                        self.overflowed.push(group.id);
                    }
                    bins.push(bin);
                    bins.len() - 1
                }
            };

            bins[bin_idx].groups.push(group.id);
            self.group_atlas.insert(group.id, AtlasId(bin_idx));
        }

        let channel_count = self.sources.iter().map(|s| s.bundle.len()).max().unwrap_or(1);
        let sources = &self.sources;
        self.atlases = bins
            .par_iter()
            .enumerate()
            .map(|(i, bin)| compose_atlas(AtlasId(i), bin, sources, &prepared, channel_count, format))
            .collect();
        self.packed = true;

        info!(
            groups = self.groups.len(),
            textures = self.sources.len(),
            atlases = self.atlases.len(),
            overflow = self.overflowed.len(),
            "Texture packing complete"
        );
        Ok(())
    }

    /// Atlas holding the textures of `group`; `None` before packing.
    pub fn get_atlas(&self, group: GroupId) -> Option<&TextureAtlas> {
        self.group_atlas
            .get(&group)
            .and_then(|id| self.atlases.get(id.0))
    }

    pub fn get_all_atlases(&self) -> &[TextureAtlas] {
        &self.atlases
    }

    pub fn is_overflow(&self, group: GroupId) -> bool {
        self.overflowed.contains(&group)
    }

    pub fn overflow_groups(&self) -> &[GroupId] {
        &self.overflowed
    }

    /// Number of distinct texture names registered.
    pub fn texture_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }
}

/// Downsample every channel of a bundle to the main texture's limited size.
fn prepare(bundle: &MaterialTexture, limit: u32) -> Prepared {
    let main = &bundle[0];
    let (width, height) = fit_within(main.width(), main.height(), limit);

    let channels = bundle
        .iter()
        .map(|t| {
            if t.dimensions() == (width, height) {
                t.pixels.clone()
            } else {
                imageops::resize(&t.pixels, width, height, FilterType::Triangle)
            }
        })
        .collect();

    Prepared {
        width,
        height,
        channels,
        linear: bundle.iter().map(|t| t.linear).collect(),
    }
}

/// Build a dedicated atlas for a group that overflowed, halving its textures
/// until they fit. Once every texture is a single pixel the atlas grows.
fn pack_overflow(items: &[(usize, u32, u32)], atlas_size: u32, allow_rotation: bool) -> AtlasBin {
    let mut size = atlas_size;
    let mut shift = 1u32;
    loop {
        let scaled: Vec<(usize, u32, u32)> = items
            .iter()
            .map(|&(s, w, h)| (s, (w >> shift.min(31)).max(1), (h >> shift.min(31)).max(1)))
            .collect();

        let mut bin = AtlasBin::new(size);
        bin.overflow = true;
        if bin.try_insert(&scaled, allow_rotation) {
            debug!(shift, size, "Fallback atlas packed");
            return bin;
        }

        if scaled.iter().all(|&(_, w, h)| w == 1 && h == 1) {
            size = size.saturating_mul(2);
        } else {
            shift += 1;
        }
    }
}

/// Composite the channel images and region table of one bin.
fn compose_atlas(
    id: AtlasId,
    bin: &AtlasBin,
    sources: &[SourceEntry],
    prepared: &[Prepared],
    channel_count: usize,
    format: PixelFormat,
) -> TextureAtlas {
    let size = bin.used_size();
    let size_f = size as f32;

    let mut regions = HashMap::with_capacity(bin.placements.len());
    for p in &bin.placements {
        let (cw, ch) = p.laid_out();
        let inner_x = (p.x + BLEED_PADDING) as f32;
        let inner_y = (p.y + BLEED_PADDING) as f32;
        regions.insert(
            sources[p.source].name.clone(),
            AtlasRegion {
                min: Vec2::new(inner_x / size_f, inner_y / size_f),
                max: Vec2::new((inner_x + cw as f32) / size_f, (inner_y + ch as f32) / size_f),
                rotated: p.rotated,
            },
        );
    }

    let textures = (0..channel_count)
        .map(|channel| {
            let clear = match format {
                PixelFormat::Rgba32 => Rgba([0, 0, 0, 0]),
                PixelFormat::Rgb24 => Rgba([0, 0, 0, 255]),
            };
            let mut image = RgbaImage::from_pixel(size, size, clear);
            let mut linear = false;

            for p in &bin.placements {
                let source = &prepared[p.source];
                let Some(pixels) = source.channels.get(channel) else {
                    continue;
                };
                linear |= source.linear.get(channel).copied().unwrap_or(false);

                if (p.w, p.h) == (source.width, source.height) {
                    blit(&mut image, pixels, p);
                } else {
                    let scaled = imageops::resize(pixels, p.w, p.h, FilterType::Triangle);
                    blit(&mut image, &scaled, p);
                }
                fill_bleed(&mut image, p);
            }

            if format == PixelFormat::Rgb24 {
                for px in image.pixels_mut() {
                    px[3] = 255;
                }
            }

            WorkingTexture {
                name: format!("atlas_{}_{}", id.0, channel),
                id: TextureId::EMPTY,
                format,
                linear,
                pixels: image,
            }
        })
        .collect();

    TextureAtlas {
        id,
        textures,
        overflow: bin.overflow,
        regions,
        groups: bin.groups.clone(),
    }
}

/// Copy `src` into the content area of `p`, transposing rotated placements.
fn blit(atlas: &mut RgbaImage, src: &RgbaImage, p: &Placement) {
    let x0 = p.x + BLEED_PADDING;
    let y0 = p.y + BLEED_PADDING;
    for (sx, sy, px) in src.enumerate_pixels() {
        let (dx, dy) = if p.rotated { (sy, sx) } else { (sx, sy) };
        atlas.put_pixel(x0 + dx, y0 + dy, *px);
    }
}

/// Replicate edge pixels into the padding ring around a placement.
fn fill_bleed(atlas: &mut RgbaImage, p: &Placement) {
    let pad = BLEED_PADDING;
    let inner_x = p.x + pad;
    let inner_y = p.y + pad;
    let (inner_w, inner_h) = p.laid_out();

    if inner_w == 0 || inner_h == 0 {
        return;
    }

    // Top and bottom rows
    for px in inner_x..inner_x + inner_w {
        let top = *atlas.get_pixel(px, inner_y);
        let bottom = *atlas.get_pixel(px, inner_y + inner_h - 1);
        for d in 1..=pad {
            atlas.put_pixel(px, inner_y - d, top);
            atlas.put_pixel(px, inner_y + inner_h - 1 + d, bottom);
        }
    }

    // Left and right columns across the padded height, which fills corners
    for py in p.y..p.y + inner_h + pad * 2 {
        let left = *atlas.get_pixel(inner_x, py);
        let right = *atlas.get_pixel(inner_x + inner_w - 1, py);
        for d in 1..=pad {
            atlas.put_pixel(inner_x - d, py, left);
            atlas.put_pixel(inner_x + inner_w - 1 + d, py, right);
        }
    }
}
