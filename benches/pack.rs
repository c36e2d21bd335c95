use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use hlod_batcher::batching::{GroupId, MaterialTexture, TexturePacker};
use hlod_batcher::types::{PixelFormat, TextureId, WorkingTexture};
use image::{Rgba, RgbaImage};

/// `count` textures of varying size, each a distinct solid colour.
fn make_textures(count: usize) -> Vec<MaterialTexture> {
    (0..count)
        .map(|i| {
            let size: u32 = 16 << (i % 4);
            let shade = (i * 37 % 256) as u8;
            let pixels = RgbaImage::from_pixel(size, size / (1 + (i % 2) as u32), Rgba([shade, 255 - shade, 64, 255]));
            let texture = WorkingTexture::from_image(format!("tex_{i}"), TextureId::new(format!("guid-{i}")), pixels);
            MaterialTexture::new(vec![Arc::new(texture)])
        })
        .collect()
}

fn bench_pack(c: &mut Criterion) {
    let textures = make_textures(64);

    c.bench_function("pack_64_textures_4_groups_1024", |b| {
        b.iter_batched(
            || {
                let mut packer = TexturePacker::new();
                for (g, chunk) in textures.chunks(16).enumerate() {
                    packer.add_texture_group(GroupId(g), chunk.to_vec()).unwrap();
                }
                packer
            },
            |mut packer| packer.pack(PixelFormat::Rgba32, 1024, 128, false).unwrap(),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("pack_64_textures_rotated_512", |b| {
        b.iter_batched(
            || {
                let mut packer = TexturePacker::new();
                packer.add_texture_group(GroupId(0), textures.clone()).unwrap();
                packer
            },
            |mut packer| packer.pack(PixelFormat::Rgba32, 512, 64, true).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_pack);
criterion_main!(benches);
