use closetkit::{analyze, is_compatible};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};

/// Denim-ish garment cutout on a transparent background
fn synthetic_cutout(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let inside = x > width / 8
            && x < width - width / 8
            && y > height / 10
            && y < height - height / 10;
        if inside {
            // Per-pixel variance so the hue buckets see realistic spread
            let wobble = ((x * 7 + y * 13) % 32) as u8;
            Rgba([40 + wobble / 2, 70 + wobble, 160 + wobble / 2, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn bench_analyze(c: &mut Criterion) {
    let small = synthetic_cutout(256, 256);
    let large = synthetic_cutout(1024, 1024);

    c.bench_function("analyze_256", |b| b.iter(|| analyze(black_box(&small))));
    c.bench_function("analyze_1024", |b| b.iter(|| analyze(black_box(&large))));
}

fn bench_compatibility(c: &mut Criterion) {
    let wardrobe: Vec<String> = (0..64)
        .map(|i| {
            format!(
                "#{:02X}{:02X}{:02X}",
                (i * 37) % 256,
                (i * 91) % 256,
                (i * 53) % 256
            )
        })
        .collect();

    c.bench_function("is_compatible_pairwise_64", |b| {
        b.iter(|| {
            let mut matches = 0usize;
            for color_a in &wardrobe {
                for color_b in &wardrobe {
                    if is_compatible(black_box(color_a), black_box(color_b)) {
                        matches += 1;
                    }
                }
            }
            matches
        });
    });
}

criterion_group!(benches, bench_analyze, bench_compatibility);
criterion_main!(benches);
