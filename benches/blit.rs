use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trayframe::display::{blit, TileGrid};

/// Tile extraction for a full 320x200 frame on the default 8x8 grid.
fn bench_blit(c: &mut Criterion) {
    let grid = TileGrid::new(320, 200, 8).expect("grid");
    let frame: Vec<u32> = (0..320 * 200).map(|i| i as u32).collect();
    let mut scratch = grid.scratch();

    c.bench_function("blit_320x200", |b| {
        b.iter(|| {
            let mut checksum = 0u32;
            let _ = blit(&grid, black_box(&frame), &mut scratch, |slot, pixels| {
                checksum = checksum.wrapping_add(slot as u32 ^ pixels[0]);
                Ok(())
            });
            black_box(checksum)
        })
    });
}

criterion_group!(benches, bench_blit);
criterion_main!(benches);
