use anyhow::{bail, Result};

/// Square tiling of a fixed-size framebuffer into `blocks_per_row` ×
/// `blocks_per_row` cells of side `width / blocks_per_row`.
///
/// The grid may overhang the bottom of the framebuffer; it never overhangs
/// the right edge because the tile side divides the width exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tile_side: usize,
    blocks_per_row: usize,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, blocks_per_row: usize) -> Result<Self> {
        if blocks_per_row == 0 {
            bail!("tile grid needs at least one block per row");
        }
        if width < blocks_per_row || width % blocks_per_row != 0 {
            bail!("framebuffer width {width} is not a multiple of {blocks_per_row} blocks per row");
        }
        if height == 0 {
            bail!("framebuffer height must be non-zero");
        }
        Ok(Self {
            width,
            height,
            tile_side: width / blocks_per_row,
            blocks_per_row,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_side(&self) -> usize {
        self.tile_side
    }

    pub fn blocks_per_row(&self) -> usize {
        self.blocks_per_row
    }

    pub fn slot_count(&self) -> usize {
        self.blocks_per_row * self.blocks_per_row
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn tile_pixels(&self) -> usize {
        self.tile_side * self.tile_side
    }

    pub fn slot_index(&self, row: usize, col: usize) -> usize {
        row * self.blocks_per_row + col
    }

    /// Framebuffer offset of the top-left pixel of cell `(row, col)`.
    pub fn block_start(&self, row: usize, col: usize) -> usize {
        row * self.tile_side * self.width + col * self.tile_side
    }

    /// Number of cells that land on the framebuffer, in row-major order.
    pub fn visible_slots(&self) -> usize {
        let rows = self.height.div_ceil(self.tile_side).min(self.blocks_per_row);
        rows * self.blocks_per_row
    }

    pub fn scratch(&self) -> Vec<u32> {
        vec![0; self.tile_pixels()]
    }
}

/// Copies every on-buffer tile of `framebuffer` into `scratch` in row-major
/// order and hands it to `present` with the tile's slot index.
///
/// Scratch rows that fall below the framebuffer are zero-filled. The walk
/// stops at the first cell whose top-left pixel is off the buffer. Returns
/// the number of tiles presented; `present` errors are returned immediately.
pub fn blit<F>(
    grid: &TileGrid,
    framebuffer: &[u32],
    scratch: &mut [u32],
    mut present: F,
) -> Result<usize>
where
    F: FnMut(usize, &[u32]) -> Result<()>,
{
    if framebuffer.len() < grid.pixel_count() {
        bail!(
            "framebuffer holds {} pixels, expected {}x{}",
            framebuffer.len(),
            grid.width,
            grid.height
        );
    }
    if scratch.len() < grid.tile_pixels() {
        bail!("scratch tile holds {} pixels, expected {}", scratch.len(), grid.tile_pixels());
    }

    let side = grid.tile_side;
    let total = grid.pixel_count();
    let scratch = &mut scratch[..grid.tile_pixels()];
    let mut presented = 0;

    for row in 0..grid.blocks_per_row {
        for col in 0..grid.blocks_per_row {
            let block_start = grid.block_start(row, col);
            if block_start >= total {
                return Ok(presented);
            }

            for (k, dst) in scratch.chunks_exact_mut(side).enumerate() {
                let row_start = block_start + k * grid.width;
                if row_start < total {
                    dst.copy_from_slice(&framebuffer[row_start..row_start + side]);
                } else {
                    dst.fill(0);
                }
            }

            present(grid.slot_index(row, col), scratch)?;
            presented += 1;
        }
    }

    Ok(presented)
}
