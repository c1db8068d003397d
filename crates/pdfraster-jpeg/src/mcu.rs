//! MCU-to-band writers: colour conversion and chroma upsampling.
//!
//! After the IDCT fills the per-component tiles of one MCU, a band writer
//! moves those samples into the interleaved output band. There are four
//! specialisations keyed off component count and colour model; dispatch is
//! static over one enum. All writers clip against the right image edge and
//! honour the band's row count, so partial edge MCUs never write outside
//! the image.

use enum_dispatch::enum_dispatch;

use crate::parser::ColorModel;

/// One component's decoded samples for the current MCU, `8*h` by `8*v`
/// pixels in row-major order.
#[derive(Debug, Clone)]
pub struct Tile {
    pub data: Vec<u8>,
    /// Row length in samples (`8 * h`).
    pub width: usize,
    /// Number of sample rows (`8 * v`).
    pub height: usize,
    /// Horizontal sampling factor of the component.
    pub h: u8,
    /// Vertical sampling factor of the component.
    pub v: u8,
}

impl Tile {
    pub fn new(h: u8, v: u8) -> Self {
        let width = 8 * h as usize;
        let height = 8 * v as usize;
        Tile { data: vec![0; width * height], width, height, h, v }
    }
}

/// Everything a writer needs for one MCU column of the current band.
pub struct BandContext<'a> {
    /// Per-frame-component tiles, IDCT output for this MCU.
    pub tiles: &'a [Tile],
    /// Leftmost image x covered by this MCU.
    pub x_base: usize,
    /// Rows of the band that are inside the image.
    pub rows: usize,
    /// The output band, `rows * stride` bytes live.
    pub band: &'a mut [u8],
    pub image_width: usize,
    /// MCU width in pixels.
    pub mcu_width: usize,
    pub h_max: u8,
    pub v_max: u8,
    /// Output row length in bytes.
    pub stride: usize,
}

/// Nearest-neighbour sample lookup with replication by sampling factors.
#[inline]
fn sample(tile: &Tile, x: usize, y: usize, h_max: u8, v_max: u8) -> i32 {
    let sx = x * tile.h as usize / h_max as usize;
    let sy = y * tile.v as usize / v_max as usize;
    i32::from(tile.data[sy * tile.width + sx])
}

#[inline]
fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// ITU T.871 YCbCr to RGB, fixed point with half-up rounding.
#[inline]
pub(crate) fn ycbcr_to_rgb(y: i32, cb: i32, cr: i32) -> (u8, u8, u8) {
    let cb = cb - 128;
    let cr = cr - 128;
    let r = ((y << 16) + 91881 * cr + 32768) >> 16;
    let g = ((y << 16) - 22554 * cb - 46802 * cr + 32768) >> 16;
    let b = ((y << 16) + 116130 * cb + 32768) >> 16;
    (clamp8(r), clamp8(g), clamp8(b))
}

/// Writes one MCU column into the interleaved output band.
#[enum_dispatch(McuWriter)]
pub trait BandWrite {
    fn write_mcu(&self, ctx: &mut BandContext<'_>);
}

/// Single-component copy.
#[derive(Debug, Clone, Copy)]
pub struct GrayWriter;

impl BandWrite for GrayWriter {
    fn write_mcu(&self, ctx: &mut BandContext<'_>) {
        let tile = &ctx.tiles[0];
        for row in 0..ctx.rows {
            let out = row * ctx.stride;
            for x in 0..ctx.mcu_width {
                let ix = ctx.x_base + x;
                if ix >= ctx.image_width {
                    break;
                }
                ctx.band[out + ix] =
                    sample(tile, x, row, ctx.h_max, ctx.v_max) as u8;
            }
        }
    }
}

/// Three components to RGB; converts from YCbCr unless the stream is
/// RGB-tagged, in which case the planes copy straight through.
#[derive(Debug, Clone, Copy)]
pub struct RgbWriter {
    pub from_ycbcr: bool,
}

impl BandWrite for RgbWriter {
    fn write_mcu(&self, ctx: &mut BandContext<'_>) {
        for row in 0..ctx.rows {
            let out = row * ctx.stride;
            for x in 0..ctx.mcu_width {
                let ix = ctx.x_base + x;
                if ix >= ctx.image_width {
                    break;
                }
                let c0 = sample(&ctx.tiles[0], x, row, ctx.h_max, ctx.v_max);
                let c1 = sample(&ctx.tiles[1], x, row, ctx.h_max, ctx.v_max);
                let c2 = sample(&ctx.tiles[2], x, row, ctx.h_max, ctx.v_max);
                let (r, g, b) = if self.from_ycbcr {
                    ycbcr_to_rgb(c0, c1, c2)
                } else {
                    (c0 as u8, c1 as u8, c2 as u8)
                };
                let p = out + ix * 3;
                ctx.band[p] = r;
                ctx.band[p + 1] = g;
                ctx.band[p + 2] = b;
            }
        }
    }
}

/// Four components, YCbCr-encoded CMY plus K: inverse-transform the first
/// three channels, invert, and copy K.
#[derive(Debug, Clone, Copy)]
pub struct YcckWriter;

impl BandWrite for YcckWriter {
    fn write_mcu(&self, ctx: &mut BandContext<'_>) {
        for row in 0..ctx.rows {
            let out = row * ctx.stride;
            for x in 0..ctx.mcu_width {
                let ix = ctx.x_base + x;
                if ix >= ctx.image_width {
                    break;
                }
                let y = sample(&ctx.tiles[0], x, row, ctx.h_max, ctx.v_max);
                let cb = sample(&ctx.tiles[1], x, row, ctx.h_max, ctx.v_max);
                let cr = sample(&ctx.tiles[2], x, row, ctx.h_max, ctx.v_max);
                let k = sample(&ctx.tiles[3], x, row, ctx.h_max, ctx.v_max);
                let (r, g, b) = ycbcr_to_rgb(y, cb, cr);
                let p = out + ix * 4;
                ctx.band[p] = 255 - r;
                ctx.band[p + 1] = 255 - g;
                ctx.band[p + 2] = 255 - b;
                ctx.band[p + 3] = k as u8;
            }
        }
    }
}

/// Four components, straight CMYK plane copy.
#[derive(Debug, Clone, Copy)]
pub struct CmykWriter;

impl BandWrite for CmykWriter {
    fn write_mcu(&self, ctx: &mut BandContext<'_>) {
        for row in 0..ctx.rows {
            let out = row * ctx.stride;
            for x in 0..ctx.mcu_width {
                let ix = ctx.x_base + x;
                if ix >= ctx.image_width {
                    break;
                }
                let p = out + ix * 4;
                for c in 0..4 {
                    ctx.band[p + c] =
                        sample(&ctx.tiles[c], x, row, ctx.h_max, ctx.v_max) as u8;
                }
            }
        }
    }
}

/// The band writer selected for a frame.
#[enum_dispatch]
#[derive(Debug, Clone, Copy)]
pub enum McuWriter {
    Gray(GrayWriter),
    Rgb(RgbWriter),
    Ycck(YcckWriter),
    Cmyk(CmykWriter),
}

/// Pick the writer for a derived colour model.
pub fn writer_for(color: ColorModel) -> McuWriter {
    match color {
        ColorModel::Luma => McuWriter::Gray(GrayWriter),
        ColorModel::Rgb => McuWriter::Rgb(RgbWriter { from_ycbcr: false }),
        ColorModel::YCbCr => McuWriter::Rgb(RgbWriter { from_ycbcr: true }),
        ColorModel::Ycck => McuWriter::Ycck(YcckWriter),
        ColorModel::Cmyk => McuWriter::Cmyk(CmykWriter),
    }
}
