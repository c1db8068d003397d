//! The decode driver: a row-by-row pull API over baseline and progressive
//! streams.
//!
//! Two strategies sit behind [`Decoder::read_row`]:
//!
//! - **Streaming** (baseline, one interleaved scan): one MCU-row band is
//!   decoded per refill. The bit reader state is captured after each band
//!   and restored before the next, so nothing outside the decoder
//!   accumulates.
//! - **Buffered** (progressive, or baseline split over several scans):
//!   every scan runs end-to-end into natural-order coefficient planes on
//!   the first pull; bands are then produced by transforming the planes one
//!   MCU row at a time.
//!
//! Output rows are interleaved samples, `width * component_count` bytes,
//! strictly top to bottom, exactly `height` of them.

use log::warn;

use crate::bitread::{BitReader, BitReaderState};
use crate::block;
use crate::error::{JpegError, Result};
use crate::huffman::HuffmanLookup;
use crate::idct::{idct_block, CoefOrder};
use crate::mcu::{writer_for, BandContext, BandWrite, McuWriter, Tile};
use crate::parser::{self, ColorModel, JpegHeader, ScanComponent, ScanSpec};
use crate::progressive;
use crate::quant::{QuantTable, ZIGZAG_TO_NATURAL};
use crate::restart::RestartTracker;

/// Baseline streaming state between band pulls.
struct Streaming {
    bit_state: BitReaderState,
    predictors: [i32; 4],
    restart: RestartTracker,
    /// MCUs not yet decoded; the final interval ends at EOI, not a marker.
    mcus_remaining: usize,
}

/// Full-image coefficient storage for multi-scan decoding.
struct Buffered {
    /// Per component: whole blocks in natural order, row-major by block.
    planes: Vec<Vec<[i32; 64]>>,
    /// Per component: blocks per block-row (padded to whole MCUs).
    blocks_per_row: Vec<usize>,
    decoded: bool,
}

enum Mode {
    Streaming(Streaming),
    Buffered(Buffered),
}

/// Pull-based JPEG decoder over a complete DCT stream.
pub struct Decoder<'a> {
    header: JpegHeader,
    data: &'a [u8],
    mode: Mode,
    writer: McuWriter,
    tiles: Vec<Tile>,
    band: Vec<u8>,
    band_rows: usize,
    band_cursor: usize,
    current_row: usize,
    next_mcu_row: usize,
}

impl<'a> Decoder<'a> {
    /// Parse the stream and set up for decoding.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = parser::parse(data)?;
        Self::from_header(header, data)
    }

    /// Set up from an already-parsed header over the same byte buffer.
    pub fn from_header(header: JpegHeader, data: &'a [u8]) -> Result<Self> {
        let single_interleaved = !header.progressive
            && header.scans.len() == 1
            && header.scans[0].components.len() == header.components.len();

        let mode = if single_interleaved {
            Mode::Streaming(Streaming {
                bit_state: BitReader::new(&data[header.scans[0].data.clone()]).capture(),
                predictors: [0; 4],
                restart: RestartTracker::new(header.scans[0].restart_interval),
                mcus_remaining: header.mcu_cols() * header.mcu_rows(),
            })
        } else {
            let mcu_cols = header.mcu_cols();
            let mcu_rows = header.mcu_rows();
            let mut planes = Vec::with_capacity(header.components.len());
            let mut blocks_per_row = Vec::with_capacity(header.components.len());
            for c in &header.components {
                let bpr = mcu_cols * c.h as usize;
                let rows = mcu_rows * c.v as usize;
                planes.push(vec![[0i32; 64]; bpr * rows]);
                blocks_per_row.push(bpr);
            }
            Mode::Buffered(Buffered { planes, blocks_per_row, decoded: false })
        };

        let tiles: Vec<Tile> = header.components.iter().map(|c| Tile::new(c.h, c.v)).collect();
        let band = vec![0u8; header.mcu_height() * header.output_stride()];
        let writer = writer_for(header.color);

        Ok(Decoder {
            header,
            data,
            mode,
            writer,
            tiles,
            band,
            band_rows: 0,
            band_cursor: 0,
            current_row: 0,
            next_mcu_row: 0,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &JpegHeader {
        &self.header
    }

    pub fn width(&self) -> u32 {
        u32::from(self.header.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.header.height)
    }

    /// Interleaved components per output pixel.
    pub fn components(&self) -> usize {
        self.header.components.len()
    }

    pub fn color(&self) -> ColorModel {
        self.header.color
    }

    /// Bytes per output row.
    pub fn output_stride(&self) -> usize {
        self.header.output_stride()
    }

    /// Rows already handed out.
    pub fn current_row(&self) -> usize {
        self.current_row
    }

    /// Produce the next row into `out` (at least `output_stride()` bytes).
    /// Returns false once all `height` rows have been read.
    pub fn read_row(&mut self, out: &mut [u8]) -> Result<bool> {
        if self.current_row >= self.header.height as usize {
            return Ok(false);
        }
        let stride = self.header.output_stride();
        if out.len() < stride {
            return Err(JpegError::Format(format!(
                "row buffer holds {} bytes, {stride} needed",
                out.len()
            )));
        }
        if self.band_cursor >= self.band_rows {
            self.refill_band()?;
        }
        let start = self.band_cursor * stride;
        out[..stride].copy_from_slice(&self.band[start..start + stride]);
        self.band_cursor += 1;
        self.current_row += 1;
        Ok(true)
    }

    /// Pull every remaining row into one contiguous buffer.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let stride = self.header.output_stride();
        let remaining = self.header.height as usize - self.current_row;
        let mut out = vec![0u8; remaining * stride];
        let mut offset = 0;
        let mut row = vec![0u8; stride];
        while self.read_row(&mut row)? {
            out[offset..offset + stride].copy_from_slice(&row);
            offset += stride;
        }
        Ok(out)
    }

    fn refill_band(&mut self) -> Result<()> {
        let mcu_h = self.header.mcu_height();
        let rows_in_band =
            (self.header.height as usize - self.next_mcu_row * mcu_h).min(mcu_h);

        if matches!(self.mode, Mode::Streaming(_)) {
            self.decode_streaming_band(rows_in_band)?;
        } else {
            self.ensure_scans_decoded()?;
            self.produce_buffered_band(rows_in_band)?;
        }

        self.next_mcu_row += 1;
        self.band_rows = rows_in_band;
        self.band_cursor = 0;
        Ok(())
    }

    /// Decode one MCU row straight from the entropy stream (baseline).
    fn decode_streaming_band(&mut self, rows_in_band: usize) -> Result<()> {
        let Decoder { header, data, mode, writer, tiles, band, .. } = self;
        let Mode::Streaming(st) = mode else {
            return Err(JpegError::Format("streaming band without streaming state".into()));
        };
        let scan = &header.scans[0];

        let mut bits = BitReader::new(&data[scan.data.clone()]);
        bits.restore(st.bit_state);

        let mcu_width = header.mcu_width();
        let stride = header.output_stride();

        for mcu_col in 0..header.mcu_cols() {
            for sc in &scan.components {
                let comp = &header.components[sc.comp];
                let dc = resolve_table(&header.tables, sc.dc_table, "DC")?;
                let ac = resolve_table(&header.tables, sc.ac_table, "AC")?;
                let quant = resolve_quant(&header.quant, comp.quant_id)?;
                let tile = &mut tiles[sc.comp];

                for v in 0..comp.v as usize {
                    for h in 0..comp.h as usize {
                        let mut blk = [0i32; 64];
                        block::decode_block(
                            &mut bits,
                            dc,
                            ac,
                            &mut st.predictors[sc.comp],
                            &mut blk,
                        )?;
                        idct_block(
                            &blk,
                            CoefOrder::Zigzag,
                            quant,
                            &mut tile.data,
                            v * 8 * tile.width + h * 8,
                            tile.width,
                        );
                    }
                }
            }

            writer.write_mcu(&mut BandContext {
                tiles: tiles.as_slice(),
                x_base: mcu_col * mcu_width,
                rows: rows_in_band,
                band: band.as_mut_slice(),
                image_width: header.width as usize,
                mcu_width,
                h_max: header.h_max,
                v_max: header.v_max,
                stride,
            });

            st.mcus_remaining -= 1;
            if st.restart.count_mcu() && st.mcus_remaining > 0 {
                st.restart.process_restart(&mut bits, &mut st.predictors);
            }
        }

        st.bit_state = bits.capture();
        Ok(())
    }

    /// Run every scan into the coefficient planes (first buffered pull).
    fn ensure_scans_decoded(&mut self) -> Result<()> {
        let Decoder { header, data, mode, .. } = self;
        let Mode::Buffered(buf) = mode else {
            return Err(JpegError::Format("buffered decode without buffered state".into()));
        };
        if buf.decoded {
            return Ok(());
        }

        for scan in &header.scans {
            decode_scan_into_planes(header, scan, *data, buf)?;
        }
        buf.decoded = true;
        Ok(())
    }

    /// Transform one MCU row of coefficient planes and write the band.
    fn produce_buffered_band(&mut self, rows_in_band: usize) -> Result<()> {
        let Decoder { header, mode, writer, tiles, band, next_mcu_row, .. } = self;
        let Mode::Buffered(buf) = mode else {
            return Err(JpegError::Format("buffered band without buffered state".into()));
        };

        let mcu_width = header.mcu_width();
        let stride = header.output_stride();

        for mcu_col in 0..header.mcu_cols() {
            for (ci, comp) in header.components.iter().enumerate() {
                let quant = resolve_quant(&header.quant, comp.quant_id)?;
                let tile = &mut tiles[ci];
                let bpr = buf.blocks_per_row[ci];
                for v in 0..comp.v as usize {
                    for h in 0..comp.h as usize {
                        let row = *next_mcu_row * comp.v as usize + v;
                        let col = mcu_col * comp.h as usize + h;
                        let blk = &buf.planes[ci][row * bpr + col];
                        idct_block(
                            blk,
                            CoefOrder::Natural,
                            quant,
                            &mut tile.data,
                            v * 8 * tile.width + h * 8,
                            tile.width,
                        );
                    }
                }
            }

            writer.write_mcu(&mut BandContext {
                tiles: tiles.as_slice(),
                x_base: mcu_col * mcu_width,
                rows: rows_in_band,
                band: band.as_mut_slice(),
                image_width: header.width as usize,
                mcu_width,
                h_max: header.h_max,
                v_max: header.v_max,
                stride,
            });
        }
        Ok(())
    }
}

fn resolve_table<'t>(
    tables: &'t [HuffmanLookup],
    index: Option<usize>,
    class: &'static str,
) -> Result<&'t HuffmanLookup> {
    index.and_then(|i| tables.get(i)).ok_or(JpegError::MissingHuffmanTable {
        class,
        id: index.map(|i| i as u8).unwrap_or(0),
    })
}

fn resolve_quant(quant: &[Option<QuantTable>; 4], id: u8) -> Result<&QuantTable> {
    quant[id as usize].as_ref().ok_or(JpegError::MissingQuantTable { id })
}

/// Per-scan state while filling coefficient planes.
struct ScanState {
    predictors: [i32; 4],
    eob_run: u32,
    restart: RestartTracker,
}

fn decode_scan_into_planes(
    header: &JpegHeader,
    scan: &ScanSpec,
    data: &[u8],
    buf: &mut Buffered,
) -> Result<()> {
    if header.progressive && scan.ss == 0 && scan.se != 0 {
        return Err(JpegError::Scan(
            "progressive scan mixes DC and AC coefficients".to_string(),
        ));
    }

    let mut bits = BitReader::new(&data[scan.data.clone()]);
    let mut st = ScanState {
        predictors: [0; 4],
        eob_run: 0,
        restart: RestartTracker::new(scan.restart_interval),
    };

    if scan.components.len() > 1 {
        // Interleaved: iterate MCUs, each component contributing h*v blocks.
        let mut remaining = header.mcu_rows() * header.mcu_cols();
        for mcu_row in 0..header.mcu_rows() {
            for mcu_col in 0..header.mcu_cols() {
                for sc in &scan.components {
                    let comp = &header.components[sc.comp];
                    let bpr = buf.blocks_per_row[sc.comp];
                    for v in 0..comp.v as usize {
                        for h in 0..comp.h as usize {
                            let row = mcu_row * comp.v as usize + v;
                            let col = mcu_col * comp.h as usize + h;
                            let index = row * bpr + col;
                            decode_one_block(header, scan, sc.comp, sc, &mut bits, &mut st, &mut buf.planes[sc.comp][index])?;
                        }
                    }
                }
                remaining -= 1;
                if st.restart.count_mcu() && remaining > 0 {
                    st.restart.process_restart(&mut bits, &mut st.predictors);
                    st.eob_run = 0;
                }
            }
        }
    } else {
        // Non-interleaved: iterate the component's own block grid; the MCU
        // of such a scan is a single block.
        let sc = &scan.components[0];
        let blocks_w = header.component_width(sc.comp).div_ceil(8);
        let blocks_h = header.component_height(sc.comp).div_ceil(8);
        let bpr = buf.blocks_per_row[sc.comp];
        let mut remaining = blocks_w * blocks_h;
        for by in 0..blocks_h {
            for bx in 0..blocks_w {
                let index = by * bpr + bx;
                decode_one_block(header, scan, sc.comp, sc, &mut bits, &mut st, &mut buf.planes[sc.comp][index])?;
                remaining -= 1;
                if st.restart.count_mcu() && remaining > 0 {
                    st.restart.process_restart(&mut bits, &mut st.predictors);
                    st.eob_run = 0;
                }
            }
        }
    }

    if let Some(marker) = bits.pending_marker() {
        if !marker.is_restart() {
            // Scan data ends where the next segment begins; anything else
            // suggests the entropy region was measured differently than it
            // was written, which the tolerant path survives.
            warn!("scan ended with {marker:?} still unconsumed");
        }
    }
    Ok(())
}

fn decode_one_block(
    header: &JpegHeader,
    scan: &ScanSpec,
    comp_index: usize,
    sc: &ScanComponent,
    bits: &mut BitReader<'_>,
    st: &mut ScanState,
    block_out: &mut [i32; 64],
) -> Result<()> {
    if !header.progressive {
        // A baseline scan routed through the buffered path: full-band
        // decode in zig-zag order, scattered to natural storage.
        let dc = resolve_table(&header.tables, sc.dc_table, "DC")?;
        let ac = resolve_table(&header.tables, sc.ac_table, "AC")?;
        let mut zz = [0i32; 64];
        block::decode_block(bits, dc, ac, &mut st.predictors[comp_index], &mut zz)?;
        for (k, &c) in zz.iter().enumerate() {
            block_out[ZIGZAG_TO_NATURAL[k]] = c;
        }
        return Ok(());
    }

    if scan.ss == 0 {
        if scan.ah == 0 {
            let dc = resolve_table(&header.tables, sc.dc_table, "DC")?;
            progressive::dc_first(bits, dc, &mut st.predictors[comp_index], scan.al, block_out)
        } else {
            progressive::dc_refine(bits, scan.al, block_out)
        }
    } else {
        let ac = resolve_table(&header.tables, sc.ac_table, "AC")?;
        if scan.ah == 0 {
            progressive::ac_first(bits, ac, scan.ss, scan.se, scan.al, &mut st.eob_run, block_out)
        } else {
            progressive::ac_refine(bits, ac, scan.ss, scan.se, scan.al, &mut st.eob_run, block_out)
        }
    }
}
