//! JPEG segment parsing.
//!
//! Walks the marker structure of a complete DCT stream and extracts what the
//! decode drivers need:
//! - frame geometry and component sampling (SOF0/SOF2)
//! - quantisation tables (DQT)
//! - Huffman tables (DHT), snapshotted per scan so redefinitions between
//!   progressive scans resolve correctly
//! - scan specifications and their entropy-coded byte ranges (SOS)
//! - restart interval (DRI), JFIF APP0 and Adobe APP14 colour hints
//!
//! Stuffed `FF 00` pairs and restart markers stay inside a scan's entropy
//! range; the bit reader deals with them.

use std::ops::Range;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::error::{JpegError, Result};
use crate::huffman::{HuffmanLookup, HuffmanTable, TableClass};
use crate::marker::Marker;
use crate::quant::QuantTable;

/// One frame component as declared in SOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component identifier byte (1/2/3 for YCbCr, sometimes ASCII).
    pub id: u8,
    /// Horizontal sampling factor 1-4.
    pub h: u8,
    /// Vertical sampling factor 1-4.
    pub v: u8,
    /// Quantisation table slot.
    pub quant_id: u8,
}

/// A component's role within one scan, with Huffman tables resolved to
/// indices into [`JpegHeader::tables`] as of that scan's SOS marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanComponent {
    /// Index into [`JpegHeader::components`].
    pub comp: usize,
    /// Resolved DC table, present when the scan decodes DC first passes.
    pub dc_table: Option<usize>,
    /// Resolved AC table, present when the scan covers AC coefficients.
    pub ac_table: Option<usize>,
}

/// One SOS segment: participating components, spectral window, successive
/// approximation, and the entropy-coded byte range that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    pub components: Vec<ScanComponent>,
    /// Spectral selection start (0 for DC).
    pub ss: u8,
    /// Spectral selection end (63 for baseline).
    pub se: u8,
    /// Successive approximation high bit (0 on first passes).
    pub ah: u8,
    /// Successive approximation low bit.
    pub al: u8,
    /// Restart interval in effect for this scan, in MCUs.
    pub restart_interval: u16,
    /// Entropy-coded data within the input buffer. Restart markers and
    /// stuffed bytes are inside; the terminating marker is not.
    pub data: Range<usize>,
}

/// JFIF APP0 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jfif {
    pub version_major: u8,
    pub version_minor: u8,
    pub units: u8,
    pub x_density: u16,
    pub y_density: u16,
}

/// Adobe APP14 record; `transform` drives colour-model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adobe {
    pub transform: u8,
}

/// Colour model of the decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// Single-component grayscale.
    Luma,
    /// Three components already in RGB (Adobe transform 0 or RGB ids).
    Rgb,
    /// Three components, ITU T.871 YCbCr.
    YCbCr,
    /// Four components, straight CMYK.
    Cmyk,
    /// Four components, YCbCr-encoded CMY plus K (Adobe transform 2).
    Ycck,
}

/// Everything the drivers need to decode a frame.
#[derive(Debug, Clone)]
pub struct JpegHeader {
    pub width: u16,
    pub height: u16,
    /// Sample precision; only 8 is accepted.
    pub precision: u8,
    pub components: Vec<Component>,
    /// Quantisation table slots.
    pub quant: [Option<QuantTable>; 4],
    /// Compiled Huffman tables in definition order; scans reference these
    /// by index so later redefinitions cannot alias earlier scans.
    pub tables: Vec<HuffmanLookup>,
    pub scans: Vec<ScanSpec>,
    /// Last restart interval seen (scans carry their own snapshot).
    pub restart_interval: u16,
    /// True for SOF2, false for SOF0.
    pub progressive: bool,
    pub color: ColorModel,
    pub jfif: Option<Jfif>,
    pub adobe: Option<Adobe>,
    /// Maximum horizontal sampling factor across components.
    pub h_max: u8,
    /// Maximum vertical sampling factor across components.
    pub v_max: u8,
}

impl JpegHeader {
    /// MCU width in pixels (`8 * h_max`).
    #[inline]
    pub fn mcu_width(&self) -> usize {
        8 * self.h_max as usize
    }

    /// MCU height in pixels (`8 * v_max`).
    #[inline]
    pub fn mcu_height(&self) -> usize {
        8 * self.v_max as usize
    }

    /// MCU columns covering the image width.
    #[inline]
    pub fn mcu_cols(&self) -> usize {
        (self.width as usize).div_ceil(self.mcu_width())
    }

    /// MCU rows covering the image height.
    #[inline]
    pub fn mcu_rows(&self) -> usize {
        (self.height as usize).div_ceil(self.mcu_height())
    }

    /// Bytes per output row: width times component count.
    #[inline]
    pub fn output_stride(&self) -> usize {
        self.width as usize * self.components.len()
    }

    /// A component's pixel width after subsampling (T.81 A.1.1).
    pub fn component_width(&self, comp: usize) -> usize {
        let c = &self.components[comp];
        (self.width as usize * c.h as usize).div_ceil(self.h_max as usize)
    }

    /// A component's pixel height after subsampling.
    pub fn component_height(&self, comp: usize) -> usize {
        let c = &self.components[comp];
        (self.height as usize * c.v as usize).div_ceil(self.v_max as usize)
    }
}

/// Tracks which table slot maps to which entry of the growing table list.
#[derive(Default)]
struct TableSlots {
    dc: [Option<usize>; 4],
    ac: [Option<usize>; 4],
}

/// Parse a complete DCT stream into a [`JpegHeader`].
pub fn parse(data: &[u8]) -> Result<JpegHeader> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(JpegError::Format("missing SOI marker".to_string()));
    }

    let mut frame: Option<(u8, JpegHeader)> = None;
    let mut quant: [Option<QuantTable>; 4] = [None, None, None, None];
    let mut tables: Vec<HuffmanLookup> = Vec::new();
    let mut slots = TableSlots::default();
    let mut scans: Vec<ScanSpec> = Vec::new();
    let mut restart_interval: u16 = 0;
    let mut jfif: Option<Jfif> = None;
    let mut adobe: Option<Adobe> = None;
    let mut saw_eoi = false;

    let mut pos = 2;
    while pos < data.len() {
        // Resynchronise on the next marker prefix.
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        if pos >= data.len() {
            break;
        }
        let Some(marker) = Marker::from_u8(data[pos]) else {
            pos += 1;
            continue;
        };
        pos += 1;

        if !marker.has_payload() {
            match marker {
                Marker::EOI => {
                    saw_eoi = true;
                    break;
                }
                Marker::RST(n) => {
                    // Restart markers belong inside a scan only.
                    warn!("stray RST{n} outside entropy-coded data");
                }
                _ => {}
            }
            continue;
        }

        if pos + 2 > data.len() {
            return Err(JpegError::Truncated { context: "reading segment length" });
        }
        let length = BigEndian::read_u16(&data[pos..]) as usize;
        if length < 2 {
            return Err(JpegError::Format(format!("segment length {length} below minimum")));
        }
        if pos + length > data.len() {
            return Err(JpegError::Truncated { context: "reading segment payload" });
        }
        let payload = &data[pos + 2..pos + length];
        let payload_end = pos + length;
        pos = payload_end;

        match marker {
            Marker::DQT => parse_dqt(payload, &mut quant)?,
            Marker::DHT => parse_dht(payload, &mut tables, &mut slots)?,
            Marker::DRI => {
                if payload.len() < 2 {
                    return Err(JpegError::Truncated { context: "reading restart interval" });
                }
                restart_interval = BigEndian::read_u16(payload);
                debug!("restart interval set to {restart_interval} MCUs");
            }
            Marker::SOF(sof) => {
                if frame.is_some() {
                    return Err(JpegError::Scan("multiple SOF segments".to_string()));
                }
                frame = Some((sof, parse_sof(sof, payload)?));
            }
            Marker::SOS => {
                let Some((_, ref header)) = frame else {
                    return Err(JpegError::Scan("SOS before SOF".to_string()));
                };
                let mut scan = parse_sos(payload, &header.components, &tables, &slots)?;
                scan.restart_interval = restart_interval;
                let entropy_start = payload_end;
                let entropy_end = entropy_region_end(data, entropy_start);
                scan.data = entropy_start..entropy_end;
                scans.push(scan);
                pos = entropy_end;
            }
            Marker::APP(0) => {
                if payload.len() >= 14 && &payload[..5] == b"JFIF\0" {
                    jfif = Some(Jfif {
                        version_major: payload[5],
                        version_minor: payload[6],
                        units: payload[7],
                        x_density: BigEndian::read_u16(&payload[8..]),
                        y_density: BigEndian::read_u16(&payload[10..]),
                    });
                }
            }
            Marker::APP(14) => {
                if payload.len() >= 12 && &payload[..5] == b"Adobe" {
                    adobe = Some(Adobe { transform: payload[11] });
                }
            }
            Marker::DAC => {
                return Err(JpegError::Format(
                    "arithmetic coding is not supported".to_string(),
                ));
            }
            // APPn, COM, DNL and reserved segments carry nothing we need.
            _ => {}
        }
    }

    let Some((_, mut header)) = frame else {
        return Err(JpegError::Format("no SOF segment found".to_string()));
    };
    if scans.is_empty() {
        return Err(JpegError::Format("no SOS segment found".to_string()));
    }
    if !saw_eoi {
        warn!("stream ends without EOI; decoding what is present");
    }

    // Every component must be able to dequantise.
    for c in &header.components {
        if quant[c.quant_id as usize].is_none() {
            return Err(JpegError::MissingQuantTable { id: c.quant_id });
        }
    }

    header.quant = quant;
    header.tables = tables;
    header.scans = scans;
    header.restart_interval = restart_interval;
    header.jfif = jfif;
    header.adobe = adobe;
    header.color = derive_color_model(&header);
    Ok(header)
}

/// Find the end of an entropy-coded region: the first `FF xx` where `xx` is
/// a real marker other than RSTn. Stuffed zeros and fill bytes pass through.
fn entropy_region_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        match data.get(i + 1) {
            Some(0x00) => i += 2,
            Some(0xD0..=0xD7) => i += 2,
            Some(0xFF) => i += 1,
            Some(_) => return i,
            None => return data.len(),
        }
    }
    data.len()
}

fn parse_dqt(payload: &[u8], quant: &mut [Option<QuantTable>; 4]) -> Result<()> {
    let mut p = 0;
    while p < payload.len() {
        let pq_tq = payload[p];
        let precision = pq_tq >> 4;
        let id = pq_tq & 0x0F;
        p += 1;
        if id > 3 {
            return Err(JpegError::Format(format!("quantisation table id {id} out of range")));
        }
        if precision > 1 {
            return Err(JpegError::Format(format!(
                "quantisation table precision {precision} out of range"
            )));
        }

        let mut values = [0u16; 64];
        if precision == 0 {
            if p + 64 > payload.len() {
                return Err(JpegError::Truncated { context: "reading 8-bit quantisation table" });
            }
            for (i, v) in values.iter_mut().enumerate() {
                *v = u16::from(payload[p + i]);
            }
            p += 64;
        } else {
            if p + 128 > payload.len() {
                return Err(JpegError::Truncated { context: "reading 16-bit quantisation table" });
            }
            for (i, v) in values.iter_mut().enumerate() {
                *v = BigEndian::read_u16(&payload[p + 2 * i..]);
            }
            p += 128;
        }
        quant[id as usize] = Some(QuantTable::from_zigzag(id, precision, values));
    }
    Ok(())
}

fn parse_dht(
    payload: &[u8],
    tables: &mut Vec<HuffmanLookup>,
    slots: &mut TableSlots,
) -> Result<()> {
    let mut p = 0;
    while p < payload.len() {
        let tc_th = payload[p];
        let class = tc_th >> 4;
        let id = tc_th & 0x0F;
        p += 1;
        if class > 1 || id > 3 {
            return Err(JpegError::Format(format!(
                "Huffman table selector out of range (class {class}, id {id})"
            )));
        }
        if p + 16 > payload.len() {
            return Err(JpegError::Truncated { context: "reading Huffman code lengths" });
        }
        let mut code_lengths = [0u8; 16];
        code_lengths.copy_from_slice(&payload[p..p + 16]);
        p += 16;

        let total: usize = code_lengths.iter().map(|&n| n as usize).sum();
        if p + total > payload.len() {
            return Err(JpegError::Truncated { context: "reading Huffman symbols" });
        }
        let symbols = payload[p..p + total].to_vec();
        p += total;

        let class = if class == 0 { TableClass::Dc } else { TableClass::Ac };
        let table = HuffmanTable { class, id, code_lengths, symbols };
        let index = tables.len();
        tables.push(HuffmanLookup::build(&table)?);
        match class {
            TableClass::Dc => slots.dc[id as usize] = Some(index),
            TableClass::Ac => slots.ac[id as usize] = Some(index),
        }
    }
    Ok(())
}

fn parse_sof(sof: u8, payload: &[u8]) -> Result<JpegHeader> {
    if sof != 0 && sof != 2 {
        return Err(JpegError::UnsupportedFrame { sof });
    }
    if payload.len() < 6 {
        return Err(JpegError::Truncated { context: "reading frame header" });
    }

    let precision = payload[0];
    if precision != 8 {
        return Err(JpegError::UnsupportedPrecision { precision });
    }
    let height = BigEndian::read_u16(&payload[1..]);
    let width = BigEndian::read_u16(&payload[3..]);
    if width == 0 || height == 0 {
        return Err(JpegError::Format(format!("degenerate frame size {width}x{height}")));
    }
    let count = payload[5];
    if !matches!(count, 1 | 3 | 4) {
        return Err(JpegError::UnsupportedComponents { count });
    }
    if payload.len() < 6 + count as usize * 3 {
        return Err(JpegError::Truncated { context: "reading frame components" });
    }

    let mut components = Vec::with_capacity(count as usize);
    let mut h_max = 1u8;
    let mut v_max = 1u8;
    for i in 0..count as usize {
        let base = 6 + i * 3;
        let id = payload[base];
        let sampling = payload[base + 1];
        let h = sampling >> 4;
        let v = sampling & 0x0F;
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
            return Err(JpegError::Format(format!(
                "component {id} has sampling factors {h}x{v} outside 1..=4"
            )));
        }
        let quant_id = payload[base + 2];
        if quant_id > 3 {
            return Err(JpegError::Format(format!(
                "component {id} references quantisation table {quant_id}"
            )));
        }
        h_max = h_max.max(h);
        v_max = v_max.max(v);
        components.push(Component { id, h, v, quant_id });
    }

    Ok(JpegHeader {
        width,
        height,
        precision,
        components,
        quant: [None, None, None, None],
        tables: Vec::new(),
        scans: Vec::new(),
        restart_interval: 0,
        progressive: sof == 2,
        color: ColorModel::Luma,
        jfif: None,
        adobe: None,
        h_max,
        v_max,
    })
}

fn parse_sos(
    payload: &[u8],
    components: &[Component],
    tables: &[HuffmanLookup],
    slots: &TableSlots,
) -> Result<ScanSpec> {
    if payload.is_empty() {
        return Err(JpegError::Truncated { context: "reading scan header" });
    }
    let ns = payload[0] as usize;
    if ns == 0 || ns > components.len() {
        return Err(JpegError::Scan(format!("scan declares {ns} components")));
    }
    if payload.len() < 1 + ns * 2 + 3 {
        return Err(JpegError::Truncated { context: "reading scan components" });
    }

    let ss = payload[1 + ns * 2];
    let se = payload[1 + ns * 2 + 1];
    let ah_al = payload[1 + ns * 2 + 2];
    let (ah, al) = (ah_al >> 4, ah_al & 0x0F);
    if ss > 63 || se > 63 || ss > se {
        return Err(JpegError::Scan(format!("spectral selection {ss}..{se} out of range")));
    }
    if ss > 0 && ns != 1 {
        return Err(JpegError::Scan(
            "AC scans must cover exactly one component".to_string(),
        ));
    }

    let needs_dc = ss == 0 && ah == 0;
    let needs_ac = se > 0;

    let mut scan_components = Vec::with_capacity(ns);
    for i in 0..ns {
        let cs = payload[1 + i * 2];
        let td_ta = payload[1 + i * 2 + 1];
        let (td, ta) = (td_ta >> 4, td_ta & 0x0F);

        let comp = components
            .iter()
            .position(|c| c.id == cs)
            .ok_or_else(|| JpegError::Scan(format!("scan references unknown component {cs}")))?;

        let dc_table = match (needs_dc, slots.dc.get(td as usize).copied().flatten()) {
            (false, _) => None,
            (true, Some(idx)) => Some(idx),
            (true, None) => return Err(JpegError::MissingHuffmanTable { class: "DC", id: td }),
        };
        let ac_table = match (needs_ac, slots.ac.get(ta as usize).copied().flatten()) {
            (false, _) => None,
            (true, Some(idx)) => Some(idx),
            (true, None) => return Err(JpegError::MissingHuffmanTable { class: "AC", id: ta }),
        };
        debug_assert!(dc_table.map_or(true, |i| i < tables.len()));
        debug_assert!(ac_table.map_or(true, |i| i < tables.len()));

        scan_components.push(ScanComponent { comp, dc_table, ac_table });
    }

    Ok(ScanSpec {
        components: scan_components,
        ss,
        se,
        ah,
        al,
        restart_interval: 0,
        data: 0..0,
    })
}

/// Decide the output colour model from component count, Adobe APP14 and
/// component ids, in that priority order.
fn derive_color_model(header: &JpegHeader) -> ColorModel {
    match header.components.len() {
        1 => ColorModel::Luma,
        3 => {
            if let Some(adobe) = header.adobe {
                return if adobe.transform == 0 { ColorModel::Rgb } else { ColorModel::YCbCr };
            }
            let ids: Vec<u8> = header.components.iter().map(|c| c.id).collect();
            if ids == [b'R', b'G', b'B'] {
                ColorModel::Rgb
            } else {
                ColorModel::YCbCr
            }
        }
        _ => {
            match header.adobe.map(|a| a.transform) {
                Some(0) => ColorModel::Cmyk,
                // Transform 2 is YCCK; transform 1 on four components is
                // not well defined and decodes as YCCK too.
                Some(_) => ColorModel::Ycck,
                None => ColorModel::Cmyk,
            }
        }
    }
}
