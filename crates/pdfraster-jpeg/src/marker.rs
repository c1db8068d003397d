//! JPEG marker classification (ITU T.81 Table B.1).

/// A marker byte following `0xFF` in a JPEG stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Marker {
    /// Start of Frame; the parameter is the SOF type (0 = baseline, 2 = progressive).
    SOF(u8),
    /// Define Huffman Table.
    DHT,
    /// Define Quantisation Table.
    DQT,
    /// Define Arithmetic Coding conditioning (unsupported, skipped).
    DAC,
    /// Restart marker 0-7.
    RST(u8),
    /// Start of Image.
    SOI,
    /// End of Image.
    EOI,
    /// Start of Scan.
    SOS,
    /// Define Number of Lines.
    DNL,
    /// Define Restart Interval.
    DRI,
    /// Application segment 0-15.
    APP(u8),
    /// Comment.
    COM,
    /// Temporary private marker.
    TEM,
    /// Anything else that is reserved or hierarchical-only.
    RES(u8),
}

impl Marker {
    /// Classify a marker byte. `0x00` (a stuffed data byte) and `0xFF`
    /// (a fill byte) are not markers and yield `None`.
    pub fn from_u8(n: u8) -> Option<Marker> {
        use Marker::*;
        match n {
            0x00 | 0xFF => None,
            0x01 => Some(TEM),
            0xC4 => Some(DHT),
            0xCC => Some(DAC),
            0xC0..=0xCF => Some(SOF(n - 0xC0)),
            0xD0..=0xD7 => Some(RST(n - 0xD0)),
            0xD8 => Some(SOI),
            0xD9 => Some(EOI),
            0xDA => Some(SOS),
            0xDB => Some(DQT),
            0xDC => Some(DNL),
            0xDD => Some(DRI),
            0xE0..=0xEF => Some(APP(n - 0xE0)),
            0xFE => Some(COM),
            other => Some(RES(other)),
        }
    }

    /// Whether a big-endian length field follows this marker.
    ///
    /// Standalone markers (SOI, EOI, TEM and the restart set) carry no
    /// payload; everything else is followed by `length` bytes that include
    /// the two length bytes themselves.
    pub fn has_payload(self) -> bool {
        !matches!(self, Marker::RST(_) | Marker::SOI | Marker::EOI | Marker::TEM)
    }

    /// Whether this is one of the restart markers RST0-RST7.
    pub fn is_restart(self) -> bool {
        matches!(self, Marker::RST(_))
    }
}
