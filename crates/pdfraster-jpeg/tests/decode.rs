//! End-to-end decode tests over synthesised streams.
//!
//! Fixtures are built segment by segment with a bit-level entropy encoder,
//! so expected pixel values are analytically known: a DC-only block with a
//! flat quantisation step of 8 produces `128 + dc` everywhere.

mod common;

use common::{coefficient_bits, dc_only_block, EntropyEncoder, JpegBuilder, TableSpec};
use pdfraster_jpeg::{ColorModel, Decoder, JpegError};

const Q8: [u8; 64] = [8; 64];
const Q1: [u8; 64] = [1; 64];

#[test]
fn baseline_gray_dc_only() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 4);

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q8)
        .sof(false, 8, 8, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.color(), ColorModel::Luma);
    assert_eq!(decoder.output_stride(), 8);

    let pixels = decoder.read_all().unwrap();
    assert_eq!(pixels.len(), 64);
    assert!(pixels.iter().all(|&p| p == 132), "expected flat 132, got {pixels:?}");
}

#[test]
fn baseline_ycbcr_with_neutral_chroma_is_gray() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 4); // Y
    dc_only_block(&mut enc, &dc, &ac, 0); // Cb
    dc_only_block(&mut enc, &dc, &ac, 0); // Cr

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q8)
        .sof(false, 8, 8, &[(1, 1, 1, 0), (2, 1, 1, 0), (3, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.color(), ColorModel::YCbCr);
    assert_eq!(decoder.output_stride(), 24);

    let mut row = [0u8; 24];
    let mut rows = 0;
    while decoder.read_row(&mut row).unwrap() {
        assert!(row.iter().all(|&p| p == 132), "row {rows}: {row:?}");
        rows += 1;
    }
    // 8 rows of 24 RGB bytes.
    assert_eq!(rows, 8);
}

#[test]
fn subsampled_420_17x17_clips_edges() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // 17x17 with 2x2 luma sampling: MCUs are 16x16, laid out 2x2. Per MCU
    // the scan carries four Y blocks then Cb then Cr. Only the very first
    // Y block moves the predictor.
    let mut enc = EntropyEncoder::new();
    for mcu in 0..4 {
        for y_block in 0..4 {
            let diff = if mcu == 0 && y_block == 0 { 4 } else { 0 };
            dc_only_block(&mut enc, &dc, &ac, diff);
        }
        dc_only_block(&mut enc, &dc, &ac, 0); // Cb
        dc_only_block(&mut enc, &dc, &ac, 0); // Cr
    }

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q8)
        .sof(false, 17, 17, &[(1, 2, 2, 0), (2, 1, 1, 0), (3, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.output_stride(), 51);

    let mut row = [0u8; 51];
    let mut rows = 0;
    while decoder.read_row(&mut row).unwrap() {
        assert!(row.iter().all(|&p| p == 132), "row {rows}: {row:?}");
        rows += 1;
    }
    // 17 rows despite the 16-pixel MCU grid covering 32.
    assert_eq!(rows, 17);
    assert_eq!(decoder.current_row(), 17);
}

#[test]
fn restart_markers_reset_dc_predictors() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // 8x32 grayscale: four MCUs stacked vertically, restart interval 2.
    // After RST0 the predictor starts over, so the third block encodes the
    // full value again rather than a zero difference.
    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 4);
    dc_only_block(&mut enc, &dc, &ac, 0);
    enc.put_restart(0);
    dc_only_block(&mut enc, &dc, &ac, 4);
    dc_only_block(&mut enc, &dc, &ac, 0);

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q8)
        .sof(false, 8, 32, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .dri(2)
        .sos(&[(1, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    let pixels = decoder.read_all().unwrap();
    assert_eq!(pixels.len(), 32 * 8);
    assert!(pixels.iter().all(|&p| p == 132));
    assert_eq!(decoder.current_row(), 32);
}

#[test]
fn progressive_three_scan_matches_baseline() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // Target coefficients: DC 4, one AC value 3 at zig-zag position 1.
    // Baseline sends them in one scan; the progressive stream splits them
    // over a DC first pass (Al=1), a DC refinement, an AC first pass
    // (Al=1) and an AC refinement carrying the last magnitude bit.
    let mut baseline_enc = EntropyEncoder::new();
    let (size, bits) = coefficient_bits(4);
    baseline_enc.put_symbol(&dc, size);
    baseline_enc.put_bits(u32::from(bits), size);
    baseline_enc.put_symbol(&ac, 0x02); // (run 0, size 2)
    baseline_enc.put_bits(0b11, 2); // +3
    baseline_enc.put_symbol(&ac, 0x00); // EOB

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q1)
        .sof(false, 8, 8, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0)], (0, 63), (0, 0), &baseline_enc.finish());
    let baseline = b.finish();
    let mut baseline_dec = Decoder::new(&baseline).unwrap();
    let expected = baseline_dec.read_all().unwrap();

    // Scan 1: DC first pass at Al=1 sends 4 >> 1 = 2.
    let mut s1 = EntropyEncoder::new();
    let (size, bits) = coefficient_bits(2);
    s1.put_symbol(&dc, size);
    s1.put_bits(u32::from(bits), size);

    // Scan 2: DC refinement appends bit 0.
    let mut s2 = EntropyEncoder::new();
    s2.put_bits(0, 1);

    // Scan 3: AC first pass at Al=1 sends 3 >> 1 = 1 at position 1.
    let mut s3 = EntropyEncoder::new();
    s3.put_symbol(&ac, 0x01);
    s3.put_bits(1, 1); // +1
    s3.put_symbol(&ac, 0x00); // EOB for the rest of the band

    // Scan 4: AC refinement; EOB run covers the block, the existing
    // nonzero consumes one correction bit (1: grow 2 to 3).
    let mut s4 = EntropyEncoder::new();
    s4.put_symbol(&ac, 0x00);
    s4.put_bits(1, 1);

    let mut p = JpegBuilder::new();
    p.jfif_app0()
        .dqt(0, &Q1)
        .sof(true, 8, 8, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0)], (0, 0), (0, 1), &s1.finish())
        .sos(&[(1, 0, 0)], (0, 0), (1, 0), &s2.finish())
        .sos(&[(1, 0, 0)], (1, 63), (0, 1), &s3.finish())
        .sos(&[(1, 0, 0)], (1, 63), (1, 0), &s4.finish());
    let progressive = p.finish();

    let mut prog_dec = Decoder::new(&progressive).unwrap();
    assert!(prog_dec.header().progressive);
    let got = prog_dec.read_all().unwrap();

    assert_eq!(got, expected, "progressive output must match the baseline equivalent");
}

#[test]
fn horizontal_422_subsampling() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // 16x8 with 2x1 luma sampling: one 16x8 MCU carrying two Y blocks.
    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 4); // Y left
    dc_only_block(&mut enc, &dc, &ac, 0); // Y right
    dc_only_block(&mut enc, &dc, &ac, 0); // Cb
    dc_only_block(&mut enc, &dc, &ac, 0); // Cr

    let mut b = JpegBuilder::new();
    b.jfif_app0()
        .dqt(0, &Q8)
        .sof(false, 16, 8, &[(1, 2, 1, 0), (2, 1, 1, 0), (3, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.output_stride(), 48);
    let pixels = decoder.read_all().unwrap();
    assert_eq!(pixels.len(), 8 * 48);
    assert!(pixels.iter().all(|&p| p == 132));
}

#[test]
fn progressive_interleaved_dc_scan() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // Scan 1 interleaves the DC coefficients of all three components; the
    // AC bands follow one component at a time.
    let mut s1 = EntropyEncoder::new();
    let (size, bits) = coefficient_bits(4);
    s1.put_symbol(&dc, size);
    s1.put_bits(u32::from(bits), size);
    s1.put_symbol(&dc, 0); // Cb diff 0
    s1.put_symbol(&dc, 0); // Cr diff 0

    let ac_scan = |_: u8| {
        let mut e = EntropyEncoder::new();
        e.put_symbol(&ac, 0x00);
        e.finish()
    };

    let mut p = JpegBuilder::new();
    p.jfif_app0()
        .dqt(0, &Q8)
        .sof(true, 8, 8, &[(1, 1, 1, 0), (2, 1, 1, 0), (3, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)], (0, 0), (0, 0), &s1.finish())
        .sos(&[(1, 0, 0)], (1, 63), (0, 0), &ac_scan(1))
        .sos(&[(2, 0, 0)], (1, 63), (0, 0), &ac_scan(2))
        .sos(&[(3, 0, 0)], (1, 63), (0, 0), &ac_scan(3));
    let data = p.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert!(decoder.header().progressive);
    let pixels = decoder.read_all().unwrap();
    assert_eq!(pixels.len(), 8 * 24);
    assert!(pixels.iter().all(|&p| p == 132), "expected flat gray 132");
}

#[test]
fn invalid_huffman_code_fails_the_decode() {
    // DC table with a single one-bit code for symbol 0; an entropy stream
    // starting with a one bit matches nothing.
    let dc = TableSpec {
        class: 0,
        id: 0,
        lengths: {
            let mut l = [0u8; 16];
            l[0] = 1;
            l
        },
        symbols: vec![0],
    };
    let ac = TableSpec::minimal_ac();

    let mut b = JpegBuilder::new();
    b.dqt(0, &Q8)
        .sof(false, 8, 8, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0)], (0, 63), (0, 0), &[0b1000_0000]);
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    let mut row = [0u8; 8];
    assert_eq!(decoder.read_row(&mut row), Err(JpegError::HuffmanMiss));
}

#[test]
fn cmyk_planes_copy_straight_through() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 4); // C -> 132
    dc_only_block(&mut enc, &dc, &ac, 0); // M -> 128
    dc_only_block(&mut enc, &dc, &ac, -4); // Y -> 124
    dc_only_block(&mut enc, &dc, &ac, 0); // K -> 128

    let mut b = JpegBuilder::new();
    b.adobe_app14(0)
        .dqt(0, &Q8)
        .sof(false, 8, 8, &[(1, 1, 1, 0), (2, 1, 1, 0), (3, 1, 1, 0), (4, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(
            &[(1, 0, 0), (2, 0, 0), (3, 0, 0), (4, 0, 0)],
            (0, 63),
            (0, 0),
            &enc.finish(),
        );
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.color(), ColorModel::Cmyk);
    assert_eq!(decoder.output_stride(), 32);

    let pixels = decoder.read_all().unwrap();
    assert_eq!(&pixels[..4], &[132, 128, 124, 128]);
    assert_eq!(&pixels[28..32], &[132, 128, 124, 128]);
}

#[test]
fn ycck_inverts_after_ycbcr() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();

    // Neutral YCbCr (gray 128) inverted gives 127 on C, M, Y; K carries 132.
    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 0); // Y
    dc_only_block(&mut enc, &dc, &ac, 0); // Cb
    dc_only_block(&mut enc, &dc, &ac, 0); // Cr
    dc_only_block(&mut enc, &dc, &ac, 4); // K

    let mut b = JpegBuilder::new();
    b.adobe_app14(2)
        .dqt(0, &Q8)
        .sof(false, 8, 8, &[(1, 1, 1, 0), (2, 1, 1, 0), (3, 1, 1, 0), (4, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(
            &[(1, 0, 0), (2, 0, 0), (3, 0, 0), (4, 0, 0)],
            (0, 63),
            (0, 0),
            &enc.finish(),
        );
    let data = b.finish();

    let mut decoder = Decoder::new(&data).unwrap();
    assert_eq!(decoder.color(), ColorModel::Ycck);
    let pixels = decoder.read_all().unwrap();
    assert_eq!(&pixels[..4], &[127, 127, 127, 132]);
}

#[test]
fn stride_is_width_times_components() {
    let dc = TableSpec::standard_dc();
    let ac = TableSpec::minimal_ac();
    let mut enc = EntropyEncoder::new();
    dc_only_block(&mut enc, &dc, &ac, 0);

    let mut b = JpegBuilder::new();
    b.dqt(0, &Q8)
        .sof(false, 5, 3, &[(1, 1, 1, 0)])
        .dht(&dc)
        .dht(&ac)
        .sos(&[(1, 0, 0)], (0, 63), (0, 0), &enc.finish());
    let data = b.finish();

    let decoder = Decoder::new(&data).unwrap();
    assert_eq!(
        decoder.output_stride(),
        decoder.width() as usize * decoder.components()
    );
    assert_eq!(decoder.output_stride(), 5);
}
