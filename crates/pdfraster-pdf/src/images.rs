//! Image XObjects: finding them in page resources and decoding the
//! DCT-encoded ones.
//!
//! An image XObject is reached through `resources[/XObject]`, has
//! `/Subtype /Image`, and carries its pixel data as a stream whose filter
//! chain ends in an image codec. DCT payloads decode here via the JPEG
//! crate; other encodings are reported, not decoded.

use log::{debug, warn};
use pdfraster_jpeg as jpeg;

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::object::{Dict, ObjRef};
use crate::pages::PageRecord;
use crate::services::{FilterChain, ImageEncoding};

/// An image XObject found in a page's resources.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Resource name, e.g. `Im0`.
    pub name: Vec<u8>,
    pub reference: ObjRef,
    /// `/Width` and `/Height` as declared by the dictionary.
    pub width: i32,
    pub height: i32,
    /// Image codec at the end of the filter chain, when there is one.
    pub encoding: Option<ImageEncoding>,
    /// The image dictionary.
    pub dict: Dict,
}

/// Decoded pixels of a DCT image, rows interleaved top to bottom.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Interleaved components per pixel (1, 3 or 4).
    pub components: u8,
    pub color: jpeg::ColorModel,
    pub data: Vec<u8>,
}

/// Enumerate the image XObjects of a page, sorted by resource name.
pub fn page_images(doc: &mut Document, page: &PageRecord) -> Vec<ImageXObject> {
    let Some(xobjects) = page.resources.get(b"XObject").cloned() else {
        return Vec::new();
    };
    let xobjects = doc.resolve(&xobjects);
    let Some(xobjects) = xobjects.as_dict() else {
        return Vec::new();
    };

    let mut entries: Vec<(Vec<u8>, ObjRef)> = xobjects
        .iter()
        .filter_map(|(name, v)| v.as_reference().map(|r| (name.clone(), r)))
        .collect();
    entries.sort();

    let mut out = Vec::new();
    for (name, reference) in entries {
        let Some(obj) = doc.get_object(reference) else {
            warn!("XObject {} is unavailable", String::from_utf8_lossy(&name));
            continue;
        };
        let Some(dict) = obj.value.as_dict() else { continue };
        if dict.get_name(b"Subtype") != Some(b"Image") {
            continue;
        }
        let dict = dict.clone();

        let width = dict
            .get(b"Width")
            .map(|v| doc.resolve(v))
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        let height = dict
            .get(b"Height")
            .map(|v| doc.resolve(v))
            .and_then(|v| v.as_int())
            .unwrap_or(0);

        let chain = FilterChain::from_stream_dict(&dict, |r| {
            doc.get_object(r).map(|o| o.value.clone())
        });
        let (_, encoding) = chain.split_image_tail();

        out.push(ImageXObject { name, reference, width, height, encoding, dict });
    }
    out
}

/// The raw image codec payload: decrypted, with any filters before the
/// codec already decoded.
pub fn image_payload(doc: &mut Document, image: &ImageXObject) -> Result<Vec<u8>> {
    let obj = doc.get_object(image.reference).ok_or_else(|| {
        PdfError::Structure(format!("image object {} is unavailable", image.reference.num))
    })?;
    let (bytes, _) = doc.stream_payload(&obj)?;
    Ok(bytes)
}

/// Decode a DCT image to interleaved pixel rows.
pub fn decode_jpeg_image(doc: &mut Document, image: &ImageXObject) -> Result<DecodedImage> {
    if image.encoding != Some(ImageEncoding::Dct) {
        return Err(PdfError::Unsupported(format!(
            "image {} is not DCT-encoded",
            String::from_utf8_lossy(&image.name)
        )));
    }
    let payload = image_payload(doc, image)?;

    let mut decoder = jpeg::Decoder::new(&payload)?;
    debug!(
        "decoding {}x{} DCT image ({} components, progressive: {})",
        decoder.width(),
        decoder.height(),
        decoder.components(),
        decoder.header().progressive
    );
    if image.width > 0 && image.width as u32 != decoder.width() {
        warn!(
            "image dictionary declares width {} but the stream carries {}",
            image.width,
            decoder.width()
        );
    }

    let data = decoder.read_all()?;
    Ok(DecodedImage {
        width: decoder.width(),
        height: decoder.height(),
        components: decoder.components() as u8,
        color: decoder.color(),
        data,
    })
}
