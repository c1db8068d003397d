//! Page-tree traversal with attribute inheritance.
//!
//! Pages hang off the catalog's `/Pages` tree. `Resources`, `MediaBox`,
//! `CropBox` and `Rotate` inherit from the nearest ancestor that defines
//! them, found by walking `/Parent` links rather than the physical tree
//! (writers disagree about where inherited keys live). Both the tree walk
//! and the parent walks carry visited sets, so cyclic files terminate.

use std::collections::HashSet;

use log::warn;

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::object::{Dict, Value};

/// US Letter in PDF user space, the fallback when no usable MediaBox is
/// found anywhere.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// One page of the document, attributes fully resolved.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// 1-based page number in tree order.
    pub number: u32,
    /// `[left, bottom, right, top]` in user space.
    pub media_box: [f32; 4],
    /// Defaults to the media box when absent or degenerate.
    pub crop_box: [f32; 4],
    /// Normalised to 0, 90, 180 or 270.
    pub rotation: i32,
    /// Inherited resource dictionary, empty when none is defined.
    pub resources: Dict,
    /// The raw page dictionary.
    pub dict: Dict,
}

/// Walk the page tree and build the page list.
pub fn collect_pages(doc: &mut Document) -> Result<Vec<PageRecord>> {
    let catalog = doc.root_object().ok_or_else(|| {
        if doc.is_encrypted() && doc.decryptor().is_none() {
            PdfError::Encrypted
        } else {
            PdfError::Structure("document catalog is unavailable".to_string())
        }
    })?;
    let Some(catalog_dict) = catalog.value.as_dict() else {
        return Err(PdfError::Structure("document catalog is not a dictionary".to_string()));
    };
    let Some(pages_value) = catalog_dict.get(b"Pages").cloned() else {
        return Err(PdfError::Structure("catalog has no /Pages".to_string()));
    };

    let declared = {
        let root = doc.resolve(&pages_value);
        root.as_dict()
            .and_then(|d| d.get(b"Count").cloned())
            .and_then(|c| doc.resolve(&c).as_int())
    };

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    walk(doc, &pages_value, &mut visited, &mut out);

    if let Some(declared) = declared {
        if declared != out.len() as i32 {
            warn!(
                "page tree declares /Count {declared} but traversal found {} pages",
                out.len()
            );
        }
    }
    if out.is_empty() {
        return Err(PdfError::Structure("page tree contains no pages".to_string()));
    }
    Ok(out)
}

fn walk(doc: &mut Document, node: &Value, visited: &mut HashSet<u32>, out: &mut Vec<PageRecord>) {
    let dict = match node {
        Value::Reference(r) => {
            if !visited.insert(r.num) {
                warn!("page tree revisits object {}; pruning", r.num);
                return;
            }
            let Some(obj) = doc.get_object(*r) else { return };
            let Some(d) = obj.value.as_dict() else { return };
            d.clone()
        }
        Value::Dict(d) => d.clone(),
        _ => return,
    };

    match dict.get(b"Kids").cloned() {
        Some(kids) => {
            let kids = doc.resolve(&kids);
            let Some(items) = kids.as_array() else { return };
            for kid in items.to_vec() {
                walk(doc, &kid, visited, out);
            }
        }
        None => {
            if dict.contains_key(b"Type") && !dict.has_type(b"Page") {
                return;
            }
            let number = out.len() as u32 + 1;
            out.push(build_record(doc, number, dict));
        }
    }
}

fn build_record(doc: &mut Document, number: u32, dict: Dict) -> PageRecord {
    let media_box = inherited(doc, &dict, b"MediaBox", |_| true)
        .and_then(|v| number_quad(doc, &v))
        .filter(has_area)
        .unwrap_or(DEFAULT_MEDIA_BOX);

    let crop_box = inherited(doc, &dict, b"CropBox", |_| true)
        .and_then(|v| number_quad(doc, &v))
        .filter(has_area)
        .unwrap_or(media_box);

    let rotation = inherited(doc, &dict, b"Rotate", |v| matches!(v, Value::Integer(_)))
        .and_then(|v| v.as_int())
        .map(normalise_rotation)
        .unwrap_or(0);

    let resources = inherited(doc, &dict, b"Resources", |v| matches!(v, Value::Dict(_)))
        .and_then(|v| v.as_dict().cloned())
        .unwrap_or_default();

    PageRecord { number, media_box, crop_box, rotation, resources, dict }
}

/// Nearest value for `key` along the `/Parent` chain that satisfies
/// `accept`; rejected values keep the walk going. Terminates on parent
/// cycles through a visited set.
fn inherited(
    doc: &mut Document,
    start: &Dict,
    key: &[u8],
    accept: impl Fn(&Value) -> bool,
) -> Option<Value> {
    let mut visited: HashSet<u32> = HashSet::new();
    let mut current = start.clone();
    loop {
        if let Some(v) = current.get(key) {
            let resolved = doc.resolve(v);
            if accept(&resolved) {
                return Some(resolved);
            }
            warn!(
                "/{} value rejected during inheritance; looking further up",
                String::from_utf8_lossy(key)
            );
        }
        let parent = current.get_reference(b"Parent")?;
        if !visited.insert(parent.num) {
            return None;
        }
        current = doc.get_object(parent)?.value.as_dict()?.clone();
    }
}

fn number_quad(doc: &mut Document, v: &Value) -> Option<[f32; 4]> {
    let arr = v.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0f32; 4];
    for (slot, item) in out.iter_mut().zip(arr.iter()) {
        *slot = doc.resolve(item).as_real()?;
    }
    Some(out)
}

fn has_area(b: &[f32; 4]) -> bool {
    (b[2] - b[0]).abs() > 0.0 && (b[3] - b[1]).abs() > 0.0
}

/// `((r % 360) + 360) % 360`, snapped to right angles.
fn normalise_rotation(r: i32) -> i32 {
    let r = ((r % 360) + 360) % 360;
    if r % 90 == 0 {
        r
    } else {
        warn!("rotation {r} is not a right angle; using 0");
        0
    }
}
