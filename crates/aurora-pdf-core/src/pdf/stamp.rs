//! Drawing a raster image onto a page.
//!
//! The image becomes an XObject (`/Subtype /Image`, DeviceRGB, with an
//! `/SMask` when it carries alpha). The page's existing content is wrapped in
//! `q`/`Q` so any graphics state it leaves behind cannot move the stamp.

use bytes::Bytes;
use lopdf::{Dictionary, Object, ObjectId, Stream};
use tracing::debug;

use super::document::{DocumentHandle, resolved_page_dict};
use crate::error::{Error, Result};

/// Placement of an image in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone)]
pub struct ImageStamp {
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Encoded PNG or JPEG bytes
    pub image: Bytes,
}

impl ImageStamp {
    fn check_geometry(&self) -> Result<()> {
        let values = [self.x, self.y, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidStamp("placement must be finite".to_string()));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::InvalidStamp(format!(
                "size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Decoded image data ready to embed.
struct RasterImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

fn decode(bytes: &[u8]) -> Result<RasterImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidStamp(format!("cannot decode image: {e}")))?;

    let has_alpha = image.color().has_alpha();
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(if has_alpha { rgba.len() / 4 } else { 0 });
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        if has_alpha {
            alpha.push(a);
        }
    }

    Ok(RasterImage {
        width,
        height,
        rgb,
        alpha: has_alpha.then_some(alpha),
    })
}

fn image_stream(width: u32, height: u32, color_space: &str, data: Vec<u8>, smask: Option<ObjectId>) -> Stream {
    let mut dict = Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
    ]);
    if let Some(smask) = smask {
        dict.set("SMask", Object::Reference(smask));
    }
    Stream::new(dict, data)
}

/// Pick an XObject name not already used in the page's resources.
fn unused_name(xobjects: &Dictionary) -> Vec<u8> {
    (1..)
        .map(|n| format!("AuroraStamp{n}").into_bytes())
        .find(|name| !xobjects.has(name))
        .unwrap_or_else(|| b"AuroraStamp".to_vec())
}

/// Draw `stamp` onto its page of `handle`.
pub fn stamp_image(handle: &mut DocumentHandle, stamp: &ImageStamp) -> Result<()> {
    stamp.check_geometry()?;
    let page_id = handle.page_id(stamp.page)?;
    let raster = decode(&stamp.image)?;

    let doc = handle.document_mut();

    let smask_id = raster
        .alpha
        .map(|alpha| doc.add_object(image_stream(raster.width, raster.height, "DeviceGray", alpha, None)));
    let image_id = doc.add_object(image_stream(
        raster.width,
        raster.height,
        "DeviceRGB",
        raster.rgb,
        smask_id,
    ));

    // Resources may be inherited or referenced; give the page its own copy
    let page = resolved_page_dict(doc, page_id)?;
    let mut resources = match page.get(b"Resources") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let name = unused_name(&xobjects);
    xobjects.set(name.clone(), Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let draw = format!(
        "\nQ\nq\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        stamp.width,
        stamp.height,
        stamp.x,
        stamp.y,
        String::from_utf8_lossy(&name)
    );
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let draw_id = doc.add_object(Stream::new(Dictionary::new(), draw.into_bytes()));

    let mut contents = vec![Object::Reference(open_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
        Ok(Object::Reference(id)) => contents.push(Object::Reference(*id)),
        _ => {}
    }
    contents.push(Object::Reference(draw_id));

    let page_dict = handle.page_dict_mut(stamp.page)?;
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Array(contents));

    debug!(
        "Stamped {}x{} image on page {} at ({}, {})",
        raster.width,
        raster.height,
        stamp.page + 1,
        stamp.x,
        stamp.y
    );
    Ok(())
}
