use std::path::Path;

use image::{DynamicImage, GenericImageView};
use indexmap::IndexMap;
use ndarray::prelude::*;

use crate::errors::{AgriVisionError, Result};
use crate::manifest::{resolve, PathRecord};

/// Decoded images of one dataset item, keyed by category in manifest order.
#[derive(Debug, Clone, Default)]
pub struct AssembledImage {
    images: IndexMap<String, DynamicImage>,
}

impl AssembledImage {
    pub fn get(&self, category: &str) -> Option<&DynamicImage> {
        self.images.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicImage)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Pixel array of `category` as height × width × channels.
    pub fn to_array(&self, category: &str) -> Result<Array3<u8>> {
        let image = self
            .get(category)
            .ok_or_else(|| AgriVisionError::not_found("category", category))?;
        pixel_array(image)
    }
}

/// Height × width × channels view of a decoded image. The source channel
/// count is kept; samples deeper than 8 bits are narrowed to `u8`.
pub fn pixel_array(image: &DynamicImage) -> Result<Array3<u8>> {
    let (width, height) = image.dimensions();
    let (channels, raw) = match image.color().channel_count() {
        1 => (1, image.to_luma8().into_raw()),
        2 => (2, image.to_luma_alpha8().into_raw()),
        3 => (3, image.to_rgb8().into_raw()),
        _ => (4, image.to_rgba8().into_raw()),
    };
    Ok(Array3::from_shape_vec(
        (height as usize, width as usize, channels),
        raw,
    )?)
}

pub(crate) fn decode(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(AgriVisionError::missing("image file", path));
    }
    image::open(path).map_err(|e| AgriVisionError::ImageProcessing {
        path: path.display().to_string(),
        operation: "image decode".to_string(),
        source: Box::new(e),
    })
}

/// Decodes the single file stored under `category` for `record`.
pub fn decode_category(record: &PathRecord, category: &str) -> Result<DynamicImage> {
    let path = record
        .path(category)
        .ok_or_else(|| AgriVisionError::not_found("category", format!("{}/{}", record.id, category)))?;
    decode(path)
}

/// Resolves `identifier` and decodes its `category` file.
pub fn assemble_one(identifier: &str, category: &str, records: &[PathRecord]) -> Result<DynamicImage> {
    let record = resolve(identifier, records)?;
    decode_category(record, category)
}

/// Resolves `identifier` and decodes every category it lists. Any failing
/// file fails the whole item.
pub fn assemble_all(identifier: &str, records: &[PathRecord]) -> Result<AssembledImage> {
    let record = resolve(identifier, records)?;
    let images = record
        .paths
        .iter()
        .map(|(category, path)| Ok((category.clone(), decode(path)?)))
        .collect::<Result<IndexMap<_, _>>>()?;
    Ok(AssembledImage { images })
}

/// Width and height shared by every image of the item, if they agree.
pub fn common_dimensions(assembled: &AssembledImage) -> Option<(u32, u32)> {
    let mut dims = assembled.images.values().map(GenericImageView::dimensions);
    let first = dims.next()?;
    dims.all(|d| d == first).then_some(first)
}
