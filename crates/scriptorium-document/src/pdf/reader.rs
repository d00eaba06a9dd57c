// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — loads finished pages back with `lopdf` so they can be
// inspected, concatenated into a consolidated document, and recompressed.

use std::collections::BTreeMap;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};
use scriptorium_core::error::ScriptoriumError;
use tracing::{debug, info, instrument};

use crate::ImageProcessor;

fn pdf_error(context: impl std::fmt::Display, err: lopdf::Error) -> ScriptoriumError {
    ScriptoriumError::PdfError(format!("{context}: {err}"))
}

fn load(path: &Path) -> Result<Document, ScriptoriumError> {
    Document::load(path)
        .map_err(|err| pdf_error(format_args!("failed to open {}", path.display()), err))
}

fn serialize(document: &mut Document, what: &str) -> Result<Vec<u8>, ScriptoriumError> {
    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .map_err(|err| ScriptoriumError::PdfError(format!("failed to write {what} PDF: {err}")))?;
    Ok(bytes)
}

/// A parsed PDF held in memory.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScriptoriumError> {
        let document = load(path.as_ref())?;
        debug!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ScriptoriumError> {
        Document::load_mem(data)
            .map(|document| Self { document })
            .map_err(|err| pdf_error(format_args!("unreadable PDF ({} bytes)", data.len()), err))
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// `(width, height)` in points of every page, in page order, read from
    /// each page's /MediaBox. Pages without a readable box report `(0, 0)`.
    pub fn page_sizes(&self) -> Vec<(f32, f32)> {
        self.document
            .get_pages()
            .values()
            .map(|&page_id| media_box_size(&self.document, page_id).unwrap_or((0.0, 0.0)))
            .collect()
    }

    /// Append the pages of each PDF in `others`, in order, after this
    /// document's own pages.
    #[instrument(skip_all, fields(documents = others.len() + 1))]
    pub fn merge(&self, others: &[&[u8]]) -> Result<Vec<u8>, ScriptoriumError> {
        let mut merged = self.document.clone();
        for (position, bytes) in others.iter().enumerate() {
            let other = Self::from_bytes(bytes)?.document;
            let appended = append_pages(&mut merged, other)?;
            debug!(position = position + 1, pages = appended, "Document appended");
        }
        serialize(&mut merged, "merged")
    }

    /// Concatenate the PDF files at `paths` in the given order.
    #[instrument(skip_all, fields(files = paths.len()))]
    pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>, ScriptoriumError> {
        let Some((first, rest)) = paths.split_first() else {
            return Err(ScriptoriumError::PdfError(
                "nothing to merge: no input documents".to_string(),
            ));
        };

        let mut merged = load(first.as_ref())?;
        for path in rest {
            append_pages(&mut merged, load(path.as_ref())?)?;
        }

        let bytes = serialize(&mut merged, "merged")?;
        info!(
            files = paths.len(),
            pages = merged.get_pages().len(),
            bytes = bytes.len(),
            "PDF files merged"
        );
        Ok(bytes)
    }

    /// Drop unreachable objects, renumber what is left, and Flate-compress
    /// every stream. `options` additionally re-encodes embedded scans and
    /// strips document metadata.
    #[instrument(skip(self))]
    pub fn compress(&self, options: &CompressOptions) -> Result<Vec<u8>, ScriptoriumError> {
        let mut document = self.document.clone();
        if options.remove_metadata {
            strip_metadata(&mut document);
        }
        let reencoded = match &options.images {
            Some(images) => reencode_images(&mut document, images),
            None => 0,
        };
        let pruned = document.prune_objects();
        document.renumber_objects();
        document.compress();

        let bytes = serialize(&mut document, "compressed")?;
        debug!(
            pruned = pruned.len(),
            reencoded,
            bytes = bytes.len(),
            "PDF recompressed"
        );
        Ok(bytes)
    }
}

/// What [`PdfReader::compress`] does beyond stream compression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressOptions {
    /// Re-encode embedded images. `None` leaves image streams as they are.
    pub images: Option<ImageRecompression>,
    /// Drop the /Info dictionary and the catalog's XMP /Metadata stream.
    pub remove_metadata: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRecompression {
    /// Images denser than this, measured against the page they sit on, are
    /// downsampled to it.
    pub target_dpi: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

fn strip_metadata(document: &mut Document) {
    document.trailer.remove(b"Info");
    if let Ok(catalog) = document.catalog_mut() {
        catalog.remove(b"Metadata");
    }
}

/// Re-encode every image XObject as JPEG, downsampled to `settings.target_dpi`.
/// An image keeps its stream when the re-encoded one would not be smaller.
/// Returns the number of images replaced.
///
/// Scanned pages are covered by their image, so the page's /MediaBox gives
/// the printed size. An image shared between pages is sized for the largest.
fn reencode_images(document: &mut Document, settings: &ImageRecompression) -> usize {
    let dpi = f64::from(settings.target_dpi);
    let mut scales: BTreeMap<ObjectId, f64> = BTreeMap::new();
    for page_id in document.get_pages().into_values() {
        let Some((width_pt, height_pt)) = media_box_size(document, page_id) else {
            continue;
        };
        let Ok(images) = document.get_page_images(page_id) else {
            continue;
        };
        for image in images.iter().filter(|i| i.width > 0 && i.height > 0) {
            let scale = f64::max(
                f64::from(width_pt) / 72.0 * dpi / image.width as f64,
                f64::from(height_pt) / 72.0 * dpi / image.height as f64,
            );
            let entry = scales.entry(image.id).or_insert(scale);
            *entry = entry.max(scale);
        }
    }

    let mut replaced = 0;
    for (id, scale) in scales {
        let Ok(stream) = document.get_object_mut(id).and_then(Object::as_stream_mut) else {
            continue;
        };
        match reencode_image(stream, scale.min(1.0), settings.quality) {
            Ok(true) => replaced += 1,
            Ok(false) => {}
            Err(err) => debug!(object = ?id, %err, "Image kept as embedded"),
        }
    }
    replaced
}

fn reencode_image(stream: &mut Stream, scale: f64, quality: u8) -> Result<bool, ScriptoriumError> {
    let Some(image) = decode_image(stream)? else {
        return Ok(false);
    };
    let scaled = ImageProcessor::from(image).scale(scale);
    let jpeg = scaled.to_jpeg_bytes(quality, None)?;
    if jpeg.len() >= stream.content.len() {
        return Ok(false);
    }

    let dict = &mut stream.dict;
    dict.set("Width", i64::from(scaled.width()));
    dict.set("Height", i64::from(scaled.height()));
    dict.set("BitsPerComponent", 8_i64);
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.remove(b"DecodeParms");
    dict.remove(b"Decode");
    stream.set_content(jpeg);
    Ok(true)
}

/// Pixels of an 8-bit RGB or gray image stream. `None` for images this pass
/// does not touch: masked, indexed, ICC-tagged, or in an unsupported filter.
fn decode_image(stream: &Stream) -> Result<Option<DynamicImage>, ScriptoriumError> {
    let dict = &stream.dict;
    let masked = dict.has(b"SMask")
        || dict.has(b"Mask")
        || dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false);
    if masked {
        return Ok(None);
    }

    let filters = stream.filters().unwrap_or_default();
    if filters.len() == 1 && filters[0] == b"DCTDecode".as_slice() {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map(Some)
            .map_err(|err| ScriptoriumError::ImageError(format!("embedded JPEG unreadable: {err}")));
    }

    let dimension = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::as_i64)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
    };
    let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height")) else {
        return Ok(None);
    };
    if dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok() != Some(8) {
        return Ok(None);
    }
    let Ok(pixels) = stream.get_plain_content() else {
        return Ok(None);
    };

    let image = match dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(b"DeviceRGB") => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        Ok(b"DeviceGray") => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        _ => None,
    };
    Ok(image)
}

/// Width and height of the page's /MediaBox.
fn media_box_size(document: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let page = document.get_dictionary(page_id).ok()?;
    let media_box = match page.get(b"MediaBox").ok()? {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };
    let values: Vec<f32> = media_box
        .as_array()
        .ok()?
        .iter()
        .filter_map(|obj| match obj {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r as f32),
            _ => None,
        })
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
        _ => None,
    }
}

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against malformed /Parent cycles.
const MAX_TREE_DEPTH: usize = 32;

fn pages_root(document: &Document) -> Result<ObjectId, ScriptoriumError> {
    document
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|err| pdf_error("document has no page tree", err))
}

/// Copy inherited attributes onto the page itself, so it keeps them once it
/// is moved under a different page tree.
fn materialize_inherited(document: &mut Document, page_id: ObjectId) {
    let Ok(page) = document.get_dictionary(page_id) else {
        return;
    };

    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let Some(node) = parent.and_then(|id| document.get_dictionary(id).ok()) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                inherited.push((key, value.clone()));
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }

    if let Ok(page) = document.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
}

/// Move every page of `other` to the end of `target`'s root page list.
///
/// `other` is renumbered above `target`'s highest object id, so its objects
/// can be moved across unchanged and shared resources stay shared. Returns the
/// number of pages appended.
fn append_pages(target: &mut Document, mut other: Document) -> Result<usize, ScriptoriumError> {
    let root_id = pages_root(target)?;

    other.renumber_objects_with(target.max_id + 1);
    let page_ids: Vec<ObjectId> = other.get_pages().into_values().collect();
    for &page_id in &page_ids {
        materialize_inherited(&mut other, page_id);
    }

    // The incoming catalog and page-tree root are replaced by the target's.
    let skip = [
        other.trailer.get(b"Root").and_then(Object::as_reference).ok(),
        pages_root(&other).ok(),
    ];
    target.max_id = target.max_id.max(other.max_id);
    for (id, object) in std::mem::take(&mut other.objects) {
        if !skip.contains(&Some(id)) {
            target.objects.insert(id, object);
        }
    }

    for &page_id in &page_ids {
        if let Ok(page) = target.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", Object::Reference(root_id));
        }
    }

    let root = target
        .get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| pdf_error("page tree root unreadable", err))?;
    root.get_mut(b"Kids")
        .and_then(Object::as_array_mut)
        .map_err(|err| pdf_error("page tree has no /Kids", err))?
        .extend(page_ids.iter().map(|&id| Object::Reference(id)));
    // /Count covers every leaf below the root, nested or not.
    let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    root.set("Count", count + page_ids.len() as i64);

    Ok(page_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::PdfWriter;
    use image::{DynamicImage, Rgb, RgbImage};

    /// Single-page PDF whose page is `width` points wide (72 dpi).
    fn page_of_width(width: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 10, Rgb([255, 255, 255])));
        PdfWriter::new(72, 8.0)
            .create_searchable_page(&image, &[])
            .unwrap()
    }

    fn widths(bytes: &[u8]) -> Vec<u32> {
        PdfReader::from_bytes(bytes)
            .unwrap()
            .page_sizes()
            .into_iter()
            .map(|(w, _)| w.round() as u32)
            .collect()
    }

    #[test]
    fn merge_preserves_page_order() {
        let a = page_of_width(30);
        let b = page_of_width(60);
        let c = page_of_width(90);

        let merged = PdfReader::from_bytes(&a)
            .unwrap()
            .merge(&[b.as_slice(), c.as_slice()])
            .unwrap();

        assert_eq!(widths(&merged), vec![30, 60, 90]);
    }

    /// One page whose /MediaBox lives only on the page-tree root.
    fn page_with_inherited_box(width: i64) -> Vec<u8> {
        use lopdf::{Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), 100.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn appended_pages_keep_inherited_media_box() {
        let merged = PdfReader::from_bytes(&page_of_width(30))
            .unwrap()
            .merge(&[page_with_inherited_box(77).as_slice()])
            .unwrap();
        assert_eq!(widths(&merged), vec![30, 77]);
    }

    /// Two pages held under an intermediate /Pages node.
    fn nested_two_page_document() -> Vec<u8> {
        use lopdf::{Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let root_id = doc.new_object_id();
        let branch_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let leaves: Vec<Object> = (0..2)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => branch_id,
                    "Contents" => content_id,
                    "MediaBox" => vec![0.into(), 0.into(), 50.into(), 50.into()],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            branch_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Parent" => root_id,
                "Kids" => leaves,
                "Count" => 2,
            }),
        );
        doc.objects.insert(
            root_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![branch_id.into()],
                "Count" => 2,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => root_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn root_count_includes_nested_pages() {
        let merged = PdfReader::from_bytes(&nested_two_page_document())
            .unwrap()
            .merge(&[page_of_width(30).as_slice()])
            .unwrap();

        let document = Document::load_mem(&merged).unwrap();
        let root = document
            .get_dictionary(pages_root(&document).unwrap())
            .unwrap();
        assert_eq!(root.get(b"Count").and_then(Object::as_i64).unwrap(), 3);
        assert_eq!(widths(&merged), vec![50, 50, 30]);
    }

    #[test]
    fn merge_files_reads_in_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, width) in [("b.pdf", 50), ("a.pdf", 20)] {
            let path = dir.path().join(name);
            std::fs::write(&path, page_of_width(width)).unwrap();
            paths.push(path);
        }

        let merged = PdfReader::merge_files(&paths).unwrap();
        assert_eq!(widths(&merged), vec![50, 20]);
    }

    #[test]
    fn merge_files_rejects_empty_input() {
        let paths: Vec<std::path::PathBuf> = Vec::new();
        assert!(PdfReader::merge_files(&paths).is_err());
    }

    #[test]
    fn compressed_document_keeps_pages() {
        let merged = PdfReader::from_bytes(&page_of_width(40))
            .unwrap()
            .merge(&[page_of_width(40).as_slice()])
            .unwrap();
        let compressed = PdfReader::from_bytes(&merged)
            .unwrap()
            .compress(&CompressOptions::default())
            .unwrap();
        assert_eq!(PdfReader::from_bytes(&compressed).unwrap().page_count(), 2);
    }

    /// One-inch page covered by a `pixels` square of noise, stored raw,
    /// with an /Info dictionary.
    fn scanned_page(pixels: u32) -> Vec<u8> {
        use lopdf::dictionary;

        let mut state = 0x2545_f491_u32;
        let noise: Vec<u8> = (0..pixels * pixels * 3)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(pixels),
                "Height" => i64::from(pixels),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            noise,
        ));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 72 0 0 72 0 0 cm /Scan Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 72.into(), 72.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Scan" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal("scanner"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn embedded_image_sizes(bytes: &[u8]) -> Vec<(i64, i64)> {
        let document = Document::load_mem(bytes).unwrap();
        document
            .get_pages()
            .into_values()
            .flat_map(|page| document.get_page_images(page).unwrap())
            .map(|image| (image.width, image.height))
            .collect()
    }

    #[test]
    fn image_recompression_downsamples_to_target_dpi() {
        let scan = scanned_page(300);
        let reader = PdfReader::from_bytes(&scan).unwrap();
        let plain = reader.compress(&CompressOptions::default()).unwrap();
        let options = CompressOptions {
            images: Some(ImageRecompression {
                target_dpi: 100,
                quality: 50,
            }),
            remove_metadata: true,
        };

        let shrunk = reader.compress(&options).unwrap();

        assert!(shrunk.len() * 2 < plain.len(), "{} vs {}", shrunk.len(), plain.len());
        assert_eq!(embedded_image_sizes(&plain), vec![(300, 300)]);
        assert_eq!(embedded_image_sizes(&shrunk), vec![(100, 100)]);
        assert_eq!(widths(&shrunk), vec![72]);
        let document = Document::load_mem(&shrunk).unwrap();
        assert!(document.trailer.get(b"Info").is_err());
    }

    #[test]
    fn images_below_target_dpi_keep_their_size() {
        let options = CompressOptions {
            images: Some(ImageRecompression {
                target_dpi: 600,
                quality: 50,
            }),
            remove_metadata: false,
        };
        let shrunk = PdfReader::from_bytes(&scanned_page(120))
            .unwrap()
            .compress(&options)
            .unwrap();

        assert_eq!(embedded_image_sizes(&shrunk), vec![(120, 120)]);
        let document = Document::load_mem(&shrunk).unwrap();
        assert!(document.trailer.get(b"Info").is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PdfReader::from_bytes(b"not a pdf").is_err());
    }
}
