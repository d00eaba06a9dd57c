// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// METS preservation metadata — per-file records and per-format aggregate
// records, written with `quick-xml`.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use scriptorium_core::config::AggregationConfig;
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::{FormatKind, SourceFile};
use scriptorium_document::{ChecksumKind, ImageInfo};

use crate::postconvert::aggregate::{AggregateEntry, AggregateMetadataRecord};

pub const METS_NS: &str = "http://www.loc.gov/METS/";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const METS_SCHEMA_LOCATION: &str =
    "http://www.loc.gov/METS/ http://www.loc.gov/standards/mets/mets.xsd";
pub const PREMIS_NS: &str = "http://www.loc.gov/premis/v3";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Who produced the records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub organization: String,
    /// Name of the producing software agent.
    pub creator: String,
}

impl From<&AggregationConfig> for Provenance {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            organization: config.organization.clone(),
            creator: config.creator.clone(),
        }
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// MIME type of a source scan, from its extension.
pub fn source_mime(source: &SourceFile) -> &'static str {
    match source.extension().as_str() {
        "tif" | "tiff" => "image/tiff",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

fn xml_err(err: impl std::fmt::Display) -> ScriptoriumError {
    ScriptoriumError::Metadata(format!("XML write failed: {err}"))
}

/// Thin element-level wrapper over `quick_xml::Writer`.
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        Ok(Self { writer })
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_err)
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(start)).map_err(xml_err)
    }

    fn text(&mut self, name: &str, text: &str) -> Result<()> {
        self.open(name, &[])?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Root element plus `metsHdr` with both agents. Leaves `mets` open.
    fn header(
        &mut self,
        objid: &str,
        label: &str,
        provenance: &Provenance,
        created: DateTime<Utc>,
    ) -> Result<()> {
        self.open(
            "mets",
            &[
                ("xmlns", METS_NS),
                ("xmlns:xlink", XLINK_NS),
                ("xmlns:xsi", XSI_NS),
                ("xsi:schemaLocation", METS_SCHEMA_LOCATION),
                ("OBJID", objid),
                ("LABEL", label),
            ],
        )?;

        let stamp = timestamp(created);
        self.open("metsHdr", &[("CREATEDATE", &stamp), ("LASTMODDATE", &stamp)])?;
        self.open("agent", &[("ROLE", "CREATOR"), ("TYPE", "ORGANIZATION")])?;
        self.text("name", &provenance.organization)?;
        self.close("agent")?;
        self.open(
            "agent",
            &[("ROLE", "CREATOR"), ("TYPE", "OTHER"), ("OTHERTYPE", "SOFTWARE")],
        )?;
        self.text("name", &provenance.creator)?;
        self.close("agent")?;
        self.close("metsHdr")
    }

    fn image_info(&mut self, info: &ImageInfo) -> Result<()> {
        self.empty(
            "imageInfo",
            &[
                ("width", &info.width.to_string()),
                ("height", &info.height.to_string()),
                ("color", &info.color),
                ("format", &info.format),
            ],
        )
    }

    /// `structMap` with one `div` per file ID.
    fn struct_map(&mut self, label: &str, file_ids: &[String]) -> Result<()> {
        self.open("structMap", &[("TYPE", "PHYSICAL")])?;
        self.open("div", &[("TYPE", "folder"), ("LABEL", label)])?;
        for (index, id) in file_ids.iter().enumerate() {
            let order = (index + 1).to_string();
            self.open("div", &[("TYPE", "page"), ("ORDER", &order)])?;
            self.empty("fptr", &[("FILEID", id)])?;
            self.close("div")?;
        }
        self.close("div")?;
        self.close("structMap")
    }
}

/// Per-file record for one source scan.
pub fn file_record(
    source: &SourceFile,
    md5: &str,
    info: Option<&ImageInfo>,
    provenance: &Provenance,
    created: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let mut xml = XmlOut::new()?;
    xml.header(&source.stem, &source.file_name(), provenance, created)?;

    let file_id = format!("FILE_{}", source.stem);
    let size = source.size_bytes.to_string();
    let modified = timestamp(source.modified);
    let href = source.path.display().to_string();

    xml.open("fileSec", &[])?;
    xml.open("fileGrp", &[("USE", "PRESERVATION")])?;
    xml.open(
        "file",
        &[
            ("ID", &file_id),
            ("MIMETYPE", source_mime(source)),
            ("SIZE", &size),
            ("CREATED", &modified),
            ("CHECKSUM", md5),
            ("CHECKSUMTYPE", ChecksumKind::Md5.label()),
        ],
    )?;
    xml.empty("FLocat", &[("LOCTYPE", "URL"), ("xlink:href", &href)])?;
    xml.close("file")?;
    xml.close("fileGrp")?;
    xml.close("fileSec")?;

    if let Some(info) = info {
        let techmd_id = format!("TECHMD_{}", source.stem);
        let stamp = timestamp(created);
        xml.open("amdSec", &[])?;
        xml.open("techMD", &[("ID", &techmd_id)])?;
        xml.open(
            "mdWrap",
            &[("MDTYPE", "OTHER"), ("OTHERMDTYPE", "TECHNICAL")],
        )?;
        xml.open("xmlData", &[])?;
        xml.empty(
            "technicalInfo",
            &[
                ("format", &info.format),
                ("width", &info.width.to_string()),
                ("height", &info.height.to_string()),
                ("color", &info.color),
                ("conversionDate", &stamp),
                ("converter", &provenance.creator),
            ],
        )?;
        xml.close("xmlData")?;
        xml.close("mdWrap")?;
        xml.close("techMD")?;
        xml.close("amdSec")?;
    }

    xml.struct_map(&source.file_name(), &[file_id])?;
    xml.close("mets")?;
    Ok(xml.finish())
}

fn original_file(xml: &mut XmlOut, entry: &AggregateEntry, with_info: bool, with_image: bool) -> Result<String> {
    let source = &entry.source;
    let id = format!("FILE_{}_ORIGINAL", source.stem);
    let size = source.size_bytes.to_string();
    let modified = timestamp(source.modified);
    let href = source.path.display().to_string();

    xml.open(
        "file",
        &[
            ("ID", &id),
            ("MIMETYPE", source_mime(source)),
            ("SIZE", &size),
            ("CREATED", &modified),
            ("CHECKSUM", &entry.source_md5),
            ("CHECKSUMTYPE", ChecksumKind::Md5.label()),
        ],
    )?;
    xml.empty("FLocat", &[("LOCTYPE", "URL"), ("xlink:href", &href)])?;
    if with_info {
        let size_mb = format!("{:.2}", source.size_bytes as f64 / BYTES_PER_MB);
        xml.empty(
            "fileInfo",
            &[
                ("name", &source.file_name()),
                ("extension", &source.extension()),
                ("size_bytes", &size),
                ("size_mb", &size_mb),
                ("modified", &modified),
            ],
        )?;
    }
    if with_image && let Some(info) = &entry.source_info {
        xml.image_info(info)?;
    }
    xml.close("file")?;
    Ok(id)
}

fn converted_file(
    xml: &mut XmlOut,
    record: &AggregateMetadataRecord,
    entry: &AggregateEntry,
    with_image: bool,
) -> Result<String> {
    let id = format!("FILE_{}_{}", entry.source.stem, record.format);
    let size = entry.artifact_size.to_string();
    let created = timestamp(entry.artifact_created);
    let href = entry.artifact.display().to_string();

    xml.open(
        "file",
        &[
            ("ID", &id),
            ("MIMETYPE", record.kind.mime_type()),
            ("SIZE", &size),
            ("CREATED", &created),
            ("CHECKSUM", &entry.artifact_md5),
            ("CHECKSUMTYPE", ChecksumKind::Md5.label()),
        ],
    )?;
    xml.empty("FLocat", &[("LOCTYPE", "URL"), ("xlink:href", &href)])?;
    if with_image
        && record.kind == FormatKind::Raster
        && let Some(info) = &entry.artifact_info
    {
        xml.image_info(info)?;
    }
    xml.close("file")?;
    Ok(id)
}

/// Aggregate record covering every artifact of one format in one folder.
pub fn aggregate_record(record: &AggregateMetadataRecord) -> Result<Vec<u8>> {
    let mut xml = XmlOut::new()?;
    let label = format!("{} {}", record.folder, record.format);
    xml.header(&record.objid(), &label, &record.provenance, record.created)?;

    let mut converted_ids = Vec::with_capacity(record.entries.len());
    xml.open("fileSec", &[])?;
    for entry in &record.entries {
        let group_id = format!("GRP_{}", entry.source.stem);
        xml.open("fileGrp", &[("USE", "PRESERVATION"), ("ID", &group_id)])?;
        original_file(&mut xml, entry, record.include_file_info, record.include_image_info)?;
        converted_ids.push(converted_file(&mut xml, record, entry, record.include_image_info)?);
        xml.close("fileGrp")?;
    }
    xml.close("fileSec")?;

    let amd_id = format!("AMD_{}", record.format);
    let techmd_id = format!("TECHMD_{}", record.format);
    xml.open("amdSec", &[("ID", &amd_id)])?;
    xml.open("techMD", &[("ID", &techmd_id)])?;
    xml.open("mdWrap", &[("MDTYPE", "PREMIS")])?;
    xml.open("xmlData", &[])?;
    xml.open("premis", &[("xmlns", PREMIS_NS), ("version", "3.0")])?;
    for entry in &record.entries {
        let identifier = format!("{}_{}", entry.source.stem, record.format);
        xml.open("object", &[])?;
        xml.open("objectIdentifier", &[])?;
        xml.text("objectIdentifierType", "LOCAL")?;
        xml.text("objectIdentifierValue", &identifier)?;
        xml.close("objectIdentifier")?;
        xml.text("size", &entry.artifact_size.to_string())?;
        xml.text("formatName", record.kind.mime_type())?;
        xml.text("dateCreated", &timestamp(entry.artifact_created))?;
        xml.close("object")?;
    }
    xml.close("premis")?;
    xml.close("xmlData")?;
    xml.close("mdWrap")?;
    xml.close("techMD")?;
    xml.close("amdSec")?;

    xml.struct_map(&label, &converted_ids)?;
    xml.close("mets")?;
    Ok(xml.finish())
}

#[cfg(test)]
pub(crate) mod testing {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    /// Values of `attr` on every `element` start or empty tag, in document order.
    pub fn attribute_values(xml: &[u8], element: &str, attr: &str) -> Vec<String> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut values = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).expect("well-formed XML") {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == element.as_bytes() => {
                    if let Some(value) = e.try_get_attribute(attr).expect("valid attribute") {
                        values.push(value.unescape_value().expect("escaped").into_owned());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        values
    }

    /// Text content of every `element`, in document order.
    pub fn element_texts(xml: &[u8], element: &str) -> Vec<String> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut inside = false;
        let mut texts = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).expect("well-formed XML") {
                Event::Start(e) if e.name().as_ref() == element.as_bytes() => inside = true,
                Event::End(e) if e.name().as_ref() == element.as_bytes() => inside = false,
                Event::Text(t) if inside => texts.push(t.unescape().expect("escaped").into_owned()),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{attribute_values, element_texts};
    use super::*;
    use std::path::PathBuf;

    fn provenance() -> Provenance {
        Provenance {
            organization: "Archivo & Co".into(),
            creator: "Sistema Automatizado".into(),
        }
    }

    fn source() -> SourceFile {
        SourceFile {
            path: PathBuf::from("/in/box/TIFF/p1.tif"),
            stem: "p1".into(),
            size_bytes: 2048,
            modified: Utc::now(),
        }
    }

    #[test]
    fn file_record_is_well_formed() {
        let info = ImageInfo {
            width: 10,
            height: 20,
            color: "L8".into(),
            format: "Tiff".into(),
        };
        let xml = file_record(&source(), "abc123", Some(&info), &provenance(), Utc::now()).unwrap();

        assert_eq!(attribute_values(&xml, "file", "ID"), vec!["FILE_p1"]);
        assert_eq!(attribute_values(&xml, "file", "CHECKSUM"), vec!["abc123"]);
        assert_eq!(attribute_values(&xml, "file", "MIMETYPE"), vec!["image/tiff"]);
        assert_eq!(attribute_values(&xml, "technicalInfo", "width"), vec!["10"]);
        assert_eq!(attribute_values(&xml, "fptr", "FILEID"), vec!["FILE_p1"]);
        // Special characters are escaped and round-trip.
        assert_eq!(
            element_texts(&xml, "name"),
            vec!["Archivo & Co", "Sistema Automatizado"]
        );
    }

    #[test]
    fn file_record_without_image_info_has_no_amdsec() {
        let xml = file_record(&source(), "abc", None, &provenance(), Utc::now()).unwrap();
        assert!(attribute_values(&xml, "techMD", "ID").is_empty());
    }

    #[test]
    fn source_mime_by_extension() {
        let mut s = source();
        assert_eq!(source_mime(&s), "image/tiff");
        s.path = PathBuf::from("/in/p1.bin");
        assert_eq!(source_mime(&s), "application/octet-stream");
    }
}
