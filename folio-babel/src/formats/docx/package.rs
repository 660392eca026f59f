//! The OPC container: zip parts, relationships and core properties.

use super::xml::{self, PKG_REL};
use crate::error::FormatError;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use zip::ZipArchive;

pub const DOCUMENT_PART: &str = "word/document.xml";

/// Every part of a package, read eagerly.
#[derive(Debug, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn open(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| FormatError::CorruptPackage(format!("not a zip archive: {e}")))?;

        let mut parts = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| FormatError::CorruptPackage(format!("unreadable entry: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let mut buffer = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buffer)
                .map_err(|e| FormatError::CorruptPackage(format!("cannot read '{name}': {e}")))?;
            parts.insert(name, buffer);
        }
        Ok(Self { parts })
    }

    /// Part bytes; names match case-insensitively as a fallback.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.trim_start_matches('/');
        self.parts
            .get(name)
            .or_else(|| {
                self.parts
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(Vec::as_slice)
    }

    /// Part decoded as UTF-8 text, without a byte order mark.
    pub fn text(&self, name: &str) -> Option<String> {
        let bytes = self.part(name)?;
        let text = String::from_utf8_lossy(bytes);
        Some(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Relationships of one part, by id.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    by_id: HashMap<String, Relationship>,
}

impl Relationships {
    pub fn parse(source: &str) -> Result<Self, String> {
        let doc = xml::parse(source).map_err(|e| e.to_string())?;
        let by_id = doc
            .root_element()
            .children()
            .filter(|n| xml::is(*n, PKG_REL, "Relationship"))
            .filter_map(|n| {
                let id = n.attribute("Id")?.to_string();
                Some((
                    id.clone(),
                    Relationship {
                        id,
                        rel_type: n.attribute("Type").unwrap_or_default().to_string(),
                        target: n.attribute("Target").unwrap_or_default().to_string(),
                        external: n.attribute("TargetMode") == Some("External"),
                    },
                ))
            })
            .collect();
        Ok(Self { by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// Relationship whose type ends in `/{kind}`, lowest id first.
    pub fn of_type(&self, kind: &str) -> Option<&Relationship> {
        let suffix = format!("/{kind}");
        self.by_id
            .values()
            .filter(|rel| rel.rel_type.ends_with(&suffix))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// `word/document.xml` → `word/_rels/document.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns it.
pub fn resolve_target(owner: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match owner.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// `docProps/core.xml` fields as metadata.
pub fn core_properties(source: &str) -> Result<BTreeMap<String, String>, String> {
    let doc = xml::parse(source).map_err(|e| e.to_string())?;
    let mut metadata = BTreeMap::new();
    for node in doc.root_element().children().filter(|n| n.is_element()) {
        let key = match node.tag_name().name() {
            "title" => "title",
            "creator" => "creator",
            "subject" => "subject",
            "description" => "description",
            "keywords" => "keywords",
            "lastModifiedBy" => "last_modified_by",
            "created" => "created",
            "modified" => "modified",
            "revision" => "revision",
            _ => continue,
        };
        let value = node.text().unwrap_or_default().trim();
        if !value.is_empty() {
            metadata.insert(key.to_string(), value.to_string());
        }
    }
    Ok(metadata)
}
