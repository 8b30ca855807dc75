//! EPUB container parsing
//!
//! Reads the ZIP archive, follows `META-INF/container.xml` to the package
//! document and loads every manifest item, in manifest order, into memory.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use quick_xml::de::from_str;
use serde::Deserialize;
use zip::result::ZipError;
use zip::ZipArchive;

use super::EpubError;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Default cap on decompressed bytes read from one container
pub const DEFAULT_EXTRACTION_LIMIT: u64 = 400 * 1024 * 1024;

/// Largest buffer reserved up front for an entry; declared sizes are untrusted
const MAX_PREALLOC: u64 = 1024 * 1024;

/// File suffixes treated as images regardless of declared media type
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".bmp"];

/// How the renderer treats an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Image,
    Document,
    Other,
}

/// A single packaged unit of the container
#[derive(Debug, Clone)]
pub struct EpubItem {
    pub id: String,
    /// Manifest href, percent-decoded, relative to the package document
    pub name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

impl EpubItem {
    /// Last path component of the item name
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> ItemKind {
        let name = self.basename().to_ascii_lowercase();
        let media_type = self.media_type.to_ascii_lowercase();

        if IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) || media_type.contains("image") {
            ItemKind::Image
        } else if media_type.contains("html") {
            ItemKind::Document
        } else {
            ItemKind::Other
        }
    }
}

/// Parsed container: the manifest items with their bytes
#[derive(Debug, Clone)]
pub struct EpubDocument {
    items: Vec<EpubItem>,
}

impl EpubDocument {
    /// Open a container, reading at most `limit` decompressed bytes in total
    pub fn open<P: AsRef<Path>>(path: P, limit: u64) -> Result<Self, EpubError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EpubError::SourceMissing(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), limit)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, limit: u64) -> Result<Self, EpubError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut budget = ExtractionBudget::new(limit);

        let container_xml = read_entry_string(&mut archive, CONTAINER_PATH, &mut budget)?
            .ok_or_else(|| EpubError::InvalidContainer(format!("{} is missing", CONTAINER_PATH)))?;
        let container: ContainerXml = from_str(&container_xml).map_err(|source| EpubError::Xml {
            file: CONTAINER_PATH.to_string(),
            source,
        })?;

        let opf_path = container
            .rootfiles
            .rootfile
            .into_iter()
            .map(|r| r.full_path)
            .find(|p| !p.trim().is_empty())
            .ok_or_else(|| EpubError::InvalidContainer("no rootfile declared".to_string()))?;

        let opf_xml = read_entry_string(&mut archive, &opf_path, &mut budget)?.ok_or_else(|| {
            EpubError::InvalidContainer(format!("package document {} is missing", opf_path))
        })?;
        let package: OpfPackage = from_str(&opf_xml).map_err(|source| EpubError::Xml {
            file: opf_path.clone(),
            source,
        })?;

        let opf_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

        let mut items = Vec::with_capacity(package.manifest.item.len());
        for entry in package.manifest.item {
            let (Some(id), Some(href)) = (entry.id, entry.href) else {
                continue;
            };
            let name = decode_href(&href);
            let path = resolve_item_path(opf_dir, &name);

            let content = match read_entry(&mut archive, &path, &mut budget)? {
                Some(content) => content,
                None => {
                    tracing::warn!(item = %id, path = %path, "Manifest item missing from archive");
                    continue;
                }
            };

            items.push(EpubItem {
                id,
                name,
                media_type: entry.media_type.unwrap_or_default(),
                content,
            });
        }

        tracing::debug!(opf = %opf_path, items = items.len(), "EPUB container parsed");

        Ok(Self { items })
    }

    /// Items in manifest order
    pub fn items(&self) -> &[EpubItem] {
        &self.items
    }

    pub fn images(&self) -> impl Iterator<Item = &EpubItem> {
        self.items.iter().filter(|i| i.kind() == ItemKind::Image)
    }

    pub fn documents(&self) -> impl Iterator<Item = &EpubItem> {
        self.items.iter().filter(|i| i.kind() == ItemKind::Document)
    }
}

/// Decompressed bytes still allowed for the current container
#[derive(Debug, Clone, Copy)]
struct ExtractionBudget {
    limit: u64,
    remaining: u64,
}

impl ExtractionBudget {
    fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    budget: &mut ExtractionBudget,
) -> Result<Option<Vec<u8>>, EpubError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let reserve = file.size().min(MAX_PREALLOC).min(budget.remaining);
    let mut content = Vec::with_capacity(reserve as usize);
    // One byte past the budget tells "exactly at the limit" from "over it"
    file.take(budget.remaining.saturating_add(1))
        .read_to_end(&mut content)?;

    let read = content.len() as u64;
    if read > budget.remaining {
        return Err(EpubError::InvalidContainer(format!(
            "{} exceeds the {} byte extraction limit",
            name, budget.limit
        )));
    }
    budget.remaining -= read;

    Ok(Some(content))
}

fn read_entry_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    budget: &mut ExtractionBudget,
) -> Result<Option<String>, EpubError> {
    Ok(read_entry(archive, name, budget)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Strip the fragment and percent-decoding from a manifest href
fn decode_href(href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    urlencoding::decode(href)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| href.to_string())
}

/// Join an href onto the package directory, collapsing `.` and `..`
fn resolve_item_path(opf_dir: &str, href: &str) -> String {
    let mut segments: Vec<&str> = opf_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            part => segments.push(part),
        }
    }
    segments.join("/")
}

// container.xml / content.opf structures for deserialization

#[derive(Debug, Deserialize)]
struct ContainerXml {
    rootfiles: RootFiles,
}

#[derive(Debug, Deserialize)]
struct RootFiles {
    #[serde(rename = "rootfile", default)]
    rootfile: Vec<RootFile>,
}

#[derive(Debug, Deserialize)]
struct RootFile {
    #[serde(rename = "@full-path")]
    full_path: String,
}

#[derive(Debug, Deserialize)]
struct OpfPackage {
    manifest: OpfManifest,
}

#[derive(Debug, Deserialize)]
struct OpfManifest {
    #[serde(rename = "item", default)]
    item: Vec<OpfManifestItem>,
}

#[derive(Debug, Deserialize)]
struct OpfManifestItem {
    #[serde(rename = "@id", default)]
    id: Option<String>,

    #[serde(rename = "@href", default)]
    href: Option<String>,

    #[serde(rename = "@media-type", default)]
    media_type: Option<String>,
}
