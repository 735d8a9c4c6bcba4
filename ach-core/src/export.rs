//! Bulk export: fetch whole doctypes, strip transport metadata, serialize.
//!
//! # Policy
//! - A doctype the platform reports as missing exports as an empty array; the
//!   key is always present.
//! - Any other fetch failure aborts the whole export before anything is written.
//! - Doctypes keep request order; documents keep platform order.
//!
//! # Output
//! Pretty-printed JSON object, doctype name → array of documents. The sink `-`
//! means standard output.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::StripOptions;
use crate::contract::{Collection, Document, Platform, ID_FIELD, REV_FIELD};
use crate::error::AchError;

/// Doctype → documents, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportArtifact {
    entries: Vec<(String, Vec<Map<String, Value>>)>,
}

impl ExportArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `doctype`, or replaces its documents if already present.
    pub fn insert(&mut self, doctype: impl Into<String>, documents: Vec<Map<String, Value>>) {
        let doctype = doctype.into();
        match self.entries.iter_mut().find(|(name, _)| *name == doctype) {
            Some(entry) => entry.1 = documents,
            None => self.entries.push((doctype, documents)),
        }
    }

    pub fn get(&self, doctype: &str) -> Option<&[Map<String, Value>]> {
        self.entries
            .iter()
            .find(|(name, _)| name == doctype)
            .map(|(_, docs)| docs.as_slice())
    }

    pub fn doctypes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Map<String, Value>])> {
        self.entries
            .iter()
            .map(|(name, docs)| (name.as_str(), docs.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, AchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, AchError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl Serialize for ExportArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (doctype, documents) in &self.entries {
            map.serialize_entry(doctype, documents)?;
        }
        map.end()
    }
}

struct ArtifactVisitor;

impl<'de> Visitor<'de> for ArtifactVisitor {
    type Value = ExportArtifact;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping doctypes to arrays of documents")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut artifact = ExportArtifact::new();
        while let Some((doctype, documents)) =
            access.next_entry::<String, Vec<Map<String, Value>>>()?
        {
            artifact.insert(doctype, documents);
        }
        Ok(artifact)
    }
}

impl<'de> Deserialize<'de> for ExportArtifact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ArtifactVisitor)
    }
}

/// Where the serialized artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSink {
    Stdout,
    File(PathBuf),
}

impl ExportSink {
    pub const STDOUT_SENTINEL: &'static str = "-";

    pub fn parse(target: &str) -> Self {
        if target == Self::STDOUT_SENTINEL {
            ExportSink::Stdout
        } else {
            ExportSink::File(PathBuf::from(target))
        }
    }
}

/// Document as it appears in the artifact under `options`.
pub fn strip_document(document: &Document, options: &StripOptions) -> Map<String, Value> {
    let mut object = Map::with_capacity(document.attributes.len() + 2);
    if options.keep_id {
        object.insert(ID_FIELD.to_string(), Value::String(document.id.clone()));
    }
    if options.keep_rev && !document.rev.is_empty() {
        object.insert(REV_FIELD.to_string(), Value::String(document.rev.clone()));
    }
    for (key, value) in &document.attributes {
        if key == ID_FIELD || key == REV_FIELD {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
    object
}

/// Fetches `doctypes` in order and assembles the stripped artifact.
pub async fn export_doctypes<P>(
    platform: &P,
    doctypes: &[String],
    options: &StripOptions,
) -> Result<ExportArtifact, AchError>
where
    P: Platform + ?Sized,
{
    debug!(doctypes = ?doctypes, ?options, "Exporting data");
    let mut artifact = ExportArtifact::new();

    for doctype in doctypes {
        let documents = match platform.fetch_all_documents(doctype).await {
            Ok(Collection::Documents(docs)) => docs,
            Ok(Collection::Missing) => {
                info!(doctype = %doctype, "Doctype does not exist, exporting it empty");
                Vec::new()
            }
            Err(e) => {
                error!(doctype = %doctype, error = %e, "Failed to fetch documents");
                return Err(AchError::FetchFailed {
                    doctype: doctype.clone(),
                    source: e,
                });
            }
        };
        info!(doctype = %doctype, count = documents.len(), "Exported documents");
        let stripped = documents
            .iter()
            .map(|doc| strip_document(doc, options))
            .collect();
        artifact.insert(doctype.clone(), stripped);
    }

    Ok(artifact)
}

/// Serializes `artifact` to `sink`, overwriting an existing file.
pub fn write_artifact(artifact: &ExportArtifact, sink: &ExportSink) -> Result<(), AchError> {
    let json = artifact.to_json_pretty()?;
    match sink {
        ExportSink::Stdout => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").map_err(|e| AchError::io("<stdout>", e))?;
            handle.flush().map_err(|e| AchError::io("<stdout>", e))?;
        }
        ExportSink::File(path) => {
            std::fs::write(path, json).map_err(|e| AchError::io(path, e))?;
            info!(path = %path.display(), doctypes = artifact.len(), "Wrote export artifact");
        }
    }
    Ok(())
}

/// Export then write: the whole `export` command.
pub async fn export_to<P>(
    platform: &P,
    doctypes: &[String],
    options: &StripOptions,
    sink: &ExportSink,
) -> Result<ExportArtifact, AchError>
where
    P: Platform + ?Sized,
{
    let artifact = export_doctypes(platform, doctypes, options).await?;
    write_artifact(&artifact, sink)?;
    Ok(artifact)
}
