//! The write side of the bulk pipeline: load an artifact into an instance, and
//! remove documents either by id or by whole doctype.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::contract::{Collection, NewDocument, Platform, ID_FIELD, REV_FIELD};
use crate::error::AchError;
use crate::export::ExportArtifact;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DoctypeCount {
    pub doctype: String,
    pub count: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub doctypes: Vec<DoctypeCount>,
}

impl WriteReport {
    pub fn total(&self) -> usize {
        self.doctypes.iter().map(|d| d.count).sum()
    }
}

pub fn load_artifact(path: &Path) -> Result<ExportArtifact, AchError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AchError::io(path, e))?;
    let artifact = ExportArtifact::from_json(&raw)?;
    info!(path = %path.display(), doctypes = artifact.len(), "Loaded artifact");
    Ok(artifact)
}

/// Creates every document of `artifact`. An `_id` is kept as the new id, `_rev` is dropped.
pub async fn import_artifact<P>(
    platform: &P,
    artifact: &ExportArtifact,
) -> Result<WriteReport, AchError>
where
    P: Platform + ?Sized,
{
    let mut report = WriteReport::default();
    for (doctype, documents) in artifact.iter() {
        for object in documents {
            let mut attributes = object.clone();
            attributes.remove(REV_FIELD);
            let id = match attributes.remove(ID_FIELD) {
                Some(Value::String(id)) => Some(id),
                _ => None,
            };
            platform
                .create_document(doctype, NewDocument { id, attributes })
                .await
                .map_err(|e| {
                    error!(doctype, error = %e, "Failed to create document");
                    AchError::WriteFailed {
                        doctype: doctype.to_string(),
                        source: e,
                    }
                })?;
        }
        info!(doctype, count = documents.len(), "Imported documents");
        report.doctypes.push(DoctypeCount {
            doctype: doctype.to_string(),
            count: documents.len(),
        });
    }
    Ok(report)
}

/// Deletes all documents of each doctype; missing doctypes count as empty.
pub async fn drop_doctypes<P>(platform: &P, doctypes: &[String]) -> Result<WriteReport, AchError>
where
    P: Platform + ?Sized,
{
    let mut report = WriteReport::default();
    for doctype in doctypes {
        let documents = match platform.fetch_all_documents(doctype).await {
            Ok(Collection::Documents(docs)) => docs,
            Ok(Collection::Missing) => {
                warn!(doctype = %doctype, "Doctype does not exist, nothing to drop");
                Vec::new()
            }
            Err(e) => {
                return Err(AchError::FetchFailed {
                    doctype: doctype.clone(),
                    source: e,
                })
            }
        };
        for document in &documents {
            platform
                .delete_document(document)
                .await
                .map_err(|e| AchError::WriteFailed {
                    doctype: doctype.clone(),
                    source: e,
                })?;
        }
        info!(doctype = %doctype, count = documents.len(), "Dropped documents");
        report.doctypes.push(DoctypeCount {
            doctype: doctype.clone(),
            count: documents.len(),
        });
    }
    Ok(report)
}

/// Deletes the documents `ids` of `doctype`.
pub async fn delete_documents<P>(
    platform: &P,
    doctype: &str,
    ids: &[String],
) -> Result<WriteReport, AchError>
where
    P: Platform + ?Sized,
{
    for id in ids {
        let document = platform
            .get_document(doctype, id)
            .await
            .map_err(|e| AchError::FetchFailed {
                doctype: doctype.to_string(),
                source: e,
            })?;
        platform
            .delete_document(&document)
            .await
            .map_err(|e| AchError::WriteFailed {
                doctype: doctype.to_string(),
                source: e,
            })?;
        info!(doctype, id = %id, "Deleted document");
    }
    Ok(WriteReport {
        doctypes: vec![DoctypeCount {
            doctype: doctype.to_string(),
            count: ids.len(),
        }],
    })
}
