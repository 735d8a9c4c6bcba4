//! Field-level before/after comparison of documents, rendered as text.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Added { field: String, value: Value },
    Removed { field: String, value: Value },
    Changed { field: String, current: Value, updated: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDiff {
    pub id: String,
    pub changes: Vec<FieldChange>,
}

impl DocumentDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compares two attribute maps; fields come out in lexical order.
pub fn diff_attributes(
    id: &str,
    current: &Map<String, Value>,
    updated: &Map<String, Value>,
) -> DocumentDiff {
    let fields: BTreeSet<&String> = current.keys().chain(updated.keys()).collect();
    let changes = fields
        .into_iter()
        .filter_map(|field| match (current.get(field), updated.get(field)) {
            (Some(a), Some(b)) if a == b => None,
            (Some(a), Some(b)) => Some(FieldChange::Changed {
                field: field.clone(),
                current: a.clone(),
                updated: b.clone(),
            }),
            (Some(a), None) => Some(FieldChange::Removed {
                field: field.clone(),
                value: a.clone(),
            }),
            (None, Some(b)) => Some(FieldChange::Added {
                field: field.clone(),
                value: b.clone(),
            }),
            (None, None) => None,
        })
        .collect();
    DocumentDiff {
        id: id.to_string(),
        changes,
    }
}

impl fmt::Display for DocumentDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Current")?;
        writeln!(f, "+ Updated")?;
        writeln!(f)?;
        writeln!(f, "  _id: {}", Value::String(self.id.clone()))?;
        for change in &self.changes {
            match change {
                FieldChange::Added { field, value } => writeln!(f, "+ {field}: {value}")?,
                FieldChange::Removed { field, value } => writeln!(f, "- {field}: {value}")?,
                FieldChange::Changed {
                    field,
                    current,
                    updated,
                } => {
                    writeln!(f, "- {field}: {current}")?;
                    writeln!(f, "+ {field}: {updated}")?;
                }
            }
        }
        Ok(())
    }
}
