#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ach_core::contract::{
    Attributes, ClientIdentity, Collection, Document, NewDocument, Platform, PlatformError,
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// In-memory instance: doctypes that were never written are reported missing.
#[derive(Default)]
pub struct InMemoryPlatform {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    clients: Mutex<Vec<ClientIdentity>>,
    next_id: AtomicUsize,
    pub mutations: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, doctype: &str, attributes: Vec<Value>) {
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(doctype.to_string()).or_default();
        for value in attributes {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            docs.push(Document {
                id: format!("{doctype}-{n}"),
                rev: "1-seed".to_string(),
                doctype: doctype.to_string(),
                attributes: as_attributes(value),
            });
        }
    }

    pub fn put(&self, document: Document) {
        self.collections
            .lock()
            .unwrap()
            .entry(document.doctype.clone())
            .or_default()
            .push(document);
    }

    pub fn seed_client(&self, id: &str, client_name: &str) {
        self.clients.lock().unwrap().push(ClientIdentity {
            id: id.to_string(),
            client_name: client_name.to_string(),
            software_id: None,
        });
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.clients.lock().unwrap().iter().map(|c| c.id.clone()).collect()
    }

    pub fn documents(&self, doctype: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(doctype)
            .cloned()
            .unwrap_or_default()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

pub fn as_attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn doc(id: &str, rev: &str, doctype: &str, attributes: Value) -> Document {
    Document {
        id: id.to_string(),
        rev: rev.to_string(),
        doctype: doctype.to_string(),
        attributes: as_attributes(attributes),
    }
}

pub fn bank_operation(id: &str, date: &str) -> Document {
    doc(
        id,
        "1-abc",
        "io.cozy.bank.operations",
        json!({ "label": format!("op {id}"), "amount": -12.5, "date": date }),
    )
}

fn bump(rev: &str) -> String {
    let n: usize = rev.split('-').next().and_then(|n| n.parse().ok()).unwrap_or(0);
    format!("{}-mem", n + 1)
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn fetch_all_documents(&self, doctype: &str) -> Result<Collection, PlatformError> {
        Ok(match self.collections.lock().unwrap().get(doctype) {
            Some(docs) => Collection::Documents(docs.clone()),
            None => Collection::Missing,
        })
    }

    async fn get_document(&self, doctype: &str, id: &str) -> Result<Document, PlatformError> {
        self.documents(doctype)
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| format!("404 {doctype}/{id}").into())
    }

    async fn create_document(
        &self,
        doctype: &str,
        document: NewDocument,
    ) -> Result<Document, PlatformError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let id = document.id.unwrap_or_else(|| {
            format!("{doctype}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        });
        let created = Document {
            id,
            rev: "1-mem".to_string(),
            doctype: doctype.to_string(),
            attributes: document.attributes,
        };
        self.collections
            .lock()
            .unwrap()
            .entry(doctype.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_document(&self, document: &Document) -> Result<Document, PlatformError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.lock().unwrap();
        let docs = collections
            .get_mut(&document.doctype)
            .ok_or("doctype does not exist")?;
        let stored = docs
            .iter_mut()
            .find(|d| d.id == document.id)
            .ok_or("document does not exist")?;
        if stored.rev != document.rev {
            return Err("409 conflict".into());
        }
        stored.attributes = document.attributes.clone();
        stored.rev = bump(&stored.rev);
        Ok(stored.clone())
    }

    async fn delete_document(&self, document: &Document) -> Result<(), PlatformError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.lock().unwrap();
        if let Some(docs) = collections.get_mut(&document.doctype) {
            docs.retain(|d| d.id != document.id);
        }
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<ClientIdentity>, PlatformError> {
        Ok(self.clients.lock().unwrap().clone())
    }

    async fn delete_client(&self, client_id: &str) -> Result<(), PlatformError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().retain(|c| c.id != client_id);
        Ok(())
    }
}
