//! # contract: capability interface to the remote document platform
//!
//! The core never speaks HTTP itself. Everything it needs from the platform is
//! expressed by two traits:
//!
//! - [`Connector`]: unauthenticated entry point. Registers an OAuth client,
//!   exchanges the consent callback for an access token and turns a [`Session`]
//!   into a [`Platform`] handle.
//! - [`Platform`]: authenticated operations on doctypes and on the OAuth client
//!   registry of the instance.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; the generated `MockConnector` and
//!   `MockPlatform` are exported under the default `test-export-mocks` feature so
//!   the CLI crate and integration tests can script platform behaviour.
//!
//! ## Errors
//! - Methods return the boxed [`PlatformError`]; the core maps it into the
//!   matching [`crate::error::AchError`] variant for the step that failed.

use async_trait::async_trait;
use serde_json::{Map, Value};

use mockall::automock;

use crate::session::Session;

/// Boxed error returned by platform implementations.
pub type PlatformError = Box<dyn std::error::Error + Send + Sync>;

/// Field/value mapping of a document, without transport metadata.
pub type Attributes = Map<String, Value>;

/// Wire name of the document identifier.
pub const ID_FIELD: &str = "_id";
/// Wire name of the document revision.
pub const REV_FIELD: &str = "_rev";

/// A document as returned by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: String,
    pub doctype: String,
    pub attributes: Attributes,
}

impl Document {
    /// Splits a raw JSON object into transport metadata and attributes.
    /// Returns `None` when the value is not an object or has no `_id`.
    pub fn from_wire(doctype: &str, value: Value) -> Option<Self> {
        let Value::Object(mut attributes) = value else {
            return None;
        };
        let id = match attributes.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => return None,
        };
        let rev = match attributes.remove(REV_FIELD) {
            Some(Value::String(rev)) => rev,
            _ => String::new(),
        };
        Some(Document {
            id,
            rev,
            doctype: doctype.to_string(),
            attributes,
        })
    }

    /// Full JSON object including `_id` and `_rev`.
    pub fn to_wire(&self) -> Value {
        let mut object = Map::with_capacity(self.attributes.len() + 2);
        object.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        if !self.rev.is_empty() {
            object.insert(REV_FIELD.to_string(), Value::String(self.rev.clone()));
        }
        for (key, value) in &self.attributes {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// A document to be created. `id` pins the identifier, otherwise the platform picks one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub id: Option<String>,
    pub attributes: Attributes,
}

/// Result of fetching a whole doctype.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Documents(Vec<Document>),
    /// The platform reported that the doctype's database does not exist.
    Missing,
}

impl Collection {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Collection::Documents(docs) => docs,
            Collection::Missing => Vec::new(),
        }
    }
}

/// An OAuth client registered on the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub id: String,
    pub client_name: String,
    pub software_id: Option<String>,
}

/// Parameters sent when registering a new OAuth client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRegistration {
    pub redirect_uri: String,
    pub client_name: String,
    pub software_id: String,
    pub software_version: String,
    /// Rendered permission scopes, e.g. `io.cozy.bank.operations:ALL`.
    pub scopes: Vec<String>,
}

/// A client accepted by the platform, waiting for user consent.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
    pub registration_access_token: String,
    /// URL the user must visit to grant the requested scopes.
    pub consent_url: String,
    /// Anti-forgery value expected back on the redirect.
    pub state: String,
}

/// Unauthenticated side of the platform: registration, token exchange, handle creation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Register a new OAuth client on the instance at `endpoint`.
    async fn register_client(
        &self,
        endpoint: &str,
        registration: &ClientRegistration,
    ) -> Result<RegisteredClient, PlatformError>;

    /// Exchange the full redirect URL received after consent for an access token.
    async fn exchange_code(
        &self,
        endpoint: &str,
        client: &RegisteredClient,
        callback_url: &str,
    ) -> Result<String, PlatformError>;

    /// Build an authenticated handle for `session`. Performs no network call.
    fn connect(&self, session: &Session) -> Box<dyn Platform>;
}

/// Authenticated operations on an instance.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch every document of `doctype` in one page, design documents excluded.
    async fn fetch_all_documents(&self, doctype: &str) -> Result<Collection, PlatformError>;

    /// Fetch a single document by id.
    async fn get_document(&self, doctype: &str, id: &str) -> Result<Document, PlatformError>;

    async fn create_document(
        &self,
        doctype: &str,
        document: NewDocument,
    ) -> Result<Document, PlatformError>;

    /// Replace `document` on the platform; its `rev` must be current.
    async fn update_document(&self, document: &Document) -> Result<Document, PlatformError>;

    async fn delete_document(&self, document: &Document) -> Result<(), PlatformError>;

    /// List all OAuth clients registered for the account.
    async fn list_clients(&self) -> Result<Vec<ClientIdentity>, PlatformError>;

    async fn delete_client(&self, client_id: &str) -> Result<(), PlatformError>;
}
