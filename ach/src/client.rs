#![doc = "HTTP implementation of the core platform contract for a Cozy instance."]
//
//! # Cozy client (CLI <-> Core)
//!
//! [`CozyConnector`] implements [`Connector`] (OAuth client registration and
//! token exchange) and hands out [`CozyClient`], which implements [`Platform`]
//! over the instance's data and settings routes with a bearer token.
//!
//! Routes used:
//! - `POST /auth/register`, `GET /auth/authorize`, `POST /auth/access_token`
//! - `GET /data/{doctype}/_all_docs?include_docs=true`, `GET|PUT|DELETE /data/{doctype}/{id}`,
//!   `POST /data/{doctype}/`
//! - `GET /settings/clients`, `DELETE /settings/clients/{id}`

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use ach_core::contract::{
    ClientIdentity, ClientRegistration, Collection, Connector, Document, NewDocument, Platform,
    PlatformError, RegisteredClient,
};
use ach_core::Session;

fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<Url, PlatformError> {
    let mut url = Url::parse(endpoint).map_err(|e| -> PlatformError {
        format!("invalid instance URL {endpoint:?}: {e}").into()
    })?;
    url.path_segments_mut()
        .map_err(|_| -> PlatformError {
            format!("instance URL {endpoint:?} cannot be a base").into()
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Reason the data layer gives for a doctype that has no database yet.
const MISSING_DATABASE_REASON: &str = "Database does not exist.";

/// Only this reason means "empty doctype"; any other 404 (wrong instance URL,
/// unknown route) is a real failure.
fn is_missing_database(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let couch_reason = value.get("reason").and_then(Value::as_str);
    let api_details = value
        .get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("detail").and_then(Value::as_str));
    couch_reason
        .into_iter()
        .chain(api_details)
        .any(|reason| reason == MISSING_DATABASE_REASON)
}

/// Turns a non-success response into an error carrying status and body.
async fn ensure_success(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    tracing::error!(
        status = %status,
        url = %url,
        "Instance returned an error. Response body: {body}"
    );
    Err(format!("{status} from {url}: {body}").into())
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    registration_access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    id: String,
    rev: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    data: Vec<ClientResource>,
}

#[derive(Debug, Deserialize)]
struct ClientResource {
    id: String,
    #[serde(default)]
    attributes: ClientAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ClientAttributes {
    #[serde(default)]
    client_name: String,
    #[serde(default)]
    software_id: Option<String>,
}

/// Unauthenticated entry point to an instance.
#[derive(Clone, Default)]
pub struct CozyConnector {
    http: Client,
}

impl CozyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: Client) -> Self {
        CozyConnector { http }
    }
}

/// Pulls `code` out of the redirect after checking `state`.
pub fn authorization_code(
    callback_url: &str,
    expected_state: &str,
) -> Result<String, PlatformError> {
    let url = Url::parse(callback_url).map_err(|e| -> PlatformError {
        format!("invalid callback URL {callback_url:?}: {e}").into()
    })?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(format!("consent refused: {value}").into()),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        return Err("callback state does not match the registration".into());
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| "callback carries no authorization code".into())
}

#[async_trait]
impl Connector for CozyConnector {
    async fn register_client(
        &self,
        endpoint: &str,
        registration: &ClientRegistration,
    ) -> Result<RegisteredClient, PlatformError> {
        tracing::info!(
            endpoint,
            client_name = %registration.client_name,
            software_id = %registration.software_id,
            "Registering OAuth client"
        );
        let url = endpoint_url(endpoint, &["auth", "register"])?;
        let body = json!({
            "redirect_uris": [registration.redirect_uri],
            "client_name": registration.client_name,
            "software_id": registration.software_id,
            "software_version": registration.software_version,
        });
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let registered: RegistrationResponse = ensure_success(response).await?.json().await?;

        let state = uuid::Uuid::new_v4().to_string();
        let scope = registration.scopes.join(" ");
        let mut consent = endpoint_url(endpoint, &["auth", "authorize"])?;
        consent
            .query_pairs_mut()
            .append_pair("client_id", &registered.client_id)
            .append_pair("redirect_uri", &registration.redirect_uri)
            .append_pair("state", &state)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope);

        tracing::info!(client_id = %registered.client_id, "Registered OAuth client");
        Ok(RegisteredClient {
            client_id: registered.client_id,
            client_secret: registered.client_secret,
            registration_access_token: registered.registration_access_token,
            consent_url: consent.to_string(),
            state,
        })
    }

    async fn exchange_code(
        &self,
        endpoint: &str,
        client: &RegisteredClient,
        callback_url: &str,
    ) -> Result<String, PlatformError> {
        let code = authorization_code(callback_url, &client.state)?;
        let url = endpoint_url(endpoint, &["auth", "access_token"])?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let token: AccessTokenResponse = ensure_success(response).await?.json().await?;
        tracing::info!(client_id = %client.client_id, "Exchanged authorization code for a token");
        Ok(token.access_token)
    }

    fn connect(&self, session: &Session) -> Box<dyn Platform> {
        Box::new(CozyClient::new(self.http.clone(), session))
    }
}

/// Authenticated client for one instance.
pub struct CozyClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl CozyClient {
    pub fn new(http: Client, session: &Session) -> Self {
        CozyClient {
            http,
            endpoint: session.endpoint.clone(),
            token: session.access_token.clone(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        endpoint_url(&self.endpoint, segments)
    }

    fn document_from(doctype: &str, value: Value) -> Result<Document, PlatformError> {
        Document::from_wire(doctype, value)
            .ok_or_else(|| format!("malformed {doctype} document in response").into())
    }

    fn written_document(
        doctype: &str,
        written: WriteResponse,
        fallback: serde_json::Map<String, Value>,
    ) -> Document {
        let attributes = match written.data {
            Some(value) => Document::from_wire(doctype, value)
                .map(|d| d.attributes)
                .unwrap_or(fallback),
            None => fallback,
        };
        Document {
            id: written.id,
            rev: written.rev,
            doctype: doctype.to_string(),
            attributes,
        }
    }
}

#[async_trait]
impl Platform for CozyClient {
    async fn fetch_all_documents(&self, doctype: &str) -> Result<Collection, PlatformError> {
        let mut url = self.url(&["data", doctype, "_all_docs"])?;
        url.query_pairs_mut().append_pair("include_docs", "true");
        tracing::debug!(doctype, url = %url, "Fetching all documents");

        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            if is_missing_database(&body) {
                tracing::info!(doctype, "Doctype database does not exist");
                return Ok(Collection::Missing);
            }
            tracing::error!(
                status = 404,
                url = %url,
                "Instance returned an error. Response body: {body}"
            );
            return Err(format!("{} from {url}: {body}", StatusCode::NOT_FOUND).into());
        }
        let all: AllDocsResponse = ensure_success(response).await?.json().await?;

        let mut documents = Vec::with_capacity(all.rows.len());
        for row in all.rows {
            if row.id.starts_with("_design") {
                continue;
            }
            if let Some(doc) = row.doc {
                documents.push(Self::document_from(doctype, doc)?);
            }
        }
        tracing::info!(doctype, count = documents.len(), "Fetched documents");
        Ok(Collection::Documents(documents))
    }

    async fn get_document(&self, doctype: &str, id: &str) -> Result<Document, PlatformError> {
        let url = self.url(&["data", doctype, id])?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let value: Value = ensure_success(response).await?.json().await?;
        Self::document_from(doctype, value)
    }

    async fn create_document(
        &self,
        doctype: &str,
        document: NewDocument,
    ) -> Result<Document, PlatformError> {
        let request = match &document.id {
            Some(id) => self.http.put(self.url(&["data", doctype, id])?),
            None => self.http.post(self.url(&["data", doctype, ""])?),
        };
        let response = request
            .bearer_auth(&self.token)
            .json(&document.attributes)
            .send()
            .await?;
        let written: WriteResponse = ensure_success(response).await?.json().await?;
        tracing::debug!(doctype, id = %written.id, "Created document");
        Ok(Self::written_document(doctype, written, document.attributes))
    }

    async fn update_document(&self, document: &Document) -> Result<Document, PlatformError> {
        let url = self.url(&["data", &document.doctype, &document.id])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .json(&document.to_wire())
            .send()
            .await?;
        let written: WriteResponse = ensure_success(response).await?.json().await?;
        tracing::debug!(doctype = %document.doctype, id = %written.id, "Updated document");
        Ok(Self::written_document(
            &document.doctype,
            written,
            document.attributes.clone(),
        ))
    }

    async fn delete_document(&self, document: &Document) -> Result<(), PlatformError> {
        let mut url = self.url(&["data", &document.doctype, &document.id])?;
        url.query_pairs_mut().append_pair("rev", &document.rev);
        let response = self.http.delete(url).bearer_auth(&self.token).send().await?;
        ensure_success(response).await?;
        tracing::debug!(doctype = %document.doctype, id = %document.id, "Deleted document");
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<ClientIdentity>, PlatformError> {
        let url = self.url(&["settings", "clients"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
            .send()
            .await?;
        let clients: ClientsResponse = ensure_success(response).await?.json().await?;
        tracing::info!(count = clients.data.len(), "Listed OAuth clients");
        Ok(clients
            .data
            .into_iter()
            .map(|c| ClientIdentity {
                id: c.id,
                client_name: c.attributes.client_name,
                software_id: c.attributes.software_id,
            })
            .collect())
    }

    async fn delete_client(&self, client_id: &str) -> Result<(), PlatformError> {
        let url = self.url(&["settings", "clients", client_id])?;
        let response = self.http.delete(url).bearer_auth(&self.token).send().await?;
        ensure_success(response).await?;
        tracing::info!(client_id, "Deleted OAuth client");
        Ok(())
    }
}
