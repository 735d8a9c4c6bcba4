//! Exercises the HTTP client against a small fake instance served by axum.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ach::client::{authorization_code, CozyConnector};
use ach_core::contract::{
    ClientRegistration, Collection, Connector, Document, Platform, RegisteredClient,
};
use ach_core::Session;
use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn push(&self, line: String) {
        self.requests.lock().unwrap().push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn get_doc(
    State(rec): State<Recorded>,
    Path((doctype, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    rec.push(format!("GET {doctype}/{id} {}", bearer(&headers)));
    match (doctype.as_str(), id.as_str()) {
        ("io.cozy.bills", "_all_docs") => Json(json!({
            "total_rows": 3,
            "rows": [
                { "id": "_design/by-date", "doc": { "_id": "_design/by-date", "views": {} } },
                { "id": "b1", "doc": { "_id": "b1", "_rev": "1-a", "amount": 10 } },
                { "id": "b2", "doc": { "_id": "b2", "_rev": "2-b", "amount": 20 } }
            ]
        }))
        .into_response(),
        ("io.cozy.bills", "b1") => {
            Json(json!({ "_id": "b1", "_rev": "1-a", "amount": 10 })).into_response()
        }
        ("io.cozy.purged", "_all_docs") => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "reason": "deleted" })),
        )
            .into_response(),
        ("io.cozy.jsonapi", "_all_docs") => (
            StatusCode::NOT_FOUND,
            Json(json!({ "errors": [{ "status": "404", "detail": "Database does not exist." }] })),
        )
            .into_response(),
        ("io.cozy.broken", _) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "reason": "Database does not exist." })),
        )
            .into_response(),
    }
}

async fn put_doc(
    State(rec): State<Recorded>,
    Path((doctype, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    rec.push(format!("PUT {doctype}/{id} {}", body));
    Json(json!({ "ok": true, "id": id, "rev": "2-new", "type": doctype, "data": body }))
        .into_response()
}

async fn delete_doc(
    State(rec): State<Recorded>,
    Path((doctype, id)): Path<(String, String)>,
    axum::extract::Query(query): axum::extract::Query<HashMap<String, String>>,
) -> StatusCode {
    rec.push(format!(
        "DELETE {doctype}/{id} rev={}",
        query.get("rev").cloned().unwrap_or_default()
    ));
    StatusCode::OK
}

async fn list_clients(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.push(format!("GET clients {}", bearer(&headers)));
    Json(json!({
        "data": [
            { "type": "io.cozy.oauth.clients", "id": "c1",
              "attributes": { "client_name": "ACH", "software_id": "ACH-0.1.0" } },
            { "type": "io.cozy.oauth.clients", "id": "c2",
              "attributes": { "client_name": "Cozy Drive" } }
        ]
    }))
}

async fn delete_client(State(rec): State<Recorded>, Path(id): Path<String>) -> StatusCode {
    rec.push(format!("DELETE clients/{id}"));
    StatusCode::NO_CONTENT
}

async fn register(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.push(format!("REGISTER {body}"));
    Json(json!({
        "client_id": "cid",
        "client_secret": "sec",
        "registration_access_token": "rat",
        "client_name": body["client_name"]
    }))
}

async fn access_token(
    State(rec): State<Recorded>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    rec.push(format!("TOKEN code={}", form.get("code").cloned().unwrap_or_default()));
    let valid = form.get("grant_type").map(String::as_str) == Some("authorization_code")
        && form.get("code").map(String::as_str) == Some("the-code")
        && form.get("client_secret").map(String::as_str) == Some("sec");
    if valid {
        Json(json!({ "access_token": "tok", "token_type": "bearer" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, "invalid_grant").into_response()
    }
}

async fn spawn_instance() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/data/:doctype/:id",
            get(get_doc).put(put_doc).delete(delete_doc),
        )
        .route("/settings/clients", get(list_clients))
        .route("/settings/clients/:id", delete(delete_client))
        .route("/auth/register", post(register))
        .route("/auth/access_token", post(access_token))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorded)
}

fn session(endpoint: &str) -> Session {
    Session::from_stored(endpoint, "tok")
}

#[tokio::test]
async fn fetch_all_skips_design_documents_and_splits_metadata() {
    let (endpoint, recorded) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let docs = platform
        .fetch_all_documents("io.cozy.bills")
        .await
        .unwrap()
        .into_documents();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "b1");
    assert_eq!(docs[0].rev, "1-a");
    assert_eq!(docs[0].attributes.get("amount"), Some(&json!(10)));
    assert!(!docs[0].attributes.contains_key("_id"));
    assert_eq!(
        recorded.lines(),
        vec!["GET io.cozy.bills/_all_docs Bearer tok".to_string()]
    );
}

#[tokio::test]
async fn missing_database_is_reported_as_missing() {
    let (endpoint, _) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let collection = platform.fetch_all_documents("io.cozy.nothing").await.unwrap();
    assert_eq!(collection, Collection::Missing);
}

#[tokio::test]
async fn missing_database_in_json_api_form_is_also_missing() {
    let (endpoint, _) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let collection = platform.fetch_all_documents("io.cozy.jsonapi").await.unwrap();
    assert_eq!(collection, Collection::Missing);
}

#[tokio::test]
async fn not_found_from_a_wrong_instance_url_is_an_error() {
    let (endpoint, recorded) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&format!("{endpoint}/wrong-prefix")));

    let err = platform
        .fetch_all_documents("io.cozy.bills")
        .await
        .expect_err("a router 404 is not an empty doctype");

    assert!(err.to_string().contains("404"), "{err}");
    assert!(recorded.lines().is_empty(), "no data route was reached");
}

#[tokio::test]
async fn not_found_with_another_reason_is_an_error() {
    let (endpoint, _) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let err = platform.fetch_all_documents("io.cozy.purged").await.unwrap_err();
    assert!(err.to_string().contains("deleted"), "{err}");
}

#[tokio::test]
async fn server_errors_carry_the_status() {
    let (endpoint, _) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let err = platform.fetch_all_documents("io.cozy.broken").await.unwrap_err();
    assert!(err.to_string().contains("500"), "{err}");
}

#[tokio::test]
async fn update_and_delete_send_the_revision() {
    let (endpoint, recorded) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let current = platform.get_document("io.cozy.bills", "b1").await.unwrap();
    let mut next = current.clone();
    next.attributes.insert("amount".into(), json!(11));
    let written: Document = platform.update_document(&next).await.unwrap();
    assert_eq!(written.rev, "2-new");
    assert_eq!(written.attributes.get("amount"), Some(&json!(11)));

    platform.delete_document(&written).await.unwrap();

    let lines = recorded.lines();
    assert!(lines[1].starts_with("PUT io.cozy.bills/b1 "));
    assert!(lines[1].contains("\"_rev\":\"1-a\""), "{}", lines[1]);
    assert_eq!(lines[2], "DELETE io.cozy.bills/b1 rev=2-new");
}

#[tokio::test]
async fn clients_are_listed_and_deleted() {
    let (endpoint, recorded) = spawn_instance().await;
    let platform = CozyConnector::new().connect(&session(&endpoint));

    let clients = platform.list_clients().await.unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0].client_name, "ACH");
    assert_eq!(clients[0].software_id.as_deref(), Some("ACH-0.1.0"));
    assert_eq!(clients[1].software_id, None);

    platform.delete_client("c1").await.unwrap();
    assert_eq!(recorded.lines().last().unwrap(), "DELETE clients/c1");
}

fn registration() -> ClientRegistration {
    ClientRegistration {
        redirect_uri: "http://localhost:3333/do_access".to_string(),
        client_name: "ACH".to_string(),
        software_id: "ACH-0.1.0".to_string(),
        software_version: "0.1.0".to_string(),
        scopes: vec![
            "io.cozy.bills:ALL".to_string(),
            "io.cozy.oauth.clients:ALL".to_string(),
        ],
    }
}

#[tokio::test]
async fn registration_builds_the_consent_url() {
    let (endpoint, recorded) = spawn_instance().await;
    let connector = CozyConnector::new();

    let client = connector
        .register_client(&endpoint, &registration())
        .await
        .unwrap();

    assert_eq!(client.client_id, "cid");
    assert_eq!(client.client_secret, "sec");
    assert!(!client.state.is_empty());

    let consent = Url::parse(&client.consent_url).unwrap();
    assert_eq!(consent.path(), "/auth/authorize");
    let query: HashMap<String, String> = consent.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "cid");
    assert_eq!(query["redirect_uri"], "http://localhost:3333/do_access");
    assert_eq!(query["state"], client.state);
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["scope"], "io.cozy.bills:ALL io.cozy.oauth.clients:ALL");

    let lines = recorded.lines();
    let sent = &lines[0];
    assert!(sent.contains("\"client_name\":\"ACH\""), "{sent}");
    assert!(sent.contains("\"redirect_uris\":[\"http://localhost:3333/do_access\"]"), "{sent}");
}

fn pending_client() -> RegisteredClient {
    RegisteredClient {
        client_id: "cid".to_string(),
        client_secret: "sec".to_string(),
        registration_access_token: "rat".to_string(),
        consent_url: String::new(),
        state: "s1".to_string(),
    }
}

#[tokio::test]
async fn exchange_posts_the_code_from_the_redirect() {
    let (endpoint, recorded) = spawn_instance().await;

    let token = CozyConnector::new()
        .exchange_code(
            &endpoint,
            &pending_client(),
            "http://localhost:3333/do_access?state=s1&code=the-code",
        )
        .await
        .unwrap();

    assert_eq!(token, "tok");
    assert_eq!(recorded.lines(), vec!["TOKEN code=the-code".to_string()]);
}

#[tokio::test]
async fn exchange_rejects_a_forged_state_without_calling_the_instance() {
    let (endpoint, recorded) = spawn_instance().await;

    let err = CozyConnector::new()
        .exchange_code(
            &endpoint,
            &pending_client(),
            "http://localhost:3333/do_access?state=other&code=the-code",
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("state"), "{err}");
    assert!(recorded.lines().is_empty());
}

#[test]
fn authorization_code_reads_the_redirect_query() {
    assert_eq!(
        authorization_code("http://localhost:3333/do_access?code=abc&state=s", "s").unwrap(),
        "abc"
    );
    assert!(authorization_code("http://localhost:3333/do_access?code=abc", "s").is_err());
    assert!(authorization_code("http://localhost:3333/do_access?state=s", "s").is_err());
    let refused =
        authorization_code("http://localhost:3333/do_access?error=access_denied&state=s", "s")
            .unwrap_err();
    assert!(refused.to_string().contains("access_denied"));
}
