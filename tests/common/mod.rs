#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;

pub const PROJECT_ID: &str = "janus-go";
pub const INSTANCE_HOSTNAME: &str = "janus-go-instance-hostname";
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/janus";

pub async fn spawn(router: axum::Router) -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

/// Unsigned JWT-shaped token carrying `aud` and `exp`
pub fn fake_id_token(audience: &str) -> String {
    use base64ct::Encoding as _;
    let header = base64ct::Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": audience,
        "exp": 1714568400,
    });
    let claims = base64ct::Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims).unwrap());
    format!("{header}.{claims}.c2lnbmF0dXJl")
}

#[derive(Default)]
pub struct MetadataServer {
    /// `None` answers 404
    pub project_id: Option<String>,
    pub hostname: Option<String>,
    /// Serve identity tokens; otherwise 404
    pub identity: bool,
    /// Hold every response for this long
    pub delay: Option<std::time::Duration>,
    pub audiences: Mutex<Vec<String>>,
}

impl MetadataServer {
    pub fn janus_go() -> Self {
        Self {
            project_id: Some(PROJECT_ID.to_owned()),
            hostname: Some(INSTANCE_HOSTNAME.to_owned()),
            identity: true,
            ..Default::default()
        }
    }

    pub async fn start(self: Arc<Self>) -> std::net::SocketAddr {
        let router = axum::Router::new()
            .route(
                "/computeMetadata/v1/project/project-id",
                axum::routing::get(metadata_project_id),
            )
            .route(
                "/computeMetadata/v1/instance/hostname",
                axum::routing::get(metadata_hostname),
            )
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/identity",
                axum::routing::get(metadata_identity),
            )
            .with_state(self);
        spawn(router).await
    }

    async fn hold(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }
}

fn has_flavor(headers: &HeaderMap) -> bool {
    headers
        .get("metadata-flavor")
        .map(|v| v == "Google")
        .unwrap_or(false)
}

fn metadata_value(headers: &HeaderMap, value: &Option<String>) -> (StatusCode, String) {
    if !has_flavor(headers) {
        return (StatusCode::FORBIDDEN, "missing Metadata-Flavor".to_owned());
    }
    match value {
        Some(v) => (StatusCode::OK, format!("{v}\n")),
        None => (StatusCode::NOT_FOUND, "not found".to_owned()),
    }
}

async fn metadata_project_id(
    State(server): State<Arc<MetadataServer>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    server.hold().await;
    metadata_value(&headers, &server.project_id)
}

async fn metadata_hostname(
    State(server): State<Arc<MetadataServer>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    server.hold().await;
    metadata_value(&headers, &server.hostname)
}

async fn metadata_identity(
    State(server): State<Arc<MetadataServer>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    server.hold().await;
    if !has_flavor(&headers) {
        return (StatusCode::FORBIDDEN, "missing Metadata-Flavor".to_owned());
    }
    if !server.identity {
        return (StatusCode::NOT_FOUND, "not found".to_owned());
    }
    if query.get("format").map(String::as_str) != Some("full") {
        return (StatusCode::BAD_REQUEST, "format".to_owned());
    }
    let audience = query.get("audience").cloned().unwrap_or_default();
    server.audiences.lock().unwrap().push(audience.clone());
    (StatusCode::OK, fake_id_token(&audience))
}

pub struct FormServer {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
    pub requests: Mutex<Vec<HashMap<String, String>>>,
}

impl FormServer {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve POST / with the canned response, recording every form body received
    pub async fn start(self: Arc<Self>) -> std::net::SocketAddr {
        let router = axum::Router::new()
            .route("/", axum::routing::post(form_post))
            .with_state(self);
        spawn(router).await
    }

    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }
}

async fn form_post(
    State(server): State<Arc<FormServer>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    server.requests.lock().unwrap().push(form);
    (
        server.status,
        [(header::CONTENT_TYPE, server.content_type)],
        server.body.clone(),
    )
}

pub fn sts_success_xml(session_name: &str) -> String {
    indoc::formatdoc! {r#"
            <AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
              <AssumeRoleWithWebIdentityResult>
                <SubjectFromWebIdentityToken>108424593459232103722</SubjectFromWebIdentityToken>
                <Audience>gcp</Audience>
                <AssumedRoleUser>
                  <Arn>arn:aws:sts::123456789012:assumed-role/janus/{session}</Arn>
                  <AssumedRoleId>AROACLKWSDQRAOEXAMPLE:{session}</AssumedRoleId>
                </AssumedRoleUser>
                <Credentials>
                  <SessionToken>AQoDYXdzEE0a8ANXXXXXXXXNO1ewxE5TijQyp+IEXAMPLE</SessionToken>
                  <SecretAccessKey>wJalrXUtnFEMI/K7MDENG/bPxRfiCYzEXAMPLEKEY</SecretAccessKey>
                  <Expiration>2024-05-01T13:00:00Z</Expiration>
                  <AccessKeyId>ASgeIAIOSFODNN7EXAMPLE</AccessKeyId>
                </Credentials>
                <Provider>accounts.google.com</Provider>
              </AssumeRoleWithWebIdentityResult>
              <ResponseMetadata>
                <RequestId>ad4156e9-bce1-11e2-82e6-6b6efEXAMPLE</RequestId>
              </ResponseMetadata>
            </AssumeRoleWithWebIdentityResponse>
        "#,
        session = session_name
    }
}

pub fn sts_client(addr: std::net::SocketAddr) -> janus::client::Client {
    janus::client::Client::with_endpoint(
        janus::validation::Region::parse("us-east-1").unwrap(),
        url::Url::parse(&format!("http://{addr}/")).unwrap(),
    )
    .unwrap()
}

pub fn unreachable_hostname() -> std::io::Result<String> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Other,
        "no hostname in tests",
    ))
}
