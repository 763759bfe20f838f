use std::sync::Arc;

use http::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use reqwest::multipart::Form;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::CredentialStore;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Body of an outgoing request.
pub enum RequestBody {
    Json(Value),
    /// The boundary is generated by reqwest; callers never set `Content-Type`.
    Multipart(Form),
}

#[derive(Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// Issues requests with the stored bearer credential and the session cookies.
///
/// A 401 is handed back like any other status. Callers decide whether that
/// means an inline error or a forced logout; nothing here refreshes.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    api: ApiConfig,
    credentials: Arc<CredentialStore>,
}

impl AuthenticatedClient {
    /// Builds a client with its own cookie jar.
    pub fn new(api: ApiConfig, credentials: Arc<CredentialStore>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http(http, api, credentials))
    }

    pub fn with_http(http: reqwest::Client, api: ApiConfig, credentials: Arc<CredentialStore>) -> Self {
        Self {
            http,
            api,
            credentials,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn endpoint(&self, path: &str) -> String {
        self.api.endpoint(path)
    }

    /// Sends one request. `Err` means no response arrived at all; every HTTP
    /// status, 401 included, comes back as `Ok(response)`.
    ///
    /// Caller headers are merged first. `Authorization` is then owned by the
    /// store: set when a credential is present, removed otherwise.
    pub async fn request(&self, url: &str, options: RequestOptions) -> ApiResult<Response> {
        let RequestOptions {
            method,
            mut headers,
            query,
            body,
        } = options;

        headers.remove(AUTHORIZATION);
        let bearer = self.credentials.get().and_then(|credential| {
            let value = credential.header_value();
            if value.is_none() {
                warn!("Stored credential is not a valid header value; sending without Authorization");
            }
            value
        });
        let has_token = bearer.is_some();
        if let Some(value) = bearer {
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self.http.request(method.clone(), url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            Some(RequestBody::Json(value)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
                }
                builder.headers(headers).json(&value)
            }
            Some(RequestBody::Multipart(form)) => {
                headers.remove(CONTENT_TYPE);
                builder.headers(headers).multipart(form)
            }
            None => builder.headers(headers),
        };

        debug!(
            "Making request: {} {} with token: {}",
            method,
            url,
            if has_token { "Present" } else { "Absent" }
        );
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if response.status() == http::StatusCode::UNAUTHORIZED {
            warn!(
                event_name = "client.unauthorized",
                event_domain = "client",
                "Request to {} returned 401; handing the response back to the caller",
                url
            );
        }
        Ok(response)
    }

    pub async fn get(&self, path: &str) -> ApiResult<Response> {
        self.request(&self.endpoint(path), RequestOptions::default())
            .await
    }

    /// POST through the same non-refreshing path. JSON bodies get
    /// `Content-Type: application/json`; multipart forms get their own boundary.
    pub async fn post(&self, path: &str, body: RequestBody) -> ApiResult<Response> {
        self.request(
            &self.endpoint(path),
            RequestOptions::method(Method::POST).body(body),
        )
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> ApiResult<Response> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to serialize request body: {}", e)))?;
        self.post(path, RequestBody::Json(value)).await
    }
}

/// Turns non-2xx responses into the matching `ApiError`.
pub fn ensure_success(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_status(status))
    }
}

/// `ensure_success` followed by JSON decoding.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    ensure_success(response)?
        .json::<T>()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(url: String, store: Arc<CredentialStore>) -> AuthenticatedClient {
        let api = ApiConfig {
            base_url: url,
            login_url: "http://idp/login".to_string(),
            logout_url: "http://idp/logout".to_string(),
        };
        AuthenticatedClient::new(api, store).expect("client should build")
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_credential_present() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/auth/me")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::with_credential("abc")));
        let response = client.get("/auth/me").await.expect("request should complete");

        m.assert_async().await;
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_omits_authorization_without_credential() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/receipts/view")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::new()));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer caller-supplied".parse().unwrap());
        let options = RequestOptions {
            headers,
            ..RequestOptions::default()
        };
        client
            .request(&client.endpoint("/receipts/view"), options)
            .await
            .expect("request should complete");

        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_unusable_credential_is_not_an_error() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/auth/me")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(
            server.url(),
            Arc::new(CredentialStore::with_credential("bad\nvalue")),
        );
        let response = client.get("/auth/me").await.expect("only network failures are errors");

        m.assert_async().await;
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_unauthorized_is_returned_not_refreshed() {
        let mut server = Server::new_async().await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("GET", "/auth/me")
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::with_credential("old")));
        let response = client.get("/auth/me").await.expect("401 is not an Err");

        assert_eq!(response.status(), 401);
        refresh.assert_async().await;
        assert!(matches!(
            ensure_success(response),
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_post_json_sets_content_type() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/receipts/status")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"receipt_id": "r1", "new_status": "approved"})))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::new()));
        client
            .post_json(
                "/receipts/status",
                &json!({"receipt_id": "r1", "new_status": "approved"}),
            )
            .await
            .expect("request should complete");

        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_multipart_post_keeps_generated_boundary() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/receipts/upload")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=.+".to_string()),
            )
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::new()));
        let form = Form::new().text("file", "hello");
        client
            .post("/receipts/upload", RequestBody::Multipart(form))
            .await
            .expect("request should complete");

        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_session_cookies_are_sent_back() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(200)
            .with_header("set-cookie", "refresh_token=cookie-123; Path=/")
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .match_header("cookie", Matcher::Regex("refresh_token=cookie-123".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(server.url(), Arc::new(CredentialStore::new()));
        client.get("/auth/me").await.expect("identity request should complete");
        client
            .request(
                &client.endpoint("/auth/refresh"),
                RequestOptions::method(Method::POST),
            )
            .await
            .expect("refresh should complete");

        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_network_failure_is_an_error() {
        let client = client_for(
            "http://127.0.0.1:9".to_string(),
            Arc::new(CredentialStore::new()),
        );
        assert!(matches!(
            client.get("/auth/me").await,
            Err(ApiError::Network(_))
        ));
    }
}
