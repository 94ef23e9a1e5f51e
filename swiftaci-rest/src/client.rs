//! Blocking HTTP transport for the controller's REST API
//!
//! - `GET  <base>/api/<path>.json` for object and class reads
//! - `POST <base>/api/<uri>.json` for save payloads
//! - `GET  <base>/doc/jsonmeta/<category>/<name>.json` for class metadata
//! - `POST <base>/api/aaaLogin.json` / `aaaLogout.json` for the session cookie

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use swiftaci_core::{AciError, QueryParams, Result, Transport};

use crate::config::ApicConfig;

/// Transport speaking to a live controller.
pub struct RestTransport {
    base_url: String,
    username: String,
    http: Client,
}

impl RestTransport {
    /// Create a client for `config`; no request is made yet.
    pub fn new(config: &ApicConfig) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(AciError::transport)?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of an API path (`mo/uni/tn-demo`, `class/fvTenant`, `aaaLogin`)
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}.json", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of a class metadata document
    pub fn metadata_url(&self, category: &str, name: &str) -> String {
        format!("{}/doc/jsonmeta/{}/{}.json", self.base_url, category, name)
    }

    /// Authenticate; the session cookie is kept by the client.
    pub fn login(&self, password: &str) -> Result<()> {
        let url = self.api_url("aaaLogin");
        info!("Logging in to {} as {}", self.base_url, self.username);
        let body = json!({"aaaUser": {"attributes": {"name": self.username, "pwd": password}}});
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(AciError::transport)?;
        check_status(resp, &url)?;
        Ok(())
    }

    /// End the session.
    pub fn logout(&self) -> Result<()> {
        let url = self.api_url("aaaLogout");
        debug!("Logging out of {}", self.base_url);
        let body = json!({"aaaUser": {"attributes": {"name": self.username}}});
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(AciError::transport)?;
        check_status(resp, &url)?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`AciError::Http`] carrying the body.
fn check_status(resp: Response, url: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(AciError::Http {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

impl Transport for RestTransport {
    fn get(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let url = self.api_url(path);
        debug!("GET {} {:?}", url, params);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .send()
            .map_err(AciError::transport)?;
        let resp = check_status(resp, &url)?;
        resp.json().map_err(AciError::transport)
    }

    fn post(&self, uri: &str, data: &Value) -> Result<()> {
        let url = self.api_url(uri);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .json(data)
            .send()
            .map_err(AciError::transport)?;
        check_status(resp, &url)?;
        Ok(())
    }

    fn fetch_class_metadata(&self, category: &str, name: &str) -> Result<Option<Value>> {
        let url = self.metadata_url(category, name);
        debug!("GET {}", url);
        let resp = self.http.get(&url).send().map_err(AciError::transport)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp, &url)?;
        Ok(Some(resp.json().map_err(AciError::transport)?))
    }
}
