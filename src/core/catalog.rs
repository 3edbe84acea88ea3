//! Remote lookups consumed by the transforms.
//!
//! `PackageCatalog` supplies the package version table and `BaseCatalog` the
//! default base. `HttpCatalog` implements both against the taskpipe API.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::defaults::TaskpipeConfig;
use crate::error::{Error, Result};

/// Environment variable holding the API bearer token.
pub const ACCESS_TOKEN_ENV: &str = "TASKPIPE_ACCESS_TOKEN";

/// Version table for every published package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersions {
    /// Old package name to current name.
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Package name to its newest version.
    #[serde(default)]
    pub latest_major: BTreeMap<String, String>,
    /// Package name to major version to the newest version within that major.
    #[serde(default)]
    pub latest_minor: BTreeMap<String, BTreeMap<String, String>>,
}

/// Execution environment a pipeline runs under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseSpec {
    pub image: String,
    pub config: String,
    #[serde(default)]
    pub arch: String,
}

pub trait PackageCatalog {
    fn package_versions(&self) -> Result<PackageVersions>;
}

pub trait BaseCatalog {
    fn default_base(&self) -> Result<BaseSpec>;
}

fn http_error(e: reqwest::Error) -> Error {
    Error::remote_request_failed(
        format!("HTTP request failed: {}", e),
        json!({ "error": e.to_string() }),
    )
}

fn api_error(url: &str, status: u16, body: &str) -> Error {
    Error::remote_request_failed(
        format!("API error: HTTP {}", status),
        json!({ "url": url, "status": status, "body": body }),
    )
}

/// Blocking client for the taskpipe API.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "api_url",
                None,
                "API URL is not configured",
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskpipe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(http_error)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Client for the configured API, authenticated from the environment.
    pub fn from_config(config: &TaskpipeConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            Duration::from_secs(config.request_timeout_secs),
            std::env::var(ACCESS_TOKEN_ENV).ok(),
        )
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(http_error)?;
        parse_json_response(&url, response)
    }
}

fn parse_json_response<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().map_err(http_error)?;

    if !status.is_success() {
        return Err(api_error(url, status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        Error::internal_json(e.to_string(), Some(format!("parse response from {}", url)))
    })
}

impl PackageCatalog for HttpCatalog {
    fn package_versions(&self) -> Result<PackageVersions> {
        self.get("/api/packages/versions")
    }
}

impl BaseCatalog for HttpCatalog {
    fn default_base(&self) -> Result<BaseSpec> {
        self.get("/api/base/default")
    }
}
