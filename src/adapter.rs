use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::{Error, Logged, Manifest, ShipMap, TeamMap};

/// How resource URLs are derived from the configured base.
///
/// `Api` is the dev-server layout with the version in the path; `Flat` is a
/// static deployment where the base already points at one version's files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointMode {
    Api,
    Flat,
}

impl FromStr for EndpointMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(EndpointMode::Api),
            "flat" => Ok(EndpointMode::Flat),
            _ => Err(Error::InvalidConfig(format!(
                "Unsupported endpoint mode '{}'",
                s
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApiEndpoint {
    base: String,
    mode: EndpointMode,
}

impl ApiEndpoint {
    pub fn new(base: &str, mode: EndpointMode) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            mode,
        }
    }

    pub fn versions_url(&self) -> String {
        match self.mode {
            EndpointMode::Api => format!("{}/api/versions.json", self.base),
            EndpointMode::Flat => format!("{}/versions.json", self.base),
        }
    }

    pub fn resource_url(&self, version: &str, resource: &str) -> String {
        match self.mode {
            EndpointMode::Api => format!("{}/api/{}/{}.json", self.base, version, resource),
            // Flat deployments serve exactly one version under the base.
            EndpointMode::Flat => format!("{}/{}.json", self.base, resource),
        }
    }
}

/**
 * Reqwest::error_for_status doesn't keep the response body, which is the
 * error message the stores are required to surface verbatim.
 */
async fn get_response(url: &str, resp: Response) -> Result<String, Error> {
    let status = resp.status();
    let text = resp.text().await.log()?;
    debug!("Status: {}", status);
    trace!("Response: {}", text);
    if status.is_client_error() || status.is_server_error() {
        Err(Error::HttpError(url.to_string(), status, text))
    } else {
        Ok(text)
    }
}

/// Boundary collaborator producing the ordered version list.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_versions(&self) -> Result<Vec<String>, Error>;
}

/// Boundary collaborator producing one dataset kind for a version.
#[async_trait]
pub trait DatasetSource<T>: Send + Sync {
    async fn fetch(&self, version: &str) -> Result<T, Error>;
}

#[derive(Clone, Debug)]
pub struct HttpAdapter {
    endpoint: ApiEndpoint,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self {
            endpoint,
            client: Default::default(),
        }
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        debug!("URL: {}", url);
        let resp = self.client.get(url).send().await.log()?;
        let text = get_response(url, resp).await.log()?;
        Ok(serde_json::from_str(&text).log()?)
    }

    async fn get_resource<T>(&self, version: &str, resource: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        self.get_json(&self.endpoint.resource_url(version, resource))
            .await
    }
}

#[async_trait]
impl VersionSource for HttpAdapter {
    async fn fetch_versions(&self) -> Result<Vec<String>, Error> {
        self.get_json(&self.endpoint.versions_url()).await
    }
}

#[derive(Clone, Debug)]
pub struct ShipsSource {
    api: Arc<HttpAdapter>,
}

impl ShipsSource {
    pub fn new(api: Arc<HttpAdapter>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DatasetSource<ShipMap> for ShipsSource {
    async fn fetch(&self, version: &str) -> Result<ShipMap, Error> {
        self.api.get_resource(version, "ships").await
    }
}

#[derive(Clone, Debug)]
pub struct TeamsSource {
    api: Arc<HttpAdapter>,
}

impl TeamsSource {
    pub fn new(api: Arc<HttpAdapter>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DatasetSource<TeamMap> for TeamsSource {
    async fn fetch(&self, version: &str) -> Result<TeamMap, Error> {
        self.api.get_resource(version, "teams").await
    }
}

#[derive(Clone, Debug)]
pub struct ManifestSource {
    api: Arc<HttpAdapter>,
}

impl ManifestSource {
    pub fn new(api: Arc<HttpAdapter>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DatasetSource<Manifest> for ManifestSource {
    async fn fetch(&self, version: &str) -> Result<Manifest, Error> {
        self.api.get_resource(version, "manifest").await
    }
}
