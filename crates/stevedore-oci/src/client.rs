//! HTTP client for the OCI distribution API

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{BearerChallenge, TokenResponse};
use crate::error::{RegistryError, Result};
use crate::reference::Reference;
use crate::types::{Descriptor, ImageManifest, Platform, RootManifest, media_types};

/// Read access to a content-addressable registry
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve a reference to the image manifest for `platform`
    async fn resolve(&self, reference: &Reference, platform: &Platform) -> Result<ImageManifest>;

    /// Download the bytes behind a descriptor
    ///
    /// Callers verify the bytes; this only transports them.
    async fn fetch_blob(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>>;
}

/// OCI distribution API client
///
/// Negotiates anonymous bearer tokens on demand and caches them per
/// repository for the lifetime of the client.
#[derive(Debug)]
pub struct RegistryClient {
    client: Client,
    plain_http: bool,
    tokens: Mutex<HashMap<String, String>>,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    /// Create a new client talking HTTPS
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new client with a custom `reqwest::Client`
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            plain_http: false,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Talk plain HTTP, for local development registries
    #[must_use]
    pub fn plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// Build a full URL below `/v2/<repository>/`
    fn url(&self, reference: &Reference, path: &str) -> Result<Url> {
        let scheme = if self.plain_http { "http" } else { "https" };
        let base = Url::parse(&format!("{scheme}://{}/v2/", reference.registry))?;
        base.join(&format!("{}/{path}", reference.repository))
            .map_err(RegistryError::Url)
    }

    fn cached_token(&self, repository: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(repository).cloned())
    }

    /// Perform a GET, answering one bearer challenge if the registry asks
    async fn get(&self, reference: &Reference, url: Url, accept: &str) -> Result<Response> {
        let response = self.send(url.clone(), accept, &reference.repository).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(BearerChallenge::parse)
                .ok_or_else(|| {
                    RegistryError::Auth(format!("{reference}: unauthorized without bearer challenge"))
                })?;
            self.authenticate(&challenge, &reference.repository).await?;
            self.send(url, accept, &reference.repository).await?
        } else {
            response
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(reference.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn send(&self, url: Url, accept: &str, repository: &str) -> Result<Response> {
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(token) = self.cached_token(repository) {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Trade a challenge for a token and cache it
    #[instrument(skip(self, challenge), fields(realm = %challenge.realm))]
    async fn authenticate(&self, challenge: &BearerChallenge, repository: &str) -> Result<()> {
        let url = challenge.token_url(repository)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(RegistryError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token = response.json::<TokenResponse>().await?.into_token()?;
        debug!(repository, "obtained registry token");
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(repository.to_string(), token);
        }
        Ok(())
    }

    /// Fetch and parse whatever `reference` points at
    async fn fetch_root(&self, reference: &Reference) -> Result<RootManifest> {
        let url = self.url(reference, &format!("manifests/{}", reference.reference()))?;
        let accept = [
            media_types::OCI_IMAGE_INDEX,
            media_types::OCI_IMAGE_MANIFEST,
            media_types::DOCKER_MANIFEST_LIST,
            media_types::DOCKER_MANIFEST,
        ]
        .join(", ");

        let response = self.get(reference, url, &accept).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await?;

        // a manifest addressed by digest must hash to it
        if let Some(digest) = reference.digest() {
            digest.verify(&bytes)?;
        }

        RootManifest::from_slice(content_type.as_deref(), &bytes)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    #[instrument(skip(self), fields(reference = %reference, platform = %platform))]
    async fn resolve(&self, reference: &Reference, platform: &Platform) -> Result<ImageManifest> {
        match self.fetch_root(reference).await? {
            RootManifest::Image(manifest) => Ok(manifest),
            RootManifest::Index(index) => {
                let entry = index
                    .select(platform)
                    .ok_or_else(|| RegistryError::NoMatchingPlatform(platform.to_string()))?;
                debug!(digest = %entry.digest, "selected platform manifest");

                let pinned = reference.with_digest(entry.digest.clone());
                match self.fetch_root(&pinned).await? {
                    RootManifest::Image(manifest) => Ok(manifest),
                    RootManifest::Index(_) => Err(RegistryError::UnsupportedMediaType(
                        "nested image index".to_string(),
                    )),
                }
            }
        }
    }

    #[instrument(skip(self, descriptor), fields(digest = %descriptor.digest, size = descriptor.size))]
    async fn fetch_blob(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let url = self.url(reference, &format!("blobs/{}", descriptor.digest))?;
        let response = self.get(reference, url, &descriptor.media_type).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
