//! Anonymous bearer-token negotiation
//!
//! Registries such as ghcr.io answer unauthenticated requests with `401` and a
//! `WWW-Authenticate: Bearer realm="...",service="...",scope="..."` challenge,
//! even for public content. The client trades the challenge for a token.

use serde::Deserialize;
use url::Url;

use crate::error::RegistryError;

/// Parsed `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a challenge header; `None` for non-bearer schemes
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in split_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }

    /// Token endpoint URL, asking for pull access to `repository`
    ///
    /// # Errors
    /// Returns an error if the realm is not a valid URL.
    pub fn token_url(&self, repository: &str) -> Result<Url, RegistryError> {
        let mut url = Url::parse(&self.realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            let scope = self
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{repository}:pull"));
            query.append_pair("scope", &scope);
        }
        Ok(url)
    }
}

/// Token endpoint response; registries disagree on the field name
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    /// The bearer token
    ///
    /// # Errors
    /// Returns [`RegistryError::Auth`] if the response carries no token.
    pub fn into_token(self) -> Result<String, RegistryError> {
        self.token
            .or(self.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryError::Auth("token endpoint returned no token".to_string()))
    }
}

/// Split `k="v",k2="v,2"` respecting quotes
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    for c in params.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_value && !in_quotes => in_value = true,
            ',' if !in_quotes => {
                if !key.trim().is_empty() {
                    out.push((key.trim().to_string(), value.clone()));
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    if !key.trim().is_empty() {
        out.push((key.trim().to_string(), value));
    }

    out
}
