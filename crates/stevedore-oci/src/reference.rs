//! Registry coordinates

use std::fmt;

use crate::digest::Digest;
use crate::error::RegistryError;

/// Registry used when a repository carries no host component
pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

/// Tag or digest part of a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Mutable tag, for example `1.0.0`
    Name(String),
    /// Immutable digest
    Digest(Digest),
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Name(name) => write!(f, "{name}"),
            Tag::Digest(digest) => write!(f, "{digest}"),
        }
    }
}

/// A fully qualified `(registry, repository, ref)` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Registry host, optionally with port
    pub registry: String,
    /// Repository path within the registry
    pub repository: String,
    /// Tag or digest
    pub tag: Tag,
}

impl Reference {
    /// Build a reference from a repository coordinate and a separate ref
    ///
    /// `repository` may carry an `oci://` prefix. `reference` is either a tag
    /// or a `sha256:` digest.
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidReference`] for empty parts.
    pub fn new(repository: &str, reference: &str) -> Result<Self, RegistryError> {
        let (registry, repository) = split_registry(repository)?;
        Ok(Self {
            registry,
            repository,
            tag: parse_tag(reference)?,
        })
    }

    /// Parse a single `host/repo:tag` or `host/repo@sha256:...` string
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidReference`] when no tag or digest is present.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let s = s.strip_prefix("oci://").unwrap_or(s);

        // the digest wins over a tag written next to it
        if let Some((name, digest)) = s.split_once('@') {
            let repository = split_tag(name).map_or(name, |(repository, _)| repository);
            return Self::new(repository, digest);
        }

        match split_tag(s) {
            Some((repository, tag)) => Self::new(repository, tag),
            None => Err(RegistryError::InvalidReference(format!(
                "{s}: missing tag or digest"
            ))),
        }
    }

    /// The `<ref>` path component for manifest requests
    #[must_use]
    pub fn reference(&self) -> String {
        self.tag.to_string()
    }

    /// Digest if the reference pins one
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        match &self.tag {
            Tag::Digest(digest) => Some(digest),
            Tag::Name(_) => None,
        }
    }

    /// Same repository, pinned to a digest
    #[must_use]
    pub fn with_digest(&self, digest: Digest) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Tag::Digest(digest),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Tag::Name(name) => write!(f, "{}/{}:{name}", self.registry, self.repository),
            Tag::Digest(digest) => write!(f, "{}/{}@{digest}", self.registry, self.repository),
        }
    }
}

/// Split `name:tag` on a ':' after the last '/'; earlier ones are ports
fn split_tag(s: &str) -> Option<(&str, &str)> {
    let last_slash = s.rfind('/').unwrap_or(0);
    let idx = last_slash + s[last_slash..].rfind(':')?;
    Some((&s[..idx], &s[idx + 1..]))
}

fn split_registry(repository: &str) -> Result<(String, String), RegistryError> {
    let repository = repository.strip_prefix("oci://").unwrap_or(repository);
    let repository = repository.trim_matches('/');
    if repository.is_empty() {
        return Err(RegistryError::InvalidReference(
            "empty repository".to_string(),
        ));
    }

    match repository.split_once('/') {
        Some((host, rest))
            if host.contains('.') || host.contains(':') || host == "localhost" =>
        {
            if rest.is_empty() {
                return Err(RegistryError::InvalidReference(repository.to_string()));
            }
            Ok((host.to_string(), rest.to_string()))
        }
        Some(_) => Ok((DEFAULT_REGISTRY.to_string(), repository.to_string())),
        None => Ok((
            DEFAULT_REGISTRY.to_string(),
            format!("library/{repository}"),
        )),
    }
}

fn parse_tag(reference: &str) -> Result<Tag, RegistryError> {
    if reference.is_empty() {
        return Err(RegistryError::InvalidReference("empty ref".to_string()));
    }
    if reference.starts_with(&format!("{}:", Digest::ALGORITHM)) {
        return Ok(Tag::Digest(reference.parse()?));
    }
    if reference.contains(['/', '@', ' ']) {
        return Err(RegistryError::InvalidReference(format!(
            "invalid tag `{reference}`"
        )));
    }
    Ok(Tag::Name(reference.to_string()))
}
