//! OCI descriptor, manifest and index types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::RegistryError;

/// Media types understood by the fetchers
pub mod media_types {
    pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    /// Package definition stored as the manifest config blob
    pub const PACKAGE_CONFIG: &str = "application/vnd.stevedore.package.config.v1+json";
    pub const LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

    /// Annotation carrying a layer's file name
    pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";
}

/// Content-addressed identity of a blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: String,
    /// Digest of the content; dedup key and integrity check
    pub digest: Digest,
    /// Size in bytes
    pub size: u64,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Platform, set on image index entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// Describe some bytes
    #[must_use]
    pub fn for_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: Digest::of(bytes),
            size: bytes.len() as u64,
            annotations: BTreeMap::new(),
            platform: None,
        }
    }

    /// Set the title annotation
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.annotations
            .insert(media_types::ANNOTATION_TITLE.to_string(), title.into());
        self
    }

    /// Set the platform
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Title annotation, if present
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.annotations
            .get(media_types::ANNOTATION_TITLE)
            .map(String::as_str)
    }

    /// Check both size and digest of `bytes` against this descriptor
    ///
    /// # Errors
    /// Returns [`RegistryError::DigestMismatch`] if either differs.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), RegistryError> {
        if bytes.len() as u64 != self.size {
            return Err(RegistryError::DigestMismatch {
                expected: format!("{} ({} bytes)", self.digest, self.size),
                actual: format!("{} ({} bytes)", Digest::of(bytes), bytes.len()),
            });
        }
        self.digest.verify(bytes)
    }
}

/// Target platform of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, OCI naming (`amd64`, `arm64`)
    pub architecture: String,
    /// Operating system; packages that run anywhere use `multi`
    pub os: String,
    /// Architecture variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// OS marker for platform-independent packages
    pub const MULTI_OS: &'static str = "multi";

    /// Create a platform
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            variant: None,
        }
    }

    /// Platform of the running host, with the multi-OS marker
    #[must_use]
    pub fn host() -> Self {
        Self::new(host_architecture(), Self::MULTI_OS)
    }

    /// Whether an index entry for `other` can serve a request for `self`
    #[must_use]
    pub fn matches(&self, other: &Platform) -> bool {
        let os_matches =
            self.os == other.os || self.os == Self::MULTI_OS || other.os == Self::MULTI_OS;
        self.architecture == other.architecture && os_matches
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{variant}", self.os, self.architecture),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

/// Map the Rust target architecture onto OCI naming
#[must_use]
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

/// An image manifest: one config blob plus layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ImageManifest {
    /// Build a manifest from a config descriptor and layers
    #[must_use]
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_types::OCI_IMAGE_MANIFEST.to_string()),
            config,
            layers,
            annotations: BTreeMap::new(),
        }
    }

    /// Config followed by every layer, in manifest order
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }

    /// Layer with the given title annotation
    #[must_use]
    pub fn layer_by_title(&self, title: &str) -> Option<&Descriptor> {
        self.layers.iter().find(|l| l.title() == Some(title))
    }

    /// Total size of config and layers
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.descriptors().map(|d| d.size).sum()
    }
}

/// An image index: per-platform manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// Entry serving the requested platform
    ///
    /// Entries without a platform are ignored.
    #[must_use]
    pub fn select(&self, platform: &Platform) -> Option<&Descriptor> {
        self.manifests.iter().find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|candidate| platform.matches(candidate))
        })
    }
}

/// Whatever a tag resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootManifest {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl RootManifest {
    /// Parse manifest bytes, using the response content type when present
    ///
    /// # Errors
    /// Returns an error for invalid JSON or unknown media types.
    pub fn from_slice(content_type: Option<&str>, bytes: &[u8]) -> Result<Self, RegistryError> {
        let media_type = match content_type {
            Some(ct) if !ct.is_empty() && ct != "application/json" => {
                ct.split(';').next().unwrap_or(ct).trim().to_string()
            }
            _ => sniff_media_type(bytes)?,
        };

        match media_type.as_str() {
            media_types::OCI_IMAGE_INDEX | media_types::DOCKER_MANIFEST_LIST => {
                Ok(Self::Index(serde_json::from_slice(bytes)?))
            }
            media_types::OCI_IMAGE_MANIFEST | media_types::DOCKER_MANIFEST => {
                Ok(Self::Image(serde_json::from_slice(bytes)?))
            }
            other => Err(RegistryError::UnsupportedMediaType(other.to_string())),
        }
    }
}

/// Work out the media type from the document itself
fn sniff_media_type(bytes: &[u8]) -> Result<String, RegistryError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if let Some(mt) = value.get("mediaType").and_then(|v| v.as_str()) {
        return Ok(mt.to_string());
    }
    if value.get("manifests").is_some() {
        Ok(media_types::OCI_IMAGE_INDEX.to_string())
    } else {
        Ok(media_types::OCI_IMAGE_MANIFEST.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_json() -> String {
        let config = Descriptor::for_bytes(media_types::PACKAGE_CONFIG, b"{}");
        let layer = Descriptor::for_bytes(media_types::LAYER, b"layer").with_title("images.tar");
        serde_json::to_string(&ImageManifest::new(config, vec![layer])).unwrap()
    }

    #[test]
    fn test_manifest_descriptors_order() {
        let manifest: ImageManifest = serde_json::from_str(&manifest_json()).unwrap();
        let media: Vec<_> = manifest.descriptors().map(|d| d.media_type.as_str()).collect();
        assert_eq!(media, vec![media_types::PACKAGE_CONFIG, media_types::LAYER]);
        assert!(manifest.layer_by_title("images.tar").is_some());
        assert_eq!(manifest.total_size(), 2 + 5);
    }

    #[test]
    fn test_descriptor_wire_format() {
        let json = serde_json::to_value(Descriptor::for_bytes("a/b", b"x")).unwrap();
        assert_eq!(json["mediaType"], "a/b");
        assert_eq!(json["size"], 1);
        assert!(json.get("annotations").is_none());
        assert!(json.get("platform").is_none());
    }

    #[test]
    fn test_descriptor_verify_checks_size() {
        let mut desc = Descriptor::for_bytes(media_types::LAYER, b"abc");
        assert!(desc.verify(b"abc").is_ok());
        assert!(desc.verify(b"abd").is_err());
        desc.size = 4;
        assert!(desc.verify(b"abc").is_err());
    }

    #[test]
    fn test_platform_matching() {
        let wanted = Platform::new("amd64", Platform::MULTI_OS);
        assert!(wanted.matches(&Platform::new("amd64", "linux")));
        assert!(wanted.matches(&Platform::new("amd64", "multi")));
        assert!(!wanted.matches(&Platform::new("arm64", "multi")));
        assert!(!Platform::new("amd64", "linux").matches(&Platform::new("amd64", "windows")));
    }

    #[test]
    fn test_index_select() {
        let amd = Descriptor::for_bytes(media_types::OCI_IMAGE_MANIFEST, b"amd")
            .with_platform(Platform::new("amd64", "multi"));
        let arm = Descriptor::for_bytes(media_types::OCI_IMAGE_MANIFEST, b"arm")
            .with_platform(Platform::new("arm64", "multi"));
        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(media_types::OCI_IMAGE_INDEX.to_string()),
            manifests: vec![amd.clone(), arm.clone()],
        };

        assert_eq!(index.select(&Platform::new("arm64", "multi")), Some(&arm));
        assert_eq!(index.select(&Platform::new("amd64", "linux")), Some(&amd));
        assert!(index.select(&Platform::new("s390x", "multi")).is_none());
    }

    #[test]
    fn test_root_manifest_detection() {
        let bytes = manifest_json();
        assert!(matches!(
            RootManifest::from_slice(None, bytes.as_bytes()).unwrap(),
            RootManifest::Image(_)
        ));

        let index = r#"{"schemaVersion":2,"manifests":[]}"#;
        assert!(matches!(
            RootManifest::from_slice(Some("application/json"), index.as_bytes()).unwrap(),
            RootManifest::Index(_)
        ));

        assert!(matches!(
            RootManifest::from_slice(Some("text/plain"), bytes.as_bytes()),
            Err(RegistryError::UnsupportedMediaType(_))
        ));
    }
}
