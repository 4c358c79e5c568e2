//! stevedore-oci: OCI types and registry client
//!
//! Content-addressed types shared by the fetchers and the content store, and
//! an HTTP client for the OCI distribution API.
//!
//! # Examples
//!
//! ```no_run
//! use stevedore_oci::{Platform, Reference, Registry, RegistryClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RegistryClient::new();
//! let reference = Reference::new("ghcr.io/example/podinfo", "6.4.0")?;
//!
//! let manifest = client.resolve(&reference, &Platform::host()).await?;
//! for descriptor in manifest.descriptors() {
//!     let bytes = client.fetch_blob(&reference, descriptor).await?;
//!     println!("{} ({} bytes)", descriptor.digest, bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod digest;
pub mod error;
pub mod reference;
pub mod types;

pub use client::{Registry, RegistryClient};
pub use digest::Digest;
pub use error::{RegistryError, Result};
pub use reference::Reference;
pub use types::{Descriptor, ImageIndex, ImageManifest, Platform, RootManifest, media_types};
