//! stevedore-pkg: Package sourcing
//!
//! Content store, local and remote package fetchers, and bundle resolution
//! (fetch every package of a bundle and stage it for the deploy engine).

pub mod bundle;
pub mod error;
pub mod local;
pub mod remote;
pub mod store;
pub mod traits;
pub mod types;

pub use bundle::{BundleResolver, new_fetcher};
pub use error::{FetchError, StoreError};
pub use local::LocalFetcher;
pub use remote::RemoteFetcher;
pub use store::ContentStore;
pub use traits::Fetcher;
pub use types::{
    ComponentMetadata, FetcherConfig, Package, PackageMetadata, PackageSource, PackageSpec,
};
