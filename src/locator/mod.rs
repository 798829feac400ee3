//! Tarball location layer
//!
//! Finds the newest release tarball of a module by walking remote
//! directory listings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Mirrors   │────▶│   Tarball   │────▶│  Selection  │
//! │ (substitute)│     │  (descend)  │     │ (ext, regex)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │  Fetchers   │     │   Compare   │
//!                     │ (http,sftp) │     │(dotted nums)│
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`compare`]: Dotted numeric version ordering and ceilings
//! - [`error`]: Error types for fetchers and the locator
//! - [`fetcher`]: Fetcher trait for listing remote directories
//! - [`fetchers`]: Concrete transports (HTTP(S), SFTP)
//! - [`mirror`]: Mirror substitution
//! - [`selection`]: Tarball choice within a final listing
//! - [`tarball`]: `TarballLocator`, directory descent

pub mod compare;
pub mod error;
pub mod fetcher;
pub mod fetchers;
pub mod mirror;
pub mod selection;
pub mod tarball;

pub use error::{FetchError, LocateError};
pub use fetcher::{DirectoryListing, Fetcher};
pub use mirror::{MirrorEntry, Mirrors};
pub use tarball::{ResolvedArtifact, TarballLocator};
