//! BuildStream project conversion
//!
//! Rewrites element sources to resolved release tarballs and produces the
//! `versions` summary of a release.
//!
//! # Modules
//!
//! - [`converter`]: Per-element resolution and rewriting
//! - [`element`]: Order-preserving element documents
//! - [`error`]: Error type for the conversion run
//! - [`release`]: Release version parsing and branch bookkeeping
//! - [`summary`]: Resolved versions and the `versions` file
//! - [`yaml_edit`]: Comment-preserving edits of YAML text

pub mod converter;
pub mod element;
pub mod error;
pub mod release;
pub mod summary;
pub mod yaml_edit;

pub use converter::{Converter, Outcome, SkipReason};
pub use error::ConvertError;
pub use release::{ReleaseVersion, update_release_branch};
pub use summary::RunSummary;
