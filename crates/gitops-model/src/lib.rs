//! Resource model and ownership tagging for the GitOps engine
//!
//! Provides the canonical representation of a rendered manifest, the observed
//! live state of a resource, and the ownership markers that distinguish
//! resources tracked by an application from foreign or pre-existing ones.

pub mod error;
pub mod hash;
pub mod identity;
pub mod live;
pub mod manifest;
pub mod ownership;

pub use error::{Error, Result};
pub use hash::{canonical_hash, CHECKSUM_PREFIX};
pub use identity::ResourceId;
pub use live::LiveResource;
pub use manifest::ResourceManifest;
pub use ownership::{Ownership, OwnershipMarker};
