//! Sitemap documents: rendering, sharding, index composition, publishing and
//! verification.
//!
//! - [`ShardWriter`]: partitions a record stream into capacity-bounded shards
//! - [`IndexComposer`]: builds subcategory, category and root indexes
//! - [`Publisher`]: stages documents and publishes them atomically
//! - [`Verifier`]: walks a published tree and checks reachability

pub mod index;
pub mod manifest;
pub mod publish;
pub mod shard;
pub mod verify;
pub mod xml;

pub use index::{CategoryOutput, Composition, IndexComposer, ROOT_KEY, SubcategoryOutput};
pub use manifest::{MANIFEST_KEY, Manifest, ManifestEntry};
pub use publish::{PublishReport, Publisher, StagedDocument};
pub use shard::ShardWriter;
pub use verify::{VerificationReport, Verifier};
pub use xml::DocumentKind;
