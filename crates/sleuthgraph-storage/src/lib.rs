//! Sleuthgraph storage: everything a finished mystery touches after generation.
//!
//! ```text
//! Mystery ──► MysteryDir (mystery.json, documents/, images/)
//!                 │
//!                 ├──► illustrate ──► images/IMG-xx.png
//!                 ├──► Publisher ──► EntityStore (metadata, documents, images)
//!                 └──► Registrar ◄── Commitment
//! ```

pub mod entity;
pub mod images;
pub mod layout;
pub mod publish;
pub mod registrar;

#[cfg(test)]
mod tests;

pub use entity::{
    AttrValue, Attributes, DirEntityStore, EntityKey, EntityStore, Filter, MemoryEntityStore,
    StoreError, StoredEntity,
};
pub use images::{illustrate, IllustrationReport, ImageError, ImageSynthesizer, PlaceholderCards};
pub use layout::{LayoutError, MysteryDir};
pub use publish::{EntityBuilder, PublishError, PublishOutcome, PublishReport, Publisher};
pub use registrar::{JournalRegistrar, Receipt, Registrar, RegistrarError};
