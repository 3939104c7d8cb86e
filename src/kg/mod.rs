//! Knowledge Layer
//!
//! The persistent RDF substrate everything else builds on: SPARQL
//! query/update access, bulk triple append, forward-closure reasoning, and
//! the human-readable blob sink. All graph state is owned here; other
//! components hold URIs, never references into the store.

mod blobs;
mod namespace;
mod reasoner;
mod store;

pub use blobs::BlobStore;
pub use namespace::{NamespaceManager, PrefixError, PrefixResult};
pub use reasoner::{ClosureRule, Reasoner};
pub use store::{Bindings, KgError, KgResult, KnowledgeBase, QueryOutcome};
