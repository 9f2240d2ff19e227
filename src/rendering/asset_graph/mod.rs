//! This module contains the bookkeeping that sits between the importer and the renderables it creates.
//!
//! Every import gets its own [`asset_cache::AssetCache`]: one write-once slot per entry of every document
//! collection. Whoever first needs an asset builds it and publishes it behind an [`std::sync::Arc`], later
//! references clone from the slot. A slot that is in flight rejects a second builder, which is how
//! reference cycles in malformed documents surface instead of recursing forever.
//!
//! Textures are the exception to "per import": images that come from an external path are shared between
//! all imports through the [`global_texture_cache::GlobalTextureCache`], keyed by the resolved path and
//! reference counted. Decoding the same path is serialized through the decode gate, so that concurrent
//! imports never decode twice, the loser of the race simply finds the winner's handle in the cache.
//!
//! Nothing in the cache owns a renderable. Whatever the import creates or references is recorded in a
//! [`instantiation::RefCountedCacheData`], which moves to the top level object once a scene or node has been
//! instantiated. Dropping the last reference to it releases the meshes, materials and owned textures to the
//! [`disposer::ObjectDisposer`], and the shared textures back to the global cache.
//!
//! Note: The import never blocks the host. Long running loops check in with the
//! [`scheduler::FrameScheduler`], which suspends the import once the frame budget is used up and resumes it
//! on the next frame.
pub mod asset_cache;
pub mod cache_data;
pub(crate) mod decode_gate;
pub mod disposer;
pub mod global_texture_cache;
pub mod instantiation;
pub mod scheduler;
