//! Turns a parsed glTF document into scene objects and renderables.
//!
//! The stateless conversions live on the unit-struct importers (`MaterialImporter`, `MeshImporter`, ...), so
//! they can be tested without a document on disk. The per-asset `ImportContext` impl blocks next to them do
//! the orchestration: memoizing through the asset cache, loading streams and yielding back to the frame loop.
pub mod accessor;
pub mod animation_importer;
pub(crate) mod context;
pub mod material_importer;
/// Primitives to vertex and index buffers, including the handedness flip.
pub mod mesh_importer;
pub mod node_importer;
pub mod scene_importer;
pub mod state;
pub mod texture_importer;
