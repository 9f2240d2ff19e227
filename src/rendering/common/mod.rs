/// Animation clips and curves as they are attached to a scene root.
pub mod animation;
/// glTF is right handed, the scene graph is left handed. All conversion between the two happens here.
pub mod coordinate_systems;
/// The arena backed hierarchy instantiated objects live in.
pub mod scene_graph;
/// Renderer-side objects (textures, meshes, materials), independent of the asset format.
pub mod types;
