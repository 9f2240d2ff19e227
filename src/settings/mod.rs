use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use gltfstream_files::gltf::types::AlphaMode;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "gltfstream")]
#[command(version = concat!(env!("VERGEN_GIT_BRANCH"), "/", env!("VERGEN_GIT_SHA")))]
#[command(about = "Streams a glTF scene into memory and prints what has been built")]
pub struct CliArgs {
    /// The .gltf or .glb file to load
    #[arg(env = "GLTFSTREAM_PATH")]
    pub path: PathBuf,

    /// Scene to load instead of the document's default scene
    #[arg(long, env = "GLTFSTREAM_SCENE")]
    pub scene: Option<usize>,

    /// JSON file containing import options, anything not specified keeps its default
    #[arg(long, env = "GLTFSTREAM_OPTIONS")]
    pub options: Option<PathBuf>,

    #[arg(long, env = "GLTFSTREAM_MULTITHREADED")]
    pub multithreaded: bool,

    #[arg(long, env = "GLTFSTREAM_VERBOSE")]
    pub verbose: bool,

    /// Number of leading mip levels to skip for DDS textures
    #[arg(long, env = "GLTFSTREAM_SKIP_MIPS")]
    pub skip_mips: Option<u32>,
}

impl CliArgs {
    /// Loads the options file (if any) and applies the command line overrides on top.
    pub fn import_options(&self) -> Result<ImportOptions, anyhow::Error> {
        let mut options = match &self.options {
            Some(path) => ImportOptions::from_file(path)?,
            None => ImportOptions::default(),
        };

        options.multithreaded |= self.multithreaded;
        options.verbose |= self.verbose;
        if let Some(skip) = self.skip_mips {
            options.mipmap_skip = skip;
        }
        Ok(options)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColliderMode {
    #[default]
    None,
    Box,
    Mesh,
    MeshConvex,
}

/// Replaces the built-in shaders. Templates win over shader names, MASK materials use the alpha test variants.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShaderOverrides {
    pub shader: Option<String>,
    pub alpha_test_shader: Option<String>,
    pub material_template: Option<String>,
    pub material_template_unlit: Option<String>,
    pub alpha_test_material_template: Option<String>,
    pub alpha_test_material_template_unlit: Option<String>,
}

impl ShaderOverrides {
    pub fn template(&self, alpha_mode: AlphaMode, unlit: bool) -> Option<&str> {
        let mask = alpha_mode == AlphaMode::Mask;
        match (mask, unlit) {
            (true, true) => self.alpha_test_material_template_unlit.as_deref(),
            (true, false) => self.alpha_test_material_template.as_deref(),
            (false, true) => self.material_template_unlit.as_deref(),
            (false, false) => self.material_template.as_deref(),
        }
    }

    pub fn shader(&self, alpha_mode: AlphaMode) -> Option<&str> {
        if alpha_mode == AlphaMode::Mask {
            self.alpha_test_shader.as_deref()
        } else {
            self.shader.as_deref()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Decode accessors and images on the blocking pool, fetch images concurrently
    pub multithreaded: bool,
    pub maximum_lod: u32,
    pub collider: ColliderMode,
    pub start_colliders_enabled: bool,
    pub shader_overrides: ShaderOverrides,
    pub keep_cpu_copy_of_mesh: bool,
    pub keep_cpu_copy_of_texture: bool,
    /// Recompress generic (PNG/JPEG) images to BC1/BC3
    pub texture_compression: bool,
    pub mipmapping: bool,
    pub max_image_dimension: u32,
    pub mipmap_skip: u32,
    pub cull_far_lod: bool,
    pub verbose: bool,
    pub frame_budget_ms: u64,
    pub frame_overrun_report_ms: u64,
    pub stream_timeout_secs: u64,
    pub show_scene_object: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            multithreaded: false,
            maximum_lod: 300,
            collider: ColliderMode::None,
            start_colliders_enabled: true,
            shader_overrides: ShaderOverrides::default(),
            keep_cpu_copy_of_mesh: true,
            keep_cpu_copy_of_texture: true,
            texture_compression: true,
            mipmapping: true,
            max_image_dimension: 32768,
            mipmap_skip: 0,
            cull_far_lod: false,
            verbose: false,
            frame_budget_ms: 10,
            frame_overrun_report_ms: 100,
            stream_timeout_secs: 30,
            show_scene_object: true,
        }
    }
}

impl ImportOptions {
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    /// Overruns are only reported when running verbose.
    pub fn overrun_report_threshold(&self) -> Option<Duration> {
        self.verbose
            .then(|| Duration::from_millis(self.frame_overrun_report_ms))
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_options_keep_their_defaults() {
        let options: ImportOptions =
            serde_json::from_str(r#"{ "collider": "mesh-convex", "mipmap_skip": 2, "shader_overrides": { "shader": "Custom/Lit" } }"#)
                .unwrap();
        assert_eq!(options.collider, ColliderMode::MeshConvex);
        assert_eq!(options.mipmap_skip, 2);
        assert_eq!(options.maximum_lod, 300);
        assert!(options.keep_cpu_copy_of_mesh);
        assert_eq!(options.shader_overrides.shader(AlphaMode::Opaque), Some("Custom/Lit"));
        assert_eq!(options.shader_overrides.shader(AlphaMode::Mask), None);
        assert_eq!(options.overrun_report_threshold(), None);
    }

    #[test]
    fn cli_overrides_apply() {
        let args = CliArgs::parse_from(["gltfstream", "scene.glb", "--multithreaded", "--skip-mips", "3"]);
        let options = args.import_options().unwrap();
        assert!(options.multithreaded);
        assert_eq!(options.mipmap_skip, 3);
        assert_eq!(args.path, PathBuf::from("scene.glb"));
    }
}
