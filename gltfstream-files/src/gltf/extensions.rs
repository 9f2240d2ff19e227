use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::ParserError;
use crate::gltf::types::{Extensions, Material, Node, TextureInfo};

/// An extension we know how to interpret, looked up by its registered name.
pub trait KnownExtension: DeserializeOwned {
    const NAME: &'static str;
}

/// The closed set of extensions the importer acts on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtensionKind {
    Lod,
    TextureTransform,
    SpecularGlossiness,
    Unlit,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 4] = [
        ExtensionKind::Lod,
        ExtensionKind::TextureTransform,
        ExtensionKind::SpecularGlossiness,
        ExtensionKind::Unlit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtensionKind::Lod => MsftLod::NAME,
            ExtensionKind::TextureTransform => TextureTransform::NAME,
            ExtensionKind::SpecularGlossiness => PbrSpecularGlossiness::NAME,
            ExtensionKind::Unlit => MaterialsUnlit::NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<ExtensionKind> {
        ExtensionKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

pub fn get_extension<E: KnownExtension>(extensions: Option<&Extensions>) -> Result<Option<E>, ParserError> {
    let Some(value) = extensions.and_then(|map| map.get(E::NAME)) else {
        return Ok(None);
    };

    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|source| ParserError::InvalidExtension { name: E::NAME, source })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MsftLod {
    /// Node ids of the lower detail levels, highest detail after the node itself first.
    pub ids: Vec<usize>,
}

impl KnownExtension for MsftLod {
    const NAME: &'static str = "MSFT_lod";
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TextureTransform {
    pub offset: [f32; 2],
    pub rotation: f32,
    pub scale: [f32; 2],
    pub tex_coord: Option<u32>,
}

impl Default for TextureTransform {
    fn default() -> Self {
        TextureTransform {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
            tex_coord: None,
        }
    }
}

impl KnownExtension for TextureTransform {
    const NAME: &'static str = "KHR_texture_transform";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PbrSpecularGlossiness {
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureInfo>,
    pub specular_factor: [f32; 3],
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

impl Default for PbrSpecularGlossiness {
    fn default() -> Self {
        PbrSpecularGlossiness {
            diffuse_factor: [1.0; 4],
            diffuse_texture: None,
            specular_factor: [1.0; 3],
            glossiness_factor: 1.0,
            specular_glossiness_texture: None,
        }
    }
}

impl KnownExtension for PbrSpecularGlossiness {
    const NAME: &'static str = "KHR_materials_pbrSpecularGlossiness";
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialsUnlit {}

impl KnownExtension for MaterialsUnlit {
    const NAME: &'static str = "KHR_materials_unlit";
}

impl Node {
    pub fn lod(&self) -> Result<Option<MsftLod>, ParserError> {
        get_extension(self.extensions.as_ref())
    }

    /// `extras.MSFT_screencoverage`, one entry per level of detail.
    pub fn lod_coverage(&self) -> Option<Vec<f32>> {
        self.extras
            .as_ref()?
            .get("MSFT_screencoverage")?
            .as_array()
            .map(|values| values.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
    }
}

impl TextureInfo {
    pub fn texture_transform(&self) -> Result<Option<TextureTransform>, ParserError> {
        get_extension(self.extensions.as_ref())
    }
}

impl Material {
    pub fn specular_glossiness(&self) -> Result<Option<PbrSpecularGlossiness>, ParserError> {
        get_extension(self.extensions.as_ref())
    }

    pub fn is_unlit(&self) -> bool {
        self.extensions
            .as_ref()
            .is_some_and(|map| map.contains_key(MaterialsUnlit::NAME))
    }
}
