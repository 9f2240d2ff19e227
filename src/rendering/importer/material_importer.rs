use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec3, Vec4};
use gltfstream_files::gltf::extensions::{KnownExtension, PbrSpecularGlossiness};
use gltfstream_files::gltf::types::{AlphaMode, Document, Material, TextureInfo};
use itertools::Itertools;
use log::{error, warn};

use crate::error::{AssetKind, ImportError};
use crate::io::common::loader::StreamProvider;
use crate::rendering::asset_graph::cache_data::MaterialCacheData;
use crate::rendering::common::types::{
    DestroyFlag, MaterialWorkflow, RenderMaterial, RenderTexture, TextureBinding,
};
use crate::rendering::importer::context::ImportContext;
use crate::rendering::importer::texture_importer::TextureImporter;
use crate::settings::{ImportOptions, ShaderOverrides};

pub const DEFAULT_ALPHA_CUTOFF: f32 = 0.5;
pub const METAL_ROUGHNESS_SHADER: &str = "GLTF/PbrMetallicRoughness";
pub const SPECULAR_GLOSSINESS_SHADER: &str = "GLTF/PbrSpecularGlossiness";
pub const UNLIT_SHADER: &str = "GLTF/Unlit";
pub const DEFAULT_MATERIAL_NAME: &str = "GLTFDefaultMaterial";

/// One texture a material samples, and whether its texels are linear data rather than sRGB color.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureRequest {
    pub texture: usize,
    pub linear: bool,
}

pub struct MaterialImporter {}

impl MaterialImporter {
    /// Only honored when the document declares the extension.
    pub fn specular_glossiness(
        document: &Document,
        material: &Material,
    ) -> Result<Option<PbrSpecularGlossiness>, ImportError> {
        if !document.uses_extension(PbrSpecularGlossiness::NAME) {
            return Ok(None);
        }
        Ok(material.specular_glossiness()?)
    }

    pub fn is_png_texture(document: &Document, info: Option<&TextureInfo>) -> bool {
        let Some(image) = info
            .and_then(|info| document.textures.get(info.index))
            .and_then(|texture| texture.source)
            .and_then(|source| document.images.get(source))
        else {
            return false;
        };

        image.mime_type.as_deref() == Some("image/png")
            || image
                .uri
                .as_deref()
                .is_some_and(|uri| uri.to_ascii_lowercase().ends_with(".png"))
    }

    /// Documents that leave the alpha mode out get MASK if the color texture can carry alpha at all.
    pub fn alpha_mode(document: &Document, material: &Material) -> Result<AlphaMode, ImportError> {
        if let Some(mode) = material.alpha_mode {
            return Ok(mode);
        }

        let color_texture = match MaterialImporter::specular_glossiness(document, material)? {
            Some(spec_gloss) => spec_gloss.diffuse_texture,
            None => material
                .pbr_metallic_roughness
                .as_ref()
                .and_then(|pbr| pbr.base_color_texture.clone()),
        };

        if MaterialImporter::is_png_texture(document, color_texture.as_ref()) {
            Ok(AlphaMode::Mask)
        } else {
            Ok(AlphaMode::Opaque)
        }
    }

    pub fn shader_name(overrides: &ShaderOverrides, alpha_mode: AlphaMode, unlit: bool, spec_gloss: bool) -> String {
        if let Some(template) = overrides.template(alpha_mode, unlit) {
            return template.to_string();
        }
        if !unlit && let Some(shader) = overrides.shader(alpha_mode) {
            return shader.to_string();
        }

        match (unlit, spec_gloss) {
            (true, _) => UNLIT_SHADER,
            (false, true) => SPECULAR_GLOSSINESS_SHADER,
            (false, false) => METAL_ROUGHNESS_SHADER,
        }
        .to_string()
    }

    /// Every texture the material needs, color textures sRGB, data textures linear.
    pub fn texture_requests(document: &Document, material: &Material) -> Result<Vec<TextureRequest>, ImportError> {
        let srgb = |info: &Option<TextureInfo>| info.as_ref().map(|info| (info.index, false));
        let linear = |info: &Option<TextureInfo>| info.as_ref().map(|info| (info.index, true));

        let mut requests = match MaterialImporter::specular_glossiness(document, material)? {
            Some(spec_gloss) => vec![
                srgb(&spec_gloss.diffuse_texture),
                srgb(&spec_gloss.specular_glossiness_texture),
            ],
            None => {
                let pbr = material.pbr_metallic_roughness.clone().unwrap_or_default();
                vec![srgb(&pbr.base_color_texture), linear(&pbr.metallic_roughness_texture)]
            }
        };
        requests.extend([
            linear(&material.normal_texture),
            linear(&material.occlusion_texture),
            srgb(&material.emissive_texture),
        ]);

        Ok(requests
            .into_iter()
            .flatten()
            // a texture wanted in both color spaces is requested twice, the second request reports the conflict
            .unique()
            .map(|(texture, linear)| TextureRequest { texture, linear })
            .collect_vec())
    }

    fn binding(
        info: Option<&TextureInfo>,
        textures: &impl Fn(usize) -> Option<RenderTexture>,
    ) -> Option<TextureBinding> {
        let info = info?;
        let texture = textures(info.index)?;

        let transform = match info.texture_transform() {
            Ok(transform) => transform,
            Err(err) => {
                warn!("Ignoring the texture transform of texture {}: {}", info.index, err);
                None
            }
        };
        let tex_coord = transform
            .as_ref()
            .and_then(|transform| transform.tex_coord)
            .unwrap_or(info.tex_coord);

        Some(TextureBinding {
            texture,
            tex_coord,
            transform,
        })
    }

    /// Maps a document material onto a render material. `textures` resolves a document texture index to
    /// the constructed texture, None where it could not be built.
    pub fn build(
        document: &Document,
        material: &Material,
        name: String,
        options: &ImportOptions,
        textures: impl Fn(usize) -> Option<RenderTexture>,
    ) -> Result<RenderMaterial, ImportError> {
        let spec_gloss = MaterialImporter::specular_glossiness(document, material)?;
        let alpha_mode = MaterialImporter::alpha_mode(document, material)?;
        let unlit = material.is_unlit();

        let workflow = match &spec_gloss {
            Some(spec_gloss) => MaterialWorkflow::SpecularGlossiness {
                diffuse_factor: Vec4::from_array(spec_gloss.diffuse_factor),
                diffuse_texture: MaterialImporter::binding(spec_gloss.diffuse_texture.as_ref(), &textures),
                specular_factor: Vec3::from_array(spec_gloss.specular_factor),
                glossiness_factor: spec_gloss.glossiness_factor,
                specular_glossiness_texture: MaterialImporter::binding(
                    spec_gloss.specular_glossiness_texture.as_ref(),
                    &textures,
                ),
            },
            None => {
                let pbr = material.pbr_metallic_roughness.clone().unwrap_or_default();
                MaterialWorkflow::MetalRoughness {
                    base_color_factor: Vec4::from_array(pbr.base_color_factor),
                    base_color_texture: MaterialImporter::binding(pbr.base_color_texture.as_ref(), &textures),
                    metallic_factor: pbr.metallic_factor,
                    roughness_factor: pbr.roughness_factor,
                    metallic_roughness_texture: MaterialImporter::binding(
                        pbr.metallic_roughness_texture.as_ref(),
                        &textures,
                    ),
                }
            }
        };

        Ok(RenderMaterial {
            name,
            shader: MaterialImporter::shader_name(&options.shader_overrides, alpha_mode, unlit, spec_gloss.is_some()),
            workflow,
            normal_texture: MaterialImporter::binding(material.normal_texture.as_ref(), &textures),
            normal_scale: material.normal_texture.as_ref().map_or(1.0, |info| info.scale),
            occlusion_texture: MaterialImporter::binding(material.occlusion_texture.as_ref(), &textures),
            occlusion_strength: material.occlusion_texture.as_ref().map_or(1.0, |info| info.strength),
            emissive_texture: MaterialImporter::binding(material.emissive_texture.as_ref(), &textures),
            emissive_factor: Vec3::from_array(material.emissive_factor),
            alpha_mode,
            alpha_cutoff: material.alpha_cutoff.unwrap_or(DEFAULT_ALPHA_CUTOFF),
            double_sided: material.double_sided,
            unlit,
            vertex_colors: false,
            maximum_lod: options.maximum_lod,
            destroyed: DestroyFlag::default(),
        })
    }

    /// For primitives without a material: white, fully rough, opaque.
    pub fn default_material(options: &ImportOptions) -> RenderMaterial {
        RenderMaterial {
            name: DEFAULT_MATERIAL_NAME.to_string(),
            shader: MaterialImporter::shader_name(&options.shader_overrides, AlphaMode::Opaque, false, false),
            workflow: MaterialWorkflow::MetalRoughness {
                base_color_factor: Vec4::ONE,
                base_color_texture: None,
                metallic_factor: 1.0,
                roughness_factor: 1.0,
                metallic_roughness_texture: None,
            },
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_texture: None,
            emissive_factor: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: DEFAULT_ALPHA_CUTOFF,
            double_sided: false,
            unlit: false,
            vertex_colors: false,
            maximum_lod: options.maximum_lod,
            destroyed: DestroyFlag::default(),
        }
    }
}

impl<L: StreamProvider> ImportContext<'_, L> {
    pub async fn material(&self, index: usize) -> Result<Arc<MaterialCacheData>, ImportError> {
        self.cache()
            .materials
            .get_or_build(index, move || async move {
                let document = self.document();
                let definition = document.materials[index].clone();
                let requests = MaterialImporter::texture_requests(document, &definition)?;

                if self.options.multithreaded {
                    let textures = requests.iter().map(|request| request.texture).collect_vec();
                    self.prefetch_image_streams(&TextureImporter::source_images(document, &textures))
                        .await?;
                }

                let mut resolved = HashMap::new();
                for request in requests {
                    let texture = self.texture(request.texture, request.linear).await?;
                    resolved.insert(request.texture, texture.texture.clone());
                }

                let name = definition
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("GLTFMaterial{}", index));
                let material = MaterialImporter::build(document, &definition, name, self.options, |texture| {
                    resolved.get(&texture).cloned().flatten()
                })?;

                let data = MaterialCacheData::new(Some(definition), material);
                self.session.record.add_material(data.material.clone());
                self.session.record.add_material(data.material_with_vertex_color.clone());
                self.checkpoint("material").await?;
                Ok(data)
            })
            .await
    }

    pub fn default_material(&self) -> Result<Arc<MaterialCacheData>, ImportError> {
        let slot = &self.cache().default_material;
        if let Some(material) = slot.get() {
            return Ok(material);
        }

        let writer = slot.begin(AssetKind::Material, self.document().materials.len())?;
        let data = writer.publish(MaterialCacheData::new(None, MaterialImporter::default_material(self.options)));
        self.session.record.add_material(data.material.clone());
        self.session.record.add_material(data.material_with_vertex_color.clone());
        Ok(data)
    }

    /// The material a primitive renders with. A material that fails to build for reasons local to it falls
    /// back to the default material, anything structural aborts.
    pub async fn primitive_material(&self, material: Option<usize>) -> Result<Arc<MaterialCacheData>, ImportError> {
        let Some(index) = material else {
            return self.default_material();
        };

        match self.material(index).await {
            Ok(material) => Ok(material),
            Err(err) if !err.is_fatal() => {
                error!("Material {} could not be built, using the default material: {}", index, err);
                self.default_material()
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> Document {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn alpha_mode_is_inferred_from_the_base_color_texture() {
        let doc = document(
            r#"{
                "images": [{ "uri": "albedo.PNG" }, { "uri": "albedo.jpg" }],
                "textures": [{ "source": 0 }, { "source": 1 }],
                "materials": [
                    { "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } },
                    { "pbrMetallicRoughness": { "baseColorTexture": { "index": 1 } } },
                    { "alphaMode": "BLEND", "pbrMetallicRoughness": { "baseColorTexture": { "index": 1 } } },
                    {}
                ]
            }"#,
        );
        let modes = doc
            .materials
            .iter()
            .map(|material| MaterialImporter::alpha_mode(&doc, material).unwrap())
            .collect_vec();
        assert_eq!(modes, vec![AlphaMode::Mask, AlphaMode::Opaque, AlphaMode::Blend, AlphaMode::Opaque]);
    }

    #[test]
    fn specular_glossiness_needs_the_extension_declared() {
        let material = r#"{ "extensions": { "KHR_materials_pbrSpecularGlossiness": {
            "diffuseTexture": { "index": 0 }, "specularFactor": [0.5, 0.5, 0.5] } } }"#;
        let declared = document(&format!(
            r#"{{ "extensionsUsed": ["KHR_materials_pbrSpecularGlossiness"], "materials": [{}] }}"#,
            material
        ));
        let undeclared = document(&format!(r#"{{ "materials": [{}] }}"#, material));

        let options = ImportOptions::default();
        let built = MaterialImporter::build(&declared, &declared.materials[0], "m".into(), &options, |_| None).unwrap();
        assert_eq!(built.shader, SPECULAR_GLOSSINESS_SHADER);
        assert!(matches!(built.workflow, MaterialWorkflow::SpecularGlossiness { specular_factor, .. } if specular_factor == Vec3::splat(0.5)));

        let built = MaterialImporter::build(&undeclared, &undeclared.materials[0], "m".into(), &options, |_| None).unwrap();
        assert_eq!(built.shader, METAL_ROUGHNESS_SHADER);
    }

    #[test]
    fn requests_use_the_right_color_space() {
        let doc = document(
            r#"{ "materials": [{
                "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 }, "metallicRoughnessTexture": { "index": 1 } },
                "normalTexture": { "index": 1, "scale": 0.5 },
                "emissiveTexture": { "index": 2 }
            }] }"#,
        );
        let requests = MaterialImporter::texture_requests(&doc, &doc.materials[0]).unwrap();
        assert_eq!(
            requests,
            vec![
                TextureRequest { texture: 0, linear: false },
                TextureRequest { texture: 1, linear: true },
                TextureRequest { texture: 2, linear: false },
            ]
        );

        let doc = document(
            r#"{ "materials": [{
                "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
                "normalTexture": { "index": 0 }
            }] }"#,
        );
        let requests = MaterialImporter::texture_requests(&doc, &doc.materials[0]).unwrap();
        assert_eq!(
            requests,
            vec![
                TextureRequest { texture: 0, linear: false },
                TextureRequest { texture: 0, linear: true },
            ]
        );
    }

    #[test]
    fn templates_win_over_shaders() {
        let overrides = ShaderOverrides {
            shader: Some("Custom/Lit".into()),
            alpha_test_material_template: Some("Templates/Cutout".into()),
            ..ShaderOverrides::default()
        };
        assert_eq!(MaterialImporter::shader_name(&overrides, AlphaMode::Mask, false, false), "Templates/Cutout");
        assert_eq!(MaterialImporter::shader_name(&overrides, AlphaMode::Opaque, false, true), "Custom/Lit");
        assert_eq!(MaterialImporter::shader_name(&overrides, AlphaMode::Opaque, true, false), UNLIT_SHADER);
        assert_eq!(
            MaterialImporter::shader_name(&ShaderOverrides::default(), AlphaMode::Blend, false, false),
            METAL_ROUGHNESS_SHADER
        );
    }

    #[test]
    fn carried_values_and_defaults() {
        let doc = document(
            r#"{ "materials": [{ "alphaMode": "MASK", "doubleSided": true, "emissiveFactor": [1, 0, 0],
                "occlusionTexture": { "index": 0, "strength": 0.25 } }] }"#,
        );
        let options = ImportOptions {
            maximum_lod: 150,
            ..ImportOptions::default()
        };
        let material = MaterialImporter::build(&doc, &doc.materials[0], "m".into(), &options, |_| None).unwrap();
        assert_eq!(material.alpha_cutoff, DEFAULT_ALPHA_CUTOFF);
        assert_eq!(material.occlusion_strength, 0.25);
        // the texture could not be resolved, the binding is dropped but the value is kept
        assert!(material.occlusion_texture.is_none());
        assert!(material.double_sided);
        assert_eq!(material.emissive_factor, Vec3::X);
        assert_eq!(material.maximum_lod, 150);
    }
}
