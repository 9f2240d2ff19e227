use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use gltfstream_files::gltf::types::{Animation, Interpolation, TargetPath};
use itertools::Itertools;
use log::{debug, warn};

use crate::error::{AssetKind, ImportError, check_range};
use crate::io::common::loader::StreamProvider;
use crate::rendering::asset_graph::cache_data::AnimationCacheData;
use crate::rendering::common::animation::{AnimatedProperty, AnimationClip, AnimationCurve, ClipWrapMode, Keyframe};
use crate::rendering::common::coordinate_systems::{convert_rotation, convert_vec3};
use crate::rendering::common::scene_graph::SceneObjectId;
use crate::rendering::importer::context::ImportContext;

pub struct AnimationImporter {}

impl AnimationImporter {
    pub fn clip_name(animation: &Animation, index: usize) -> String {
        animation
            .name
            .clone()
            .unwrap_or_else(|| format!("animation:{}", index))
    }

    pub fn property(path: TargetPath) -> Option<AnimatedProperty> {
        match path {
            TargetPath::Translation => Some(AnimatedProperty::Translation),
            TargetPath::Rotation => Some(AnimatedProperty::Rotation),
            TargetPath::Scale => Some(AnimatedProperty::Scale),
            TargetPath::Weights => None,
        }
    }

    /// Flips quaternions that point into the other hemisphere than their predecessor, so interpolation takes
    /// the short way. Returns which keys were flipped.
    pub fn enforce_quaternion_continuity(values: &mut [Quat]) -> Vec<bool> {
        let mut flipped = vec![false; values.len()];
        for i in 1..values.len() {
            if values[i - 1].dot(values[i]) < 0.0 {
                values[i] = -values[i];
                flipped[i] = true;
            }
        }
        flipped
    }

    /// Output values in the target convention, four components each. Cubic splines store
    /// (in tangent, value, out tangent) per key.
    fn convert_values(property: AnimatedProperty, raw: Vec<Vec4>) -> Vec<Vec4> {
        match property {
            AnimatedProperty::Translation => raw
                .into_iter()
                .map(|v| convert_vec3(v.truncate()).extend(0.0))
                .collect_vec(),
            AnimatedProperty::Rotation => raw
                .into_iter()
                .map(|v| Vec4::from(convert_rotation(Quat::from_vec4(v))))
                .collect_vec(),
            AnimatedProperty::Scale => raw,
        }
    }

    fn slope(from: (f32, f32), to: (f32, f32)) -> f32 {
        let dt = to.0 - from.0;
        if dt.abs() <= f32::EPSILON { 0.0 } else { (to.1 - from.1) / dt }
    }

    /// Per component curves of one channel. `raw` holds the sampler output as four component vectors
    /// (the fourth is unused outside of rotations).
    pub fn channel_curves(
        path: &str,
        property: AnimatedProperty,
        times: &[f32],
        raw: Vec<Vec4>,
        interpolation: Interpolation,
    ) -> Result<Vec<AnimationCurve>, ImportError> {
        let frames = times.len();
        let expected = match interpolation {
            Interpolation::CubicSpline => frames * 3,
            _ => frames,
        };
        if raw.len() < expected {
            return Err(ImportError::malformed(format!(
                "{} has {} keyframes but only {} output values",
                path,
                frames,
                raw.len()
            )));
        }

        let converted = AnimationImporter::convert_values(property, raw);
        let (mut values, mut tangents_in, mut tangents_out) = match interpolation {
            Interpolation::CubicSpline => {
                let (mut a, mut b, mut c) = (vec![], vec![], vec![]);
                for key in converted.chunks_exact(3).take(frames) {
                    a.push(key[1]);
                    b.push(key[0]);
                    c.push(key[2]);
                }
                (a, b, c)
            }
            _ => (converted[..frames].to_vec(), vec![], vec![]),
        };

        if property == AnimatedProperty::Rotation {
            let mut quats = values.iter().map(|&v| Quat::from_vec4(v)).collect_vec();
            let flipped = AnimationImporter::enforce_quaternion_continuity(&mut quats);
            values = quats.into_iter().map(Vec4::from).collect_vec();
            // a flipped key keeps its curve shape only if its tangents flip with it
            for (i, _) in flipped.iter().enumerate().filter(|(_, flipped)| **flipped) {
                if let Some(t) = tangents_in.get_mut(i) {
                    *t = -*t;
                }
                if let Some(t) = tangents_out.get_mut(i) {
                    *t = -*t;
                }
            }
        }

        let curves = (0..property.components())
            .map(|component| {
                let keys = (0..frames)
                    .map(|i| {
                        let value = values[i][component];
                        let mut key = Keyframe::new(times[i], value);
                        match interpolation {
                            Interpolation::Step => {
                                key.in_tangent = 0.0;
                                key.out_tangent = f32::INFINITY;
                            }
                            Interpolation::Linear => {
                                if i > 0 {
                                    key.in_tangent =
                                        AnimationImporter::slope((times[i - 1], values[i - 1][component]), (times[i], value));
                                }
                                if i + 1 < frames {
                                    key.out_tangent =
                                        AnimationImporter::slope((times[i], value), (times[i + 1], values[i + 1][component]));
                                }
                            }
                            Interpolation::CubicSpline => {
                                key.in_tangent = tangents_in[i][component];
                                key.out_tangent = tangents_out[i][component];
                            }
                        }
                        key
                    })
                    .collect_vec();

                AnimationCurve {
                    path: path.to_string(),
                    property,
                    component,
                    keys,
                }
            })
            .collect_vec();
        Ok(curves)
    }
}

impl<L: StreamProvider> ImportContext<'_, L> {
    async fn sampler_output(&self, accessor: usize, property: AnimatedProperty) -> Result<Vec<Vec4>, ImportError> {
        let accessor = self.accessor(accessor).await?;
        Ok(match property {
            AnimatedProperty::Rotation => accessor.to_vec4s()?,
            _ => accessor
                .to_vec3s()?
                .into_iter()
                .map(|v: Vec3| v.extend(0.0))
                .collect_vec(),
        })
    }

    /// Builds one clip against the already constructed hierarchy below `root`.
    pub async fn animation_clip(&self, index: usize, root: SceneObjectId) -> Result<Arc<AnimationCacheData>, ImportError> {
        self.cache()
            .animations
            .get_or_build(index, move || async move {
                let animation = &self.document().animations[index];
                let mut curves = vec![];

                for channel in &animation.channels {
                    let sampler = &animation.samplers
                        [check_range(AssetKind::Sampler, channel.sampler, animation.samplers.len())?];
                    let Some(node) = channel.target.node else {
                        continue;
                    };
                    let Some(property) = AnimationImporter::property(channel.target.path) else {
                        debug!("Skipping the morph target weights of node {}", node);
                        continue;
                    };

                    let Some(node_data) = self.cache().nodes.get(node)? else {
                        warn!("Animation {} targets node {}, which has not been built", index, node);
                        continue;
                    };
                    let Some(path) = self.read_graph(|graph| graph.relative_path(node_data.object, root)) else {
                        warn!("Animation {} targets node {} outside of the loaded hierarchy", index, node);
                        continue;
                    };

                    let times = self.accessor(sampler.input).await?.to_floats()?;
                    let output = self.sampler_output(sampler.output, property).await?;
                    curves.extend(AnimationImporter::channel_curves(
                        &path,
                        property,
                        &times,
                        output,
                        sampler.interpolation,
                    )?);
                }

                self.checkpoint("animation").await?;
                Ok(AnimationCacheData {
                    clip: Arc::new(AnimationClip {
                        name: AnimationImporter::clip_name(animation, index),
                        wrap_mode: ClipWrapMode::Loop,
                        curves,
                    }),
                })
            })
            .await
    }
}
