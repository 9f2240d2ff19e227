#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

impl Keyframe {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnimatedProperty {
    Translation,
    Rotation,
    Scale,
}

impl AnimatedProperty {
    pub fn name(self) -> &'static str {
        match self {
            AnimatedProperty::Translation => "localPosition",
            AnimatedProperty::Rotation => "localRotation",
            AnimatedProperty::Scale => "localScale",
        }
    }

    pub fn components(self) -> usize {
        match self {
            AnimatedProperty::Rotation => 4,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnimationCurve {
    /// Path of the animated object relative to the clip's root.
    pub path: String,
    pub property: AnimatedProperty,
    /// x, y, z (and w for rotations)
    pub component: usize,
    pub keys: Vec<Keyframe>,
}

impl AnimationCurve {
    pub fn property_name(&self) -> String {
        format!("{}.{}", self.property.name(), ["x", "y", "z", "w"][self.component])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClipWrapMode {
    Once,
    Loop,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub wrap_mode: ClipWrapMode,
    pub curves: Vec<AnimationCurve>,
}

impl AnimationClip {
    pub fn length(&self) -> f32 {
        self.curves
            .iter()
            .filter_map(|curve| curve.keys.last())
            .map(|key| key.time)
            .fold(0.0, f32::max)
    }

    pub fn curve(&self, path: &str, property: AnimatedProperty, component: usize) -> Option<&AnimationCurve> {
        self.curves
            .iter()
            .find(|c| c.path == path && c.property == property && c.component == component)
    }
}
