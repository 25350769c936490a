//! Uniform values and change tracking.
//!
//! The engine keeps one desired value per uniform name. Each program keeps a
//! record of what it last received, so a draw only uploads what changed since
//! that program's previous draw.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};
use crate::gfx::Graphics;

/// Scalar or 1 to 4 component float uniform.
///
/// Serialized untagged: `1.0` or `[1.0, 2.0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl UniformValue {
    pub fn components(&self) -> &[f32] {
        match self {
            Self::Scalar(x) => std::slice::from_ref(x),
            Self::Vector(v) => v,
        }
    }

    /// Checks the component count for `name`.
    pub fn validate(&self, name: &str) -> Result<()> {
        match self.components().len() {
            0 => Err(EngineError::EmptyUniformValue(name.to_string())),
            1..=4 => Ok(()),
            _ => Err(EngineError::UniformArity),
        }
    }
}

// Compared by components so `1.0` and `[1.0]` are the same upload.
impl PartialEq for UniformValue {
    fn eq(&self, other: &Self) -> bool {
        self.components() == other.components()
    }
}

impl From<f32> for UniformValue {
    fn from(x: f32) -> Self {
        Self::Scalar(x)
    }
}

impl From<Vec<f32>> for UniformValue {
    fn from(v: Vec<f32>) -> Self {
        Self::Vector(v)
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(v: [f32; N]) -> Self {
        Self::Vector(v.to_vec())
    }
}

/// Uploads `value` through the call matching its arity.
pub(crate) fn upload<G: Graphics>(
    gl: &mut G,
    location: &G::UniformLocation,
    name: &str,
    value: &UniformValue,
) -> Result<()> {
    match *value.components() {
        [] => return Err(EngineError::EmptyUniformValue(name.to_string())),
        [x] => gl.uniform_1f(location, x),
        [x, y] => gl.uniform_2f(location, x, y),
        [x, y, z] => gl.uniform_3f(location, x, y, z),
        [x, y, z, w] => gl.uniform_4f(location, x, y, z, w),
        _ => return Err(EngineError::UniformArity),
    }
    Ok(())
}

/// Engine-wide desired uniform state.
#[derive(Debug, Default)]
pub(crate) struct UniformStore {
    desired: BTreeMap<String, UniformValue>,
}

impl UniformStore {
    pub fn set(&mut self, name: &str, value: UniformValue) {
        self.desired.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.desired.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.desired.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn clear(&mut self) {
        self.desired.clear();
    }
}

/// What one program has received, plus its location cache.
#[derive(Debug)]
pub(crate) struct ProgramUniforms<L> {
    applied: HashMap<String, UniformValue>,
    /// `None` caches a failed lookup.
    locations: HashMap<String, Option<L>>,
}

impl<L> Default for ProgramUniforms<L> {
    fn default() -> Self {
        Self {
            applied: HashMap::new(),
            locations: HashMap::new(),
        }
    }
}

impl<L: Clone> ProgramUniforms<L> {
    pub fn location<G>(&mut self, gl: &mut G, program: G::Program, name: &str) -> Option<L>
    where
        G: Graphics<UniformLocation = L>,
    {
        if let Some(cached) = self.locations.get(name) {
            return cached.clone();
        }
        let location = gl.uniform_location(program, name);
        self.locations.insert(name.to_string(), location.clone());
        location
    }

    pub fn is_current(&self, name: &str, value: &UniformValue) -> bool {
        self.applied.get(name) == Some(value)
    }

    pub fn mark_applied(&mut self, name: &str, value: &UniformValue) {
        self.applied.insert(name.to_string(), value.clone());
    }

    /// Forgets everything; used when the program is relinked.
    pub fn reset(&mut self) {
        self.applied.clear();
        self.locations.clear();
    }

    /// Uploads every desired uniform that differs from this program's record.
    ///
    /// `program` must be the active program. Names the program does not
    /// declare are recorded as applied and skipped. Returns the number of
    /// uploads issued.
    pub fn apply_changes<G>(
        &mut self,
        gl: &mut G,
        program: G::Program,
        store: &UniformStore,
    ) -> Result<usize>
    where
        G: Graphics<UniformLocation = L>,
    {
        let mut uploads = 0;
        for (name, value) in store.iter() {
            if self.is_current(name, value) {
                continue;
            }
            if let Some(location) = self.location(gl, program, name) {
                upload(gl, &location, name, value)?;
                uploads += 1;
            }
            self.mark_applied(name, value);
        }
        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{GfxCall, RecordingGraphics, RecordingSurface, ShaderStage};

    #[test]
    fn equality_is_by_components() {
        assert_eq!(UniformValue::Scalar(1.0), UniformValue::Vector(vec![1.0]));
        assert_ne!(UniformValue::from([1.0, 2.0]), UniformValue::from([1.0, 2.5]));
    }

    #[test]
    fn untagged_json_forms() {
        let scalar: UniformValue = serde_json::from_str("0.5").unwrap();
        let vector: UniformValue = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(scalar, UniformValue::Scalar(0.5));
        assert_eq!(vector.components(), &[1.0, 2.0, 3.0]);
        assert_eq!(serde_json::to_string(&UniformValue::from([1.0, 2.0])).unwrap(), "[1.0,2.0]");
    }

    #[test]
    fn arity_bounds() {
        assert_eq!(
            UniformValue::Vector(vec![]).validate("u_x"),
            Err(EngineError::EmptyUniformValue("u_x".into()))
        );
        assert_eq!(UniformValue::from([0.0; 5]).validate("u_x"), Err(EngineError::UniformArity));
        assert!(UniformValue::from([0.0; 4]).validate("u_x").is_ok());
    }

    #[test]
    fn changes_upload_once_per_value() {
        let surface = RecordingSurface::new(4, 4);
        let journal = surface.journal();
        let mut gl = RecordingGraphics::from_surface(surface).unwrap();

        let p = gl.create_program().unwrap();
        let s = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(s, "u_time u_resolution");
        gl.attach_shader(p, s);
        gl.link_program(p).unwrap();
        gl.use_program(Some(p));

        let mut store = UniformStore::default();
        store.set("u_time", UniformValue::Scalar(1.0));
        store.set("u_resolution", [4.0, 4.0].into());
        store.set("u_missing", UniformValue::Scalar(2.0));

        let mut record = ProgramUniforms::default();
        assert_eq!(record.apply_changes(&mut gl, p, &store).unwrap(), 2);
        assert_eq!(record.apply_changes(&mut gl, p, &store).unwrap(), 0);

        store.set("u_time", UniformValue::Scalar(2.0));
        assert_eq!(record.apply_changes(&mut gl, p, &store).unwrap(), 1);

        assert_eq!(journal.uploads(p, "u_time"), 2);
        assert_eq!(journal.uploads(p, "u_resolution"), 1);
        assert_eq!(journal.uploads(p, "u_missing"), 0);
        assert!(journal.calls().contains(&GfxCall::Uniform {
            program: p,
            name: "u_resolution".into(),
            values: vec![4.0, 4.0],
        }));
    }
}
