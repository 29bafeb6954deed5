//! Object identity and live interaction facts.
//!
//! An [`ObjectRef`] is a stable identity for a physical interactable. It is
//! never a live handle: the environment resolves it to whatever scene object
//! it stands for. Authoring may refer to objects directly or by name; both
//! strategies normalize to the same `ObjectRef` before reaching the engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Namespace for deterministic scene-path identities.
const SCENE_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2a_9d4e_5f60_8a7b_1c2d_3e4f_5a6b);

/// Stable identity for a real-world interactable.
///
/// # Examples
///
/// ```
/// use trainflow::ObjectRef;
///
/// let a = ObjectRef::from_scene_path("Workbench/Knob1");
/// let b = ObjectRef::from_scene_path("Workbench/Knob1");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(Uuid);

impl ObjectRef {
    /// Creates a new random object identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identity from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derives a deterministic identity from a scene path.
    ///
    /// The same path yields the same `ObjectRef` in every session.
    #[must_use]
    pub fn from_scene_path(path: &str) -> Self {
        Self(Uuid::new_v5(&SCENE_NAMESPACE, path.trim().as_bytes()))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ObjectRef {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifies an interactable by name or role for gating purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Creates an action id. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A position in world space.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Creates a vector.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Last known interaction facts for one object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectState {
    /// Socket the object is currently snapped into.
    pub snapped_to: Option<ObjectRef>,
    /// Whether the object is currently held.
    pub is_grabbed: bool,
    /// Last reported rotation angle, in degrees.
    pub rotation_angle: Option<f32>,
    /// Last reported world position.
    pub position: Option<Vec3>,
}

/// Outcome of looking up a scene name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one object carries the name.
    Found(ObjectRef),
    /// No object carries the name.
    Missing,
    /// Several objects carry the name.
    Ambiguous,
}

impl Resolution {
    /// The resolved object, if exactly one was found.
    #[must_use]
    pub const fn object(self) -> Option<ObjectRef> {
        match self {
            Self::Found(object) => Some(object),
            Self::Missing | Self::Ambiguous => None,
        }
    }
}

/// Name-based object lookup provided by the environment.
pub trait ObjectResolver {
    /// Resolves a scene name to an object identity.
    fn resolve(&self, name: &str) -> Option<ObjectRef>;

    /// Resolves a scene name, telling a missing name apart from an
    /// ambiguous one. Resolvers that cannot detect ambiguity report
    /// every failure as [`Resolution::Missing`].
    fn lookup(&self, name: &str) -> Resolution {
        self.resolve(name).map_or(Resolution::Missing, Resolution::Found)
    }
}

impl<F> ObjectResolver for F
where
    F: Fn(&str) -> Option<ObjectRef>,
{
    fn resolve(&self, name: &str) -> Option<ObjectRef> {
        self(name)
    }
}

/// In-memory name directory.
///
/// Registering the same name for two different objects makes that name
/// ambiguous; ambiguous names never resolve.
#[derive(Debug, Default, Clone)]
pub struct NameDirectory {
    by_name: HashMap<String, Vec<ObjectRef>>,
}

impl NameDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `object` under `name`.
    pub fn register(&mut self, name: impl AsRef<str>, object: ObjectRef) {
        let entry = self.by_name.entry(normalize(name.as_ref())).or_default();
        if !entry.contains(&object) {
            entry.push(object);
        }
    }

    /// Registers `name` with an identity derived from the name itself and
    /// returns it.
    pub fn register_path(&mut self, name: impl AsRef<str>) -> ObjectRef {
        let object = ObjectRef::from_scene_path(name.as_ref());
        self.register(name, object);
        object
    }

    /// Returns true if more than one object is registered under `name`.
    #[must_use]
    pub fn is_ambiguous(&self, name: &str) -> bool {
        self.by_name
            .get(&normalize(name))
            .is_some_and(|v| v.len() > 1)
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl ObjectResolver for NameDirectory {
    fn resolve(&self, name: &str) -> Option<ObjectRef> {
        let resolution = self.lookup(name);
        if resolution == Resolution::Ambiguous {
            warn!(name, "ambiguous object name; refusing to resolve");
        }
        resolution.object()
    }

    fn lookup(&self, name: &str) -> Resolution {
        match self.by_name.get(&normalize(name)).map(Vec::as_slice) {
            Some([only]) => Resolution::Found(*only),
            Some([_, _, ..]) => Resolution::Ambiguous,
            _ => Resolution::Missing,
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_string()
}
