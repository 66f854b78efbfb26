//! Uniform and attribute binding tables, and output sharing between pipelines.
//!
//! Binding tables are shared handles: a pass keeps a clone and reads the values
//! when it renders, while the owner keeps mutating them between frames. The set
//! of names (and the shape of each value) is fixed when the table is built.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::device::TextureId;

/// Broad category of a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Scalar,
    Vector,
    Matrix,
    Texture,
}

/// Declared type of a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformShape {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Texture,
}

impl UniformShape {
    pub fn kind(self) -> UniformKind {
        match self {
            UniformShape::Float | UniformShape::Int => UniformKind::Scalar,
            UniformShape::Vec2 | UniformShape::Vec3 | UniformShape::Vec4 => UniformKind::Vector,
            UniformShape::Mat2 | UniformShape::Mat3 | UniformShape::Mat4 => UniformKind::Matrix,
            UniformShape::Texture => UniformKind::Texture,
        }
    }
}

/// Value of a uniform. Matrices are column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// A texture sampled by the pass; `None` binds nothing.
    Texture(Option<TextureId>),
}

impl UniformValue {
    pub fn shape(&self) -> UniformShape {
        match self {
            UniformValue::Float(_) => UniformShape::Float,
            UniformValue::Int(_) => UniformShape::Int,
            UniformValue::Vec2(_) => UniformShape::Vec2,
            UniformValue::Vec3(_) => UniformShape::Vec3,
            UniformValue::Vec4(_) => UniformShape::Vec4,
            UniformValue::Mat2(_) => UniformShape::Mat2,
            UniformValue::Mat3(_) => UniformShape::Mat3,
            UniformValue::Mat4(_) => UniformShape::Mat4,
            UniformValue::Texture(_) => UniformShape::Texture,
        }
    }

    pub fn kind(&self) -> UniformKind {
        self.shape().kind()
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<Mat2> for UniformValue {
    fn from(m: Mat2) -> Self {
        UniformValue::Mat2(m.to_cols_array())
    }
}

impl From<Mat3> for UniformValue {
    fn from(m: Mat3) -> Self {
        UniformValue::Mat3(m.to_cols_array())
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array())
    }
}

impl From<Option<TextureId>> for UniformValue {
    fn from(t: Option<TextureId>) -> Self {
        UniformValue::Texture(t)
    }
}

impl From<TextureId> for UniformValue {
    fn from(t: TextureId) -> Self {
        UniformValue::Texture(Some(t))
    }
}

/// One declared uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformEntry {
    pub name: String,
    pub shape: UniformShape,
    /// `None` until a value is set; unset uniforms are not uploaded.
    pub value: Option<UniformValue>,
}

/// Shared, ordered uniform binding table.
///
/// ```
/// use texchain::{Uniforms, UniformShape};
///
/// let uniforms = Uniforms::new()
///     .with("d", [1.0_f32 / 256.0, 1.0 / 256.0])
///     .with("dt", 0.25_f32)
///     .with_unset("point", UniformShape::Vec2);
///
/// uniforms.set("dt", 0.5_f32);
/// assert_eq!(uniforms.get("dt"), Some(0.5_f32.into()));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Uniforms {
    entries: Rc<RefCell<Vec<UniformEntry>>>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` with an initial value.
    pub fn with(self, name: &str, value: impl Into<UniformValue>) -> Self {
        let value = value.into();
        self.declare(name, value.shape(), Some(value));
        self
    }

    /// Declares `name` without a value.
    pub fn with_unset(self, name: &str, shape: UniformShape) -> Self {
        self.declare(name, shape, None);
        self
    }

    /// Declares a texture uniform.
    pub fn with_texture(self, name: &str, texture: Option<TextureId>) -> Self {
        self.declare(name, UniformShape::Texture, Some(UniformValue::Texture(texture)));
        self
    }

    /// Adds a declaration after construction. Redeclaring replaces the entry.
    pub fn declare(&self, name: &str, shape: UniformShape, value: Option<UniformValue>) {
        let mut entries = self.entries.borrow_mut();
        let entry = UniformEntry {
            name: name.to_owned(),
            shape,
            value,
        };
        match entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Updates the value of a declared uniform.
    ///
    /// Returns `false` (and leaves the table untouched) when `name` is not
    /// declared or the value has another shape.
    pub fn set(&self, name: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|e| e.name == name) {
            Some(entry) if entry.shape == value.shape() => {
                entry.value = Some(value);
                true
            }
            Some(entry) => {
                log::warn!(
                    "uniform `{name}` is declared as {:?}, ignoring {:?} value",
                    entry.shape,
                    value.shape()
                );
                false
            }
            None => {
                log::warn!("uniform `{name}` is not declared");
                false
            }
        }
    }

    /// Clears the value of a declared uniform.
    pub fn unset(&self, name: &str) {
        if let Some(entry) = self.entries.borrow_mut().iter_mut().find(|e| e.name == name) {
            entry.value = None;
        }
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> Ref<'_, Vec<UniformEntry>> {
        self.entries.borrow()
    }

    /// Whether both handles point to the same table.
    pub fn ptr_eq(&self, other: &Uniforms) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

/// One declared vertex attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeEntry {
    pub name: String,
    /// Floats per vertex (1 to 4).
    pub components: u32,
    pub data: Vec<f32>,
}

#[derive(Debug, Default)]
struct AttributeTable {
    entries: Vec<AttributeEntry>,
    version: u64,
}

/// Shared vertex attribute binding table.
///
/// The pipeline creates one GPU buffer per attribute when the pass is added and
/// re-uploads the data whenever the table changed since the last render.
#[derive(Clone, Debug, Default)]
pub struct Attributes {
    table: Rc<RefCell<AttributeTable>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, components: u32, data: Vec<f32>) -> Self {
        self.table.borrow_mut().entries.push(AttributeEntry {
            name: name.to_owned(),
            components,
            data,
        });
        self
    }

    /// Replaces the data of a declared attribute. Returns `false` if unknown.
    pub fn set(&self, name: &str, data: Vec<f32>) -> bool {
        let mut table = self.table.borrow_mut();
        let Some(entry) = table.entries.iter_mut().find(|e| e.name == name) else {
            log::warn!("attribute `{name}` is not declared");
            return false;
        };
        entry.data = data;
        table.version += 1;
        true
    }

    pub fn entries(&self) -> Ref<'_, [AttributeEntry]> {
        Ref::map(self.table.borrow(), |t| t.entries.as_slice())
    }

    /// Monotonic counter bumped by every [`set`](Self::set).
    pub fn version(&self) -> u64 {
        self.table.borrow().version
    }
}

/// Writing end of a pipeline output that other pipelines sample.
#[derive(Debug, Default)]
pub struct OutputSlot {
    cell: Rc<Cell<Option<TextureId>>>,
}

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, output: Option<TextureId>) {
        self.cell.set(output);
    }

    /// A read-only view for consumers.
    pub fn reader(&self) -> OutputRef {
        OutputRef {
            cell: Rc::clone(&self.cell),
        }
    }
}

/// Read-only view of another pipeline's latest output.
#[derive(Clone, Debug, Default)]
pub struct OutputRef {
    cell: Rc<Cell<Option<TextureId>>>,
}

impl OutputRef {
    pub fn get(&self) -> Option<TextureId> {
        self.cell.get()
    }
}
