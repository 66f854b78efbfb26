//! Uniform types as WGSL lays them out in a uniform buffer.

use naga::TypeInner;

use crate::rtt::UniformValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
    Bool,
}

impl ScalarKind {
    pub(crate) fn from_naga(scalar: naga::Scalar) -> Option<Self> {
        match scalar.kind {
            naga::ScalarKind::Float if scalar.width == 4 => Some(ScalarKind::Float),
            naga::ScalarKind::Sint if scalar.width == 4 => Some(ScalarKind::Sint),
            naga::ScalarKind::Uint if scalar.width == 4 => Some(ScalarKind::Uint),
            naga::ScalarKind::Bool => Some(ScalarKind::Bool),
            _ => None,
        }
    }
}

/// Shape of a scalar, vector or matrix uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformType {
    Scalar(ScalarKind),
    Vector { size: u8, kind: ScalarKind },
    /// Always `f32` in WGSL.
    Matrix { columns: u8, rows: u8 },
}

impl UniformType {
    pub(crate) fn from_naga(inner: &TypeInner) -> Option<Self> {
        match *inner {
            TypeInner::Scalar(scalar) => Some(UniformType::Scalar(ScalarKind::from_naga(scalar)?)),
            TypeInner::Vector { size, scalar } => Some(UniformType::Vector {
                size: size as u8,
                kind: ScalarKind::from_naga(scalar)?,
            }),
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } if scalar.width == 4 => Some(UniformType::Matrix {
                columns: columns as u8,
                rows: rows as u8,
            }),
            _ => None,
        }
    }
}

fn floats(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Column-major matrix with each column padded to the WGSL column stride.
fn matrix(values: &[f32], columns: usize, rows: usize) -> Vec<u8> {
    let stride = if rows == 2 { 2 } else { 4 };
    let mut padded = vec![0.0f32; columns * stride];
    for c in 0..columns {
        padded[c * stride..c * stride + rows].copy_from_slice(&values[c * rows..(c + 1) * rows]);
    }
    floats(&padded)
}

/// Encodes `value` for a uniform of type `ty`.
///
/// Returns `None` when the value does not fit the declared type; texture values
/// are never encoded here.
pub fn encode_uniform(value: &UniformValue, ty: UniformType) -> Option<Vec<u8>> {
    use ScalarKind::*;

    match (value, ty) {
        (UniformValue::Float(v), UniformType::Scalar(Float)) => Some(floats(&[*v])),
        (UniformValue::Int(v), UniformType::Scalar(Sint)) => Some(v.to_ne_bytes().to_vec()),
        (UniformValue::Int(v), UniformType::Scalar(Uint)) => {
            u32::try_from(*v).ok().map(|v| v.to_ne_bytes().to_vec())
        }
        (UniformValue::Vec2(v), UniformType::Vector { size: 2, kind: Float }) => Some(floats(v)),
        (UniformValue::Vec3(v), UniformType::Vector { size: 3, kind: Float }) => Some(floats(v)),
        (UniformValue::Vec4(v), UniformType::Vector { size: 4, kind: Float }) => Some(floats(v)),
        (UniformValue::Mat2(m), UniformType::Matrix { columns: 2, rows: 2 }) => Some(matrix(m, 2, 2)),
        (UniformValue::Mat3(m), UniformType::Matrix { columns: 3, rows: 3 }) => Some(matrix(m, 3, 3)),
        (UniformValue::Mat4(m), UniformType::Matrix { columns: 4, rows: 4 }) => Some(matrix(m, 4, 4)),
        _ => None,
    }
}
