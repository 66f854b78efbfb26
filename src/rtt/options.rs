use crate::device::{BlendMode, FilterMode, Primitive, TextureType, WrapMode};

/// Storage and sampling of every texture a pipeline owns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureOptions {
    pub texture_type: TextureType,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl TextureOptions {
    pub fn new(texture_type: TextureType) -> Self {
        Self {
            texture_type,
            ..Default::default()
        }
    }

    /// Sets both the minification and magnification filter.
    pub fn filter(mut self, filter: FilterMode) -> Self {
        self.min_filter = filter;
        self.mag_filter = filter;
        self
    }

    /// Sets the wrap mode on both axes.
    pub fn wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self
    }
}

/// Vertex data and draw shape of a pipeline's passes.
///
/// `vertices` feeds the `position` attribute, two floats per vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub primitive: Primitive,
    pub first: u32,
    pub count: u32,
}

impl Geometry {
    /// The unit square as a 4-vertex triangle strip.
    pub fn quad() -> Self {
        Self {
            vertices: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            primitive: Primitive::TriangleStrip,
            first: 0,
            count: 4,
        }
    }

    /// One point per vertex.
    pub fn points(vertices: Vec<f32>) -> Self {
        let count = (vertices.len() / 2) as u32;
        Self {
            vertices,
            primitive: Primitive::Points,
            first: 0,
            count,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::quad()
    }
}

/// Construction options of a [`Pipeline`](super::Pipeline).
///
/// Unset sizes default to the device surface size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub texture: TextureOptions,
    /// Number of previous outputs kept for lookback.
    pub history: usize,
    pub geometry: Option<Geometry>,
    pub blend: BlendMode,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = Some(width);
        self.viewport_height = Some(height);
        self
    }

    pub fn texture(mut self, texture: TextureOptions) -> Self {
        self.texture = texture;
        self
    }

    pub fn history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// New dimensions for [`Pipeline::resize`](super::Pipeline::resize).
///
/// Unset fields default to the device surface size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

impl ResizeOptions {
    /// Follow the surface for both texture and viewport sizes.
    pub fn surface() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = Some(width);
        self.viewport_height = Some(height);
        self
    }
}
