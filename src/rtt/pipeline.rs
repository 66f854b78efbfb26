//! The pipeline builder and pass executor.

use crate::device::{
    AttributeBinding, BlendMode, BufferId, DrawCall, Primitive, ProgramDesc, ProgramId,
    RenderDevice, Target, TargetFormat, TextureArrayBinding, TextureBinding, TextureDesc,
    TextureId,
};
use crate::error::RttError;
use crate::shader::{HISTORY_SAMPLER, INPUT_SAMPLER};

use super::bindings::{Attributes, OutputRef, OutputSlot, UniformShape, UniformValue, Uniforms};
use super::options::{Geometry, PipelineOptions, ResizeOptions, TextureOptions};
use super::targets::{HistoryRing, RenderTargets};
use super::{DEFAULT_VERTEX_SHADER, PAINT_FRAGMENT_SHADER};

/// Name of the geometry vertex attribute.
const POSITION: &str = "position";

/// A compiled program with its binding tables.
///
/// Iterated passes point at the same entry, so each program and each attribute
/// buffer exists once however many times it runs.
struct PassProgram {
    program: ProgramId,
    uniforms: Uniforms,
    attributes: Option<Attributes>,
    buffers: Vec<AttributeBinding>,
    uploaded_version: u64,
}

impl PassProgram {
    fn destroy(self, device: &mut dyn RenderDevice) {
        for binding in self.buffers {
            device.destroy_buffer(binding.buffer);
        }
        device.destroy_program(self.program);
    }
}

/// GPU objects that exist for the whole life of a pipeline, independent of
/// its passes.
struct Resources {
    targets: RenderTargets,
    geometry_buffer: BufferId,
    paint_program: ProgramId,
    paint_buffer: BufferId,
}

impl Resources {
    fn create(
        device: &mut dyn RenderDevice,
        desc: &TextureDesc,
        history: usize,
        geometry: &Geometry,
    ) -> Result<Self, RttError> {
        let targets = RenderTargets::allocate(device, desc, history)?;

        let geometry_buffer = match device.create_buffer(&geometry.vertices) {
            Ok(buffer) => buffer,
            Err(err) => {
                targets.destroy(device);
                return Err(err);
            }
        };

        let paint_program = match device.create_program(&ProgramDesc {
            vertex: DEFAULT_VERTEX_SHADER,
            fragment: PAINT_FRAGMENT_SHADER,
            target: TargetFormat::Surface,
            primitive: Primitive::TriangleStrip,
            blend: BlendMode::Replace,
        }) {
            Ok(program) => program,
            Err(err) => {
                device.destroy_buffer(geometry_buffer);
                targets.destroy(device);
                return Err(err);
            }
        };

        let paint_buffer = match device.create_buffer(&Geometry::quad().vertices) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_program(paint_program);
                device.destroy_buffer(geometry_buffer);
                targets.destroy(device);
                return Err(err);
            }
        };

        Ok(Self {
            targets,
            geometry_buffer,
            paint_program,
            paint_buffer,
        })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_buffer(self.paint_buffer);
        device.destroy_program(self.paint_program);
        device.destroy_buffer(self.geometry_buffer);
        self.targets.destroy(device);
    }
}

/// A chain of render-to-texture passes sharing ping-pong and history targets.
///
/// Every operation that touches the GPU takes the device explicitly and returns
/// the pipeline for chaining:
///
/// ```ignore
/// pipeline.clear(device)?.render(device)?.paint(device)?;
/// ```
///
/// # Resource ownership
///
/// The pipeline owns its textures, programs and buffers and releases them in
/// [`reset`](Self::reset) and [`destroy`](Self::destroy). Other pipelines only
/// ever see its output through [`output`](Self::output) or
/// [`output_ref`](Self::output_ref), bound as a texture uniform.
pub struct Pipeline {
    viewport_width: u32,
    viewport_height: u32,
    texture: TextureOptions,
    history_depth: usize,
    geometry: Geometry,
    blend: BlendMode,

    resources: Resources,
    programs: Vec<PassProgram>,
    /// Index into `programs` for every pass, in execution order.
    passes: Vec<usize>,

    render_index: usize,
    output: Option<TextureId>,
    published: OutputSlot,
}

fn texture_desc(width: u32, height: u32, options: TextureOptions) -> TextureDesc {
    TextureDesc {
        width,
        height,
        options,
    }
}

fn require_size(width: u32, height: u32) -> Result<(), RttError> {
    if width == 0 || height == 0 {
        return Err(RttError::InvalidContext(format!(
            "pipeline textures must not be empty, got {width}x{height}"
        )));
    }
    Ok(())
}

impl Pipeline {
    /// Creates a pipeline and allocates its targets.
    ///
    /// Sizes not given in `options` follow the device surface.
    ///
    /// # Errors
    ///
    /// [`RttError::InvalidContext`] when the resolved texture size is empty, or
    /// whatever the device reports while allocating. Nothing stays allocated on
    /// failure.
    pub fn new(device: &mut dyn RenderDevice, options: PipelineOptions) -> Result<Self, RttError> {
        let (surface_width, surface_height) = device.surface_size();
        let width = options.width.unwrap_or(surface_width);
        let height = options.height.unwrap_or(surface_height);
        require_size(width, height)?;

        let geometry = options.geometry.unwrap_or_default();
        let resources = Resources::create(
            device,
            &texture_desc(width, height, options.texture),
            options.history,
            &geometry,
        )?;

        Ok(Self {
            viewport_width: options.viewport_width.unwrap_or(surface_width),
            viewport_height: options.viewport_height.unwrap_or(surface_height),
            texture: options.texture,
            history_depth: options.history,
            geometry,
            blend: options.blend,
            resources,
            programs: Vec::new(),
            passes: Vec::new(),
            render_index: 0,
            output: None,
            published: OutputSlot::new(),
        })
    }

    /// Appends a pass built from a vertex and a fragment stage.
    ///
    /// Uniform and attribute values are read at every render, so the tables can
    /// keep changing after the pass is added. One vertex buffer is created per
    /// attribute.
    ///
    /// # Errors
    ///
    /// [`RttError::ShaderCompile`] or [`RttError::ProgramLink`]; the pipeline is
    /// left unchanged.
    pub fn add_vertex_fragment_pass(
        &mut self,
        device: &mut dyn RenderDevice,
        vertex: &str,
        fragment: &str,
        uniforms: &Uniforms,
        attributes: Option<&Attributes>,
    ) -> Result<&mut Self, RttError> {
        let program = device.create_program(&ProgramDesc {
            vertex,
            fragment,
            target: TargetFormat::Texture(self.texture.texture_type),
            primitive: self.geometry.primitive,
            blend: self.blend,
        })?;

        let mut pass = PassProgram {
            program,
            uniforms: uniforms.clone(),
            attributes: attributes.cloned(),
            buffers: Vec::new(),
            uploaded_version: 0,
        };

        if let Some(attributes) = attributes {
            pass.uploaded_version = attributes.version();
            for entry in attributes.entries().iter() {
                match device.create_buffer(&entry.data) {
                    Ok(buffer) => pass.buffers.push(AttributeBinding {
                        name: entry.name.clone(),
                        components: entry.components,
                        buffer,
                    }),
                    Err(err) => {
                        pass.destroy(device);
                        return Err(err);
                    }
                }
            }
        }

        log::debug!(
            "added pass {} (program {:?}, {} uniform(s))",
            self.passes.len(),
            program,
            uniforms.len()
        );
        self.programs.push(pass);
        self.passes.push(self.programs.len() - 1);
        Ok(self)
    }

    /// Appends a pass running `fragment` over the default full-screen quad.
    pub fn add_fragment_pass(
        &mut self,
        device: &mut dyn RenderDevice,
        fragment: &str,
        uniforms: &Uniforms,
    ) -> Result<&mut Self, RttError> {
        self.add_vertex_fragment_pass(device, DEFAULT_VERTEX_SHADER, fragment, uniforms, None)
    }

    /// Repeats the last pass `count` more times, sharing its program and
    /// binding tables.
    pub fn iterate_pass(&mut self, count: usize) -> &mut Self {
        let Some(&last) = self.passes.last() else {
            log::warn!("iterate_pass() called on a pipeline without passes");
            return self;
        };
        self.passes.extend(std::iter::repeat_n(last, count));
        self
    }

    /// Runs every pass once, front to back.
    ///
    /// Each pass flips the ping-pong index and writes the selected target while
    /// sampling the previous output. With history configured the last pass
    /// rotates the ring and writes its head instead.
    ///
    /// When a pass fails, output, ping-pong index and history ring are restored
    /// to their state before the call.
    pub fn render(&mut self, device: &mut dyn RenderDevice) -> Result<&mut Self, RttError> {
        if self.passes.is_empty() {
            log::warn!("render() called on a pipeline without passes");
            return Ok(self);
        }

        let output = self.output;
        let render_index = self.render_index;
        let history = self.resources.targets.history().clone();
        if let Err(err) = self.run_passes(device) {
            self.output = output;
            self.render_index = render_index;
            *self.resources.targets.history_mut() = history;
            return Err(err);
        }

        self.published.publish(self.output);
        Ok(self)
    }

    fn run_passes(&mut self, device: &mut dyn RenderDevice) -> Result<(), RttError> {
        let last = self.passes.len() - 1;
        for i in 0..self.passes.len() {
            let index = self.passes[i];
            self.render_index = (self.render_index + 1) % 2;

            let input = self.output;
            let mut target = self.resources.targets.color(self.render_index);
            if i == last {
                if let Some(head) = self.resources.targets.history_mut().rotate() {
                    target = head;
                }
            }

            self.upload_attributes(device, index)?;
            let call = self.pass_draw_call(device, index, input, target)?;
            device.draw(&call)?;
            self.output = Some(target);
        }
        Ok(())
    }

    fn upload_attributes(&mut self, device: &mut dyn RenderDevice, index: usize) -> Result<(), RttError> {
        let pass = &mut self.programs[index];
        let Some(attributes) = &pass.attributes else {
            return Ok(());
        };
        let version = attributes.version();
        if version == pass.uploaded_version {
            return Ok(());
        }
        for entry in attributes.entries().iter() {
            if let Some(binding) = pass.buffers.iter().find(|b| b.name == entry.name) {
                device.write_buffer(binding.buffer, &entry.data)?;
            }
        }
        pass.uploaded_version = version;
        Ok(())
    }

    /// Resolves the bindings of one pass against its program's interface.
    ///
    /// Texture units: 0 is the input, then one per texture uniform in
    /// declaration order, then the history lookback frames.
    fn pass_draw_call(
        &self,
        device: &dyn RenderDevice,
        index: usize,
        input: Option<TextureId>,
        target: TextureId,
    ) -> Result<DrawCall, RttError> {
        let pass = &self.programs[index];
        let interface = device
            .program_interface(pass.program)
            .ok_or(RttError::UnknownProgram(pass.program))?;

        let mut uniforms = Vec::new();
        let mut textures = Vec::new();
        let mut texture_arrays = Vec::new();

        if interface.declares(INPUT_SAMPLER) {
            textures.push(TextureBinding {
                name: INPUT_SAMPLER.to_owned(),
                unit: 0,
                texture: input,
            });
        }

        let mut next_unit = 1;
        for entry in pass.uniforms.entries().iter() {
            if entry.shape == UniformShape::Texture {
                let unit = next_unit;
                next_unit += 1;
                if !interface.declares(&entry.name) {
                    log::trace!("program {:?} does not use texture `{}`", pass.program, entry.name);
                    continue;
                }
                let texture = match entry.value {
                    Some(UniformValue::Texture(texture)) => texture,
                    _ => None,
                };
                textures.push(TextureBinding {
                    name: entry.name.clone(),
                    unit,
                    texture,
                });
                continue;
            }

            let Some(value) = entry.value else {
                log::trace!("uniform `{}` has no value yet", entry.name);
                continue;
            };
            if interface.uniform(&entry.name).is_none() {
                log::trace!("program {:?} does not use uniform `{}`", pass.program, entry.name);
                continue;
            }
            uniforms.push((entry.name.clone(), value));
        }

        let lookback = self.resources.targets.history().lookback();
        if !lookback.is_empty() && interface.declares_array(HISTORY_SAMPLER, lookback.len()) {
            texture_arrays.push(TextureArrayBinding {
                name: HISTORY_SAMPLER.to_owned(),
                first_unit: next_unit,
                textures: lookback.to_vec(),
            });
        }

        let mut attributes = Vec::with_capacity(1 + pass.buffers.len());
        attributes.push(AttributeBinding {
            name: POSITION.to_owned(),
            components: 2,
            buffer: self.resources.geometry_buffer,
        });
        attributes.extend(pass.buffers.iter().cloned());
        attributes.retain(|a| {
            let used = interface.attribute(&a.name).is_some();
            if !used {
                log::trace!("program {:?} does not use attribute `{}`", pass.program, a.name);
            }
            used
        });

        Ok(DrawCall {
            program: pass.program,
            target: Target::Texture(target),
            viewport: self.resources.targets.size(),
            uniforms,
            textures,
            texture_arrays,
            attributes,
            primitive: self.geometry.primitive,
            first: self.geometry.first,
            count: self.geometry.count,
        })
    }

    /// Reallocates every owned texture at the new size.
    ///
    /// Passes, bindings and texture ids survive, contents do not. Unset fields
    /// follow the device surface.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, options: ResizeOptions) -> Result<&mut Self, RttError> {
        let (surface_width, surface_height) = device.surface_size();
        let width = options.width.unwrap_or(surface_width);
        let height = options.height.unwrap_or(surface_height);
        require_size(width, height)?;

        self.resources.targets.resize(device, width, height)?;
        self.viewport_width = options.viewport_width.unwrap_or(surface_width);
        self.viewport_height = options.viewport_height.unwrap_or(surface_height);
        log::debug!(
            "resized pipeline to {width}x{height}, viewport {}x{}",
            self.viewport_width,
            self.viewport_height
        );
        Ok(self)
    }

    /// Releases every pass and GPU object and allocates fresh targets.
    ///
    /// The pipeline comes back without passes and without output.
    pub fn reset(&mut self, device: &mut dyn RenderDevice) -> Result<&mut Self, RttError> {
        self.release_passes(device);
        self.output = None;
        self.render_index = 0;
        self.published.publish(None);

        let (width, height) = self.resources.targets.size();
        let fresh = Resources::create(
            device,
            &texture_desc(width, height, self.texture),
            self.history_depth,
            &self.geometry,
        )?;
        std::mem::replace(&mut self.resources, fresh).destroy(device);
        log::debug!("pipeline reset");
        Ok(self)
    }

    fn release_passes(&mut self, device: &mut dyn RenderDevice) {
        self.passes.clear();
        for pass in self.programs.drain(..) {
            pass.destroy(device);
        }
    }

    /// Clears the current output to transparent black.
    ///
    /// Does nothing (with a warning) before the first render.
    pub fn clear(&mut self, device: &mut dyn RenderDevice) -> Result<&mut Self, RttError> {
        match self.output {
            Some(output) => device.clear(output)?,
            None => log::warn!("clear() skipped: {}", RttError::NoOutputYet),
        }
        Ok(self)
    }

    /// Draws the current output to the surface at the viewport size.
    ///
    /// Does nothing (with a warning) before the first render.
    pub fn paint(&mut self, device: &mut dyn RenderDevice) -> Result<&mut Self, RttError> {
        let Some(output) = self.output else {
            log::warn!("paint() skipped: {}", RttError::NoOutputYet);
            return Ok(self);
        };

        let quad = Geometry::quad();
        device.draw(&DrawCall {
            program: self.resources.paint_program,
            target: Target::Surface,
            viewport: (self.viewport_width, self.viewport_height),
            uniforms: Vec::new(),
            textures: vec![TextureBinding {
                name: INPUT_SAMPLER.to_owned(),
                unit: 0,
                texture: Some(output),
            }],
            texture_arrays: Vec::new(),
            attributes: vec![AttributeBinding {
                name: POSITION.to_owned(),
                components: 2,
                buffer: self.resources.paint_buffer,
            }],
            primitive: quad.primitive,
            first: quad.first,
            count: quad.count,
        })?;
        Ok(self)
    }

    /// Exchanges the two ping-pong targets without rendering.
    pub fn swap(&mut self) -> &mut Self {
        self.resources.targets.swap();
        self
    }

    /// Releases everything the pipeline owns.
    pub fn destroy(mut self, device: &mut dyn RenderDevice) {
        self.release_passes(device);
        self.published.publish(None);
        self.resources.destroy(device);
    }

    /// Texture written by the last pass of the latest render.
    pub fn output(&self) -> Option<TextureId> {
        self.output
    }

    /// A handle that always reads this pipeline's latest output.
    pub fn output_ref(&self) -> OutputRef {
        self.published.reader()
    }

    /// Ping-pong target written by the latest pass (0 or 1).
    pub fn render_index(&self) -> usize {
        self.render_index
    }

    pub fn color_targets(&self) -> [TextureId; 2] {
        self.resources.targets.colors()
    }

    pub fn history(&self) -> &HistoryRing {
        self.resources.targets.history()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn size(&self) -> (u32, u32) {
        self.resources.targets.size()
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, FilterMode, RecordingDevice, TextureType};

    const COPY: &str = r#"
@group(0) @binding(0) var t_sampler: texture_2d<f32>;
@group(0) @binding(1) var t_sampler_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
    return textureSample(t_sampler, t_sampler_sampler, uv);
}
"#;

    const ADVECT: &str = r#"
struct Params {
    d: vec2f,
    dt: f32,
}
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var t_sampler: texture_2d<f32>;
@group(0) @binding(2) var t_sampler_sampler: sampler;
@group(0) @binding(3) var motion: texture_2d<f32>;
@group(0) @binding(4) var motion_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
    let m = textureSample(motion, motion_sampler, uv);
    return textureSample(t_sampler, t_sampler_sampler, uv - m.xy * params.d * params.dt);
}
"#;

    const TRAILS: &str = r#"
@group(0) @binding(0) var t_sampler: texture_2d<f32>;
@group(0) @binding(1) var t_history_0: texture_2d<f32>;
@group(0) @binding(2) var t_history_1: texture_2d<f32>;
@group(0) @binding(3) var linear: sampler;

@fragment
fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
    let a = textureSample(t_history_0, linear, uv);
    let b = textureSample(t_history_1, linear, uv);
    return textureSample(t_sampler, linear, uv) * 0.5 + (a + b) * 0.25;
}
"#;

    fn pipeline(device: &mut RecordingDevice, history: usize) -> Pipeline {
        Pipeline::new(device, PipelineOptions::new().size(64, 64).history(history)).unwrap()
    }

    fn pass_draws(device: &RecordingDevice, program: ProgramId) -> Vec<DrawCall> {
        device.draws().into_iter().filter(|d| d.program == program).cloned().collect()
    }

    #[test]
    fn zero_size_is_an_invalid_context() {
        let mut device = RecordingDevice::new(0, 0);
        let err = Pipeline::new(&mut device, PipelineOptions::new()).err().expect("must fail");
        assert!(matches!(err, RttError::InvalidContext(_)));
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn sizes_default_to_the_surface() {
        let mut device = RecordingDevice::new(320, 200);
        let pipeline = Pipeline::new(&mut device, PipelineOptions::new()).unwrap();
        assert_eq!(pipeline.size(), (320, 200));
        assert_eq!(pipeline.viewport(), (320, 200));
    }

    #[test]
    fn render_index_follows_pass_count() {
        for passes in 1..=4 {
            let mut device = RecordingDevice::new(64, 64);
            let mut pipeline = pipeline(&mut device, 0);
            let uniforms = Uniforms::new();
            pipeline
                .add_fragment_pass(&mut device, COPY, &uniforms)
                .unwrap()
                .iterate_pass(passes - 1);
            pipeline.render(&mut device).unwrap();

            assert_eq!(pipeline.render_index(), passes % 2);
            assert_eq!(pipeline.output(), Some(pipeline.color_targets()[pipeline.render_index()]));
            assert_eq!(device.draws().len(), passes);
        }
    }

    #[test]
    fn passes_never_sample_their_target() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let uniforms = Uniforms::new();
        pipeline
            .add_fragment_pass(&mut device, COPY, &uniforms)
            .unwrap()
            .add_fragment_pass(&mut device, COPY, &uniforms)
            .unwrap()
            .add_fragment_pass(&mut device, COPY, &uniforms)
            .unwrap();
        pipeline.render(&mut device).unwrap();

        let draws = device.draws();
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[0].texture(INPUT_SAMPLER).unwrap().texture, None);
        for pair in draws.windows(2) {
            let Target::Texture(written) = pair[0].target else {
                panic!("pass wrote the surface");
            };
            assert_eq!(pair[1].texture(INPUT_SAMPLER).unwrap().texture, Some(written));
        }
        for draw in &draws {
            if let Some(input) = draw.texture(INPUT_SAMPLER).unwrap().texture {
                assert_ne!(Target::Texture(input), draw.target);
            }
        }
        assert_eq!(draws[2].target, Target::Texture(pipeline.output().unwrap()));
        assert_ne!(draws[0].texture(INPUT_SAMPLER).unwrap().texture, pipeline.output());
    }

    #[test]
    fn history_keeps_previous_outputs() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 2);
        pipeline.add_fragment_pass(&mut device, TRAILS, &Uniforms::new()).unwrap();

        let mut outputs = Vec::new();
        for _ in 0..3 {
            pipeline.render(&mut device).unwrap();
            outputs.push(pipeline.output().unwrap());
        }

        let ring = pipeline.history().slots();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring[0], outputs[2]);
        assert_eq!(ring[1], outputs[1]);
        assert_eq!(ring[2], outputs[0]);

        let draws = device.draws();
        let last = draws.last().unwrap();
        let history = &last.texture_arrays[0];
        assert_eq!(history.name, HISTORY_SAMPLER);
        assert_eq!(history.first_unit, 1);
        assert_eq!(history.textures, vec![outputs[1], outputs[0]]);
    }

    #[test]
    fn history_only_replaces_the_last_pass_target() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 1);
        pipeline
            .add_fragment_pass(&mut device, COPY, &Uniforms::new())
            .unwrap()
            .iterate_pass(1);
        pipeline.render(&mut device).unwrap();

        let draws = device.draws();
        let colors = pipeline.color_targets();
        assert_eq!(draws[0].target, Target::Texture(colors[1]));
        assert_eq!(draws[1].target, Target::Texture(pipeline.history().slots()[0]));
        assert_eq!(pipeline.render_index(), 0);
    }

    #[test]
    fn clear_and_paint_before_render_do_nothing() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();
        let before = device.commands().len();

        pipeline.clear(&mut device).unwrap().paint(&mut device).unwrap();
        assert_eq!(device.commands().len(), before);
    }

    #[test]
    fn clear_targets_the_output() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();
        pipeline.render(&mut device).unwrap().clear(&mut device).unwrap();
        let output = pipeline.output().unwrap();
        assert_eq!(device.commands().last(), Some(&Command::Clear(output)));
    }

    #[test]
    fn paint_draws_once_to_the_surface() {
        let mut device = RecordingDevice::new(800, 600);
        let mut pipeline = Pipeline::new(
            &mut device,
            PipelineOptions::new().size(128, 128).viewport(400, 300),
        )
        .unwrap();
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();
        pipeline.render(&mut device).unwrap();

        let before = device.draws().len();
        pipeline.paint(&mut device).unwrap();
        let draws = device.draws();
        assert_eq!(draws.len(), before + 1);

        let paint = draws.last().unwrap();
        assert_eq!(paint.target, Target::Surface);
        assert_eq!(paint.viewport, (400, 300));
        assert_eq!(paint.texture(INPUT_SAMPLER).unwrap().texture, pipeline.output());
        assert_eq!(paint.count, 4);
    }

    #[test]
    fn undeclared_and_unset_uniforms_are_skipped() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let uniforms = Uniforms::new()
            .with("d", [0.5_f32, 0.5])
            .with("not_in_shader", 3.0_f32)
            .with_unset("dt", UniformShape::Float)
            .with_texture("motion", Some(TextureId(99)));
        pipeline.add_fragment_pass(&mut device, ADVECT, &uniforms).unwrap();
        pipeline.render(&mut device).unwrap();

        let draw = device.draws()[0].clone();
        assert_eq!(draw.uniform("d"), Some(&UniformValue::Vec2([0.5, 0.5])));
        assert_eq!(draw.uniform("not_in_shader"), None);
        assert_eq!(draw.uniform("dt"), None);

        uniforms.set("dt", 0.25_f32);
        pipeline.render(&mut device).unwrap();
        let draw = device.draws()[1].clone();
        assert_eq!(draw.uniform("dt"), Some(&UniformValue::Float(0.25)));
        assert_eq!(draw.uniform("d"), Some(&UniformValue::Vec2([0.5, 0.5])));
    }

    #[test]
    fn texture_units_advance_in_declaration_order() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let uniforms = Uniforms::new()
            .with_texture("unused", Some(TextureId(40)))
            .with("d", [0.0_f32, 0.0])
            .with_texture("motion", Some(TextureId(41)));
        pipeline.add_fragment_pass(&mut device, ADVECT, &uniforms).unwrap();
        pipeline.render(&mut device).unwrap();

        let draw = device.draws()[0].clone();
        assert_eq!(draw.texture(INPUT_SAMPLER).unwrap().unit, 0);
        assert!(draw.texture("unused").is_none());
        let motion = draw.texture("motion").unwrap();
        assert_eq!(motion.unit, 2);
        assert_eq!(motion.texture, Some(TextureId(41)));
    }

    #[test]
    fn texture_uniforms_are_late_bound() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let uniforms = Uniforms::new().with_texture("motion", None);
        pipeline.add_fragment_pass(&mut device, ADVECT, &uniforms).unwrap();

        pipeline.render(&mut device).unwrap();
        uniforms.set("motion", TextureId(7));
        pipeline.render(&mut device).unwrap();

        let draws = device.draws();
        assert_eq!(draws[0].texture("motion").unwrap().texture, None);
        assert_eq!(draws[1].texture("motion").unwrap().texture, Some(TextureId(7)));
    }

    #[test]
    fn same_size_resize_keeps_the_draw_sequence() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let uniforms = Uniforms::new().with("d", [0.1_f32, 0.1]).with_texture("motion", None);
        pipeline
            .add_fragment_pass(&mut device, ADVECT, &uniforms)
            .unwrap()
            .add_fragment_pass(&mut device, COPY, &uniforms)
            .unwrap();

        pipeline.render(&mut device).unwrap();
        let first: Vec<DrawCall> = device.draws().into_iter().cloned().collect();
        let targets = pipeline.color_targets();

        pipeline.resize(&mut device, ResizeOptions::surface().size(64, 64)).unwrap();
        assert_eq!(pipeline.pass_count(), 2);
        assert_eq!(pipeline.color_targets(), targets);

        device.take_commands();
        pipeline.render(&mut device).unwrap();
        let second: Vec<DrawCall> = device.draws().into_iter().cloned().collect();

        assert_eq!(second.len(), first.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.program, b.program);
            assert_eq!(a.uniforms, b.uniforms);
            assert_eq!(a.viewport, b.viewport);
        }
    }

    #[test]
    fn resize_reallocates_every_texture() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 1);
        pipeline.resize(&mut device, ResizeOptions::surface().size(32, 16)).unwrap();

        assert_eq!(pipeline.size(), (32, 16));
        for id in pipeline.color_targets().iter().chain(pipeline.history().slots()) {
            assert_eq!(device.texture_size(*id), Some((32, 16)));
        }
        assert_eq!(device.live_textures(), 4);
    }

    #[test]
    fn failed_resize_keeps_the_previous_size() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();
        device.fail_resize_of(pipeline.color_targets()[1]);

        assert!(pipeline.resize(&mut device, ResizeOptions::surface().size(32, 32)).is_err());
        assert_eq!(pipeline.size(), (64, 64));
        assert_eq!(device.texture_size(pipeline.color_targets()[0]), Some((64, 64)));

        pipeline.render(&mut device).unwrap();
        assert_eq!(device.draws().last().unwrap().viewport, (64, 64));
    }

    #[test]
    fn failed_render_restores_output_and_history() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 1);
        let reader = pipeline.output_ref();
        pipeline
            .add_fragment_pass(&mut device, COPY, &Uniforms::new())
            .unwrap()
            .iterate_pass(1);
        pipeline.render(&mut device).unwrap();

        let output = pipeline.output();
        let render_index = pipeline.render_index();
        let ring = pipeline.history().slots().to_vec();

        device.fail_draws_after(1);
        let err = pipeline.render(&mut device).err().expect("second pass must fail");
        assert!(matches!(err, RttError::Device(_)));
        assert_eq!(pipeline.output(), output);
        assert_eq!(reader.get(), output);
        assert_eq!(pipeline.render_index(), render_index);
        assert_eq!(pipeline.history().slots(), ring.as_slice());
    }

    #[test]
    fn swap_twice_restores_targets() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let original = pipeline.color_targets();

        pipeline.swap();
        assert_eq!(pipeline.color_targets(), [original[1], original[0]]);
        pipeline.swap();
        assert_eq!(pipeline.color_targets(), original);
    }

    #[test]
    fn failed_pass_leaves_nothing_behind() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let programs = device.live_programs();

        let err = pipeline
            .add_fragment_pass(&mut device, "@fragment fn fs_main( {", &Uniforms::new())
            .err()
            .expect("must fail");
        assert!(matches!(err, RttError::ShaderCompile { .. }));
        assert_eq!(pipeline.pass_count(), 0);
        assert_eq!(device.live_programs(), programs);
    }

    #[test]
    fn iterate_pass_reuses_the_program() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        pipeline.iterate_pass(3);
        assert_eq!(pipeline.pass_count(), 0);

        let programs = device.live_programs();
        pipeline
            .add_fragment_pass(&mut device, COPY, &Uniforms::new())
            .unwrap()
            .iterate_pass(3);
        assert_eq!(pipeline.pass_count(), 4);
        assert_eq!(device.live_programs(), programs + 1);

        pipeline.render(&mut device).unwrap();
        let program = device.draws()[0].program;
        assert_eq!(pass_draws(&device, program).len(), 4);
    }

    #[test]
    fn empty_pipeline_renders_nothing() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        pipeline.render(&mut device).unwrap();
        assert!(device.draws().is_empty());
        assert_eq!(pipeline.output(), None);
    }

    #[test]
    fn custom_geometry_is_drawn_verbatim() {
        let mut device = RecordingDevice::new(64, 64);
        let points = Geometry::points(vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);
        let mut pipeline = Pipeline::new(
            &mut device,
            PipelineOptions::new()
                .size(16, 16)
                .geometry(points)
                .texture(TextureOptions::new(TextureType::HalfFloat).filter(FilterMode::Linear))
                .blend(BlendMode::Additive),
        )
        .unwrap();
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();
        pipeline.render(&mut device).unwrap();

        let draw = device.draws()[0].clone();
        assert_eq!(draw.primitive, Primitive::Points);
        assert_eq!((draw.first, draw.count), (0, 3));
        assert_eq!(draw.viewport, (16, 16));
    }

    #[test]
    fn pass_attributes_are_uploaded_when_changed() {
        const VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) clip: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs_main(@location(0) position: vec2f, @location(1) offset: vec2f) -> VertexOutput {
    var out: VertexOutput;
    out.uv = position;
    out.clip = vec4f(position + offset, 0.0, 1.0);
    return out;
}
"#;
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let attributes = Attributes::new().with("offset", 2, vec![0.0; 8]);
        pipeline
            .add_vertex_fragment_pass(&mut device, VERTEX, COPY, &Uniforms::new(), Some(&attributes))
            .unwrap();

        pipeline.render(&mut device).unwrap();
        let draw = device.draws()[0].clone();
        let names: Vec<&str> = draw.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["position", "offset"]);
        let offset = draw.attributes[1].buffer;

        attributes.set("offset", vec![0.5; 8]);
        pipeline.render(&mut device).unwrap();
        assert_eq!(device.buffer_data(offset), Some(&[0.5f32; 8][..]));
    }

    #[test]
    fn output_ref_tracks_renders_and_reset() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 0);
        let reader = pipeline.output_ref();
        pipeline.add_fragment_pass(&mut device, COPY, &Uniforms::new()).unwrap();

        pipeline.render(&mut device).unwrap();
        assert_eq!(reader.get(), pipeline.output());

        pipeline.reset(&mut device).unwrap();
        assert_eq!(reader.get(), None);
        assert_eq!(pipeline.pass_count(), 0);
        assert_eq!(pipeline.output(), None);
    }

    #[test]
    fn reset_and_destroy_release_everything() {
        let mut device = RecordingDevice::new(64, 64);
        let mut pipeline = pipeline(&mut device, 2);
        let attributes = Attributes::new().with("unused", 1, vec![0.0; 4]);
        pipeline
            .add_vertex_fragment_pass(&mut device, DEFAULT_VERTEX_SHADER, COPY, &Uniforms::new(), Some(&attributes))
            .unwrap();
        let textures = device.live_textures();
        let buffers = device.live_buffers();

        pipeline.reset(&mut device).unwrap();
        assert_eq!(device.live_textures(), textures);
        assert_eq!(device.live_buffers(), buffers - 1);
        assert_eq!(device.live_programs(), 1);

        pipeline.destroy(&mut device);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
    }
}
