use std::borrow::Cow;

use glam::Vec2;

use crate::device::{RenderDevice, TextureType};
use crate::error::RttError;
use crate::input::PointerEvent;
use crate::rtt::{OutputRef, OutputSlot, Pipeline, PipelineOptions, TextureOptions, UniformShape, Uniforms};

use super::{EffectHooks, StageConfig, StageContext, with_cleanup};

/// Pointer state feeding the motion injection.
///
/// Positions are in uv space (origin top-left), quantized to the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionState {
    cells: u32,
    pub point: Option<Vec2>,
    pub last_point: Option<Vec2>,
    /// Pointer displacement since the previous move, in surface units.
    pub velocity: Vec2,
    pub dye: f32,
    pub add_dye: bool,
    old_mouse: Vec2,
}

impl MotionState {
    pub fn new(cells: u32) -> Self {
        Self {
            cells,
            point: None,
            last_point: None,
            velocity: Vec2::ZERO,
            dye: 0.0,
            add_dye: false,
            old_mouse: Vec2::ZERO,
        }
    }

    /// Records a pointer move to `(x, y)` pixels on a `width` x `height` surface.
    pub fn moved(&mut self, x: f32, y: f32, width: u32, height: u32) {
        let size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        let mouse = Vec2::new(x, y);
        let cells = self.cells as f32;

        let point = (mouse / size * cells).floor() / cells;
        self.last_point = Some(self.point.unwrap_or(point));
        self.point = Some(point);

        self.velocity = (mouse - self.old_mouse) / size;
        if self.add_dye {
            self.dye = 1.0;
        }
        self.old_mouse = mouse;
    }

    /// Back to neutral after a frame used the injected motion.
    pub fn consume(&mut self) {
        self.velocity = Vec2::ZERO;
        self.dye = 0.0;
    }

    fn bind(&self, uniforms: &Uniforms) {
        if let (Some(point), Some(last_point)) = (self.point, self.last_point) {
            uniforms.set("point", point);
            uniforms.set("last_point", last_point);
        }
        uniforms.set("velocity", self.velocity);
        uniforms.set("dye", self.dye);
    }
}

/// Turns pointer input into a velocity and dye field on the fluid grid.
pub struct Motion {
    source: Cow<'static, str>,
    cells: u32,
    state: MotionState,
    uniforms: Uniforms,
    pipeline: Option<Pipeline>,
    output: OutputSlot,
}

impl Motion {
    pub fn new(config: &StageConfig, source: Cow<'static, str>) -> Self {
        Self {
            source,
            cells: config.cells,
            state: MotionState::new(config.cells),
            uniforms: Uniforms::new()
                .with_unset("point", UniformShape::Vec2)
                .with_unset("last_point", UniformShape::Vec2)
                .with("dye", 0.0_f32)
                .with("velocity", Vec2::ZERO)
                .with("ratio", 1.0_f32),
            pipeline: None,
            output: OutputSlot::new(),
        }
    }

    /// The motion field, for the fluid solver.
    pub fn output(&self) -> OutputRef {
        self.output.reader()
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }
}

impl EffectHooks for Motion {
    fn initialize(&mut self, device: &mut dyn RenderDevice, ctx: &StageContext) -> Result<(), RttError> {
        self.uniforms.set("ratio", ctx.aspect);
        let pipeline = Pipeline::new(
            device,
            PipelineOptions::new()
                .size(self.cells, self.cells)
                .texture(TextureOptions::new(TextureType::Float)),
        )?;
        let pipeline = with_cleanup(device, pipeline, |pipeline, device| {
            pipeline.add_fragment_pass(device, &self.source, &self.uniforms)?.render(device)?;
            Ok(())
        })?;
        self.output.publish(pipeline.output());
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn update(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        self.state.bind(&self.uniforms);
        pipeline.render(device)?;
        self.output.publish(pipeline.output());
        self.state.consume();
        Ok(())
    }

    fn resize(&mut self, _device: &mut dyn RenderDevice, ctx: &StageContext) -> Result<(), RttError> {
        self.uniforms.set("ratio", ctx.aspect);
        Ok(())
    }

    fn pointer(
        &mut self,
        _device: &mut dyn RenderDevice,
        ctx: &StageContext,
        event: &PointerEvent,
    ) -> Result<(), RttError> {
        match *event {
            PointerEvent::Down => self.state.add_dye = true,
            PointerEvent::Up => self.state.add_dye = false,
            PointerEvent::Moved { x, y } => self.state.moved(x, y, ctx.width, ctx.height),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordingDevice, Target};
    use crate::rtt::UniformValue;

    #[test]
    fn first_move_starts_a_segment_at_the_pointer() {
        let mut state = MotionState::new(256);
        state.moved(100.0, 50.0, 200, 100);
        assert_eq!(state.point, Some(Vec2::new(0.5, 0.5)));
        assert_eq!(state.last_point, state.point);
        assert_eq!(state.velocity, Vec2::new(0.5, 0.5));
        assert_eq!(state.dye, 0.0);

        state.moved(150.0, 50.0, 200, 100);
        assert_eq!(state.last_point, Some(Vec2::new(0.5, 0.5)));
        assert_eq!(state.velocity, Vec2::new(0.25, 0.0));
    }

    #[test]
    fn points_are_quantized_to_cells() {
        let mut state = MotionState::new(4);
        state.moved(30.0, 99.0, 100, 100);
        assert_eq!(state.point, Some(Vec2::new(0.25, 0.75)));
    }

    #[test]
    fn dye_needs_a_pressed_button() {
        let mut state = MotionState::new(16);
        state.moved(1.0, 1.0, 16, 16);
        assert_eq!(state.dye, 0.0);
        state.add_dye = true;
        state.moved(2.0, 1.0, 16, 16);
        assert_eq!(state.dye, 1.0);
    }

    #[test]
    fn consume_resets_velocity_and_dye() {
        let mut state = MotionState::new(16);
        state.add_dye = true;
        state.moved(8.0, 8.0, 16, 16);
        state.consume();
        assert_eq!(state.velocity, Vec2::ZERO);
        assert_eq!(state.dye, 0.0);
        assert!(state.point.is_some());
    }

    #[test]
    fn update_binds_then_resets() {
        let config = StageConfig {
            cells: 8,
            ..Default::default()
        };
        let ctx = StageContext::new(16, 16);
        let mut device = RecordingDevice::new(16, 16);
        let mut motion = Motion::new(&config, Cow::Borrowed(include_str!("shaders/motion.wgsl")));
        motion.initialize(&mut device, &ctx).unwrap();

        motion.pointer(&mut device, &ctx, &PointerEvent::Down).unwrap();
        motion.pointer(&mut device, &ctx, &PointerEvent::Moved { x: 8.0, y: 4.0 }).unwrap();
        device.take_commands();
        motion.update(&mut device, &ctx).unwrap();

        let draws = device.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].uniform("dye"), Some(&UniformValue::Float(1.0)));
        assert_eq!(draws[0].uniform("point"), Some(&UniformValue::Vec2([0.5, 0.25])));
        assert_eq!(draws[0].target, Target::Texture(motion.output().get().unwrap()));
        assert_eq!(motion.state().velocity, Vec2::ZERO);
        assert_eq!(motion.state().dye, 0.0);
    }

    #[test]
    fn failed_initialize_releases_everything() {
        let ctx = StageContext::new(16, 16);
        let mut device = RecordingDevice::new(16, 16);
        let before = device.live_objects();

        let mut motion = Motion::new(&StageConfig::default(), Cow::Borrowed("@fragment fn fs_main( {"));
        let err = motion.initialize(&mut device, &ctx).unwrap_err();
        assert!(matches!(err, RttError::ShaderCompile { .. }));
        assert_eq!(device.live_objects(), before);

        let mut motion = Motion::new(&StageConfig::default(), Cow::Borrowed(include_str!("shaders/motion.wgsl")));
        device.fail_draws_after(0);
        assert!(motion.initialize(&mut device, &ctx).is_err());
        assert_eq!(device.live_objects(), before);
        assert_eq!(motion.output().get(), None);
    }
}
