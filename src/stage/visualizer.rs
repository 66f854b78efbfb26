use std::borrow::Cow;

use crate::device::{BlendMode, FilterMode, RenderDevice, TextureType};
use crate::error::RttError;
use crate::rtt::{OutputRef, Pipeline, PipelineOptions, ResizeOptions, TextureOptions, Uniforms};

use super::{EffectHooks, StageContext, with_cleanup};

/// Composes the dye field and the particle layer and paints the result.
pub struct Visualizer {
    source: Cow<'static, str>,
    dye: OutputRef,
    particles: OutputRef,
    uniforms: Uniforms,
    pipeline: Option<Pipeline>,
}

impl Visualizer {
    pub fn new(source: Cow<'static, str>, dye: OutputRef, particles: OutputRef) -> Self {
        Self {
            source,
            uniforms: Uniforms::new()
                .with_texture("dye", dye.get())
                .with_texture("particles", particles.get()),
            dye,
            particles,
            pipeline: None,
        }
    }

    fn bind(&self) {
        self.uniforms.set("dye", self.dye.get());
        self.uniforms.set("particles", self.particles.get());
    }
}

impl EffectHooks for Visualizer {
    fn initialize(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        let pipeline = Pipeline::new(
            device,
            PipelineOptions::new()
                .texture(TextureOptions::new(TextureType::UnsignedByte).filter(FilterMode::Linear))
                .blend(BlendMode::Alpha),
        )?;
        self.bind();
        let pipeline = with_cleanup(device, pipeline, |pipeline, device| {
            pipeline.add_fragment_pass(device, &self.source, &self.uniforms)?.render(device)?;
            Ok(())
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn update(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        self.bind();
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.render(device)?.paint(device)?;
        }
        Ok(())
    }

    fn resize(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.resize(device, ResizeOptions::surface())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordingDevice, Target};
    use crate::rtt::OutputSlot;
    use crate::stage::ShaderSources;

    #[test]
    fn update_composes_then_paints() {
        let dye = OutputSlot::new();
        let particles = OutputSlot::new();
        let mut device = RecordingDevice::new(40, 20);
        let ctx = StageContext::new(40, 20);
        let mut visualizer = Visualizer::new(ShaderSources::default().visualizer, dye.reader(), particles.reader());
        visualizer.initialize(&mut device, &ctx).unwrap();
        device.take_commands();

        visualizer.update(&mut device, &ctx).unwrap();
        let draws = device.draws();
        assert_eq!(draws.len(), 2);
        assert_ne!(draws[0].target, Target::Surface);
        assert_eq!(draws[0].texture("dye").unwrap().unit, 1);
        assert_eq!(draws[0].texture("particles").unwrap().unit, 2);
        assert_eq!(draws[1].target, Target::Surface);
        assert_eq!(draws[1].viewport, (40, 20));
    }

    #[test]
    fn failed_initialize_releases_everything() {
        let ctx = StageContext::new(40, 20);
        let mut device = RecordingDevice::new(40, 20);
        let before = device.live_objects();

        let mut visualizer = Visualizer::new(Cow::Borrowed("@fragment fn fs_main( {"), OutputRef::default(), OutputRef::default());
        let err = visualizer.initialize(&mut device, &ctx).unwrap_err();
        assert!(matches!(err, RttError::ShaderCompile { .. }));
        assert_eq!(device.live_objects(), before);

        let mut visualizer = Visualizer::new(ShaderSources::default().visualizer, OutputRef::default(), OutputRef::default());
        device.fail_draws_after(0);
        assert!(visualizer.initialize(&mut device, &ctx).is_err());
        assert_eq!(device.live_objects(), before);
    }
}
