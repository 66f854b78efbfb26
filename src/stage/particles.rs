use std::borrow::Cow;
use std::f32::consts::TAU;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{BlendMode, RenderDevice, TextureRegion, TextureType};
use crate::error::RttError;
use crate::input::PointerEvent;
use crate::rtt::{
    Geometry, OutputRef, OutputSlot, Pipeline, PipelineOptions, ResizeOptions, TextureOptions,
    Uniforms,
};

use super::{EffectHooks, StageConfig, StageContext, with_cleanup};

/// Writes new particles into the data texture, one row per emission.
#[derive(Debug)]
struct Emitter {
    side: u32,
    cursor: u32,
    size: f32,
    age: f32,
    radius: f32,
    rng: StdRng,
}

impl Emitter {
    fn new(config: &StageConfig) -> Self {
        Self {
            side: config.particle_cells(),
            cursor: 0,
            size: config.particle_size,
            age: config.particle_age,
            radius: config.particle_radius,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Particles scattered around `at` (uv space), and the texels they go to.
    ///
    /// Texel layout: xy position, z size, w age.
    fn emit(&mut self, at: Vec2, aspect: f32) -> (TextureRegion, Vec<f32>) {
        let count = self.side;
        let mut data = Vec::with_capacity(count as usize * 4);
        for _ in 0..count {
            let angle = self.rng.gen_range(0.0..TAU);
            let reach = self.rng.gen_range(0.0..=self.radius);
            data.extend_from_slice(&[
                at.x + angle.cos() * reach,
                at.y + angle.sin() * reach * aspect,
                self.size,
                self.rng.gen_range(0.0..=self.age),
            ]);
        }

        let region = TextureRegion {
            x: self.cursor % self.side,
            y: self.cursor / self.side,
            width: count,
            height: 1,
        };
        self.cursor = (self.cursor + count) % (self.side * self.side);
        (region, data)
    }
}

/// One point per particle, centered on its data texel.
fn lookup_points(side: u32, count: u32) -> Geometry {
    let side_f = side as f32;
    let vertices = (0..count)
        .flat_map(|i| [((i % side) as f32 + 0.5) / side_f, ((i / side) as f32 + 0.5) / side_f])
        .collect();
    Geometry::points(vertices)
}

/// Particles carried by the fluid velocity and drawn as additive sprites.
pub struct Particles {
    data_source: Cow<'static, str>,
    particles_source: Cow<'static, str>,
    count: u32,
    solver: OutputRef,
    data_uniforms: Uniforms,
    particle_uniforms: Uniforms,
    data: Option<Pipeline>,
    particles: Option<Pipeline>,
    emitter: Emitter,
    dragging: bool,
    output: OutputSlot,
}

impl Particles {
    pub fn new(
        config: &StageConfig,
        data_source: Cow<'static, str>,
        particles_source: Cow<'static, str>,
        solver: OutputRef,
    ) -> Self {
        Self {
            data_source,
            particles_source,
            count: config.particle_count,
            data_uniforms: Uniforms::new()
                .with("d", Vec2::splat(1.0 / config.cells as f32))
                .with("dt", config.timestep)
                .with_texture("solver", solver.get()),
            particle_uniforms: Uniforms::new().with_texture("particle_data", None),
            solver,
            data: None,
            particles: None,
            emitter: Emitter::new(config),
            dragging: false,
            output: OutputSlot::new(),
        }
    }

    /// The sprite layer at surface size.
    pub fn output(&self) -> OutputRef {
        self.output.reader()
    }

    fn build(&self, device: &mut dyn RenderDevice) -> Result<(Pipeline, Pipeline), RttError> {
        let side = self.emitter.side;
        let data = Pipeline::new(
            device,
            PipelineOptions::new()
                .size(side, side)
                .texture(TextureOptions::new(TextureType::Float)),
        )?;
        let data = with_cleanup(device, data, |data, device| {
            data.add_fragment_pass(device, &self.data_source, &self.data_uniforms)?;
            Ok(())
        })?;

        let sprites = PipelineOptions::new()
            .texture(TextureOptions::new(TextureType::HalfFloat))
            .geometry(lookup_points(side, self.count))
            .blend(BlendMode::Additive);
        let particles = match Pipeline::new(device, sprites) {
            Ok(particles) => with_cleanup(device, particles, |particles, device| {
                particles.add_vertex_fragment_pass(
                    device,
                    &self.particles_source,
                    &self.particles_source,
                    &self.particle_uniforms,
                    None,
                )?;
                Ok(())
            }),
            Err(err) => Err(err),
        };
        match particles {
            Ok(particles) => Ok((data, particles)),
            Err(err) => {
                data.destroy(device);
                Err(err)
            }
        }
    }

    /// Renders the first data and sprite frames.
    fn prime(&mut self, device: &mut dyn RenderDevice) -> Result<(), RttError> {
        let (Some(data), Some(particles)) = (self.data.as_mut(), self.particles.as_mut()) else {
            return Ok(());
        };
        self.data_uniforms.set("solver", self.solver.get());
        data.render(device)?;
        self.particle_uniforms.set("particle_data", data.output());
        particles.render(device)?;
        self.output.publish(particles.output());
        Ok(())
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        for pipeline in [self.data.take(), self.particles.take()].into_iter().flatten() {
            pipeline.destroy(device);
        }
        self.output.publish(None);
    }
}

impl EffectHooks for Particles {
    fn initialize(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        let (data, particles) = self.build(device)?;
        self.data = Some(data);
        self.particles = Some(particles);
        if let Err(err) = self.prime(device) {
            self.release(device);
            return Err(err);
        }
        Ok(())
    }

    fn update(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        let (Some(data), Some(particles)) = (self.data.as_mut(), self.particles.as_mut()) else {
            return Ok(());
        };
        self.data_uniforms.set("solver", self.solver.get());
        data.render(device)?;
        self.particle_uniforms.set("particle_data", data.output());

        // The cleared texture becomes the next write target.
        particles.swap().clear(device)?.render(device)?;
        self.output.publish(particles.output());
        Ok(())
    }

    fn resize(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        if let Some(particles) = self.particles.as_mut() {
            particles.resize(device, ResizeOptions::surface())?;
        }
        Ok(())
    }

    fn pointer(
        &mut self,
        device: &mut dyn RenderDevice,
        ctx: &StageContext,
        event: &PointerEvent,
    ) -> Result<(), RttError> {
        match *event {
            PointerEvent::Down => self.dragging = true,
            PointerEvent::Up => self.dragging = false,
            PointerEvent::Moved { x, y } if self.dragging => {
                let Some(target) = self.data.as_ref().and_then(Pipeline::output) else {
                    return Ok(());
                };
                let at = Vec2::new(x / ctx.width.max(1) as f32, y / ctx.height.max(1) as f32);
                let (region, texels) = self.emitter.emit(at, ctx.aspect);
                log::trace!("emitting {} particles at {at}", region.width);
                device.write_texture(target, region, &texels)?;
            }
            PointerEvent::Moved { .. } => {}
        }
        Ok(())
    }
}
