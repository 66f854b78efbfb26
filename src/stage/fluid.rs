use std::borrow::Cow;

use glam::Vec2;

use crate::device::{FilterMode, RenderDevice, TextureType};
use crate::error::RttError;
use crate::rtt::{OutputRef, OutputSlot, Pipeline, PipelineOptions, TextureOptions, Uniforms};

use super::{EffectHooks, StageConfig, StageContext, with_cleanup};

/// Velocity and dye fields on a square grid.
///
/// The solver advances velocity and density one step per tick; the dye pass
/// then advects color through the new velocity field. Both read the motion
/// injection and share one uniform table.
pub struct Fluid {
    solver_source: Cow<'static, str>,
    dye_source: Cow<'static, str>,
    cells: u32,
    motion: OutputRef,
    uniforms: Uniforms,
    solver: Option<Pipeline>,
    dye: Option<Pipeline>,
    solver_output: OutputSlot,
    dye_output: OutputSlot,
}

impl Fluid {
    pub fn new(
        config: &StageConfig,
        solver_source: Cow<'static, str>,
        dye_source: Cow<'static, str>,
        motion: OutputRef,
    ) -> Self {
        let cell = 1.0 / config.cells as f32;
        Self {
            solver_source,
            dye_source,
            cells: config.cells,
            uniforms: Uniforms::new()
                .with("d", Vec2::splat(cell))
                .with("dt", config.timestep)
                .with_texture("motion", motion.get())
                .with_texture("solver", None),
            motion,
            solver: None,
            dye: None,
            solver_output: OutputSlot::new(),
            dye_output: OutputSlot::new(),
        }
    }

    /// Velocity (xy) and density (z) of the latest step.
    pub fn solver_output(&self) -> OutputRef {
        self.solver_output.reader()
    }

    pub fn dye_output(&self) -> OutputRef {
        self.dye_output.reader()
    }

    fn step(&mut self, device: &mut dyn RenderDevice) -> Result<(), RttError> {
        let (Some(solver), Some(dye)) = (self.solver.as_mut(), self.dye.as_mut()) else {
            return Ok(());
        };
        self.uniforms.set("motion", self.motion.get());
        solver.render(device)?;
        self.uniforms.set("solver", solver.output());
        dye.render(device)?;

        self.solver_output.publish(solver.output());
        self.dye_output.publish(dye.output());
        Ok(())
    }

    fn build(&self, device: &mut dyn RenderDevice) -> Result<(Pipeline, Pipeline), RttError> {
        let grid = PipelineOptions::new().size(self.cells, self.cells);

        let solver = Pipeline::new(device, grid.clone().texture(TextureOptions::new(TextureType::Float)))?;
        let solver = with_cleanup(device, solver, |solver, device| {
            solver.add_fragment_pass(device, &self.solver_source, &self.uniforms)?;
            Ok(())
        })?;

        let dye_texture = TextureOptions::new(TextureType::Float).filter(FilterMode::Linear);
        let dye = match Pipeline::new(device, grid.texture(dye_texture)) {
            Ok(dye) => with_cleanup(device, dye, |dye, device| {
                dye.add_fragment_pass(device, &self.dye_source, &self.uniforms)?;
                Ok(())
            }),
            Err(err) => Err(err),
        };
        match dye {
            Ok(dye) => Ok((solver, dye)),
            Err(err) => {
                solver.destroy(device);
                Err(err)
            }
        }
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        for pipeline in [self.solver.take(), self.dye.take()].into_iter().flatten() {
            pipeline.destroy(device);
        }
        self.solver_output.publish(None);
        self.dye_output.publish(None);
    }
}

impl EffectHooks for Fluid {
    fn initialize(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        let (solver, dye) = self.build(device)?;
        self.solver = Some(solver);
        self.dye = Some(dye);
        if let Err(err) = self.step(device) {
            self.release(device);
            return Err(err);
        }
        Ok(())
    }

    fn update(&mut self, device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        self.step(device)
    }
}
