//! The effect stage: a fixed chain of render-to-texture effects driven one
//! tick at a time.
//!
//! ```text
//! motion ──► fluid (solver, dye) ──► particles ──► visualizer ──► surface
//!                 └──────────────────────────────────┘
//! ```
//!
//! Effects receive the outputs they sample as [`OutputRef`](crate::rtt::OutputRef)s when they are
//! built, so the order of construction is the order of the chain.

mod fluid;
mod motion;
mod particles;
mod shaders;
mod visualizer;

pub use fluid::Fluid;
pub use motion::{Motion, MotionState};
pub use particles::Particles;
pub use shaders::ShaderSources;
pub use visualizer::Visualizer;

use crate::device::RenderDevice;
use crate::error::RttError;
use crate::input::PointerEvent;
use crate::rtt::Pipeline;

/// Simulation constants shared by the effects.
#[derive(Clone, Debug, PartialEq)]
pub struct StageConfig {
    /// Side of the square fluid and motion grids.
    pub cells: u32,
    pub timestep: f32,
    pub particle_count: u32,
    pub particle_size: f32,
    /// Upper bound of the random age given to emitted particles.
    pub particle_age: f32,
    /// Emission radius around the pointer, in uv units.
    pub particle_radius: f32,
    pub seed: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            cells: 256,
            timestep: 0.25,
            particle_count: 1024 * 256,
            particle_size: 0.7,
            particle_age: 5.0,
            particle_radius: 0.025,
            seed: 0x5eed,
        }
    }
}

impl StageConfig {
    /// Side of the square particle data texture.
    pub fn particle_cells(&self) -> u32 {
        f64::from(self.particle_count).sqrt().ceil() as u32
    }
}

/// Frame state visible to every effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageContext {
    pub width: u32,
    pub height: u32,
    pub aspect: f32,
    pub paused: bool,
}

impl StageContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect: aspect(width, height),
            paused: false,
        }
    }
}

fn aspect(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Runs `setup` on a new pipeline and destroys the pipeline if it fails.
fn with_cleanup(
    device: &mut dyn RenderDevice,
    mut pipeline: Pipeline,
    setup: impl FnOnce(&mut Pipeline, &mut dyn RenderDevice) -> Result<(), RttError>,
) -> Result<Pipeline, RttError> {
    match setup(&mut pipeline, &mut *device) {
        Ok(()) => Ok(pipeline),
        Err(err) => {
            pipeline.destroy(device);
            Err(err)
        }
    }
}

/// Lifecycle of an effect.
pub trait EffectHooks {
    /// Builds the effect's pipelines.
    fn initialize(&mut self, device: &mut dyn RenderDevice, ctx: &StageContext) -> Result<(), RttError>;

    /// Renders one frame.
    fn update(&mut self, device: &mut dyn RenderDevice, ctx: &StageContext) -> Result<(), RttError>;

    /// Reacts to a surface resize.
    fn resize(&mut self, _device: &mut dyn RenderDevice, _ctx: &StageContext) -> Result<(), RttError> {
        Ok(())
    }

    /// Reacts to pointer input. Never called while paused.
    fn pointer(
        &mut self,
        _device: &mut dyn RenderDevice,
        _ctx: &StageContext,
        _event: &PointerEvent,
    ) -> Result<(), RttError> {
        Ok(())
    }
}

/// The closed set of effects a [`Stage`] can run.
pub enum Effect {
    Motion(Motion),
    Fluid(Fluid),
    Particles(Particles),
    Visualizer(Visualizer),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Motion(_) => "motion",
            Effect::Fluid(_) => "fluid",
            Effect::Particles(_) => "particles",
            Effect::Visualizer(_) => "visualizer",
        }
    }

    /// Position in the update order, lowest first.
    pub fn priority(&self) -> u32 {
        match self {
            Effect::Motion(_) => 0,
            Effect::Fluid(_) => 1,
            Effect::Particles(_) => 2,
            Effect::Visualizer(_) => 3,
        }
    }

    fn hooks(&mut self) -> &mut dyn EffectHooks {
        match self {
            Effect::Motion(e) => e,
            Effect::Fluid(e) => e,
            Effect::Particles(e) => e,
            Effect::Visualizer(e) => e,
        }
    }
}

/// Runs effects in priority order, one [`tick`](Stage::tick) per frame.
pub struct Stage {
    effects: Vec<Effect>,
    context: StageContext,
    initialized: bool,
}

impl Stage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            effects: Vec::new(),
            context: StageContext::new(width, height),
            initialized: false,
        }
    }

    /// The full motion, fluid, particles and visualizer chain.
    pub fn fluid_field(width: u32, height: u32, config: &StageConfig, shaders: &ShaderSources) -> Self {
        let motion = Motion::new(config, shaders.motion.clone());
        let fluid = Fluid::new(
            config,
            shaders.fluid_solver.clone(),
            shaders.fluid_dye.clone(),
            motion.output(),
        );
        let particles = Particles::new(
            config,
            shaders.particle_data.clone(),
            shaders.particles.clone(),
            fluid.solver_output(),
        );
        let visualizer = Visualizer::new(shaders.visualizer.clone(), fluid.dye_output(), particles.output());

        let mut stage = Self::new(width, height);
        stage
            .add(Effect::Visualizer(visualizer))
            .add(Effect::Particles(particles))
            .add(Effect::Fluid(fluid))
            .add(Effect::Motion(motion));
        stage
    }

    /// Registers an effect, keeping the update order sorted by priority.
    pub fn add(&mut self, effect: Effect) -> &mut Self {
        if self.initialized {
            log::warn!("effect `{}` added after initialization", effect.name());
        }
        let at = self.effects.partition_point(|e| e.priority() <= effect.priority());
        self.effects.insert(at, effect);
        self
    }

    pub fn effect(&self, name: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.name() == name)
    }

    /// Effect names in update order.
    pub fn names(&self) -> Vec<&'static str> {
        self.effects.iter().map(Effect::name).collect()
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    pub fn initialize(&mut self, device: &mut dyn RenderDevice) -> Result<(), RttError> {
        for effect in &mut self.effects {
            log::debug!("initializing {}", effect.name());
            effect.hooks().initialize(device, &self.context)?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Updates every effect in order, then presents the frame.
    ///
    /// Does nothing while paused.
    pub fn tick(&mut self, device: &mut dyn RenderDevice) -> Result<(), RttError> {
        if self.context.paused {
            return Ok(());
        }
        if !self.initialized {
            self.initialize(device)?;
        }
        for effect in &mut self.effects {
            effect.hooks().update(device, &self.context)?;
        }
        device.present();
        Ok(())
    }

    /// Resizes the surface and lets every effect follow.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<(), RttError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        device.resize_surface(width, height);
        self.context.width = width;
        self.context.height = height;
        self.context.aspect = aspect(width, height);
        if !self.initialized {
            return Ok(());
        }
        for effect in &mut self.effects {
            effect.hooks().resize(device, &self.context)?;
        }
        Ok(())
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.context.paused = paused;
        log::info!("{}", if paused { "paused" } else { "resumed" });
    }

    /// Flips the pause state and returns the new one.
    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.context.paused);
        self.context.paused
    }

    pub fn is_paused(&self) -> bool {
        self.context.paused
    }

    /// Forwards pointer input to every effect, unless paused.
    pub fn pointer(&mut self, device: &mut dyn RenderDevice, event: &PointerEvent) -> Result<(), RttError> {
        if self.context.paused || !self.initialized {
            return Ok(());
        }
        for effect in &mut self.effects {
            effect.hooks().pointer(device, &self.context, event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, RecordingDevice, Target};

    fn small_config() -> StageConfig {
        StageConfig {
            cells: 16,
            particle_count: 64,
            ..Default::default()
        }
    }

    fn stage(device: &mut RecordingDevice) -> Stage {
        let mut stage = Stage::fluid_field(64, 32, &small_config(), &ShaderSources::default());
        stage.initialize(device).unwrap();
        stage
    }

    #[test]
    fn effects_run_in_priority_order() {
        let stage = Stage::fluid_field(64, 32, &small_config(), &ShaderSources::default());
        assert_eq!(stage.names(), ["motion", "fluid", "particles", "visualizer"]);
        assert!(stage.effect("fluid").is_some());
        assert!(stage.effect("missing").is_none());
    }

    #[test]
    fn particle_cells_cover_the_count() {
        assert_eq!(StageConfig::default().particle_cells(), 512);
        let odd = StageConfig {
            particle_count: 10,
            ..Default::default()
        };
        assert_eq!(odd.particle_cells(), 4);
    }

    #[test]
    fn tick_renders_then_presents() {
        let mut device = RecordingDevice::new(64, 32);
        let mut stage = stage(&mut device);
        device.take_commands();

        stage.tick(&mut device).unwrap();
        let commands = device.commands();
        assert_eq!(commands.last(), Some(&Command::Present));
        assert_eq!(device.presents(), 1);

        let draws = device.draws();
        // motion, solver, dye, particle data, particles, visualizer, paint
        assert_eq!(draws.len(), 7);
        assert_eq!(draws.last().unwrap().target, Target::Surface);
        assert_eq!(draws.last().unwrap().viewport, (64, 32));
    }

    #[test]
    fn paused_stage_does_nothing() {
        let mut device = RecordingDevice::new(64, 32);
        let mut stage = stage(&mut device);
        device.take_commands();

        assert!(stage.toggle_pause());
        stage.tick(&mut device).unwrap();
        stage.pointer(&mut device, &PointerEvent::Down).unwrap();
        stage.pointer(&mut device, &PointerEvent::Moved { x: 10.0, y: 10.0 }).unwrap();
        assert!(device.commands().is_empty());

        assert!(!stage.toggle_pause());
        stage.tick(&mut device).unwrap();
        assert_eq!(device.presents(), 1);
    }

    #[test]
    fn resize_follows_the_surface() {
        let mut device = RecordingDevice::new(64, 32);
        let mut stage = stage(&mut device);
        stage.resize(&mut device, 128, 128).unwrap();

        assert_eq!(stage.context().aspect, 1.0);
        device.take_commands();
        stage.tick(&mut device).unwrap();
        let paint = device.draws().last().cloned().cloned().unwrap();
        assert_eq!(paint.viewport, (128, 128));
    }

    #[test]
    fn dragging_emits_particles() {
        let mut device = RecordingDevice::new(64, 32);
        let mut stage = stage(&mut device);
        stage.tick(&mut device).unwrap();
        device.take_commands();

        stage.pointer(&mut device, &PointerEvent::Moved { x: 32.0, y: 16.0 }).unwrap();
        assert!(!device.commands().iter().any(|c| matches!(c, Command::WriteTexture(..))));

        stage.pointer(&mut device, &PointerEvent::Down).unwrap();
        stage.pointer(&mut device, &PointerEvent::Moved { x: 34.0, y: 16.0 }).unwrap();
        let writes: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::WriteTexture(_, region) => Some(*region),
                _ => None,
            })
            .collect();
        assert_eq!(writes.len(), 1);
        assert_eq!((writes[0].width, writes[0].height), (8, 1));
    }
}
