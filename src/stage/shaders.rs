use std::borrow::Cow;

/// WGSL sources of the stage effects.
///
/// Defaults are the shaders shipped with the crate; any of them can be replaced
/// before the stage is initialized.
#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub motion: Cow<'static, str>,
    pub fluid_solver: Cow<'static, str>,
    pub fluid_dye: Cow<'static, str>,
    pub particle_data: Cow<'static, str>,
    /// Holds both the vertex and the fragment stage.
    pub particles: Cow<'static, str>,
    pub visualizer: Cow<'static, str>,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            motion: Cow::Borrowed(include_str!("shaders/motion.wgsl")),
            fluid_solver: Cow::Borrowed(include_str!("shaders/fluid_solver.wgsl")),
            fluid_dye: Cow::Borrowed(include_str!("shaders/fluid_dye.wgsl")),
            particle_data: Cow::Borrowed(include_str!("shaders/particle_data.wgsl")),
            particles: Cow::Borrowed(include_str!("shaders/particles.wgsl")),
            visualizer: Cow::Borrowed(include_str!("shaders/visualizer.wgsl")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtt::DEFAULT_VERTEX_SHADER;
    use crate::shader::build_program;

    #[test]
    fn bundled_shaders_link() {
        let sources = ShaderSources::default();
        for fragment in [
            &sources.motion,
            &sources.fluid_solver,
            &sources.fluid_dye,
            &sources.particle_data,
            &sources.visualizer,
        ] {
            build_program(DEFAULT_VERTEX_SHADER, fragment).unwrap();
        }
        let particles = build_program(&sources.particles, &sources.particles).unwrap();
        assert!(particles.declares("particle_data"));
        assert_eq!(particles.attributes().len(), 1);
    }

    #[test]
    fn solver_and_dye_share_names() {
        let sources = ShaderSources::default();
        let solver = build_program(DEFAULT_VERTEX_SHADER, &sources.fluid_solver).unwrap();
        let dye = build_program(DEFAULT_VERTEX_SHADER, &sources.fluid_dye).unwrap();
        for name in ["d", "dt", "motion"] {
            assert!(solver.declares(name), "solver misses {name}");
            assert!(dye.declares(name), "dye misses {name}");
        }
        assert!(!solver.declares("solver"));
        assert!(dye.declares("solver"));
    }
}
