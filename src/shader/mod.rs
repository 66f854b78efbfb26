//! WGSL front-end: compilation, program linking and interface reflection.
//!
//! The engine addresses uniforms, textures and vertex attributes by *name*, the
//! way a pass's binding tables are written. This module bridges those names to
//! the `@group/@binding` and `@location` slots declared in WGSL by parsing and
//! validating the source with naga (the same front-end wgpu runs) and reflecting
//! over the globals each entry point actually uses.
//!
//! # Conventions
//!
//! ```wgsl
//! struct Params { d: vec2f, dt: f32 }
//! @group(0) @binding(0) var<uniform> params: Params;   // uniforms "d" and "dt"
//! @group(0) @binding(1) var<uniform> ratio: f32;       // uniform "ratio"
//! @group(0) @binding(2) var t_sampler: texture_2d<f32>; // previous pass output
//! @group(0) @binding(3) var t_sampler_sampler: sampler; // its sampler
//! ```
//!
//! Globals declared but never used by the selected entry points are not part of
//! the interface. Binding values to them is silently skipped, which lets one
//! uniform table serve several heterogeneous passes.

mod layout;

pub use layout::{ScalarKind, UniformType, encode_uniform};

use std::collections::BTreeMap;
use std::fmt;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, TypeInner};

use crate::error::RttError;

/// Name of the sampler uniform receiving the previous pass's output.
pub const INPUT_SAMPLER: &str = "t_sampler";

/// Name of the array sampler receiving the history lookback frames.
pub const HISTORY_SAMPLER: &str = "t_history";

/// Suffix pairing a `sampler` global with the texture of the same prefix.
pub const SAMPLER_SUFFIX: &str = "_sampler";

/// Shader stage of a compiled source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A validated WGSL module with the entry point selected for one stage.
pub struct CompiledStage {
    stage: ShaderStage,
    module: Module,
    info: ModuleInfo,
    entry_index: usize,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Name of the selected entry point.
    pub fn entry_point(&self) -> &str {
        &self.module.entry_points[self.entry_index].name
    }
}

/// Prefixes every line of `source` with its 1-based line number.
pub fn annotate_source(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4}: {}\n", i + 1, line))
        .collect()
}

fn compile_error(stage: ShaderStage, diagnostic: String, source: &str) -> RttError {
    RttError::ShaderCompile {
        stage,
        diagnostic,
        annotated: annotate_source(source),
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Parses and validates `source`, selecting the first entry point of `stage`.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledStage, RttError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| compile_error(stage, e.emit_to_string(source), source))?;

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| compile_error(stage, error_chain(&e), source))?;

    let entry_index = module
        .entry_points
        .iter()
        .position(|ep| ep.stage == stage.naga())
        .ok_or_else(|| compile_error(stage, format!("no @{stage} entry point"), source))?;

    Ok(CompiledStage {
        stage,
        module,
        info,
        entry_index,
    })
}

/// A `@group/@binding` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
}

/// A `var<uniform>` buffer of the program.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBlock {
    pub slot: ResourceSlot,
    /// Byte size of the declared type.
    pub size: u32,
}

/// Where a named uniform lives inside the program's uniform blocks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformSlot {
    /// Index into [`ShaderInterface::blocks`].
    pub block: usize,
    pub offset: u32,
    pub ty: UniformType,
}

/// A `@location` input of the vertex entry point.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub components: u32,
    pub kind: ScalarKind,
}

/// Everything the engine needs to know about a linked program.
#[derive(Clone, Debug, Default)]
pub struct ShaderInterface {
    vertex_entry: String,
    fragment_entry: String,
    blocks: Vec<UniformBlock>,
    uniforms: BTreeMap<String, UniformSlot>,
    textures: BTreeMap<String, ResourceSlot>,
    samplers: BTreeMap<String, ResourceSlot>,
    attributes: Vec<VertexInput>,
}

impl ShaderInterface {
    pub fn vertex_entry(&self) -> &str {
        &self.vertex_entry
    }

    pub fn fragment_entry(&self) -> &str {
        &self.fragment_entry
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.get(name)
    }

    pub fn texture(&self, name: &str) -> Option<ResourceSlot> {
        self.textures.get(name).copied()
    }

    pub fn textures(&self) -> impl Iterator<Item = (&str, ResourceSlot)> {
        self.textures.iter().map(|(name, slot)| (name.as_str(), *slot))
    }

    pub fn samplers(&self) -> impl Iterator<Item = (&str, ResourceSlot)> {
        self.samplers.iter().map(|(name, slot)| (name.as_str(), *slot))
    }

    /// Vertex inputs sorted by location.
    pub fn attributes(&self) -> &[VertexInput] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexInput> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether a uniform of any kind named `name` is used by the program.
    pub fn declares(&self, name: &str) -> bool {
        self.uniforms.contains_key(name) || self.textures.contains_key(name)
    }

    /// Name of the texture element `index` of the array sampler `name`.
    pub fn array_element(name: &str, index: usize) -> String {
        format!("{name}_{index}")
    }

    /// Whether any element of the array sampler `name` is used by the program.
    pub fn declares_array(&self, name: &str, len: usize) -> bool {
        (0..len).any(|i| self.textures.contains_key(&Self::array_element(name, i)))
    }

    /// Distinct bind group indices used by the program.
    pub fn groups(&self) -> Vec<u32> {
        let mut groups: Vec<u32> = self
            .blocks
            .iter()
            .map(|b| b.slot.group)
            .chain(self.textures.values().map(|s| s.group))
            .chain(self.samplers.values().map(|s| s.group))
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

/// Stage I/O at one `@location`.
struct Varying {
    name: String,
    components: u32,
    kind: ScalarKind,
}

fn varying_shape(module: &Module, ty: Handle<naga::Type>) -> Option<(u32, ScalarKind)> {
    match module.types[ty].inner {
        TypeInner::Scalar(scalar) => Some((1, ScalarKind::from_naga(scalar)?)),
        TypeInner::Vector { size, scalar } => Some((size as u32, ScalarKind::from_naga(scalar)?)),
        _ => None,
    }
}

fn collect_varyings(
    module: &Module,
    name: Option<&String>,
    ty: Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut BTreeMap<u32, Varying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some((components, kind)) = varying_shape(module, ty) {
                out.insert(
                    *location,
                    Varying {
                        name: name.cloned().unwrap_or_default(),
                        components,
                        kind,
                    },
                );
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { ref members, .. } = module.types[ty].inner {
                for member in members {
                    collect_varyings(
                        module,
                        member.name.as_ref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn stage_inputs(stage: &CompiledStage) -> BTreeMap<u32, Varying> {
    let function = &stage.module.entry_points[stage.entry_index].function;
    let mut inputs = BTreeMap::new();
    for arg in &function.arguments {
        collect_varyings(
            &stage.module,
            arg.name.as_ref(),
            arg.ty,
            arg.binding.as_ref(),
            &mut inputs,
        );
    }
    inputs
}

fn stage_outputs(stage: &CompiledStage) -> BTreeMap<u32, Varying> {
    let function = &stage.module.entry_points[stage.entry_index].function;
    let mut outputs = BTreeMap::new();
    if let Some(result) = &function.result {
        collect_varyings(
            &stage.module,
            None,
            result.ty,
            result.binding.as_ref(),
            &mut outputs,
        );
    }
    outputs
}

impl ShaderInterface {
    fn add_resources(
        &mut self,
        stage: &CompiledStage,
        owners: &mut BTreeMap<ResourceSlot, String>,
    ) -> Result<(), RttError> {
        let module = &stage.module;
        let usage = stage.info.get_entry_point(stage.entry_index);

        for (handle, global) in module.global_variables.iter() {
            if usage[handle].is_empty() {
                continue;
            }
            let (Some(binding), Some(name)) = (&global.binding, &global.name) else {
                continue;
            };
            let slot = ResourceSlot {
                group: binding.group,
                binding: binding.binding,
            };

            match owners.get(&slot) {
                Some(owner) if owner == name => continue,
                Some(owner) => {
                    return Err(RttError::ProgramLink(format!(
                        "@group({}) @binding({}) is `{owner}` in one stage and `{name}` in the {} stage",
                        slot.group, slot.binding, stage.stage
                    )));
                }
                None => {
                    owners.insert(slot, name.clone());
                }
            }

            let inner = &module.types[global.ty].inner;
            match global.space {
                AddressSpace::Uniform => {
                    let block = self.blocks.len();
                    self.blocks.push(UniformBlock {
                        slot,
                        size: inner.size(module.to_ctx()),
                    });
                    if let TypeInner::Struct { ref members, .. } = *inner {
                        for member in members {
                            let (Some(member_name), Some(ty)) = (
                                &member.name,
                                UniformType::from_naga(&module.types[member.ty].inner),
                            ) else {
                                continue;
                            };
                            self.uniforms.insert(
                                member_name.clone(),
                                UniformSlot {
                                    block,
                                    offset: member.offset,
                                    ty,
                                },
                            );
                        }
                    } else if let Some(ty) = UniformType::from_naga(inner) {
                        self.uniforms.insert(
                            name.clone(),
                            UniformSlot {
                                block,
                                offset: 0,
                                ty,
                            },
                        );
                    }
                }
                AddressSpace::Handle => match *inner {
                    TypeInner::Image { .. } => {
                        self.textures.insert(name.clone(), slot);
                    }
                    TypeInner::Sampler { .. } => {
                        self.samplers.insert(name.clone(), slot);
                    }
                    _ => {
                        log::debug!("ignoring unsupported resource `{name}` in {} stage", stage.stage);
                    }
                },
                _ => {
                    log::debug!("ignoring `{name}` in address space {:?}", global.space);
                }
            }
        }
        Ok(())
    }
}

/// Combines a vertex and a fragment stage into one program interface.
///
/// Fails with [`RttError::ProgramLink`] when the fragment stage reads a
/// `@location` the vertex stage does not write (or writes with another shape),
/// or when both stages put different globals on the same binding.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ShaderInterface, RttError> {
    let produced = stage_outputs(vertex);
    for (location, input) in stage_inputs(fragment) {
        match produced.get(&location) {
            Some(output) if output.components == input.components && output.kind == input.kind => {}
            Some(output) => {
                return Err(RttError::ProgramLink(format!(
                    "fragment input `{}` @location({location}) has {} component(s), vertex output `{}` has {}",
                    input.name, input.components, output.name, output.components
                )));
            }
            None => {
                return Err(RttError::ProgramLink(format!(
                    "fragment input `{}` @location({location}) is not written by the vertex stage",
                    input.name
                )));
            }
        }
    }

    let mut interface = ShaderInterface {
        vertex_entry: vertex.entry_point().to_owned(),
        fragment_entry: fragment.entry_point().to_owned(),
        ..Default::default()
    };

    let mut owners = BTreeMap::new();
    interface.add_resources(vertex, &mut owners)?;
    interface.add_resources(fragment, &mut owners)?;

    interface.attributes = stage_inputs(vertex)
        .into_iter()
        .map(|(location, v)| VertexInput {
            name: v.name,
            location,
            components: v.components,
            kind: v.kind,
        })
        .collect();

    Ok(interface)
}

/// Compiles both stages and links them.
pub fn build_program(vertex: &str, fragment: &str) -> Result<ShaderInterface, RttError> {
    let vs = compile(ShaderStage::Vertex, vertex)?;
    let fs = compile(ShaderStage::Fragment, fragment)?;
    link(&vs, &fs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtt::DEFAULT_VERTEX_SHADER;

    const FRAGMENT: &str = r#"
struct Params {
    d: vec2f,
    dt: f32,
    unused: f32,
}
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<uniform> ratio: f32;
@group(0) @binding(2) var t_sampler: texture_2d<f32>;
@group(0) @binding(3) var t_sampler_sampler: sampler;
@group(0) @binding(4) var never_read: texture_2d<f32>;

@fragment
fn fs_main(@location(0) uv: vec2f) -> @location(0) vec4f {
    let c = textureSample(t_sampler, t_sampler_sampler, uv + params.d * params.dt);
    return c * ratio;
}
"#;

    #[test]
    fn annotates_every_line() {
        let annotated = annotate_source("a\nb\nc");
        assert_eq!(annotated, "   1: a\n   2: b\n   3: c\n");
    }

    #[test]
    fn compile_error_carries_numbered_source() {
        let broken = "@fragment\nfn fs_main() -> @location(0) vec4f {\n    return vec4f(1.0\n}\n";
        let err = compile(ShaderStage::Fragment, broken).err().expect("must fail");
        match err {
            RttError::ShaderCompile {
                stage, annotated, ..
            } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(annotated.contains("   3:     return vec4f(1.0"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile(ShaderStage::Vertex, FRAGMENT).err().expect("must fail");
        assert!(matches!(err, RttError::ShaderCompile { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn reflects_used_uniforms_and_textures() {
        let interface = build_program(DEFAULT_VERTEX_SHADER, FRAGMENT).unwrap();

        let d = interface.uniform("d").unwrap();
        assert_eq!(d.offset, 0);
        assert_eq!(d.ty, UniformType::Vector { size: 2, kind: ScalarKind::Float });
        assert_eq!(interface.uniform("dt").unwrap().offset, 8);
        assert_eq!(interface.uniform("ratio").unwrap().offset, 0);
        assert_eq!(interface.blocks().len(), 2);

        assert!(interface.declares(INPUT_SAMPLER));
        assert!(!interface.declares("never_read"));
        assert!(!interface.declares("missing"));
        assert_eq!(interface.groups(), vec![0]);

        let position = interface.attribute("position").unwrap();
        assert_eq!(position.location, 0);
        assert_eq!(position.components, 2);
    }

    #[test]
    fn unmatched_varying_fails_to_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(3) color: vec4f) -> @location(0) vec4f {
    return color;
}
"#;
        let err = build_program(DEFAULT_VERTEX_SHADER, fragment).err().expect("must fail");
        assert!(matches!(err, RttError::ProgramLink(_)));
    }

    #[test]
    fn conflicting_bindings_fail_to_link() {
        let vertex = r#"
@group(0) @binding(0) var<uniform> scale: f32;
@vertex
fn vs_main(@location(0) position: vec2f) -> @builtin(position) vec4f {
    return vec4f(position * scale, 0.0, 1.0);
}
"#;
        let fragment = r#"
@group(0) @binding(0) var<uniform> tint: vec4f;
@fragment
fn fs_main() -> @location(0) vec4f {
    return tint;
}
"#;
        let err = build_program(vertex, fragment).err().expect("must fail");
        assert!(matches!(err, RttError::ProgramLink(_)));
    }
}
