//! WGSL program compilation, link checks and named uniform storage.
//!
//! Stages are parsed and validated with naga on the CPU so compile and link
//! failures surface before any GPU object exists. Each linked program carries
//! a [`UniformLayout`] reflected from its `@group(0) @binding(0)` uniform
//! struct; uniform writes go through that name → offset cache.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use bytemuck::bytes_of;
use glam::{Mat4, Vec2, Vec3, Vec4};
use log::{info, trace};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner, VectorSize};

use crate::error::RenderError;

pub const UNIFORM_GROUP: u32 = 0;
pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "vs_main",
            Self::Fragment => "fs_main",
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "VERTEX",
            Self::Fragment => "FRAGMENT",
        })
    }
}

/// A single parsed and validated stage.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    stage: ShaderStage,
    source: String,
    module: Module,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    fn entry_point(&self) -> Option<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.stage == self.stage.naga_stage() && ep.name == self.stage.entry_point())
    }
}

/// Parses and validates one stage, returning the compiler diagnostic on failure.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, RenderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| RenderError::ShaderCompile {
        stage,
        log: err.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| RenderError::ShaderCompile {
            stage,
            log: err.emit_to_string(source),
        })?;
    Ok(CompiledStage {
        stage,
        source: source.to_owned(),
        module,
    })
}

/// Value types accepted by [`UniformBlock::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    pub const fn size(self) -> usize {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    fn from_naga(inner: &TypeInner) -> Option<Self> {
        let is_f32 = |scalar: &naga::Scalar| scalar.kind == ScalarKind::Float && scalar.width == 4;
        match inner {
            TypeInner::Scalar(scalar) if is_f32(scalar) => Some(Self::Float),
            TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Sint && scalar.width == 4 => {
                Some(Self::Int)
            }
            TypeInner::Vector { size, scalar } if is_f32(scalar) => Some(match size {
                VectorSize::Bi => Self::Vec2,
                VectorSize::Tri => Self::Vec3,
                VectorSize::Quad => Self::Vec4,
            }),
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if is_f32(scalar) => Some(Self::Mat4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
            Self::Mat4(_) => UniformKind::Mat4,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::Float(v) => bytes_of(v),
            Self::Int(v) => bytes_of(v),
            Self::Vec2(v) => bytes_of(v),
            Self::Vec3(v) => bytes_of(v),
            Self::Vec4(v) => bytes_of(v),
            Self::Mat4(v) => bytes_of(v),
        }
    }

    fn read(kind: UniformKind, bytes: &[u8]) -> Self {
        let f = |i: usize| f32::from_ne_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
        match kind {
            UniformKind::Float => Self::Float(f(0)),
            UniformKind::Int => Self::Int(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            UniformKind::Vec2 => Self::Vec2(Vec2::new(f(0), f(1))),
            UniformKind::Vec3 => Self::Vec3(Vec3::new(f(0), f(1), f(2))),
            UniformKind::Vec4 => Self::Vec4(Vec4::new(f(0), f(1), f(2), f(3))),
            UniformKind::Mat4 => Self::Mat4(Mat4::from_cols_array(&std::array::from_fn(f))),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        Self::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        Self::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        Self::Mat4(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Name → location cache for a program's uniform struct, resolved at link time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    fields: HashMap<String, UniformField>,
    size: u32,
}

impl UniformLayout {
    pub fn field(&self, name: &str) -> Option<UniformField> {
        self.fields.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Byte size of the uniform buffer binding, zero when the program has no uniforms.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn reflect(stage: &CompiledStage) -> Option<(Self, Vec<(String, UniformField)>)> {
        let module = stage.module();
        let global = module.global_variables.iter().find_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            (var.space == AddressSpace::Uniform
                && binding.group == UNIFORM_GROUP
                && binding.binding == UNIFORM_BINDING)
                .then_some(var)
        })?;

        let mut members = Vec::new();
        let size = match &module.types[global.ty].inner {
            TypeInner::Struct { members: declared, span } => {
                for member in declared {
                    let (Some(name), Some(kind)) = (
                        member.name.as_ref(),
                        UniformKind::from_naga(&module.types[member.ty].inner),
                    ) else {
                        continue;
                    };
                    members.push((
                        name.clone(),
                        UniformField {
                            offset: member.offset,
                            kind,
                        },
                    ));
                }
                *span
            }
            other => {
                let kind = UniformKind::from_naga(other)?;
                if let Some(name) = global.name.as_ref() {
                    members.push((name.clone(), UniformField { offset: 0, kind }));
                }
                kind.size() as u32
            }
        };

        let layout = Self {
            fields: members.iter().cloned().collect(),
            size: size.next_multiple_of(16),
        };
        Some((layout, members))
    }
}

/// CPU-side copy of a program's uniform struct.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: Arc<UniformLayout>,
    data: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: Arc<UniformLayout>) -> Self {
        let data = vec![0; layout.size() as usize];
        Self { layout, data }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Writes `value` under `name`. Unknown names and mismatched types are
    /// ignored; returns whether the write landed.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        let Some(field) = self.layout.field(name) else {
            trace!("ignoring write to inactive uniform `{name}`");
            return false;
        };
        if field.kind != value.kind() {
            trace!(
                "ignoring write to uniform `{name}`: expected {:?}, got {:?}",
                field.kind,
                value.kind()
            );
            return false;
        }
        let start = field.offset as usize;
        let bytes = value.bytes();
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        true
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let field = self.layout.field(name)?;
        let start = field.offset as usize;
        Some(UniformValue::read(
            field.kind,
            &self.data[start..start + field.kind.size()],
        ))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Vertex + fragment stages that passed the link checks.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    label: String,
    vertex: CompiledStage,
    fragment: CompiledStage,
    uniforms: Arc<UniformLayout>,
    vertex_inputs: Vec<u32>,
    samples_texture: bool,
}

impl LinkedProgram {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex(&self) -> &CompiledStage {
        &self.vertex
    }

    pub fn fragment(&self) -> &CompiledStage {
        &self.fragment
    }

    pub fn uniforms(&self) -> &Arc<UniformLayout> {
        &self.uniforms
    }

    /// Attribute locations consumed by the vertex entry point, ascending.
    pub fn vertex_inputs(&self) -> &[u32] {
        &self.vertex_inputs
    }

    /// Whether the fragment stage declares a texture in group 1.
    pub fn samples_texture(&self) -> bool {
        self.samples_texture
    }

    pub fn new_uniform_block(&self) -> UniformBlock {
        UniformBlock::new(Arc::clone(&self.uniforms))
    }
}

/// Compiles both stages and links them into a program.
///
/// Linking checks that each stage exposes its entry point, that every
/// fragment input location is written by the vertex stage, and that uniform
/// members declared in both stages agree on offset and type.
pub fn compile_and_link(
    label: &str,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<LinkedProgram, RenderError> {
    let vertex = compile_stage(ShaderStage::Vertex, vertex_source)?;
    let fragment = compile_stage(ShaderStage::Fragment, fragment_source)?;
    let link_error = |log: String| RenderError::ShaderLink {
        program: label.to_owned(),
        log,
    };

    let vs_entry = vertex
        .entry_point()
        .ok_or_else(|| link_error(format!("vertex stage has no `{}` entry point", ShaderStage::Vertex.entry_point())))?;
    let fs_entry = fragment.entry_point().ok_or_else(|| {
        link_error(format!(
            "fragment stage has no `{}` entry point",
            ShaderStage::Fragment.entry_point()
        ))
    })?;

    let vertex_inputs: BTreeSet<u32> = vs_entry
        .function
        .arguments
        .iter()
        .flat_map(|arg| locations(vertex.module(), arg.binding.as_ref(), arg.ty))
        .collect();
    let vertex_outputs: BTreeSet<u32> = vs_entry
        .function
        .result
        .iter()
        .flat_map(|result| locations(vertex.module(), result.binding.as_ref(), result.ty))
        .collect();
    let fragment_inputs: BTreeSet<u32> = fs_entry
        .function
        .arguments
        .iter()
        .flat_map(|arg| locations(fragment.module(), arg.binding.as_ref(), arg.ty))
        .collect();
    if let Some(missing) = fragment_inputs.difference(&vertex_outputs).next() {
        return Err(link_error(format!(
            "fragment input at location {missing} is not written by the vertex stage"
        )));
    }

    let uniforms = link_uniforms(&vertex, &fragment).map_err(link_error)?;
    let samples_texture = fragment.module().global_variables.iter().any(|(_, var)| {
        matches!(fragment.module().types[var.ty].inner, TypeInner::Image { .. })
            && var.binding.as_ref().is_some_and(|b| b.group == TEXTURE_GROUP)
    });

    info!(
        "linked program `{label}` ({} uniforms, {} vertex inputs)",
        uniforms.len(),
        vertex_inputs.len()
    );
    Ok(LinkedProgram {
        label: label.to_owned(),
        vertex,
        fragment,
        uniforms: Arc::new(uniforms),
        vertex_inputs: vertex_inputs.into_iter().collect(),
        samples_texture,
    })
}

fn locations(module: &Module, binding: Option<&Binding>, ty: naga::Handle<naga::Type>) -> Vec<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => vec![*location],
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|member| match member.binding {
                    Some(Binding::Location { location, .. }) => Some(location),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn link_uniforms(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<UniformLayout, String> {
    let reflected = [UniformLayout::reflect(vertex), UniformLayout::reflect(fragment)];
    let mut merged = UniformLayout::default();
    for (layout, members) in reflected.into_iter().flatten() {
        for (name, field) in members {
            match merged.fields.get(&name) {
                Some(existing) if *existing != field => {
                    return Err(format!(
                        "uniform `{name}` disagrees between stages: {:?} at offset {} vs {:?} at offset {}",
                        existing.kind, existing.offset, field.kind, field.offset
                    ));
                }
                Some(_) => {}
                None => {
                    merged.fields.insert(name, field);
                }
            }
        }
        merged.size = merged.size.max(layout.size);
    }
    Ok(merged)
}

/// Opaque identifier for a program owned by a render device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(u32);

impl ProgramHandle {
    pub fn id(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

#[derive(Debug)]
pub struct ProgramSlot<T> {
    pub program: LinkedProgram,
    pub uniforms: UniformBlock,
    pub backend: T,
}

/// Live programs of a device together with their uniform state.
///
/// `T` carries whatever the backend builds per program (pipelines, buffers).
#[derive(Debug)]
pub struct ProgramTable<T> {
    slots: HashMap<ProgramHandle, ProgramSlot<T>>,
    next_id: u32,
}

impl<T> Default for ProgramTable<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> ProgramTable<T> {
    pub fn insert(&mut self, program: LinkedProgram, backend: T) -> ProgramHandle {
        let handle = ProgramHandle(self.next_id);
        self.next_id += 1;
        let uniforms = program.new_uniform_block();
        self.slots.insert(
            handle,
            ProgramSlot {
                program,
                uniforms,
                backend,
            },
        );
        handle
    }

    pub fn remove(&mut self, handle: ProgramHandle) -> Option<ProgramSlot<T>> {
        self.slots.remove(&handle)
    }

    pub fn get(&self, handle: ProgramHandle) -> Option<&ProgramSlot<T>> {
        self.slots.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ProgramHandle) -> Option<&mut ProgramSlot<T>> {
        self.slots.get_mut(&handle)
    }

    /// Writes a uniform on a live program; stale handles are ignored like unknown names.
    pub fn set_uniform(&mut self, handle: ProgramHandle, name: &str, value: impl Into<UniformValue>) -> bool {
        match self.slots.get_mut(&handle) {
            Some(slot) => slot.uniforms.set(name, value),
            None => {
                trace!("ignoring uniform `{name}` for released {handle}");
                false
            }
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (ProgramHandle, ProgramSlot<T>)> + '_ {
        self.slots.drain()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static PASSTHROUGH: Lazy<LinkedProgram> = Lazy::new(|| {
        compile_and_link("passthrough", PASSTHROUGH_VS, PASSTHROUGH_FS).expect("passthrough links")
    });

    const PASSTHROUGH_VS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec3<f32>,
    scale: f32,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(2) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.model * vec4<f32>(position * u.scale, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const PASSTHROUGH_FS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec3<f32>,
    scale: f32,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(u.tint * uv.x, 1.0);
}
"#;

    #[test]
    fn stage_banner_names() {
        assert_eq!(ShaderStage::Vertex.to_string(), "VERTEX");
        assert_eq!(ShaderStage::Fragment.to_string(), "FRAGMENT");
    }

    #[test]
    fn invalid_source_reports_compiler_log() {
        let err = compile_and_link("broken", "fn vs_main( -> {", PASSTHROUGH_FS).unwrap_err();
        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.trim().is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn type_errors_fail_the_fragment_stage() {
        let fs = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        let err = compile_and_link("bad-return", PASSTHROUGH_VS, fs).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompile { stage: ShaderStage::Fragment, ref log } if !log.is_empty()
        ));
    }

    #[test]
    fn passthrough_links_and_reflects_uniforms() {
        let program = PASSTHROUGH.clone();
        assert_eq!(program.label(), "passthrough");
        assert_eq!(program.vertex_inputs(), &[0, 2]);
        assert!(!program.samples_texture());

        let uniforms = program.uniforms();
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms.field("model").unwrap().kind, UniformKind::Mat4);
        let tint = uniforms.field("tint").unwrap();
        assert_eq!((tint.offset, tint.kind), (64, UniformKind::Vec3));
        assert_eq!(uniforms.field("scale").unwrap().offset, 76);
        assert_eq!(uniforms.size(), 80);
    }

    #[test]
    fn missing_entry_point_is_a_link_error() {
        let vs = PASSTHROUGH_VS.replace("vs_main", "main");
        let err = compile_and_link("renamed", &vs, PASSTHROUGH_FS).unwrap_err();
        assert!(err.to_string().starts_with("ERROR::SHADER::PROGRAM::LINKING_FAILED"));
    }

    #[test]
    fn unmatched_varying_is_a_link_error() {
        let fs = r#"
@fragment
fn fs_main(@location(3) normal: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(normal, 1.0);
}
"#;
        let err = compile_and_link("varying", PASSTHROUGH_VS, fs).unwrap_err();
        match err {
            RenderError::ShaderLink { program, log } => {
                assert_eq!(program, "varying");
                assert!(log.contains("location 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn disagreeing_uniform_structs_fail_to_link() {
        let fs = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return u.tint * uv.y;
}
"#;
        let err = compile_and_link("mismatch", PASSTHROUGH_VS, fs).unwrap_err();
        assert!(matches!(err, RenderError::ShaderLink { ref log, .. } if log.contains("tint")));
    }

    #[test]
    fn unknown_uniform_is_a_silent_no_op() {
        let program = PASSTHROUGH.clone();
        let mut block = program.new_uniform_block();
        let before = block.bytes().to_vec();
        assert!(!block.set("lightColor9", Vec3::ONE));
        assert!(!block.set("scale", Vec3::ONE));
        assert_eq!(block.bytes(), before.as_slice());

        assert!(block.set("tint", Vec3::new(0.25, 0.5, 1.0)));
        assert!(block.set("scale", 2.0));
        assert_eq!(block.get("tint"), Some(UniformValue::Vec3(Vec3::new(0.25, 0.5, 1.0))));
        assert_eq!(block.get("scale"), Some(UniformValue::Float(2.0)));
        assert_eq!(block.get("missing"), None);
    }

    #[test]
    fn matrices_are_stored_column_major() {
        let program = PASSTHROUGH.clone();
        let mut block = program.new_uniform_block();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        block.set("model", model);
        assert_eq!(block.get("model"), Some(UniformValue::Mat4(model)));
        assert_eq!(&block.bytes()[48..52], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn program_table_ignores_released_handles() {
        let program = PASSTHROUGH.clone();
        let mut table = ProgramTable::<()>::default();
        let first = table.insert(program.clone(), ());
        let second = table.insert(program, ());
        assert_ne!(first, second);
        assert!(table.set_uniform(first, "scale", 3.0));

        assert!(table.remove(first).is_some());
        assert!(table.remove(first).is_none());
        assert!(!table.set_uniform(first, "scale", 3.0));
        assert_eq!(table.len(), 1);
    }
}
