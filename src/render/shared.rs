//! WGSL sources for the lit and lamp programs.
//!
//! Both stages of a program declare the same `Uniforms` struct at
//! `@group(0) @binding(0)`; the linker rejects programs whose copies disagree.
//! Light uniforms are named `lightColorN`, `lightPosN`, `lightIntensityN` and
//! `highlightSizeN` for N in 1..=5.

pub(crate) const LIT_UNIFORMS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    normalMatrix: mat4x4<f32>,
    viewPosition: vec3<f32>,
    uvScale: vec2<f32>,
    lightColor1: vec3<f32>,
    lightIntensity1: f32,
    lightPos1: vec3<f32>,
    highlightSize1: f32,
    lightColor2: vec3<f32>,
    lightIntensity2: f32,
    lightPos2: vec3<f32>,
    highlightSize2: f32,
    lightColor3: vec3<f32>,
    lightIntensity3: f32,
    lightPos3: vec3<f32>,
    highlightSize3: f32,
    lightColor4: vec3<f32>,
    lightIntensity4: f32,
    lightPos4: vec3<f32>,
    highlightSize4: f32,
    lightColor5: vec3<f32>,
    lightIntensity5: f32,
    lightPos5: vec3<f32>,
    highlightSize5: f32,
}

@group(0) @binding(0)
var<uniform> u: Uniforms;
"#;

pub(crate) const LIT_VERTEX_BODY: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world = u.model * vec4<f32>(input.position, 1.0);
    output.clip_position = u.projection * u.view * world;
    output.world_position = world.xyz;
    output.normal = (u.normalMatrix * vec4<f32>(input.normal, 0.0)).xyz;
    output.uv = input.uv;
    return output;
}
"#;

pub(crate) const LIT_FRAGMENT_BODY: &str = r#"
struct FragmentInput {
    @location(0) normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@group(1) @binding(0)
var uTexture: texture_2d<f32>;
@group(1) @binding(1)
var uSampler: sampler;

fn point_light(
    position: vec3<f32>,
    color: vec3<f32>,
    intensity: f32,
    highlight: f32,
    normal: vec3<f32>,
    frag_pos: vec3<f32>,
) -> vec3<f32> {
    let ambient = intensity * color;

    let light_dir = normalize(position - frag_pos);
    let diffuse = max(dot(normal, light_dir), 0.2) * color;

    let view_dir = normalize(u.viewPosition - frag_pos);
    let reflect_dir = reflect(-light_dir, normal);
    let specular = 0.2 * pow(max(dot(view_dir, reflect_dir), 0.0), highlight) * color;

    return ambient + diffuse + specular;
}

@fragment
fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {
    let texel = textureSample(uTexture, uSampler, input.uv * u.uvScale).xyz;
    let n = normalize(input.normal);
    let p = input.world_position;

    var result = vec3<f32>(0.0);
    result += point_light(u.lightPos1, u.lightColor1, u.lightIntensity1, u.highlightSize1, n, p) * texel;
    result += point_light(u.lightPos2, u.lightColor2, u.lightIntensity2, u.highlightSize2, n, p) * texel;
    result += point_light(u.lightPos3, u.lightColor3, u.lightIntensity3, u.highlightSize3, n, p) * texel;
    result += point_light(u.lightPos4, u.lightColor4, u.lightIntensity4, u.highlightSize4, n, p) * texel;
    result += point_light(u.lightPos5, u.lightColor5, u.lightIntensity5, u.highlightSize5, n, p) * texel;
    return vec4<f32>(result, 1.0);
}
"#;

pub(crate) const LAMP_VERTEX: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.projection * u.view * u.model * vec4<f32>(position, 1.0);
}
"#;

pub(crate) const LAMP_FRAGMENT: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

pub fn lit_vertex_source() -> String {
    format!("{LIT_UNIFORMS}{LIT_VERTEX_BODY}")
}

pub fn lit_fragment_source() -> String {
    format!("{LIT_UNIFORMS}{LIT_FRAGMENT_BODY}")
}

pub fn lamp_vertex_source() -> &'static str {
    LAMP_VERTEX
}

pub fn lamp_fragment_source() -> &'static str {
    LAMP_FRAGMENT
}
