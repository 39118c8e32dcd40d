//! Static vertex data for the still-life primitives.
//!
//! Every primitive is generated once at startup into an interleaved float
//! table. Lit primitives use `position.xyz normal.xyz uv.xy`; the light
//! marker is position-only. Normals are written as-is and renormalized by
//! the lighting shader.

use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Attribute layout of a primitive's vertex table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexLayout {
    Position,
    PositionNormalUv,
}

impl VertexLayout {
    pub const fn floats_per_vertex(self) -> usize {
        match self {
            Self::Position => 3,
            Self::PositionNormalUv => 8,
        }
    }

    pub const fn stride_bytes(self) -> u64 {
        (self.floats_per_vertex() * std::mem::size_of::<f32>()) as u64
    }
}

/// Identifies one of the eleven static primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimitiveId {
    Plane,
    MilkBottom,
    MilkTop,
    CapTop,
    CapSide,
    DonutBox,
    Donut,
    GlassTop,
    GlassSide,
    MilkPlane,
    LightMarker,
}

impl PrimitiveId {
    pub const ALL: [PrimitiveId; 11] = [
        Self::Plane,
        Self::MilkBottom,
        Self::MilkTop,
        Self::CapTop,
        Self::CapSide,
        Self::DonutBox,
        Self::Donut,
        Self::GlassTop,
        Self::GlassSide,
        Self::MilkPlane,
        Self::LightMarker,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Plane => "plane",
            Self::MilkBottom => "milk-bottom",
            Self::MilkTop => "milk-top",
            Self::CapTop => "cap-top",
            Self::CapSide => "cap-side",
            Self::DonutBox => "donut-box",
            Self::Donut => "donut",
            Self::GlassTop => "glass-top",
            Self::GlassSide => "glass-side",
            Self::MilkPlane => "milk-plane",
            Self::LightMarker => "light-marker",
        }
    }

    pub const fn layout(self) -> VertexLayout {
        match self {
            Self::LightMarker => VertexLayout::Position,
            _ => VertexLayout::PositionNormalUv,
        }
    }

    /// Length of the vertex table this primitive is declared with.
    pub const fn declared_floats(self) -> usize {
        match self {
            Self::LightMarker => 108,
            Self::Plane => 48,
            Self::MilkBottom => 192,
            Self::MilkTop => 144,
            Self::DonutBox => 240,
            Self::GlassTop => 192,
            Self::GlassSide => 384,
            Self::CapTop => 192,
            Self::CapSide => 384,
            Self::Donut => 3072,
            Self::MilkPlane => 48,
        }
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable interleaved vertex table for one primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    id: PrimitiveId,
    vertices: Vec<f32>,
}

impl Primitive {
    /// Wraps a generated table.
    ///
    /// # Panics
    ///
    /// Panics when the table length differs from the primitive's declared
    /// float count. That is a build defect in the generator, not an input error.
    pub fn new(id: PrimitiveId, vertices: Vec<f32>) -> Self {
        assert_eq!(
            vertices.len(),
            id.declared_floats(),
            "primitive {id} generated {} floats, declared {}",
            vertices.len(),
            id.declared_floats()
        );
        Self { id, vertices }
    }

    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    pub fn layout(&self) -> VertexLayout {
        self.id.layout()
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        (self.vertices.len() / self.layout().floats_per_vertex()) as u32
    }
}

/// All static primitives keyed by identifier.
#[derive(Debug, Clone)]
pub struct GeometryCatalog {
    primitives: BTreeMap<PrimitiveId, Primitive>,
}

impl GeometryCatalog {
    /// Builds the milk carton, donut box, donut, glass, ground and marker tables.
    pub fn still_life() -> Self {
        let primitives = PrimitiveId::ALL
            .into_iter()
            .map(|id| (id, Primitive::new(id, generate(id))))
            .collect();
        Self { primitives }
    }

    pub fn get(&self, id: PrimitiveId) -> &Primitive {
        &self.primitives[&id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.values()
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

// Model-space dimensions. The carton and its label are drawn at half scale,
// the cap sits on the ridge of the carton top.
const GROUND_HALF_EXTENT: f32 = 30.0;
const CARTON_CENTER: Vec2 = Vec2::new(-6.7, -5.6);
const CARTON_HALF_WIDTH: f32 = 3.0;
const CARTON_BODY_HEIGHT: f32 = 16.0;
const CARTON_RIDGE_HEIGHT: f32 = 22.0;
const CAP_RADIUS: f32 = 1.0;
const CAP_HEIGHT: f32 = 1.0;
const BOX_HALF_EXTENT: f32 = 5.0;
const BOX_HEIGHT: f32 = 4.0;
const DONUT_MAJOR_RADIUS: f32 = 3.0;
const DONUT_MINOR_RADIUS: f32 = 1.0;
const GLASS_RADIUS: f32 = 3.0;
const GLASS_HEIGHT: f32 = 12.0;
const ROUND_SEGMENTS: u32 = 8;

fn generate(id: PrimitiveId) -> Vec<f32> {
    match id {
        PrimitiveId::Plane => ground_plane(),
        PrimitiveId::MilkBottom => carton_body(),
        PrimitiveId::MilkTop => carton_top(),
        PrimitiveId::CapTop => disc(CAP_RADIUS, CAP_HEIGHT),
        PrimitiveId::CapSide => cylinder_wall(CAP_RADIUS, CAP_HEIGHT),
        PrimitiveId::DonutBox => open_box(),
        PrimitiveId::Donut => torus(),
        PrimitiveId::GlassTop => disc(GLASS_RADIUS, GLASS_HEIGHT),
        PrimitiveId::GlassSide => cylinder_wall(GLASS_RADIUS, GLASS_HEIGHT),
        PrimitiveId::MilkPlane => carton_label(),
        PrimitiveId::LightMarker => marker_cube(),
    }
}

#[derive(Default)]
struct VertexWriter {
    data: Vec<f32>,
}

impl VertexWriter {
    fn vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) {
        self.data.extend_from_slice(&position.to_array());
        self.data.extend_from_slice(&normal.to_array());
        self.data.extend_from_slice(&uv.to_array());
    }

    fn triangle(&mut self, corners: [(Vec3, Vec2); 3], normal: Vec3) {
        for (position, uv) in corners {
            self.vertex(position, normal, uv);
        }
    }

    /// Two triangles over corners given counter-clockwise.
    fn quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        self.triangle(
            [(corners[0], uvs[0]), (corners[1], uvs[1]), (corners[2], uvs[2])],
            normal,
        );
        self.triangle(
            [(corners[0], uvs[0]), (corners[2], uvs[2]), (corners[3], uvs[3])],
            normal,
        );
    }

    fn finish(self) -> Vec<f32> {
        self.data
    }
}

fn ground_plane() -> Vec<f32> {
    let e = GROUND_HALF_EXTENT;
    let mut w = VertexWriter::default();
    w.quad(
        [
            Vec3::new(-e, 0.0, e),
            Vec3::new(e, 0.0, e),
            Vec3::new(e, 0.0, -e),
            Vec3::new(-e, 0.0, -e),
        ],
        Vec3::Y,
    );
    w.finish()
}

/// Corner of the carton footprint at height `y`; `sx`/`sz` pick the side.
fn carton_corner(sx: f32, sz: f32, y: f32) -> Vec3 {
    Vec3::new(
        CARTON_CENTER.x + sx * CARTON_HALF_WIDTH,
        y,
        CARTON_CENTER.y + sz * CARTON_HALF_WIDTH,
    )
}

fn carton_body() -> Vec<f32> {
    let h = CARTON_BODY_HEIGHT;
    let mut w = VertexWriter::default();
    // front, right, back, left
    let sides = [
        ((-1.0, 1.0), (1.0, 1.0), Vec3::Z),
        ((1.0, 1.0), (1.0, -1.0), Vec3::X),
        ((1.0, -1.0), (-1.0, -1.0), Vec3::NEG_Z),
        ((-1.0, -1.0), (-1.0, 1.0), Vec3::NEG_X),
    ];
    for ((ax, az), (bx, bz), normal) in sides {
        w.quad(
            [
                carton_corner(ax, az, 0.0),
                carton_corner(bx, bz, 0.0),
                carton_corner(bx, bz, h),
                carton_corner(ax, az, h),
            ],
            normal,
        );
    }
    w.finish()
}

fn carton_top() -> Vec<f32> {
    let (base, ridge) = (CARTON_BODY_HEIGHT, CARTON_RIDGE_HEIGHT);
    let rise = ridge - base;
    let ridge_point = |sx: f32| Vec3::new(CARTON_CENTER.x + sx * CARTON_HALF_WIDTH, ridge, CARTON_CENTER.y);
    let mut w = VertexWriter::default();

    let front_normal = Vec3::new(0.0, CARTON_HALF_WIDTH, rise);
    w.quad(
        [
            carton_corner(-1.0, 1.0, base),
            carton_corner(1.0, 1.0, base),
            ridge_point(1.0),
            ridge_point(-1.0),
        ],
        front_normal,
    );
    let back_normal = Vec3::new(0.0, CARTON_HALF_WIDTH, -rise);
    w.quad(
        [
            carton_corner(1.0, -1.0, base),
            carton_corner(-1.0, -1.0, base),
            ridge_point(-1.0),
            ridge_point(1.0),
        ],
        back_normal,
    );

    for sx in [1.0, -1.0] {
        w.triangle(
            [
                (carton_corner(sx, sx, base), Vec2::ZERO),
                (carton_corner(sx, -sx, base), Vec2::X),
                (ridge_point(sx), Vec2::new(0.5, 1.0)),
            ],
            Vec3::new(sx, 0.0, 0.0),
        );
    }
    w.finish()
}

fn carton_label() -> Vec<f32> {
    let z = CARTON_CENTER.y + CARTON_HALF_WIDTH + 0.02;
    let (left, right) = (CARTON_CENTER.x - 2.5, CARTON_CENTER.x + 2.5);
    let (bottom, top) = (3.0, 13.0);
    let mut w = VertexWriter::default();
    w.quad(
        [
            Vec3::new(left, bottom, z),
            Vec3::new(right, bottom, z),
            Vec3::new(right, top, z),
            Vec3::new(left, top, z),
        ],
        Vec3::Z,
    );
    w.finish()
}

fn ring_point(radius: f32, segment: u32, y: f32) -> Vec3 {
    let angle = TAU * segment as f32 / ROUND_SEGMENTS as f32;
    Vec3::new(radius * angle.cos(), y, radius * angle.sin())
}

fn disc(radius: f32, y: f32) -> Vec<f32> {
    let center = Vec3::new(0.0, y, 0.0);
    let polar_uv = |p: Vec3| Vec2::new(0.5 + 0.5 * p.x / radius, 0.5 + 0.5 * p.z / radius);
    let mut w = VertexWriter::default();
    for segment in 0..ROUND_SEGMENTS {
        let a = ring_point(radius, segment, y);
        let b = ring_point(radius, segment + 1, y);
        w.triangle(
            [(center, Vec2::splat(0.5)), (b, polar_uv(b)), (a, polar_uv(a))],
            Vec3::Y,
        );
    }
    w.finish()
}

fn cylinder_wall(radius: f32, height: f32) -> Vec<f32> {
    let mut w = VertexWriter::default();
    for segment in 0..ROUND_SEGMENTS {
        let (u0, u1) = (
            segment as f32 / ROUND_SEGMENTS as f32,
            (segment + 1) as f32 / ROUND_SEGMENTS as f32,
        );
        let (a0, a1) = (ring_point(radius, segment, 0.0), ring_point(radius, segment + 1, 0.0));
        let (b0, b1) = (
            ring_point(radius, segment, height),
            ring_point(radius, segment + 1, height),
        );
        let (n0, n1) = (a0 / radius, a1 / radius);
        w.vertex(a0, n0, Vec2::new(u0, 0.0));
        w.vertex(a1, n1, Vec2::new(u1, 0.0));
        w.vertex(b1, n1, Vec2::new(u1, 1.0));
        w.vertex(a0, n0, Vec2::new(u0, 0.0));
        w.vertex(b1, n1, Vec2::new(u1, 1.0));
        w.vertex(b0, n0, Vec2::new(u0, 1.0));
    }
    w.finish()
}

fn open_box() -> Vec<f32> {
    let (e, h) = (BOX_HALF_EXTENT, BOX_HEIGHT);
    let p = |x: f32, y: f32, z: f32| Vec3::new(x * e, y, z * e);
    let mut w = VertexWriter::default();
    w.quad([p(-1.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(1.0, 0.0, -1.0), p(-1.0, 0.0, -1.0)], Vec3::Y);
    w.quad([p(-1.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(1.0, h, 1.0), p(-1.0, h, 1.0)], Vec3::Z);
    w.quad([p(1.0, 0.0, 1.0), p(1.0, 0.0, -1.0), p(1.0, h, -1.0), p(1.0, h, 1.0)], Vec3::X);
    w.quad([p(1.0, 0.0, -1.0), p(-1.0, 0.0, -1.0), p(-1.0, h, -1.0), p(1.0, h, -1.0)], Vec3::NEG_Z);
    w.quad([p(-1.0, 0.0, -1.0), p(-1.0, 0.0, 1.0), p(-1.0, h, 1.0), p(-1.0, h, -1.0)], Vec3::NEG_X);
    w.finish()
}

fn torus() -> Vec<f32> {
    let steps = ROUND_SEGMENTS;
    let sample = |i: u32, j: u32| {
        let u = TAU * i as f32 / steps as f32;
        let v = TAU * j as f32 / steps as f32;
        let normal = Vec3::new(v.cos() * u.cos(), v.sin(), v.cos() * u.sin());
        let ring = DONUT_MAJOR_RADIUS + DONUT_MINOR_RADIUS * v.cos();
        let position = Vec3::new(ring * u.cos(), DONUT_MINOR_RADIUS * (1.0 + v.sin()), ring * u.sin());
        let uv = Vec2::new(i as f32 / steps as f32, j as f32 / steps as f32);
        (position, normal, uv)
    };

    let mut w = VertexWriter::default();
    for i in 0..steps {
        for j in 0..steps {
            let corners = [sample(i, j), sample(i + 1, j), sample(i + 1, j + 1), sample(i, j + 1)];
            for index in [0, 1, 2, 0, 2, 3] {
                let (position, normal, uv) = corners[index];
                w.vertex(position, normal, uv);
            }
        }
    }
    w.finish()
}

fn marker_cube() -> Vec<f32> {
    const FACES: [[[f32; 3]; 4]; 6] = [
        [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
        [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]],
        [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]],
        [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]],
        [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]],
        [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
    ];
    FACES
        .iter()
        .flat_map(|face| [0, 1, 2, 0, 2, 3].map(|index| face[index]))
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_vertices(primitive: &Primitive) -> impl Iterator<Item = (Vec3, Vec3, Vec2)> + '_ {
        primitive.vertices().chunks_exact(8).map(|v| {
            (
                Vec3::new(v[0], v[1], v[2]),
                Vec3::new(v[3], v[4], v[5]),
                Vec2::new(v[6], v[7]),
            )
        })
    }

    #[test]
    fn every_primitive_matches_its_declared_size() {
        let catalog = GeometryCatalog::still_life();
        assert_eq!(catalog.len(), 11);
        for id in PrimitiveId::ALL {
            let primitive = catalog.get(id);
            assert_eq!(primitive.vertices().len(), id.declared_floats(), "{id}");
            let per_vertex = id.layout().floats_per_vertex();
            assert_eq!(primitive.vertices().len() % per_vertex, 0, "{id}");
            assert_eq!(primitive.vertex_count() % 3, 0, "{id} is not a triangle list");
        }
    }

    #[test]
    fn vertex_counts_follow_the_layout() {
        let catalog = GeometryCatalog::still_life();
        assert_eq!(catalog.get(PrimitiveId::LightMarker).vertex_count(), 36);
        assert_eq!(catalog.get(PrimitiveId::Plane).vertex_count(), 6);
        assert_eq!(catalog.get(PrimitiveId::Donut).vertex_count(), 384);
        assert_eq!(catalog.get(PrimitiveId::GlassSide).vertex_count(), 48);
    }

    #[test]
    fn lit_primitives_carry_nonzero_normals() {
        let catalog = GeometryCatalog::still_life();
        for primitive in catalog.iter().filter(|p| p.layout() == VertexLayout::PositionNormalUv) {
            for (_, normal, _) in lit_vertices(primitive) {
                assert!(normal.length() > 0.5, "{} has a degenerate normal", primitive.id());
            }
        }
    }

    #[test]
    fn donut_normals_point_away_from_the_tube_center() {
        let catalog = GeometryCatalog::still_life();
        for (position, normal, _) in lit_vertices(catalog.get(PrimitiveId::Donut)) {
            let ring = Vec3::new(position.x, 0.0, position.z).normalize() * DONUT_MAJOR_RADIUS
                + Vec3::Y * DONUT_MINOR_RADIUS;
            let outward = (position - ring).normalize();
            assert!(outward.dot(normal) > 0.99);
        }
    }

    #[test]
    fn marker_cube_is_centered_unit_cube() {
        let catalog = GeometryCatalog::still_life();
        let marker = catalog.get(PrimitiveId::LightMarker);
        assert!(marker.vertices().iter().all(|v| v.abs() == 0.5));
    }

    #[test]
    #[should_panic(expected = "declared 48")]
    fn wrong_table_length_is_rejected() {
        Primitive::new(PrimitiveId::Plane, vec![0.0; 40]);
    }
}
