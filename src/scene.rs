use glam::{Mat4, Vec3};
use serde::Serialize;

use crate::geometry::PrimitiveId;
use crate::texture::TextureSlot;

/// Per-object transform, composed as translate × rotate(x) × scale each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformRecipe {
    pub translation: Vec3,
    pub rotation_x_degrees: f32,
    pub scale: Vec3,
}

impl TransformRecipe {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation_x_degrees: 0.0,
        scale: Vec3::ONE,
    };

    pub const fn uniform(scale: f32) -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation_x_degrees: 0.0,
            scale: Vec3::splat(scale),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_rotation_x(self.rotation_x_degrees.to_radians())
            * Mat4::from_scale(self.scale)
    }
}

impl Default for TransformRecipe {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One entry of the fixed draw table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneObject {
    pub name: &'static str,
    pub primitive: PrimitiveId,
    pub transform: TransformRecipe,
    pub texture: TextureSlot,
}

impl SceneObject {
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.model_matrix()
    }
}

const CARTON: TransformRecipe = TransformRecipe::uniform(0.5);

const CAP: TransformRecipe = TransformRecipe {
    translation: Vec3::new(-3.35, 11.0, -2.8),
    rotation_x_degrees: 6.1,
    scale: Vec3::new(0.85, 1.0, 0.85),
};

const GLASS: TransformRecipe = TransformRecipe {
    translation: Vec3::new(-5.0, 0.0, 4.0),
    rotation_x_degrees: 0.0,
    scale: Vec3::splat(0.4),
};

/// Scene objects in draw order.
pub const STILL_LIFE: [SceneObject; 10] = [
    SceneObject {
        name: "ground",
        primitive: PrimitiveId::Plane,
        transform: TransformRecipe::IDENTITY,
        texture: TextureSlot::Plane,
    },
    SceneObject {
        name: "milk carton",
        primitive: PrimitiveId::MilkBottom,
        transform: CARTON,
        texture: TextureSlot::MilkCarton,
    },
    SceneObject {
        name: "milk carton top",
        primitive: PrimitiveId::MilkTop,
        transform: CARTON,
        texture: TextureSlot::MilkTop,
    },
    SceneObject {
        name: "cap top",
        primitive: PrimitiveId::CapTop,
        transform: CAP,
        texture: TextureSlot::CapTop,
    },
    SceneObject {
        name: "cap side",
        primitive: PrimitiveId::CapSide,
        transform: CAP,
        texture: TextureSlot::CapSide,
    },
    SceneObject {
        name: "donut box",
        primitive: PrimitiveId::DonutBox,
        transform: TransformRecipe {
            translation: Vec3::new(5.0, 0.0, 2.0),
            rotation_x_degrees: 0.0,
            scale: Vec3::new(0.7, 0.6, 0.7),
        },
        texture: TextureSlot::DonutBox,
    },
    SceneObject {
        name: "donut",
        primitive: PrimitiveId::Donut,
        transform: TransformRecipe {
            translation: Vec3::new(0.0, 0.0, 6.0),
            rotation_x_degrees: 0.0,
            scale: Vec3::new(0.6, 0.7, 0.6),
        },
        texture: TextureSlot::Donut,
    },
    SceneObject {
        name: "glass top",
        primitive: PrimitiveId::GlassTop,
        transform: GLASS,
        texture: TextureSlot::GlassTop,
    },
    SceneObject {
        name: "glass side",
        primitive: PrimitiveId::GlassSide,
        transform: GLASS,
        texture: TextureSlot::MilkSide,
    },
    SceneObject {
        name: "milk label",
        primitive: PrimitiveId::MilkPlane,
        transform: CARTON,
        texture: TextureSlot::Label,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_order_is_fixed() {
        let order: Vec<PrimitiveId> = STILL_LIFE.iter().map(|object| object.primitive).collect();
        assert_eq!(
            order,
            vec![
                PrimitiveId::Plane,
                PrimitiveId::MilkBottom,
                PrimitiveId::MilkTop,
                PrimitiveId::CapTop,
                PrimitiveId::CapSide,
                PrimitiveId::DonutBox,
                PrimitiveId::Donut,
                PrimitiveId::GlassTop,
                PrimitiveId::GlassSide,
                PrimitiveId::MilkPlane,
            ]
        );
        assert!(STILL_LIFE.iter().all(|object| object.primitive != PrimitiveId::LightMarker));
    }

    #[test]
    fn model_matrix_scales_before_translating() {
        let recipe = TransformRecipe {
            translation: Vec3::new(5.0, 0.0, 2.0),
            rotation_x_degrees: 0.0,
            scale: Vec3::splat(2.0),
        };
        let point = recipe.model_matrix().transform_point3(Vec3::ONE);
        assert_eq!(point, Vec3::new(7.0, 2.0, 4.0));
    }

    #[test]
    fn cap_tilts_about_x() {
        let tilted = CAP.model_matrix().transform_vector3(Vec3::Y);
        assert!(tilted.x.abs() < 1e-6);
        assert!((tilted.y - 6.1f32.to_radians().cos()).abs() < 1e-6);
        assert!((tilted.z - 6.1f32.to_radians().sin()).abs() < 1e-6);
    }

    #[test]
    fn identity_recipe_is_identity() {
        assert_eq!(TransformRecipe::default().model_matrix(), Mat4::IDENTITY);
    }
}
