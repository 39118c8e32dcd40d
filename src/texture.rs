use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::render::{RenderDevice, TextureHandle};

/// Decoded RGBA8 pixels, flipped so row 0 is the bottom of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file (3 or 4); pixels are always expanded to RGBA.
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let image = image::open(path).map_err(|err| RenderError::TextureLoad {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_dynamic(path, image)
    }

    pub fn from_dynamic(path: &Path, image: DynamicImage) -> Result<Self, RenderError> {
        let channels = image.color().channel_count();
        if channels != 3 && channels != 4 {
            return Err(RenderError::TextureLoad {
                path: path.to_path_buf(),
                reason: format!("unsupported image with {channels} channels"),
            });
        }
        let rgba = image.flipv().to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            channels,
            pixels: rgba.into_raw(),
        })
    }

    /// 1×1 opaque white, bound in place of textures that failed to load.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            channels: 4,
            pixels: vec![255; 4],
        }
    }
}

/// Texture unit assignments for the scene's materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TextureSlot {
    Plane,
    MilkCarton,
    MilkTop,
    DonutBox,
    GlassTop,
    MilkSide,
    CapTop,
    CapSide,
    Donut,
    Label,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 10] = [
        Self::Plane,
        Self::MilkCarton,
        Self::MilkTop,
        Self::DonutBox,
        Self::GlassTop,
        Self::MilkSide,
        Self::CapTop,
        Self::CapSide,
        Self::Donut,
        Self::Label,
    ];

    pub const fn unit(self) -> u32 {
        match self {
            Self::Plane => 1,
            Self::MilkCarton => 2,
            Self::MilkTop => 3,
            Self::DonutBox => 4,
            Self::GlassTop => 5,
            Self::MilkSide => 6,
            Self::CapTop => 7,
            Self::CapSide => 8,
            Self::Donut => 9,
            Self::Label => 10,
        }
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Plane => "plane1.jpg",
            Self::MilkCarton => "milkCarton.jpg",
            Self::MilkTop => "milkTop.jpg",
            Self::DonutBox => "DonutBox1.jpg",
            Self::GlassTop => "glassTop8.jpg",
            Self::MilkSide => "milkSide.jpg",
            Self::CapTop => "capTop.jpg",
            Self::CapSide => "capSide.jpg",
            Self::Donut => "donut1.png",
            Self::Label => "test5.jpg",
        }
    }
}

impl fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {} ({})", self.unit(), self.file_name())
    }
}

/// Outcome of loading one slot.
#[derive(Debug)]
pub enum SlotStatus {
    Loaded(TextureImage),
    Failed(RenderError),
}

/// Best-effort load of every slot from an asset directory.
///
/// Failures are logged once here and the slot falls back to white when bound.
#[derive(Debug)]
pub struct TextureSet {
    root: PathBuf,
    slots: BTreeMap<TextureSlot, SlotStatus>,
}

impl TextureSet {
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let slots = TextureSlot::ALL
            .into_iter()
            .map(|slot| {
                let path = root.join(slot.file_name());
                let status = match TextureImage::load(&path) {
                    Ok(image) => {
                        info!("loaded {slot}: {}x{} ({} channels)", image.width, image.height, image.channels);
                        SlotStatus::Loaded(image)
                    }
                    Err(err) => {
                        warn!("{err}; {slot} renders untextured");
                        SlotStatus::Failed(err)
                    }
                };
                (slot, status)
            })
            .collect();
        Self { root, slots }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image(&self, slot: TextureSlot) -> Option<&TextureImage> {
        match self.slots.get(&slot)? {
            SlotStatus::Loaded(image) => Some(image),
            SlotStatus::Failed(_) => None,
        }
    }

    pub fn status(&self, slot: TextureSlot) -> Option<&SlotStatus> {
        self.slots.get(&slot)
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .values()
            .filter(|status| matches!(status, SlotStatus::Loaded(_)))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureSlot, &SlotStatus)> {
        self.slots.iter().map(|(slot, status)| (*slot, status))
    }
}

/// Device textures for the slots that loaded.
#[derive(Debug, Default)]
pub struct SceneTextures {
    handles: BTreeMap<TextureSlot, TextureHandle>,
}

impl SceneTextures {
    /// Uploads every loaded image. Upload failures leave the slot untextured.
    pub fn upload<D: RenderDevice + ?Sized>(device: &mut D, set: &TextureSet) -> Self {
        let mut handles = BTreeMap::new();
        for slot in TextureSlot::ALL {
            let Some(image) = set.image(slot) else {
                continue;
            };
            match device.create_texture(slot, image) {
                Ok(handle) => {
                    handles.insert(slot, handle);
                }
                Err(err) => warn!("{err}; {slot} renders untextured"),
            }
        }
        Self { handles }
    }

    /// Handle to bind for `slot`; `None` means the default white texture.
    pub fn get(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.handles.get(&slot).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn destroy<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, handle) in std::mem::take(&mut self.handles) {
            device.destroy_texture(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn rgb_image_loads_with_three_channels_and_is_flipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stripe.png");
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.save(&path).unwrap();

        let texture = TextureImage::load(&path).unwrap();
        assert_eq!(texture.channels, 3);
        assert_eq!((texture.width, texture.height), (2, 2));
        assert_eq!(texture.pixels.len(), 16);
        // Top-left red pixel ends up on the last row after the flip.
        assert_eq!(&texture.pixels[8..12], &[255, 0, 0, 255]);
        assert_eq!(&texture.pixels[0..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn rgba_image_keeps_four_channels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alpha.png");
        RgbaImage::from_pixel(3, 1, image::Rgba([1, 2, 3, 4])).save(&path).unwrap();
        let texture = TextureImage::load(&path).unwrap();
        assert_eq!(texture.channels, 4);
        assert_eq!(&texture.pixels[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn one_and_two_channel_images_are_rejected() {
        let dir = tempdir().unwrap();
        let gray = dir.path().join("gray.png");
        GrayImage::new(4, 4).save(&gray).unwrap();
        let gray_alpha = dir.path().join("gray_alpha.png");
        GrayAlphaImage::new(4, 4).save(&gray_alpha).unwrap();

        for path in [gray, gray_alpha] {
            let err = TextureImage::load(&path).unwrap_err();
            assert!(err.is_recoverable());
            assert!(matches!(err, RenderError::TextureLoad { ref reason, .. } if reason.contains("channels")));
        }
    }

    #[test]
    fn missing_file_is_a_texture_error() {
        let err = TextureImage::load(Path::new("does/not/exist.jpg")).unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad { .. }));
    }

    #[test]
    fn texture_set_is_best_effort() {
        let dir = tempdir().unwrap();
        RgbImage::new(2, 2).save(dir.path().join("donut1.png")).unwrap();
        GrayImage::new(2, 2).save(dir.path().join("capTop.jpg")).unwrap();

        let set = TextureSet::load(dir.path());
        assert_eq!(set.loaded_count(), 1);
        assert!(set.image(TextureSlot::Donut).is_some());
        assert!(set.image(TextureSlot::CapTop).is_none());
        assert!(matches!(set.status(TextureSlot::Plane), Some(SlotStatus::Failed(_))));
    }

    #[test]
    fn scene_textures_only_cover_loaded_slots() {
        let dir = tempdir().unwrap();
        RgbImage::new(2, 2).save(dir.path().join("plane1.jpg")).unwrap();
        let set = TextureSet::load(dir.path());

        let mut device = crate::render::HeadlessDevice::new(4, 4);
        let mut textures = SceneTextures::upload(&mut device, &set);
        assert_eq!(textures.len(), 1);
        assert!(textures.get(TextureSlot::Plane).is_some());
        assert!(textures.get(TextureSlot::Donut).is_none());

        textures.destroy(&mut device);
        assert!(textures.is_empty());
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn slot_units_are_distinct() {
        let mut units: Vec<u32> = TextureSlot::ALL.iter().map(|slot| slot.unit()).collect();
        units.dedup();
        assert_eq!(units, (1..=10).collect::<Vec<_>>());
    }
}
