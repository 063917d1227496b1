use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

/// Device-side texture object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
    Cubemap,
}

/// A texture as seen by the renderer: identity and the few properties that
/// influence sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureKind,
    pub has_mipmaps: bool,
}

impl Texture {
    pub fn new(id: TextureId, kind: TextureKind, has_mipmaps: bool) -> Rc<Self> {
        Rc::new(Self {
            id,
            kind,
            has_mipmaps,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplerFilter {
    Nearest,
    #[default]
    Bilinear,
    Trilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplerWrap {
    Clamp,
    MirroredRepeat,
    #[default]
    Repeat,
}

/// Sampling configuration for one texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSampler {
    pub filter: SamplerFilter,
    pub wrap: SamplerWrap,
    pub anisotropy: u8,
    pub mipmaps: bool,
}

impl TextureSampler {
    /// Follow the bound texture's mipmap availability. Returns `true` if the
    /// sampler changed.
    pub fn use_mipmaps(&mut self, mipmaps: bool) -> bool {
        let changed = self.mipmaps != mipmaps;
        self.mipmaps = mipmaps;
        changed
    }
}

impl Default for TextureSampler {
    fn default() -> Self {
        Self {
            filter: SamplerFilter::default(),
            wrap: SamplerWrap::default(),
            anisotropy: 1,
            mipmaps: true,
        }
    }
}

/// One hardware texture slot.
///
/// Holds only a weak reference: texture lifetime belongs to the caller.
/// Texture and sampler are tracked separately since either can change alone.
#[derive(Debug, Clone)]
pub struct TextureUnit {
    pub texture: Weak<Texture>,
    pub sampler: TextureSampler,
    pub texture_updated: bool,
    pub sampler_updated: bool,
}

impl TextureUnit {
    pub fn texture(&self) -> Option<Rc<Texture>> {
        self.texture.upgrade()
    }

    pub fn holds(&self, texture: Option<&Rc<Texture>>) -> bool {
        match texture {
            Some(texture) => std::ptr::eq(self.texture.as_ptr(), Rc::as_ptr(texture)),
            None => self.texture.upgrade().is_none(),
        }
    }
}

impl Default for TextureUnit {
    fn default() -> Self {
        Self {
            texture: Weak::new(),
            sampler: TextureSampler::default(),
            texture_updated: true,
            sampler_updated: false,
        }
    }
}
