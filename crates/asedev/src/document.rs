//! In-memory model of a decoded sprite document.
//!
//! Everything here is built once by the parser and then treated as
//! immutable. The `Document` owns all child entities; cross-references
//! between them (a cel's layer, a layer's parent, a linked cel's target
//! frame) are stored as indices into the owning arrays rather than
//! pointers, so there are no ownership cycles and a document is freed by
//! dropping it.

/// Pixel storage format of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// 4 bytes per pixel, R/G/B/A order.
    Rgba,
    /// 2 bytes per pixel: value then alpha.
    Grayscale,
    /// 1 byte per pixel, palette index.
    Indexed,
}

impl ColorMode {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorMode::Rgba => 4,
            ColorMode::Grayscale => 2,
            ColorMode::Indexed => 1,
        }
    }
}

/// How an animation tag plays back its frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationDirection {
    Forward,
    Reverse,
    PingPong,
    PingPongReverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Normal,
    Group,
    Tilemap,
}

/// Free-form text and/or color a file can attach to a layer, cel, tag or
/// slice.
#[derive(Debug, Clone, Default)]
pub struct UserData {
    pub text: Option<String>,
    pub color: Option<[u8; 4]>,
}

impl UserData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.color.is_none()
    }
}

/// Embedded color-space description.
#[derive(Debug, Clone)]
pub enum ColorProfile {
    None,
    Srgb { gamma: Option<f32> },
    Icc { data: Vec<u8> },
}

/// Bit meanings of [`Layer::flags`].
pub mod layer_flags {
    pub const VISIBLE: u16 = 0x0001;
    pub const EDITABLE: u16 = 0x0002;
    pub const LOCK_MOVEMENT: u16 = 0x0004;
    pub const BACKGROUND: u16 = 0x0008;
    pub const PREFER_LINKED_CELS: u16 = 0x0010;
    pub const COLLAPSED: u16 = 0x0020;
    pub const REFERENCE: u16 = 0x0040;
}

#[derive(Debug)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub flags: u16,
    /// Normalized from the file's opacity byte; forced to 1.0 when the
    /// header declares layer opacities meaningless.
    pub opacity: f32,
    /// Blend mode word as stored in the file. Compositing currently always
    /// uses source-over regardless of this value.
    pub blend_mode: u16,
    /// Arena index of the enclosing group layer, if any.
    pub parent: Option<usize>,
    pub user_data: Option<UserData>,
}

impl Layer {
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.flags & layer_flags::VISIBLE != 0
    }

    #[must_use]
    pub fn is_background(&self) -> bool {
        self.flags & layer_flags::BACKGROUND != 0
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.flags & layer_flags::REFERENCE != 0
    }
}

/// Pixel payload of a cel.
#[derive(Debug)]
pub enum CelData {
    /// Decompressed (or raw) pixels, exactly `width * height *
    /// bytes_per_pixel` bytes.
    Pixels(Vec<u8>),
    /// Reuse of an earlier frame's cel on the same layer.
    Linked { frame: u16 },
}

/// Sub-pixel placement info from a cel-extra chunk.
#[derive(Debug, Clone, Copy)]
pub struct PreciseBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One layer's contribution to one frame.
#[derive(Debug)]
pub struct Cel {
    pub layer_index: usize,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub opacity: u8,
    pub data: CelData,
    pub precise_bounds: Option<PreciseBounds>,
    pub user_data: Option<UserData>,
}

#[derive(Debug)]
pub struct Frame {
    /// Display duration in milliseconds. The parser already substitutes the
    /// document default when the file stores zero.
    pub duration_ms: u16,
    /// Cels in file order, which the format guarantees is back-to-front.
    pub cels: Vec<Cel>,
}

/// Named animation range.
#[derive(Debug)]
pub struct Tag {
    pub name: String,
    pub from_frame: u16,
    pub to_frame: u16,
    pub direction: AnimationDirection,
    pub color: [u8; 3],
    pub user_data: Option<UserData>,
}

/// Inner rectangle of a 9-patch slice.
#[derive(Debug, Clone, Copy)]
pub struct NinePatch {
    pub center_x: i32,
    pub center_y: i32,
    pub center_width: u32,
    pub center_height: u32,
}

/// Named rectangular region valid from a given frame onward.
#[derive(Debug)]
pub struct Slice {
    pub name: String,
    pub frame: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub nine_patch: Option<NinePatch>,
    pub pivot: Option<(i32, i32)>,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone, Default)]
pub struct PaletteEntry {
    pub rgba: [u8; 4],
    pub name: Option<String>,
}

#[derive(Debug, Default)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    pub(crate) fn resize(&mut self, len: usize) {
        self.entries.resize(len, PaletteEntry::default());
    }

    pub(crate) fn set(&mut self, index: usize, entry: PaletteEntry) {
        self.entries[index] = entry;
    }

    #[must_use]
    pub fn get(&self, index: u8) -> Option<&PaletteEntry> {
        self.entries.get(usize::from(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully decoded sprite document.
#[derive(Debug)]
pub struct Document {
    pub color_mode: ColorMode,
    pub width: u16,
    pub height: u16,
    /// Palette index treated as fully transparent (indexed mode only).
    pub transparent_index: u8,
    /// Default frame duration in milliseconds, from the header.
    pub default_duration_ms: u16,
    pub pixel_aspect: (u8, u8),
    pub grid: GridGeometry,
    pub color_profile: Option<ColorProfile>,
    pub palette: Palette,
    pub layers: Vec<Layer>,
    pub frames: Vec<Frame>,
    pub tags: Vec<Tag>,
    pub slices: Vec<Slice>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GridGeometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Document {
    /// Whether a layer should be drawn, considering every enclosing group.
    ///
    /// Walks the parent indices; the arena is built by the parser so the
    /// chain is acyclic (parents always precede children).
    #[must_use]
    pub fn layer_effectively_visible(&self, layer_index: usize) -> bool {
        let mut current = Some(layer_index);
        while let Some(index) = current {
            let layer = &self.layers[index];
            if !layer.is_visible() {
                return false;
            }
            current = layer.parent;
        }
        true
    }

    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.color_mode.bytes_per_pixel()
    }
}
