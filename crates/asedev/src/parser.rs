//! Chunked container parsing.
//!
//! A file is a fixed 128-byte header followed by one record per frame; each
//! frame carries a sequence of self-describing chunks (layer definitions,
//! cels, tags, palette updates, ...). Chunk payloads are handed to their
//! handlers through an exact-length sub-reader, and a handler that leaves
//! payload bytes unread fails the load: silently mis-sized chunks corrupt
//! every later file offset, so they are never ignored.


use std::path::{Path, PathBuf};

use crate::document::{
    AnimationDirection, Cel, CelData, ColorMode, ColorProfile, Document, Frame, GridGeometry,
    Layer, LayerKind, NinePatch, Palette, PaletteEntry, PreciseBounds, Slice, Tag, UserData,
};
use crate::inflate;
use crate::utils::mem_reader::{MemReader, MemReaderError};

const FILE_MAGIC: u16 = 0xA5E0;
const FRAME_MAGIC: u16 = 0xF1FA;

const CHUNK_LAYER: u16 = 0x2004;
const CHUNK_CEL: u16 = 0x2005;
const CHUNK_CEL_EXTRA: u16 = 0x2006;
const CHUNK_COLOR_PROFILE: u16 = 0x2007;
const CHUNK_TAGS: u16 = 0x2018;
const CHUNK_PALETTE: u16 = 0x2019;
const CHUNK_USER_DATA: u16 = 0x2020;
const CHUNK_SLICE: u16 = 0x2022;

/// Format-imposed ceilings. Exceeding one is a fatal parse error.
const MAX_LAYERS: usize = 64;
const MAX_TAGS: usize = 256;
const MAX_SLICES: usize = 128;
const MAX_PALETTE_ENTRIES: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad file magic {found:#06x}, expected 0xA5E0")]
    BadMagic { found: u16 },
    #[error("bad magic {found:#06x} for frame {frame}, expected 0xF1FA")]
    BadFrameMagic { frame: usize, found: u16 },
    #[error("unsupported color depth of {depth} bits per pixel")]
    UnsupportedColorDepth { depth: u16 },
    #[error("{what} count {count} exceeds the format maximum of {max}")]
    FormatLimitExceeded {
        what: &'static str,
        count: usize,
        max: usize,
    },
    #[error("chunk size {size} of chunk type {chunk_type:#06x} is smaller than the chunk header")]
    InvalidChunkSize { chunk_type: u16, size: u32 },
    #[error(
        "chunk type {chunk_type:#06x} declared {declared} payload bytes but {consumed} were consumed"
    )]
    ChunkSizeMismatch {
        chunk_type: u16,
        declared: usize,
        consumed: usize,
    },
    #[error("unsupported cel type {cel_type}")]
    UnsupportedCelType { cel_type: u16 },
    #[error(
        "cel declares {declared} pixel bytes but its {payload}-byte compressed payload cannot expand that far"
    )]
    ImplausibleCelSize { declared: usize, payload: usize },
    #[error("cel references layer {index}, but only {layer_count} layers are defined")]
    InvalidLayerIndex { index: usize, layer_count: usize },
    #[error("palette range {first}..={last} is invalid for a palette of {size} entries")]
    InvalidPaletteRange { first: u32, last: u32, size: u32 },
    #[error("file truncated: {0}")]
    Truncated(#[from] MemReaderError),
}

/// Loads a document from a file on disk.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Document, LoadError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_memory(&data)
}

/// Loads a document from bytes already in memory.
pub fn load_from_memory(data: &[u8]) -> Result<Document, LoadError> {
    Parser::new().load(&mut MemReader::new(data))
}

/// Which previously parsed entity the next user-data chunk belongs to.
///
/// The format attaches user data positionally: a user-data chunk annotates
/// whatever chunk preceded it. After a tags chunk, consecutive user-data
/// chunks walk the freshly parsed tags in order.
#[derive(Debug, Clone, Copy)]
enum PendingUserData {
    None,
    Layer(usize),
    Cel { frame: usize, cel: usize },
    Slice(usize),
    Tags { next: usize, end: usize },
}

struct Parser {
    doc: Document,
    pending_user_data: PendingUserData,
    layer_opacity_valid: bool,
    /// Most recent layer index per nesting depth, for parent assignment.
    level_stack: Vec<Option<usize>>,
    current_frame: usize,
}

impl Parser {
    fn new() -> Self {
        Self {
            doc: Document {
                color_mode: ColorMode::Rgba,
                width: 0,
                height: 0,
                transparent_index: 0,
                default_duration_ms: 100,
                pixel_aspect: (1, 1),
                grid: GridGeometry::default(),
                color_profile: None,
                palette: Palette::default(),
                layers: Vec::new(),
                frames: Vec::new(),
                tags: Vec::new(),
                slices: Vec::new(),
            },
            pending_user_data: PendingUserData::None,
            layer_opacity_valid: false,
            level_stack: Vec::new(),
            current_frame: 0,
        }
    }

    fn load(mut self, reader: &mut MemReader<'_>) -> Result<Document, LoadError> {
        let frame_count = self.parse_header(reader)?;

        // Frame count is fixed here and never changes.
        self.doc.frames = Vec::with_capacity(frame_count);
        for frame in 0..frame_count {
            self.current_frame = frame;
            self.parse_frame(reader, frame)?;
        }

        Ok(self.doc)
    }

    fn parse_header(&mut self, reader: &mut MemReader<'_>) -> Result<usize, LoadError> {
        reader.skip(4)?; // declared file size
        let magic = reader.read_u16_le()?;
        if magic != FILE_MAGIC {
            return Err(LoadError::BadMagic { found: magic });
        }
        let frame_count = usize::from(reader.read_u16_le()?);
        self.doc.width = reader.read_u16_le()?;
        self.doc.height = reader.read_u16_le()?;
        let depth = reader.read_u16_le()?;
        self.doc.color_mode = match depth {
            32 => ColorMode::Rgba,
            16 => ColorMode::Grayscale,
            8 => ColorMode::Indexed,
            _ => return Err(LoadError::UnsupportedColorDepth { depth }),
        };
        let flags = reader.read_u32_le()?;
        self.layer_opacity_valid = flags & 1 != 0;
        let speed = reader.read_u16_le()?;
        if speed != 0 {
            self.doc.default_duration_ms = speed;
        }
        reader.skip(8)?; // two reserved dwords
        self.doc.transparent_index = reader.read_u8()?;
        reader.skip(3)?;
        let _color_count_hint = reader.read_u16_le()?;
        self.doc.pixel_aspect = (reader.read_u8()?, reader.read_u8()?);
        self.doc.grid = GridGeometry {
            x: reader.read_i16_le()?,
            y: reader.read_i16_le()?,
            width: reader.read_u16_le()?,
            height: reader.read_u16_le()?,
        };
        reader.skip(84)?; // reserved
        Ok(frame_count)
    }

    fn parse_frame(&mut self, reader: &mut MemReader<'_>, frame: usize) -> Result<(), LoadError> {
        reader.skip(4)?; // declared frame size
        let magic = reader.read_u16_le()?;
        if magic != FRAME_MAGIC {
            return Err(LoadError::BadFrameMagic {
                frame,
                found: magic,
            });
        }
        let old_chunk_count = reader.read_u16_le()?;
        let duration = reader.read_u16_le()?;
        reader.skip(2)?;
        let new_chunk_count = reader.read_u32_le()?;
        let chunk_count = if new_chunk_count != 0 {
            usize::try_from(new_chunk_count).unwrap_or(usize::MAX)
        } else {
            usize::from(old_chunk_count)
        };

        self.doc.frames.push(Frame {
            duration_ms: if duration != 0 {
                duration
            } else {
                self.doc.default_duration_ms
            },
            cels: Vec::new(),
        });

        // User-data attachment never crosses a frame boundary.
        self.pending_user_data = PendingUserData::None;

        for _ in 0..chunk_count {
            self.parse_chunk(reader)?;
        }
        Ok(())
    }

    fn parse_chunk(&mut self, reader: &mut MemReader<'_>) -> Result<(), LoadError> {
        let chunk_size = reader.read_u32_le()?;
        let chunk_type = reader.read_u16_le()?;
        let Some(body_len) = (chunk_size as usize).checked_sub(6) else {
            return Err(LoadError::InvalidChunkSize {
                chunk_type,
                size: chunk_size,
            });
        };
        let mut body = reader.read_to_subreader(body_len)?;

        match chunk_type {
            CHUNK_LAYER => self.parse_layer_chunk(&mut body)?,
            CHUNK_CEL => self.parse_cel_chunk(&mut body)?,
            CHUNK_CEL_EXTRA => self.parse_cel_extra_chunk(&mut body)?,
            CHUNK_COLOR_PROFILE => self.parse_color_profile_chunk(&mut body)?,
            CHUNK_TAGS => self.parse_tags_chunk(&mut body)?,
            CHUNK_PALETTE => self.parse_palette_chunk(&mut body)?,
            CHUNK_USER_DATA => self.parse_user_data_chunk(&mut body)?,
            CHUNK_SLICE => self.parse_slice_chunk(&mut body)?,
            _ => {
                // Forward compatibility: unknown chunk types are skipped
                // whole.
                log::debug!("skipping unknown chunk type {chunk_type:#06x} ({body_len} bytes)");
                let _skipped = body.read_remaining();
            }
        }

        if !body.is_empty() {
            return Err(LoadError::ChunkSizeMismatch {
                chunk_type,
                declared: body_len,
                consumed: body_len - body.remaining(),
            });
        }
        Ok(())
    }

    fn parse_layer_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        if self.doc.layers.len() == MAX_LAYERS {
            return Err(LoadError::FormatLimitExceeded {
                what: "layer",
                count: MAX_LAYERS + 1,
                max: MAX_LAYERS,
            });
        }

        let flags = body.read_u16_le()?;
        let layer_type = body.read_u16_le()?;
        let child_level = usize::from(body.read_u16_le()?);
        body.skip(4)?; // default width/height, unused
        let blend_mode = body.read_u16_le()?;
        let opacity = body.read_u8()?;
        body.skip(3)?;
        let name = body.read_string()?;

        let kind = match layer_type {
            0 => LayerKind::Normal,
            1 => LayerKind::Group,
            2 => {
                let _tileset_index = body.read_u32_le()?;
                LayerKind::Tilemap
            }
            other => {
                log::warn!("layer {name:?} has unknown type {other}, treating as normal");
                LayerKind::Normal
            }
        };

        // The enclosing group is whichever layer most recently appeared one
        // nesting level up.
        let parent = if child_level == 0 {
            None
        } else {
            self.level_stack.get(child_level - 1).copied().flatten()
        };

        let index = self.doc.layers.len();
        if self.level_stack.len() <= child_level {
            self.level_stack.resize(child_level + 1, None);
        }
        self.level_stack[child_level] = Some(index);

        self.doc.layers.push(Layer {
            name,
            kind,
            flags,
            opacity: if self.layer_opacity_valid {
                f32::from(opacity) / 255.0
            } else {
                1.0
            },
            blend_mode,
            parent,
            user_data: None,
        });
        self.pending_user_data = PendingUserData::Layer(index);
        Ok(())
    }

    fn parse_cel_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let layer_index = usize::from(body.read_u16_le()?);
        if layer_index >= self.doc.layers.len() {
            return Err(LoadError::InvalidLayerIndex {
                index: layer_index,
                layer_count: self.doc.layers.len(),
            });
        }
        let x = body.read_i16_le()?;
        let y = body.read_i16_le()?;
        let opacity = body.read_u8()?;
        let cel_type = body.read_u16_le()?;
        body.skip(7)?;

        let bytes_per_pixel = self.doc.bytes_per_pixel();
        let (width, height, data) = match cel_type {
            0 => {
                let width = body.read_u16_le()?;
                let height = body.read_u16_le()?;
                let pixel_len = usize::from(width) * usize::from(height) * bytes_per_pixel;
                let pixels = body.read_slice(pixel_len)?.to_vec();
                (width, height, CelData::Pixels(pixels))
            }
            1 => {
                let frame = body.read_u16_le()?;
                (0, 0, CelData::Linked { frame })
            }
            2 => {
                let width = body.read_u16_le()?;
                let height = body.read_u16_le()?;
                let pixel_len = usize::from(width) * usize::from(height) * bytes_per_pixel;
                let compressed = body.read_remaining();
                // Deflate tops out around a 1032:1 expansion ratio, so a
                // declared size beyond that bound is structural corruption.
                // Checking before the allocation keeps a hostile header from
                // demanding gigabytes for a few payload bytes.
                if pixel_len > compressed.len().saturating_mul(1032).max(64) {
                    return Err(LoadError::ImplausibleCelSize {
                        declared: pixel_len,
                        payload: compressed.len(),
                    });
                }
                let mut pixels = vec![0u8; pixel_len];
                match inflate::zlib_decompress(compressed, &mut pixels) {
                    Ok(written) if written == pixel_len => {}
                    Ok(written) => {
                        // A short stream leaves the tail untouched; re-zero
                        // the whole cel so no partial data survives.
                        log::warn!(
                            "cel on layer {layer_index} in frame {} decompressed to {written} \
                             bytes, expected {pixel_len}; substituting blank pixels",
                            self.current_frame
                        );
                        pixels.fill(0);
                    }
                    Err(error) => {
                        log::warn!(
                            "cel on layer {layer_index} in frame {} failed to decompress \
                             ({error}); substituting blank pixels",
                            self.current_frame
                        );
                        pixels.fill(0);
                    }
                }
                (width, height, CelData::Pixels(pixels))
            }
            other => return Err(LoadError::UnsupportedCelType { cel_type: other }),
        };

        let frame = self.current_frame;
        let cels = &mut self.doc.frames[frame].cels;
        cels.push(Cel {
            layer_index,
            x,
            y,
            width,
            height,
            opacity,
            data,
            precise_bounds: None,
            user_data: None,
        });
        self.pending_user_data = PendingUserData::Cel {
            frame,
            cel: cels.len() - 1,
        };
        Ok(())
    }

    fn parse_cel_extra_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let flags = body.read_u32_le()?;
        let x = body.read_fixed_le()?;
        let y = body.read_fixed_le()?;
        let width = body.read_fixed_le()?;
        let height = body.read_fixed_le()?;
        body.skip(16)?;

        if flags & 1 == 0 {
            return Ok(());
        }
        let frame = self.current_frame;
        if let Some(cel) = self.doc.frames[frame].cels.last_mut() {
            cel.precise_bounds = Some(PreciseBounds {
                x,
                y,
                width,
                height,
            });
        } else {
            log::warn!("cel-extra chunk in frame {frame} without a preceding cel");
        }
        Ok(())
    }

    fn parse_color_profile_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let profile_type = body.read_u16_le()?;
        let flags = body.read_u16_le()?;
        let gamma = body.read_fixed_le()?;
        body.skip(8)?;

        self.doc.color_profile = match profile_type {
            0 => Some(ColorProfile::None),
            1 => Some(ColorProfile::Srgb {
                gamma: (flags & 1 != 0).then_some(gamma),
            }),
            2 => {
                let icc_len = body.read_u32_le()?;
                let data = body.read_slice(icc_len as usize)?.to_vec();
                Some(ColorProfile::Icc { data })
            }
            other => {
                log::warn!("unknown color profile type {other}");
                let _rest = body.read_remaining();
                None
            }
        };
        Ok(())
    }

    fn parse_tags_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let count = usize::from(body.read_u16_le()?);
        body.skip(8)?;

        if self.doc.tags.len() + count > MAX_TAGS {
            return Err(LoadError::FormatLimitExceeded {
                what: "tag",
                count: self.doc.tags.len() + count,
                max: MAX_TAGS,
            });
        }

        let first_new = self.doc.tags.len();
        for _ in 0..count {
            let from_frame = body.read_u16_le()?;
            let to_frame = body.read_u16_le()?;
            let direction = match body.read_u8()? {
                0 => AnimationDirection::Forward,
                1 => AnimationDirection::Reverse,
                2 => AnimationDirection::PingPong,
                3 => AnimationDirection::PingPongReverse,
                other => {
                    log::warn!("unknown tag direction {other}, treating as forward");
                    AnimationDirection::Forward
                }
            };
            body.skip(8)?;
            let mut color = [0u8; 3];
            body.read_exact(&mut color)?;
            body.skip(1)?;
            let name = body.read_string()?;
            self.doc.tags.push(Tag {
                name,
                from_frame,
                to_frame,
                direction,
                color,
                user_data: None,
            });
        }

        self.pending_user_data = if count > 0 {
            PendingUserData::Tags {
                next: first_new,
                end: self.doc.tags.len(),
            }
        } else {
            PendingUserData::None
        };
        Ok(())
    }

    fn parse_palette_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let new_size = body.read_u32_le()?;
        let first = body.read_u32_le()?;
        let last = body.read_u32_le()?;
        body.skip(8)?;

        if new_size as usize > MAX_PALETTE_ENTRIES {
            return Err(LoadError::FormatLimitExceeded {
                what: "palette entry",
                count: new_size as usize,
                max: MAX_PALETTE_ENTRIES,
            });
        }
        if first > last || last >= new_size {
            return Err(LoadError::InvalidPaletteRange {
                first,
                last,
                size: new_size,
            });
        }

        self.doc.palette.resize(new_size as usize);
        for index in first..=last {
            let entry_flags = body.read_u16_le()?;
            let mut rgba = [0u8; 4];
            body.read_exact(&mut rgba)?;
            let name = if entry_flags & 1 != 0 {
                Some(body.read_string()?)
            } else {
                None
            };
            self.doc.palette.set(index as usize, PaletteEntry { rgba, name });
        }
        Ok(())
    }

    fn parse_user_data_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let flags = body.read_u32_le()?;
        let mut user_data = UserData::default();
        if flags & 1 != 0 {
            user_data.text = Some(body.read_string()?);
        }
        if flags & 2 != 0 {
            let mut color = [0u8; 4];
            body.read_exact(&mut color)?;
            user_data.color = Some(color);
        }

        let slot = match self.pending_user_data {
            PendingUserData::None => {
                log::warn!("user-data chunk with nothing to attach to, ignoring");
                return Ok(());
            }
            PendingUserData::Layer(index) => {
                self.pending_user_data = PendingUserData::None;
                &mut self.doc.layers[index].user_data
            }
            PendingUserData::Cel { frame, cel } => {
                self.pending_user_data = PendingUserData::None;
                &mut self.doc.frames[frame].cels[cel].user_data
            }
            PendingUserData::Slice(index) => {
                self.pending_user_data = PendingUserData::None;
                &mut self.doc.slices[index].user_data
            }
            PendingUserData::Tags { next, end } => {
                self.pending_user_data = if next + 1 < end {
                    PendingUserData::Tags {
                        next: next + 1,
                        end,
                    }
                } else {
                    PendingUserData::None
                };
                &mut self.doc.tags[next].user_data
            }
        };
        *slot = Some(user_data);
        Ok(())
    }

    fn parse_slice_chunk(&mut self, body: &mut MemReader<'_>) -> Result<(), LoadError> {
        let count = body.read_u32_le()? as usize;
        let flags = body.read_u32_le()?;
        body.skip(4)?; // reserved
        let name = body.read_string()?;

        if self.doc.slices.len() + count > MAX_SLICES {
            return Err(LoadError::FormatLimitExceeded {
                what: "slice",
                count: self.doc.slices.len() + count,
                max: MAX_SLICES,
            });
        }

        for _ in 0..count {
            let frame = body.read_u32_le()?;
            let x = body.read_i32_le()?;
            let y = body.read_i32_le()?;
            let width = body.read_u32_le()?;
            let height = body.read_u32_le()?;
            let nine_patch = if flags & 1 != 0 {
                Some(NinePatch {
                    center_x: body.read_i32_le()?,
                    center_y: body.read_i32_le()?,
                    center_width: body.read_u32_le()?,
                    center_height: body.read_u32_le()?,
                })
            } else {
                None
            };
            let pivot = if flags & 2 != 0 {
                Some((body.read_i32_le()?, body.read_i32_le()?))
            } else {
                None
            };
            self.doc.slices.push(Slice {
                name: name.clone(),
                frame,
                x,
                y,
                width,
                height,
                nine_patch,
                pivot,
                user_data: None,
            });
        }

        if count > 0 {
            self.pending_user_data = PendingUserData::Slice(self.doc.slices.len() - 1);
        }
        Ok(())
    }
}
