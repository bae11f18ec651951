//! Flattens a document's layer stack into per-frame RGBA images.
//!
//! Cels are stored in back-to-front order within each frame, so compositing
//! is a single pass per frame: resolve the cel's pixels (following links),
//! convert to RGBA, and source-over blend into the canvas. All blending is
//! 8-bit integer math matching the usual `(t + (t >> 8)) >> 8` rounding of
//! byte products.

use crate::document::{Cel, CelData, ColorMode, Document, Layer, LayerKind};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("linked cel on layer {layer} in frame {frame} forms a link cycle")]
    LinkCycle { frame: usize, layer: usize },
    #[error("linked cel on layer {layer} in frame {frame} has no resolvable target")]
    BrokenLink { frame: usize, layer: usize },
}

/// One flattened frame: tightly packed RGBA, row-major from the top-left.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u8>,
}

/// Flattens every frame of the document.
pub fn flatten_all_frames(doc: &Document) -> Result<Vec<FrameImage>, ComposeError> {
    (0..doc.frames.len())
        .map(|frame| flatten_frame(doc, frame))
        .collect()
}

/// Flattens a single frame.
///
/// # Panics
/// Panics if `frame_index` is out of range for the document.
pub fn flatten_frame(doc: &Document, frame_index: usize) -> Result<FrameImage, ComposeError> {
    let width = usize::from(doc.width);
    let height = usize::from(doc.height);
    let mut pixels = vec![0u8; width * height * 4];

    for cel in &doc.frames[frame_index].cels {
        let layer = &doc.layers[cel.layer_index];
        // Only normal layers contribute pixels; groups have none and
        // tilemap cels are not pixel data. Reference layers are guides.
        if layer.kind != LayerKind::Normal || layer.is_reference() {
            continue;
        }
        if !doc.layer_effectively_visible(cel.layer_index) {
            continue;
        }

        let source = resolve_cel(doc, frame_index, cel)?;
        let CelData::Pixels(source_pixels) = &source.data else {
            continue;
        };
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let layer_alpha = (layer.opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
        let cel_alpha = mul8(u32::from(cel.opacity), layer_alpha);
        if cel_alpha == 0 {
            continue;
        }

        blit(
            doc,
            layer,
            &mut pixels,
            cel,
            source,
            source_pixels,
            cel_alpha,
        );
    }

    Ok(FrameImage {
        width: doc.width,
        height: doc.height,
        pixels,
    })
}

/// Follows link cels to the cel that actually owns pixels.
///
/// Position and opacity always come from the original cel; only the pixel
/// data (and its dimensions) come from the link target. The hop count is
/// capped at the frame count, past which the chain must revisit a frame.
fn resolve_cel<'a>(
    doc: &'a Document,
    frame: usize,
    cel: &'a Cel,
) -> Result<&'a Cel, ComposeError> {
    let mut current = cel;
    let mut hops = 0usize;
    while let CelData::Linked {
        frame: target_frame,
    } = current.data
    {
        hops += 1;
        if hops > doc.frames.len() {
            return Err(ComposeError::LinkCycle {
                frame,
                layer: cel.layer_index,
            });
        }
        let broken = || ComposeError::BrokenLink {
            frame,
            layer: cel.layer_index,
        };
        let target = doc.frames.get(usize::from(target_frame)).ok_or_else(broken)?;
        current = target
            .cels
            .iter()
            .find(|candidate| candidate.layer_index == cel.layer_index)
            .ok_or_else(broken)?;
    }
    Ok(current)
}

fn blit(
    doc: &Document,
    layer: &Layer,
    canvas: &mut [u8],
    cel: &Cel,
    source: &Cel,
    source_pixels: &[u8],
    cel_alpha: u32,
) {
    let canvas_width = i32::from(doc.width);
    let canvas_height = i32::from(doc.height);

    for row in 0..i32::from(source.height) {
        let canvas_y = i32::from(cel.y) + row;
        if canvas_y < 0 || canvas_y >= canvas_height {
            continue;
        }
        for col in 0..i32::from(source.width) {
            let canvas_x = i32::from(cel.x) + col;
            if canvas_x < 0 || canvas_x >= canvas_width {
                continue;
            }
            #[expect(clippy::cast_sign_loss)]
            let source_index =
                (row as usize * usize::from(source.width) + col as usize) * doc.bytes_per_pixel();
            let rgba = fetch_rgba(doc, layer, source_pixels, source_index);
            let src_a = mul8(u32::from(rgba[3]), cel_alpha);
            if src_a == 0 {
                continue;
            }
            #[expect(clippy::cast_sign_loss)]
            let offset = (canvas_y as usize * usize::from(doc.width) + canvas_x as usize) * 4;
            blend_over(&mut canvas[offset..offset + 4], rgba, src_a);
        }
    }
}

/// Reads one source pixel as RGBA, whatever the document's color mode.
fn fetch_rgba(doc: &Document, layer: &Layer, pixels: &[u8], index: usize) -> [u8; 4] {
    match doc.color_mode {
        ColorMode::Rgba => [
            pixels[index],
            pixels[index + 1],
            pixels[index + 2],
            pixels[index + 3],
        ],
        ColorMode::Grayscale => {
            let value = pixels[index];
            [value, value, value, pixels[index + 1]]
        }
        ColorMode::Indexed => {
            let palette_index = pixels[index];
            if palette_index == doc.transparent_index && !layer.is_background() {
                return [0, 0, 0, 0];
            }
            // A missing palette entry renders as transparent black rather
            // than failing the whole frame.
            doc.palette
                .get(palette_index)
                .map_or([0, 0, 0, 0], |entry| entry.rgba)
        }
    }
}

/// Byte product with rounding: `mul8(a, b)` approximates `a * b / 255`.
fn mul8(a: u32, b: u32) -> u32 {
    let t = a * b + 0x80;
    (t + (t >> 8)) >> 8
}

/// Source-over blend of one straight-alpha RGBA pixel into the canvas.
fn blend_over(dst: &mut [u8], src: [u8; 4], src_a: u32) {
    let dst_a = u32::from(dst[3]);
    let out_a = src_a + dst_a - mul8(src_a, dst_a);
    if out_a == 0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }
    for channel in 0..3 {
        let s = i64::from(src[channel]);
        let d = i64::from(dst[channel]);
        // Result always lands between d and s, so the cast is lossless.
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let blended = (d + (s - d) * i64::from(src_a) / i64::from(out_a)) as u8;
        dst[channel] = blended;
    }
    #[expect(clippy::cast_possible_truncation)]
    let out_a = out_a as u8;
    dst[3] = out_a;
}
