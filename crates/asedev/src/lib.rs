//! Decoder for layered, animated sprite-sheet files.
//!
//! This crate parses the chunked binary container (128-byte header, frame
//! records, typed chunks), inflates the zlib/DEFLATE-compressed cel pixels
//! with its own RFC 1951 engine, and can flatten the resulting layer stack
//! into per-frame RGBA images.
//!
//! The usual entry points are [`load_from_file`] or [`load_from_memory`] to
//! get a [`document::Document`], and [`flatten_all_frames`] to composite it.

pub mod compositor;
pub mod document;
pub mod inflate;
pub mod parser;
pub mod utils;

pub use compositor::{ComposeError, FrameImage, flatten_all_frames, flatten_frame};
pub use parser::{LoadError, load_from_file, load_from_memory};
