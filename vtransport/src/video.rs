//! Raw video frames and the seams to the outside world.
//!
//! The engine consumes raw frames from a [`FrameSource`] and hands decoded
//! frames to a [`VideoDisplay`]; both are implemented outside the core.
//! [`Y4mInput`] is the stock file-backed source: a YUV4MPEG2 reader that
//! wraps around to the first frame when the file ends.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// A planar I420 image: full-resolution luma plane followed by the two
/// quarter-resolution chroma planes in one contiguous buffer.
#[derive(Debug, Clone)]
pub struct RawImage {
    width: u16,
    height: u16,
    data: Vec<u8>,
}

impl RawImage {
    /// Allocates a zeroed image for the given display dimensions.
    pub fn new(width: u16, height: u16) -> Self {
        let luma = width as usize * height as usize;
        let chroma = Self::chroma_dim(width) * Self::chroma_dim(height);
        Self {
            width,
            height,
            data: vec![0u8; luma + 2 * chroma],
        }
    }

    fn chroma_dim(dim: u16) -> usize {
        (dim as usize + 1) / 2
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Width of the chroma planes in pixels.
    pub fn chroma_width(&self) -> usize {
        Self::chroma_dim(self.width)
    }

    /// Height of the chroma planes in pixels.
    pub fn chroma_height(&self) -> usize {
        Self::chroma_dim(self.height)
    }

    fn luma_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn chroma_size(&self) -> usize {
        self.chroma_width() * self.chroma_height()
    }

    pub fn y(&self) -> &[u8] {
        &self.data[..self.luma_size()]
    }

    pub fn u(&self) -> &[u8] {
        let start = self.luma_size();
        &self.data[start..start + self.chroma_size()]
    }

    pub fn v(&self) -> &[u8] {
        let start = self.luma_size() + self.chroma_size();
        &self.data[start..start + self.chroma_size()]
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        let end = self.luma_size();
        &mut self.data[..end]
    }

    pub fn u_mut(&mut self) -> &mut [u8] {
        let start = self.luma_size();
        let end = start + self.chroma_size();
        &mut self.data[start..end]
    }

    pub fn v_mut(&mut self) -> &mut [u8] {
        let start = self.luma_size() + self.chroma_size();
        let end = start + self.chroma_size();
        &mut self.data[start..end]
    }

    /// Whole I420 buffer, planes back to back.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Lazy sequence of raw frames at a fixed resolution.
pub trait FrameSource {
    /// Fetches the next raw frame into `image`.
    fn read_frame(&mut self, image: &mut RawImage) -> Result<()>;
}

/// Display surface accepting planar frames.
pub trait VideoDisplay {
    fn show_frame(&mut self, image: &RawImage) -> Result<()>;

    /// True once the user asked the display to close.
    fn signal_quit(&mut self) -> bool;
}

/// YUV4MPEG2 file reader in loop mode.
///
/// Only 4:2:0 colorspaces are supported. The stream dimensions must match
/// the negotiated configuration; a mismatch is fatal at startup.
#[derive(Debug)]
pub struct Y4mInput {
    reader: BufReader<File>,
    width: u16,
    height: u16,

    /// Offset of the first FRAME marker, right past the stream header.
    data_start: u64,
}

impl Y4mInput {
    pub fn open<P: AsRef<Path>>(path: P, width: u16, height: u16) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;
        if header.pop() != Some(b'\n') {
            return Err(Error::VideoInput("missing YUV4MPEG2 stream header".into()));
        }
        let header = std::str::from_utf8(&header)
            .map_err(|_| Error::VideoInput("stream header is not ASCII".into()))?;

        let mut tokens = header.split_ascii_whitespace();
        if tokens.next() != Some("YUV4MPEG2") {
            return Err(Error::VideoInput("not a YUV4MPEG2 stream".into()));
        }

        let mut file_width = None;
        let mut file_height = None;
        for token in tokens {
            let (tag, value) = token.split_at(1);
            match tag {
                "W" => file_width = value.parse::<u16>().ok(),
                "H" => file_height = value.parse::<u16>().ok(),
                "C" if !value.starts_with("420") => {
                    return Err(Error::VideoInput(format!(
                        "unsupported colorspace C{value}, expected 4:2:0"
                    )));
                }
                _ => {}
            }
        }

        if file_width != Some(width) || file_height != Some(height) {
            return Err(Error::DimensionMismatch);
        }

        let data_start = reader.stream_position()?;
        Ok(Self {
            reader,
            width,
            height,
            data_start,
        })
    }
}

impl FrameSource for Y4mInput {
    fn read_frame(&mut self, image: &mut RawImage) -> Result<()> {
        if image.width() != self.width || image.height() != self.height {
            return Err(Error::DimensionMismatch);
        }

        let mut marker = Vec::new();
        if self.reader.read_until(b'\n', &mut marker)? == 0 {
            // End of input: wrap around to the first frame.
            debug!("video input reached the end, looping");
            self.reader.seek(SeekFrom::Start(self.data_start))?;
            if self.reader.read_until(b'\n', &mut marker)? == 0 {
                return Err(Error::VideoInput("video contains no frames".into()));
            }
        }
        if !marker.starts_with(b"FRAME") {
            return Err(Error::VideoInput("malformed FRAME marker".into()));
        }

        self.reader.read_exact(image.data_mut())?;
        Ok(())
    }
}
