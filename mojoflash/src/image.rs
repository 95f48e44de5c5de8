//! Source image to be programmed.
//!
//! The image is read twice per verified session: once streamed during the
//! transfer, then again from offset zero while comparing the readback. Its
//! length must fit the protocol's 32-bit length header; larger sources are
//! rejected up front instead of being silently truncated.

use crate::error::{Error, Result};
use log::debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Re-readable byte source with a known length.
#[derive(Debug)]
pub struct SourceImage<R = File> {
    reader: R,
    len: u32,
}

impl SourceImage<File> {
    /// Open an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let image = Self::from_reader(file)?;
        debug!("Opened image {} ({} bytes)", path.display(), image.len);
        Ok(image)
    }
}

impl SourceImage<std::io::Cursor<Vec<u8>>> {
    /// Wrap an in-memory image.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_reader(std::io::Cursor::new(bytes.into()))
    }
}

impl<R: Read + Seek> SourceImage<R> {
    /// Wrap a seekable reader. The length is taken from the end of the stream.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let end = reader.seek(SeekFrom::End(0))?;
        let len = u32::try_from(end).map_err(|_| Error::ImageTooLarge { len: end })?;
        reader.rewind()?;
        Ok(Self { reader, len })
    }

    /// Image length in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether the image has no content.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Seek back to the first byte.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader
            .rewind()?;
        Ok(())
    }

    /// Fill `buf` from the current position.
    ///
    /// The image is not expected to change while a session runs, so running
    /// out of bytes early is an I/O error.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader
            .read_exact(buf)?;
        Ok(())
    }

    /// Consume the image and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
