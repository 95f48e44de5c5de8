//! Length header and payload streaming.
//!
//! ```text
//! +----------------+---------------------------------+
//! | Length (LE u32)|  Payload (Length bytes, raw)    |
//! +----------------+---------------------------------+
//! |    4 bytes     |  sent in chunk_size pieces      |
//! +----------------+---------------------------------+
//! ```
//!
//! There is no in-band delimiter: the device counts exactly the announced
//! number of bytes.

use crate::error::{Error, Result};
use crate::image::SourceImage;
use crate::port::write_once;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use std::io::{Read, Seek, Write};

/// Size of the length header, in bytes.
pub const LENGTH_HEADER_LEN: usize = 4;

/// Encode an image length as the on-wire header.
pub fn encode_length(len: u32) -> [u8; LENGTH_HEADER_LEN] {
    let mut header = [0u8; LENGTH_HEADER_LEN];
    LittleEndian::write_u32(&mut header, len);
    header
}

/// Decode an on-wire length header.
pub fn decode_length(header: [u8; LENGTH_HEADER_LEN]) -> u32 {
    LittleEndian::read_u32(&header)
}

/// Chunked payload encoder.
#[derive(Debug, Clone, Copy)]
pub struct TransferCodec {
    chunk_size: usize,
}

impl TransferCodec {
    /// Create a codec writing `chunk_size` bytes per write.
    ///
    /// `chunk_size` must be non-zero.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be at least 1 byte".into()));
        }
        Ok(Self { chunk_size })
    }

    /// Bytes written per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write the length header.
    pub fn send_length<W: Write + ?Sized>(&self, port: &mut W, len: u32) -> Result<()> {
        let header = encode_length(len);
        trace!("Length header: {header:02X?}");
        write_once(port, &header)?;
        Ok(())
    }

    /// Stream the whole image from its current position.
    ///
    /// Each chunk goes out in a single write. A failed or short write aborts
    /// the transfer with [`Error::Transfer`]; the remainder of a chunk is
    /// never resent. Returns the number of bytes sent.
    pub fn send_payload<W, R, F>(
        &self,
        port: &mut W,
        image: &mut SourceImage<R>,
        mut progress: F,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        R: Read + Seek,
        F: FnMut(u64, u64),
    {
        let total = u64::from(image.len());
        let mut buf = vec![0u8; self.chunk_size];
        let mut offset: u64 = 0;

        debug!("Streaming {total} bytes in {}-byte chunks", self.chunk_size);

        while offset < total {
            // Bounded by chunk_size, which is a usize.
            #[allow(clippy::cast_possible_truncation)]
            let want = (total - offset).min(self.chunk_size as u64) as usize;
            let chunk = &mut buf[..want];
            image.read_chunk(chunk)?;

            write_once(port, chunk).map_err(|source| Error::Transfer { offset, source })?;

            offset += want as u64;
            progress(offset, total);
        }

        Ok(offset)
    }
}

impl Default for TransferCodec {
    fn default() -> Self {
        Self {
            chunk_size: crate::protocol::DEFAULT_CHUNK_SIZE,
        }
    }
}
