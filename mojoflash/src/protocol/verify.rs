//! Flash readback and comparison.
//!
//! ```text
//! +------+-----------------------+----------------------------+
//! | 0xAA | Total length (LE u32) |  Content (Total - 5 bytes) |
//! +------+-----------------------+----------------------------+
//! |  1   |           4           |          variable          |
//! +------+-----------------------+----------------------------+
//! ```
//!
//! The total length counts the 5 header bytes, so the stored content is
//! `total - 5` bytes long and must match the source image exactly.

use crate::error::{Error, Result};
use crate::image::SourceImage;
use crate::port::Port;
use crate::protocol::CMD_READBACK;
use crate::protocol::transfer::decode_length;
use log::{debug, trace};
use std::io::{Read, Seek};
use std::time::Duration;

/// First byte of a readback reply.
pub const VERIFY_MARKER: u8 = 0xAA;

/// Size of the readback reply header, in bytes.
pub const VERIFY_HEADER_LEN: usize = 5;

/// Parsed readback reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyHeader {
    total_len: u32,
}

impl VerifyHeader {
    /// Parse a header from the bytes received after the readback command.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let invalid = || Error::InvalidVerifyHeader {
            received: bytes.to_vec(),
        };

        if bytes.len() != VERIFY_HEADER_LEN || bytes[0] != VERIFY_MARKER {
            return Err(invalid());
        }

        let total_len = decode_length([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if total_len < VERIFY_HEADER_LEN as u32 {
            return Err(invalid());
        }

        Ok(Self { total_len })
    }

    /// Total reply length, header included.
    pub fn total_len(&self) -> u32 {
        self.total_len
    }

    /// Length of the stored image that follows the header.
    pub fn content_len(&self) -> u32 {
        self.total_len - VERIFY_HEADER_LEN as u32
    }
}

/// Readback verifier.
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    chunk_size: usize,
    timeout: Duration,
}

impl Verifier {
    /// Create a verifier reading `chunk_size` bytes at a time, waiting up to
    /// `timeout` for each read.
    pub fn new(chunk_size: usize, timeout: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            timeout,
        }
    }

    /// Request the stored image and compare it against `image`.
    ///
    /// Stops at the first differing byte without reading any further.
    pub fn verify<P, R, F>(
        &self,
        port: &mut P,
        image: &mut SourceImage<R>,
        mut progress: F,
    ) -> Result<()>
    where
        P: Port + ?Sized,
        R: Read + Seek,
        F: FnMut(u64, u64),
    {
        port.write_all_bytes(&[CMD_READBACK])?;

        let raw = port.read_reply(VERIFY_HEADER_LEN, self.timeout)?;
        trace!("Readback header: {raw:02X?}");
        let header = VerifyHeader::parse(&raw)?;

        let content_len = header.content_len();
        if content_len != image.len() {
            return Err(Error::SizeMismatch {
                expected: image.len(),
                actual: content_len,
            });
        }
        debug!("Device reports {content_len} stored bytes");

        image.rewind()?;

        let total = u64::from(content_len);
        let mut source = vec![0u8; self.chunk_size];
        let mut compared: u64 = 0;

        while compared < total {
            // Bounded by chunk_size, which is a usize.
            #[allow(clippy::cast_possible_truncation)]
            let want = (total - compared).min(self.chunk_size as u64) as usize;

            let got = port.read_reply(want, self.timeout)?;
            let expected = &mut source[..got.len()];
            image.read_chunk(expected)?;

            if let Some(i) = expected
                .iter()
                .zip(&got)
                .position(|(e, g)| e != g)
            {
                return Err(Error::DataMismatch {
                    offset: compared + i as u64 + 1,
                    expected: expected[i],
                    actual: got[i],
                });
            }

            compared += got.len() as u64;
            progress(compared, total);

            if got.len() < want {
                return Err(Error::ReadbackTruncated {
                    expected: content_len,
                    received: compared,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn pattern(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| (i * 7 + 3) as u8)
            .collect()
    }

    fn readback(content: &[u8]) -> Vec<u8> {
        let total = u32::try_from(content.len() + VERIFY_HEADER_LEN).unwrap();
        let mut reply = vec![VERIFY_MARKER];
        reply.extend_from_slice(&total.to_le_bytes());
        reply.extend_from_slice(content);
        reply
    }

    #[test]
    fn test_header_parse() {
        let header = VerifyHeader::parse(&[0xAA, 0x31, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(header.total_len(), 305);
        assert_eq!(header.content_len(), 300);
    }

    #[test]
    fn test_header_bad_marker() {
        let err = VerifyHeader::parse(&[0x55, 0x31, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::InvalidVerifyHeader { .. }));
    }

    #[test]
    fn test_header_short() {
        let err = VerifyHeader::parse(&[0xAA, 0x31]).unwrap_err();
        match err {
            Error::InvalidVerifyHeader { received } => assert_eq!(received, [0xAA, 0x31]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_header_total_below_header_size() {
        let err = VerifyHeader::parse(&[0xAA, 0x04, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::InvalidVerifyHeader { .. }));
    }

    #[test]
    fn test_verify_ok() {
        let data = pattern(300);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut port = MockPort::new(&readback(&data));

        Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap();

        assert_eq!(port.written(), b"S");
        assert_eq!(port.pending(), 0);
    }

    #[test]
    fn test_verify_is_repeatable() {
        let data = pattern(300);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let verifier = Verifier::new(256, TIMEOUT);

        for _ in 0..3 {
            let mut port = MockPort::new(&readback(&data));
            verifier
                .verify(&mut port, &mut image, |_, _| {})
                .unwrap();
        }
    }

    #[test]
    fn test_verify_rewinds_image() {
        let data = pattern(40);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut scratch = [0u8; 40];
        image.read_chunk(&mut scratch).unwrap();

        let mut port = MockPort::new(&readback(&data));
        Verifier::new(16, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap();
    }

    #[test]
    fn test_size_mismatch_before_comparison() {
        let data = pattern(300);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut reply = readback(&pattern(299));
        reply.extend_from_slice(&[0xEE; 8]);
        let mut port = MockPort::new(&reply);

        let err = Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| panic!("no comparison expected"))
            .unwrap_err();

        match err {
            Error::SizeMismatch { expected, actual } => {
                assert_eq!(expected, 300);
                assert_eq!(actual, 299);
            },
            other => panic!("expected size mismatch, got {other}"),
        }
        // Only the header was consumed.
        assert_eq!(port.pending(), 299 + 8);
    }

    #[test]
    fn test_data_mismatch_reports_one_based_offset() {
        let data = pattern(300);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut stored = data.clone();
        stored[149] ^= 0xFF;
        let mut port = MockPort::new(&readback(&stored));

        let err = Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap_err();

        match err {
            Error::DataMismatch {
                offset,
                expected,
                actual,
            } => {
                assert_eq!(offset, 150);
                assert_eq!(expected, data[149]);
                assert_eq!(actual, stored[149]);
            },
            other => panic!("expected data mismatch, got {other}"),
        }
        // The first chunk was read; the remainder was left untouched.
        assert_eq!(port.pending(), 300 - 256);
    }

    #[test]
    fn test_data_mismatch_in_later_chunk() {
        let data = pattern(100);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut stored = data.clone();
        stored[99] = !stored[99];
        let mut port = MockPort::new(&readback(&stored));

        let err = Verifier::new(32, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::DataMismatch { offset: 100, .. }));
    }

    #[test]
    fn test_missing_header() {
        let mut image = SourceImage::from_bytes(pattern(10)).unwrap();
        let mut port = MockPort::new(&[]);

        let err = Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVerifyHeader { received } if received.is_empty()));
    }

    #[test]
    fn test_truncated_readback() {
        let data = pattern(300);
        let mut image = SourceImage::from_bytes(data.clone()).unwrap();
        let mut reply = readback(&data);
        reply.truncate(VERIFY_HEADER_LEN + 280);
        let mut port = MockPort::new(&reply);

        let err = Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap_err();
        match err {
            Error::ReadbackTruncated { expected, received } => {
                assert_eq!(expected, 300);
                assert_eq!(received, 280);
            },
            other => panic!("expected truncated readback, got {other}"),
        }
    }

    #[test]
    fn test_empty_image_verifies_header_only() {
        let mut image = SourceImage::from_bytes(Vec::new()).unwrap();
        let mut port = MockPort::new(&readback(&[]));

        Verifier::new(256, TIMEOUT)
            .verify(&mut port, &mut image, |_, _| {})
            .unwrap();
    }
}
