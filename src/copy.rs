//! Verified streaming copy of one payload.
//!
//! Reads exactly the declared number of bytes from the input, hashes the raw
//! bytes with sha256, decompresses them if requested and writes the result
//! to the output. The hash always covers the payload as stored in the
//! package, before decompression.

use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};

use crate::error::CopyError;
use crate::manifest::CompressionKind;

/// One copy job.
pub struct CopyRequest<'a> {
    pub input: &'a mut dyn Read,
    pub output: &'a mut dyn Write,
    /// Bytes to consume from `input`.
    pub nbytes: u64,
    /// Running offset into the package, advanced by the bytes consumed.
    pub offset: &'a mut u64,
    pub compression: CompressionKind,
    pub encrypted: bool,
    pub ivt: Option<&'a str>,
    /// Expected sha256 (hex). `None` or empty skips verification.
    pub hash: Option<&'a str>,
}

/// The byte-copy collaborator used for scripts and streamed images.
pub trait Copier {
    /// Returns the number of bytes consumed from the input.
    fn copy(&self, request: CopyRequest<'_>) -> Result<u64, CopyError>;
}

/// Default [`Copier`]: sha256 verification, zlib and zstd decompression.
///
/// Decryption needs key material this crate does not hold; encrypted
/// payloads fail with [`CopyError::Decrypt`].
#[derive(Debug, Default, Clone, Copy)]
pub struct VerifiedCopy;

const BUF_SIZE: usize = 64 * 1024;

struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    count: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            count: 0,
        }
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

fn pump(reader: &mut dyn Read, output: &mut dyn Write, decoding: bool) -> Result<(), CopyError> {
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if decoding => return Err(CopyError::Decompress(e)),
            Err(e) => return Err(CopyError::Io(e)),
        };
        output.write_all(&buf[..n])?;
    }
}

impl Copier for VerifiedCopy {
    fn copy(&self, request: CopyRequest<'_>) -> Result<u64, CopyError> {
        if request.encrypted {
            return Err(CopyError::Decrypt(format!(
                "no decryption key available (ivt {})",
                request.ivt.unwrap_or("<none>")
            )));
        }

        let mut source = HashingReader::new(request.input.take(request.nbytes));
        match request.compression {
            CompressionKind::None => pump(&mut source, request.output, false)?,
            CompressionKind::Zlib => {
                let mut decoder = flate2::read::ZlibDecoder::new(&mut source);
                pump(&mut decoder, request.output, true)?;
            }
            CompressionKind::Zstd => {
                let mut decoder =
                    zstd::stream::read::Decoder::new(&mut source).map_err(CopyError::Decompress)?;
                pump(&mut decoder, request.output, true)?;
            }
        }
        // Trailing bytes after the compressed stream still count toward the hash.
        io::copy(&mut source, &mut io::sink())?;
        request.output.flush()?;

        if source.count != request.nbytes {
            return Err(CopyError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "expected {} bytes, input ended after {}",
                    request.nbytes, source.count
                ),
            )));
        }
        *request.offset += source.count;

        if let Some(expected) = request.hash.filter(|h| !h.is_empty()) {
            let actual = format!("{:x}", source.hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(CopyError::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(source.count)
    }
}

/// Hex sha256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(
        input: &[u8],
        nbytes: u64,
        compression: CompressionKind,
        hash: Option<&str>,
    ) -> (Result<u64, CopyError>, Vec<u8>, u64) {
        let mut reader = Cursor::new(input.to_vec());
        let mut out = Vec::new();
        let mut offset = 0u64;
        let result = VerifiedCopy.copy(CopyRequest {
            input: &mut reader,
            output: &mut out,
            nbytes,
            offset: &mut offset,
            compression,
            encrypted: false,
            ivt: None,
            hash,
        });
        (result, out, offset)
    }

    #[test]
    fn plain_copy_verifies_hash() {
        let data = b"#!/bin/sh\necho pre\n";
        let hash = sha256_hex(data);
        let (result, out, offset) = run(data, data.len() as u64, CompressionKind::None, Some(&hash));
        assert_eq!(result.unwrap(), data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(offset, data.len() as u64);
    }

    #[test]
    fn copy_stops_at_declared_length() {
        let (result, out, _) = run(b"abcdef", 3, CompressionKind::None, None);
        assert_eq!(result.unwrap(), 3);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn hash_mismatch_is_reported() {
        let (result, _, _) = run(b"payload", 7, CompressionKind::None, Some("00ff"));
        assert!(matches!(result, Err(CopyError::HashMismatch { .. })));
    }

    #[test]
    fn short_input_is_an_io_error() {
        let (result, _, offset) = run(b"abc", 10, CompressionKind::None, None);
        assert!(matches!(result, Err(CopyError::Io(_))));
        assert_eq!(offset, 0);
    }

    #[test]
    fn zstd_payload_is_decompressed_and_hash_covers_compressed_bytes() {
        let plain = b"rootfs contents ".repeat(64);
        let packed = zstd::stream::encode_all(&plain[..], 3).unwrap();
        let hash = sha256_hex(&packed);

        let (result, out, _) = run(&packed, packed.len() as u64, CompressionKind::Zstd, Some(&hash));
        assert_eq!(result.unwrap(), packed.len() as u64);
        assert_eq!(out, plain);
    }

    #[test]
    fn zlib_payload_is_decompressed() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let plain = b"echo post\n".repeat(10);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&plain).unwrap();
        let packed = enc.finish().unwrap();

        let (result, out, _) = run(&packed, packed.len() as u64, CompressionKind::Zlib, None);
        assert!(result.is_ok());
        assert_eq!(out, plain);
    }

    #[test]
    fn corrupt_compressed_data_is_a_decompress_error() {
        let garbage = b"definitely not zstd";
        let (result, _, _) = run(garbage, garbage.len() as u64, CompressionKind::Zstd, None);
        assert!(matches!(result, Err(CopyError::Decompress(_))));
    }

    #[test]
    fn encrypted_payload_needs_a_key() {
        let mut reader = Cursor::new(b"x".to_vec());
        let mut out = Vec::new();
        let mut offset = 0;
        let result = VerifiedCopy.copy(CopyRequest {
            input: &mut reader,
            output: &mut out,
            nbytes: 1,
            offset: &mut offset,
            compression: CompressionKind::None,
            encrypted: true,
            ivt: Some("00112233"),
            hash: None,
        });
        assert!(matches!(result, Err(CopyError::Decrypt(_))));
    }
}
