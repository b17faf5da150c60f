// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfaces for .deb package files.

The .deb file specification lives at <https://manpages.debian.org/unstable/dpkg-dev/deb.5.en.html>.

Only the `data.tar[.<ext>]` member is consumed. `debian-binary` and
`control.tar` are skipped.
*/

use {
    crate::error::{Result, SandboxError},
    std::io::Read,
};

pub mod reader;

/// Prefix of the archive member holding installable files.
pub const DATA_TAR_PREFIX: &str = "data.tar";

/// Compression applied to a `data.tar` payload.
///
/// The table is deliberately narrow. Anything that isn't `.gz` or `.xz` is
/// read as a raw tar stream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PayloadCodec {
    /// Uncompressed tar.
    Plain,
    /// gzip (`.gz` extension).
    Gzip,
    /// LZMA family (`.xz` extension).
    Lzma,
}

impl PayloadCodec {
    /// Resolve the codec for an archive member name.
    pub fn from_member_name(name: &str) -> Self {
        if name.ends_with(".xz") {
            Self::Lzma
        } else if name.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Plain
        }
    }

    /// Filename extension for payloads compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Plain => "",
            Self::Gzip => ".gz",
            Self::Lzma => ".xz",
        }
    }

    /// Fully decode payload data.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        self.decode_into(data, &mut buffer)
            .map_err(|source| SandboxError::Decompression {
                codec: *self,
                source,
            })?;

        Ok(buffer)
    }

    fn decode_into(&self, data: &[u8], buffer: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            Self::Plain => {
                buffer.extend_from_slice(data);
            }
            Self::Gzip => {
                libflate::gzip::Decoder::new(data)?.read_to_end(buffer)?;
            }
            Self::Lzma => {
                // The auto decoder also accepts legacy .lzma streams.
                let stream = xz2::stream::Stream::new_auto_decoder(u64::MAX, 0)?;
                xz2::read::XzDecoder::new_stream(data, stream).read_to_end(buffer)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::compress};

    #[test]
    fn test_codec_from_member_name() {
        assert_eq!(PayloadCodec::from_member_name("data.tar"), PayloadCodec::Plain);
        assert_eq!(PayloadCodec::from_member_name("data.tar.gz"), PayloadCodec::Gzip);
        assert_eq!(PayloadCodec::from_member_name("data.tar.xz"), PayloadCodec::Lzma);
        assert_eq!(PayloadCodec::from_member_name("data.tar.bz2"), PayloadCodec::Plain);
        assert_eq!(PayloadCodec::from_member_name("data.tar.zst"), PayloadCodec::Plain);
    }

    #[test]
    fn test_decode() -> Result<()> {
        let data = b"hello world".repeat(20);

        for codec in [PayloadCodec::Plain, PayloadCodec::Gzip, PayloadCodec::Lzma] {
            let compressed = compress(codec, &data)?;
            assert_eq!(codec.decode(&compressed)?, data, "{:?}", codec);
        }

        Ok(())
    }

    #[test]
    fn test_decode_corrupt_gzip() {
        let res = PayloadCodec::Gzip.decode(b"definitely not gzip");
        assert!(matches!(
            res,
            Err(SandboxError::Decompression {
                codec: PayloadCodec::Gzip,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_corrupt_xz() {
        let res = PayloadCodec::Lzma.decode(b"\xff\xffdefinitely not xz");
        assert!(matches!(
            res,
            Err(SandboxError::Decompression {
                codec: PayloadCodec::Lzma,
                ..
            })
        ));
    }
}
