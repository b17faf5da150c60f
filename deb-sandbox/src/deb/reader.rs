// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! .deb file reading functionality. */

use {
    crate::{
        ar::{ArArchive, ArchiveMember},
        deb::{PayloadCodec, DATA_TAR_PREFIX},
        error::{Result, SandboxError},
    },
    std::io::{Cursor, Read},
};

/// Classification of a `data.tar` entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    /// Symlinks, hard links, devices, FIFOs. Never installed.
    Other,
}

impl From<tar::EntryType> for EntryKind {
    fn from(entry_type: tar::EntryType) -> Self {
        if entry_type.is_dir() {
            Self::Directory
        } else if entry_type.is_file() {
            Self::RegularFile
        } else {
            Self::Other
        }
    }
}

/// A reader for the `data.tar` payload of a `.deb` file.
pub struct DataTarReader {
    member_name: String,
    codec: PayloadCodec,
    archive: tar::Archive<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for DataTarReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTarReader")
            .field("member_name", &self.member_name)
            .field("codec", &self.codec)
            .finish()
    }
}

impl DataTarReader {
    /// Locate the payload in a sequence of `ar` members.
    ///
    /// The first member whose name begins with `data.tar` wins. Errors from
    /// members preceding it are propagated.
    pub fn from_members<'a>(
        members: impl Iterator<Item = Result<ArchiveMember<'a>>>,
    ) -> Result<Self> {
        for member in members {
            let member = member?;

            if member.name.starts_with(DATA_TAR_PREFIX) {
                let codec = PayloadCodec::from_member_name(&member.name);
                log::debug!("payload member {} decoded as {:?}", member.name, codec);

                let data = codec.decode(member.body)?;

                return Ok(Self {
                    member_name: member.name,
                    codec,
                    archive: tar::Archive::new(Cursor::new(data)),
                });
            }
        }

        Err(SandboxError::MissingDataTar)
    }

    /// Open the payload of raw `.deb` file data.
    pub fn from_deb_data(data: &[u8]) -> Result<Self> {
        Self::from_members(ArArchive::new(data)?)
    }

    /// The name of the `ar` member the payload came from.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// The codec the payload was decoded with.
    pub fn codec(&self) -> PayloadCodec {
        self.codec
    }

    /// Obtain the entries in the `data.tar` file.
    ///
    /// This can only be called once. It is a glorified wrapper around
    /// [tar::Archive::entries()] and has the same semantics.
    pub fn entries(&mut self) -> Result<DataTarEntries<'_>> {
        let entries = self.archive.entries().map_err(SandboxError::MalformedTar)?;

        Ok(DataTarEntries { entries })
    }
}

/// Represents entries in a `data.tar` file.
pub struct DataTarEntries<'a> {
    entries: tar::Entries<'a, Cursor<Vec<u8>>>,
}

impl<'a> Iterator for DataTarEntries<'a> {
    type Item = Result<DataTarEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.entries.next() {
            Some(Ok(entry)) => Some(Ok(DataTarEntry { inner: entry })),
            Some(Err(e)) => Some(Err(SandboxError::MalformedTar(e))),
            None => None,
        }
    }
}

/// A wrapper around [tar::Entry] for content in `data.tar` files.
pub struct DataTarEntry<'a> {
    inner: tar::Entry<'a, Cursor<Vec<u8>>>,
}

impl<'a> DataTarEntry<'a> {
    /// The raw path of this entry as recorded in the archive.
    ///
    /// No normalization is performed. Paths may be absolute or contain `..`.
    pub fn path(&self) -> String {
        String::from_utf8_lossy(&self.inner.path_bytes()).to_string()
    }

    /// What kind of filesystem node this entry describes.
    pub fn kind(&self) -> EntryKind {
        self.inner.header().entry_type().into()
    }
}

impl<'a> Read for DataTarEntry<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::{
            ar_with_members, compress, deb_with_data_member, deb_with_entries, tar_with_entries,
            TestEntry,
        },
    };

    fn collect(reader: &mut DataTarReader) -> Result<Vec<(String, EntryKind, Vec<u8>)>> {
        let mut res = vec![];

        for entry in reader.entries()? {
            let mut entry = entry?;
            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            res.push((entry.path(), entry.kind(), data));
        }

        Ok(res)
    }

    fn sample_entries() -> Vec<TestEntry<'static>> {
        vec![
            TestEntry::Dir("./usr/"),
            TestEntry::File("./usr/bin/tool", b"hi"),
            TestEntry::Symlink("./usr/bin/alias", "tool"),
        ]
    }

    #[test]
    fn test_codec_dispatch() -> Result<()> {
        for codec in [PayloadCodec::Plain, PayloadCodec::Gzip, PayloadCodec::Lzma] {
            let deb = deb_with_entries(codec, &sample_entries())?;
            let mut reader = DataTarReader::from_deb_data(&deb)?;

            assert_eq!(reader.codec(), codec);
            assert_eq!(reader.member_name(), format!("data.tar{}", codec.extension()));

            let entries = collect(&mut reader)?;
            assert_eq!(
                entries,
                vec![
                    ("./usr/".to_string(), EntryKind::Directory, vec![]),
                    ("./usr/bin/tool".to_string(), EntryKind::RegularFile, b"hi".to_vec()),
                    ("./usr/bin/alias".to_string(), EntryKind::Other, vec![]),
                ]
            );
        }

        Ok(())
    }

    #[test]
    fn test_missing_data_tar() -> Result<()> {
        let deb = ar_with_members(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", vec![0; 4]),
        ])?;

        assert!(matches!(
            DataTarReader::from_deb_data(&deb),
            Err(SandboxError::MissingDataTar)
        ));

        Ok(())
    }

    #[test]
    fn test_first_data_member_wins() -> Result<()> {
        let first = tar_with_entries(&[TestEntry::File("first", b"1")])?;
        let second = compress(
            PayloadCodec::Gzip,
            &tar_with_entries(&[TestEntry::File("second", b"2")])?,
        )?;

        let deb = ar_with_members(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("data.tar", first),
            ("data.tar.gz", second),
        ])?;

        let mut reader = DataTarReader::from_deb_data(&deb)?;
        assert_eq!(reader.codec(), PayloadCodec::Plain);
        let entries = collect(&mut reader)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "first");

        Ok(())
    }

    #[test]
    fn test_unsupported_suffix_is_malformed_tar() -> Result<()> {
        // Looks nothing like a tar header, so the checksum cannot match.
        let payload = b"BZh91AY&SY".repeat(128);
        let deb = deb_with_data_member("data.tar.bz2", payload)?;

        let mut reader = DataTarReader::from_deb_data(&deb)?;
        assert_eq!(reader.codec(), PayloadCodec::Plain);

        let res = collect(&mut reader);
        assert!(matches!(res, Err(SandboxError::MalformedTar(_))));

        Ok(())
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            DataTarReader::from_deb_data(b"this is not a deb"),
            Err(SandboxError::Format)
        ));
    }

    #[test]
    fn test_corrupt_member_before_payload() -> Result<()> {
        let mut deb = ar_with_members(&[("debian-binary", vec![0; 200])])?;
        deb.truncate(100);

        assert!(matches!(
            DataTarReader::from_deb_data(&deb),
            Err(SandboxError::CorruptArchive { .. })
        ));

        Ok(())
    }
}
