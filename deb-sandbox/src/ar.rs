// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading of `ar` archives.

A `.deb` file is an `ar` archive. The format is trivial: an 8 byte magic
`!<arch>\n` followed by members. Each member has a 60 byte header, its body,
and a single padding byte if the body ends on an odd offset.

The header fields we care about:

| Bytes  | Field                           |
|--------|---------------------------------|
| 0-15   | name, space padded              |
| 48-57  | body size, ASCII decimal        |

The remaining fields (mtime, uid, gid, mode, terminator) are ignored.
*/

use crate::error::{Result, SandboxError};

/// Magic bytes at the start of every `ar` archive.
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Length of a member header.
pub const HEADER_LEN: usize = 60;

const NAME_RANGE: std::ops::Range<usize> = 0..16;
const SIZE_RANGE: std::ops::Range<usize> = 48..58;

/// A member of an `ar` archive.
///
/// The body borrows from the archive data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveMember<'a> {
    /// Member name, with padding and any GNU `/` terminator removed.
    pub name: String,
    /// Declared body size.
    pub size: usize,
    /// Offset of the body within the archive.
    pub offset: usize,
    /// The member body.
    pub body: &'a [u8],
}

/// A single pass reader of `ar` archive members.
///
/// Iteration yields members in archive order. Iteration ends when fewer
/// than a full header's worth of bytes remain. After an error is yielded,
/// iteration ends.
#[derive(Debug)]
pub struct ArArchive<'a> {
    data: &'a [u8],
    position: usize,
    failed: bool,
}

impl<'a> ArArchive<'a> {
    /// Construct a reader over archive data, validating the magic.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < AR_MAGIC.len() || &data[0..AR_MAGIC.len()] != AR_MAGIC {
            return Err(SandboxError::Format);
        }

        Ok(Self {
            data,
            position: AR_MAGIC.len(),
            failed: false,
        })
    }

    /// The offset of the next header to be read.
    pub fn position(&self) -> usize {
        self.position
    }

    fn read_member(&mut self) -> Result<ArchiveMember<'a>> {
        let header_offset = self.position;
        let header = &self.data[header_offset..header_offset + HEADER_LEN];

        let name = String::from_utf8_lossy(&header[NAME_RANGE]);
        let name = name.trim();
        // GNU ar terminates names with a slash.
        let name = name.strip_suffix('/').unwrap_or(name).to_string();

        let size = std::str::from_utf8(&header[SIZE_RANGE])
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or(SandboxError::CorruptArchive {
                offset: header_offset,
                reason: "member size is not a decimal number",
            })?;

        let offset = header_offset + HEADER_LEN;
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= self.data.len())
            .ok_or(SandboxError::CorruptArchive {
                offset: header_offset,
                reason: "member body is truncated",
            })?;

        self.position = end;
        if self.position % 2 == 1 {
            self.position += 1;
        }

        Ok(ArchiveMember {
            name,
            size,
            offset,
            body: &self.data[offset..end],
        })
    }
}

impl<'a> Iterator for ArArchive<'a> {
    type Item = Result<ArchiveMember<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.len().saturating_sub(self.position) < HEADER_LEN {
            return None;
        }

        let res = self.read_member();
        if res.is_err() {
            self.failed = true;
        }

        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::ar_with_members};

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            ArArchive::new(b"!<arch>"),
            Err(SandboxError::Format)
        ));
        assert!(matches!(
            ArArchive::new(b"PK\x03\x04notanarchive"),
            Err(SandboxError::Format)
        ));
    }

    #[test]
    fn test_empty_archive() -> Result<()> {
        let mut archive = ArArchive::new(AR_MAGIC)?;
        assert!(archive.next().is_none());

        Ok(())
    }

    #[test]
    fn test_members_in_order() -> Result<()> {
        let data = ar_with_members(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", vec![1, 2, 3]),
            ("data.tar", vec![42; 10]),
        ])?;

        let members = ArArchive::new(&data)?.collect::<Result<Vec<_>>>()?;

        assert_eq!(members.len(), 3);
        assert_eq!(members[0].name, "debian-binary");
        assert_eq!(members[0].body, b"2.0\n");
        assert_eq!(members[1].name, "control.tar.gz");
        assert_eq!(members[1].size, 3);
        assert_eq!(members[1].body, &[1, 2, 3]);
        assert_eq!(members[2].name, "data.tar");
        assert_eq!(members[2].body, &[42; 10]);

        Ok(())
    }

    #[test]
    fn test_accounting_covers_whole_archive() -> Result<()> {
        // Odd sizes force padding bytes between members.
        let data = ar_with_members(&[
            ("a", vec![1; 3]),
            ("b", vec![2; 4]),
            ("c", vec![3; 7]),
            ("d", vec![]),
        ])?;

        let mut archive = ArArchive::new(&data)?;
        let mut accounted = AR_MAGIC.len();

        while let Some(member) = archive.next() {
            let member = member?;
            assert_eq!(member.offset, accounted + HEADER_LEN);
            accounted += HEADER_LEN + member.size;
            if accounted % 2 == 1 {
                accounted += 1;
            }
        }

        assert_eq!(accounted, data.len());
        assert_eq!(archive.position(), data.len());

        Ok(())
    }

    #[test]
    fn test_gnu_name_terminator() -> Result<()> {
        let mut data = AR_MAGIC.to_vec();
        data.extend_from_slice(format!("{:<16}{:<32}{:<10}`\n", "data.tar.xz/", "", 2).as_bytes());
        data.extend_from_slice(b"xx");

        let member = ArArchive::new(&data)?.next().unwrap()?;
        assert_eq!(member.name, "data.tar.xz");

        Ok(())
    }

    #[test]
    fn test_truncated_body() -> Result<()> {
        let mut data = ar_with_members(&[("data.tar", vec![0; 100])])?;
        data.truncate(data.len() - 10);

        let mut archive = ArArchive::new(&data)?;
        assert!(matches!(
            archive.next(),
            Some(Err(SandboxError::CorruptArchive { offset: 8, .. }))
        ));
        assert!(archive.next().is_none());

        Ok(())
    }

    #[test]
    fn test_bad_size_field() -> Result<()> {
        let mut data = AR_MAGIC.to_vec();
        data.extend_from_slice(format!("{:<16}{:<32}{:<10}`\n", "data.tar", "", "12abc").as_bytes());

        let mut archive = ArArchive::new(&data)?;
        assert!(matches!(
            archive.next(),
            Some(Err(SandboxError::CorruptArchive { .. }))
        ));

        Ok(())
    }

    #[test]
    fn test_trailing_partial_header_ends_cleanly() -> Result<()> {
        let mut data = ar_with_members(&[("debian-binary", b"2.0\n".to_vec())])?;
        data.extend_from_slice(&[b' '; 59]);

        let members = ArArchive::new(&data)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(members.len(), 1);

        Ok(())
    }
}
