// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Helpers for constructing synthetic `.deb` archives in tests. */

use {
    crate::{deb::PayloadCodec, error::Result},
    std::io::Write,
};

/// An entry to write into a test tar archive.
pub enum TestEntry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
}

/// Build an `ar` archive holding the given members.
pub fn ar_with_members(members: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut buffer = vec![];
    {
        let mut builder = ar::Builder::new(&mut buffer);

        for (name, data) in members {
            let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as _);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            builder.append(&header, data.as_slice())?;
        }
    }

    Ok(buffer)
}

fn new_tar_header(path: &str, entry_type: tar::EntryType, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(if entry_type.is_dir() { 0o755 } else { 0o644 });

    // Write the name verbatim. `set_path()` refuses `..` components, which we
    // need in order to exercise the sandbox.
    let name = path.as_bytes();
    let name_buffer = &mut header.as_old_mut().name;
    assert!(name.len() <= name_buffer.len(), "test path too long");
    name_buffer[0..name.len()].copy_from_slice(name);

    header
}

/// Build an uncompressed tar archive from entries.
pub fn tar_with_entries(entries: &[TestEntry<'_>]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        match entry {
            TestEntry::Dir(path) => {
                let mut header = new_tar_header(path, tar::EntryType::Directory, 0);
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            }
            TestEntry::File(path, data) => {
                let mut header =
                    new_tar_header(path, tar::EntryType::Regular, data.len() as u64);
                header.set_cksum();
                builder.append(&header, *data)?;
            }
            TestEntry::Symlink(path, target) => {
                let mut header = new_tar_header(path, tar::EntryType::Symlink, 0);
                header.set_link_name(target)?;
                header.set_cksum();
                builder.append(&header, std::io::empty())?;
            }
        }
    }

    Ok(builder.into_inner()?)
}

/// Compress data with a payload codec.
pub fn compress(codec: PayloadCodec, data: &[u8]) -> Result<Vec<u8>> {
    Ok(match codec {
        PayloadCodec::Plain => data.to_vec(),
        PayloadCodec::Gzip => {
            let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
            encoder.write_all(data)?;
            encoder.finish().into_result()?
        }
        PayloadCodec::Lzma => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data)?;
            encoder.finish()?
        }
    })
}

/// Build a `.deb` whose payload member has the given name and raw content.
pub fn deb_with_data_member(member_name: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
    let control = compress(
        PayloadCodec::Gzip,
        &tar_with_entries(&[TestEntry::File("./control", b"Package: test\n")])?,
    )?;

    ar_with_members(&[
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", control),
        (member_name, payload),
    ])
}

/// Build a `.deb` holding entries in a `data.tar` compressed with `codec`.
pub fn deb_with_entries(codec: PayloadCodec, entries: &[TestEntry<'_>]) -> Result<Vec<u8>> {
    let payload = compress(codec, &tar_with_entries(entries)?)?;

    deb_with_data_member(&format!("data.tar{}", codec.extension()), payload)
}
