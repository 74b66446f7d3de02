//! Deterministic source archives.
//!
//! Entries are sorted by path, carry zero mtime/uid/gid and use GNU headers,
//! so the same tree always produces byte-identical output.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    Gzip,
    Bzip2,
    Xz,
}

impl ArchiveFormat {
    /// Format implied by an archive file name, or `None` for anything that
    /// is not a tarball.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if name.ends_with(".tar.bz2") {
            Some(Self::Bzip2)
        } else if name.ends_with(".tar.xz") {
            Some(Self::Xz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Gzip => "tar.gz",
            Self::Bzip2 => "tar.bz2",
            Self::Xz => "tar.xz",
        }
    }
}

/// Write `source_dir` as an archive at `dest`, every entry under `prefix/`.
/// A top-level `.git` directory is skipped.
pub fn write_source_archive(
    source_dir: &Path,
    prefix: &str,
    format: ArchiveFormat,
    dest: &Path,
) -> io::Result<()> {
    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.retain(|(rel, _)| rel != ".git" && !rel.starts_with(".git/"));
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let writer = BufWriter::new(File::create(dest)?);
    let mut writer = match format {
        ArchiveFormat::Tar => pack(writer, prefix, &entries)?,
        ArchiveFormat::Gzip => {
            let enc = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            pack(enc, prefix, &entries)?.finish()?
        }
        ArchiveFormat::Bzip2 => {
            let enc = bzip2::write::BzEncoder::new(writer, bzip2::Compression::best());
            pack(enc, prefix, &entries)?.finish()?
        }
        ArchiveFormat::Xz => {
            let enc = xz2::write::XzEncoder::new(writer, 6);
            pack(enc, prefix, &entries)?.finish()?
        }
    };
    writer.flush()?;
    writer.get_ref().sync_all()
}

fn pack<W: Write>(writer: W, prefix: &str, entries: &[(String, PathBuf)]) -> io::Result<W> {
    let mut ar = tar::Builder::new(writer);
    ar.follow_symlinks(false);

    append_dir(&mut ar, prefix, None)?;
    for (rel_path, full_path) in entries {
        let meta = match full_path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("skipping {rel_path}: metadata error: {e}");
                continue;
            }
        };
        let path = format!("{prefix}/{rel_path}");
        let ft = meta.file_type();
        if ft.is_file() {
            let data = fs::read(full_path)?;
            let mut header = make_header(&meta, tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_cksum();
            ar.append_data(&mut header, &path, data.as_slice())?;
        } else if ft.is_dir() {
            append_dir(&mut ar, &path, Some(&meta))?;
        } else if ft.is_symlink() {
            let target = fs::read_link(full_path)?;
            let mut header = make_header(&meta, tar::EntryType::Symlink);
            header.set_size(0);
            header.set_cksum();
            ar.append_link(&mut header, &path, &target)?;
        } else {
            warn!("skipping unsupported file type: {rel_path}");
        }
    }

    ar.into_inner()
}

fn append_dir<W: Write>(
    ar: &mut tar::Builder<W>,
    path: &str,
    meta: Option<&fs::Metadata>,
) -> io::Result<()> {
    let mut header = match meta {
        Some(m) => make_header(m, tar::EntryType::Directory),
        None => {
            let mut h = tar::Header::new_gnu();
            h.set_entry_type(tar::EntryType::Directory);
            h.set_mtime(0);
            h.set_uid(0);
            h.set_gid(0);
            h.set_mode(0o755);
            h
        }
    };
    header.set_size(0);
    header.set_cksum();
    ar.append_data(&mut header, format!("{path}/"), io::empty())
}

fn make_header(meta: &fs::Metadata, entry_type: tar::EntryType) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(meta.permissions().mode() & 0o7777);
    header
}

/// Recursively collect (relative_path, full_path) pairs from a directory tree.
fn collect_entries(root: &Path, current: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut result = Vec::new();
    for entry in fs::read_dir(current)? {
        let full = entry?.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| io::Error::other(format!("path strip: {e}")))?
            .to_string_lossy()
            .into_owned();

        if full.symlink_metadata()?.is_dir() {
            if rel == ".git" {
                continue;
            }
            result.push((rel, full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}
