//! Gzip'd tar archives of a fleet root

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use fleet_core::error::SnapshotError;

/// Path of the temporary file an archive is written to before being renamed
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Archive every regular file under `root` into `dest` with paths relative to
/// `root`. Returns the number of files written.
///
/// Nothing is left at `dest` (or its temporary sibling) on failure.
pub fn pack_dir(root: &Path, dest: &Path) -> Result<usize, SnapshotError> {
    let (partial, count) = pack_partial(root, dest)?;
    if let Err(source) = std::fs::rename(&partial, dest) {
        let _ = std::fs::remove_file(&partial);
        return Err(SnapshotError::Archive {
            path: dest.to_path_buf(),
            source,
        });
    }
    Ok(count)
}

/// Write the archive for `dest` to its temporary sibling without touching
/// `dest` itself. Returns the temporary path and the number of files.
///
/// The caller renames the temporary file into place; on failure it is removed.
pub fn pack_partial(root: &Path, dest: &Path) -> Result<(PathBuf, usize), SnapshotError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(dest);
    match write_archive(root, &partial) {
        Ok(count) => Ok((partial, count)),
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_archive(root: &Path, partial: &Path) -> Result<usize, SnapshotError> {
    let archive_err = |source: io::Error| SnapshotError::Archive {
        path: partial.to_path_buf(),
        source,
    };

    let file = File::create(partial).map_err(archive_err)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0;
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_err(io::Error::from(e)))?;
        if !entry.file_type().is_file() || entry.path() == partial {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| SnapshotError::UnsafeEntry(entry.path().to_path_buf()))?;
        builder
            .append_path_with_name(entry.path(), relative)
            .map_err(archive_err)?;
        count += 1;
    }

    let encoder = builder.into_inner().map_err(archive_err)?;
    let mut writer = encoder.finish().map_err(archive_err)?;
    writer.flush().map_err(archive_err)?;
    writer
        .into_inner()
        .map_err(|e| archive_err(e.into_error()))?
        .sync_all()
        .map_err(archive_err)?;

    Ok(count)
}

/// Unpack regular files from `archive` into `dest`, creating directories as
/// needed. Returns the number of files written.
pub fn unpack_into(archive: &Path, dest: &Path) -> Result<usize, SnapshotError> {
    let file = match File::open(archive) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound(archive.to_path_buf()))
        }
        Err(source) => {
            return Err(SnapshotError::Archive {
                path: archive.to_path_buf(),
                source,
            })
        }
    };
    let archive_err = |source: io::Error| SnapshotError::Archive {
        path: archive.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dest)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let mut count = 0;
    for entry in tar.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let relative = entry.path().map_err(archive_err)?.into_owned();
        if !is_contained(&relative) {
            return Err(SnapshotError::UnsafeEntry(relative));
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target).map_err(archive_err)?;
        count += 1;
    }

    Ok(count)
}

/// True if `path` is relative and never climbs above its base
fn is_contained(path: &Path) -> bool {
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}
