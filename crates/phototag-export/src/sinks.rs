//! Directory-backed sinks. Both write baseline JPEG at full quality.

use crate::{ExportError, ExportSink, ExportTarget};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const JPEG_QUALITY: u8 = 100;
const MAX_LIBRARY_SUFFIX: u32 = 10_000;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reject names that would escape the target directory.
fn check_name(name: &str) -> Result<(), ExportError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(ExportError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn write_jpeg(image: &DynamicImage, file: impl Write, path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(file);
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&rgb)?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Write `path` through a temporary file in `dir` that is renamed into
/// place, so a failed write leaves any previous file untouched.
fn replace_file(
    dir: &Path,
    path: &Path,
    write: impl FnOnce(&mut File) -> Result<(), ExportError>,
) -> Result<(), ExportError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    write(tmp.as_file_mut())?;
    tmp.persist(path).map_err(|e| io_error(path)(e.error))?;
    Ok(())
}

/// App-private documents directory. Writes `<name>.jpg`, replacing any
/// previous export with the same name.
#[derive(Debug, Clone)]
pub struct DocumentsSink {
    dir: PathBuf,
}

impl DocumentsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DocumentsSink {
    fn target(&self) -> ExportTarget {
        ExportTarget::Documents
    }

    fn export(&self, image: &DynamicImage, name: &str) -> Result<PathBuf, ExportError> {
        check_name(name)?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.dir.join(format!("{name}.jpg"));
        replace_file(&self.dir, &path, |file| write_jpeg(image, file, &path))?;

        if !path.is_file() {
            return Err(ExportError::Missing(path));
        }
        tracing::info!(path = %path.display(), "image saved to documents");
        Ok(path)
    }
}

/// Photo library directory. Existing assets are never replaced: a taken
/// name gets a ` (2)`, ` (3)`, ... suffix.
#[derive(Debug, Clone)]
pub struct PhotoLibrarySink {
    dir: PathBuf,
}

impl PhotoLibrarySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create_unique(&self, name: &str) -> Result<(File, PathBuf), ExportError> {
        for n in 1..=MAX_LIBRARY_SUFFIX {
            let file_name = if n == 1 {
                format!("{name}.jpg")
            } else {
                format!("{name} ({n}).jpg")
            };
            let path = self.dir.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&path)(e)),
            }
        }
        let path = self.dir.join(format!("{name}.jpg"));
        Err(ExportError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free file name"),
        })
    }
}

impl ExportSink for PhotoLibrarySink {
    fn target(&self) -> ExportTarget {
        ExportTarget::PhotoLibrary
    }

    fn export(&self, image: &DynamicImage, name: &str) -> Result<PathBuf, ExportError> {
        check_name(name)?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let (file, path) = self.create_unique(name)?;
        if let Err(e) = write_jpeg(image, file, &path) {
            // Don't leave a truncated asset behind.
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        tracing::info!(path = %path.display(), "image saved to photo library");
        Ok(path)
    }
}
