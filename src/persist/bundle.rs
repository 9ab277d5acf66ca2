use crate::constants::MANIFEST_ENTRY;
use crate::errors::ConformalError;
use crate::persist::manifest::BundleManifest;
use log::info;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// A saved predictor: a manifest and an ordered list of named blobs.
///
/// Blobs are encrypted when the manifest says so. Serialising the bundle to
/// bytes or a file is a separate step from saving the predictor.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelBundle {
    pub(crate) manifest: BundleManifest,
    pub(crate) entries: Vec<(String, Vec<u8>)>,
}

fn write_err<E: ToString>(e: E) -> ConformalError {
    ConformalError::UnableToWrite(e.to_string())
}

fn read_err<E: ToString>(e: E) -> ConformalError {
    ConformalError::UnableToRead(e.to_string())
}

impl ModelBundle {
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn entries(&self) -> &[(String, Vec<u8>)] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, b)| b.as_slice())
    }

    /// Zip container holding the manifest first, then every entry in order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConformalError> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options: FileOptions<'_, ()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);

            zip.start_file(MANIFEST_ENTRY, options).map_err(write_err)?;
            zip.write_all(self.manifest.to_json()?.as_bytes()).map_err(write_err)?;
            for (name, data) in &self.entries {
                zip.start_file(name.as_str(), options).map_err(write_err)?;
                zip.write_all(data).map_err(write_err)?;
            }
            zip.finish().map_err(write_err)?;
        }
        Ok(buffer.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConformalError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(read_err)?;
        let mut manifest = None;
        let mut entries = Vec::with_capacity(archive.len().saturating_sub(1));
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(read_err)?;
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data).map_err(read_err)?;
            if name == MANIFEST_ENTRY {
                let json = String::from_utf8(data).map_err(read_err)?;
                manifest = Some(BundleManifest::from_json(&json)?);
            } else {
                entries.push((name, data));
            }
        }
        let manifest = manifest.ok_or_else(|| read_err(format!("bundle has no {}", MANIFEST_ENTRY)))?;
        Ok(ModelBundle { manifest, entries })
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConformalError> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), &bytes).map_err(write_err)?;
        info!("Wrote model bundle of {} bytes to {}.", bytes.len(), path.as_ref().display());
        Ok(())
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConformalError> {
        let bytes = fs::read(path).map_err(read_err)?;
        Self::from_bytes(&bytes)
    }
}
