//! Newline-delimited layer files

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::builder::LayerSink;
use crate::error::{Error, Result};
use crate::types::{Layer, NodeHash};

/// Flat file of leaf hashes written wave by wave during leaf generation
pub struct ScratchFile {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl ScratchFile {
    /// Create (or truncate) the scratch file at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| Error::storage(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of hashes appended so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and sync, returning the file's path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer
            .flush()
            .map_err(|e| Error::storage(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::storage(&self.path, e))?;
        Ok(self.path)
    }
}

impl LayerSink for ScratchFile {
    fn append(&mut self, hashes: &[NodeHash]) -> Result<()> {
        for hash in hashes {
            writeln!(self.writer, "{hash}").map_err(|e| Error::storage(&self.path, e))?;
        }
        self.written += hashes.len();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::storage(&self.path, e))
    }
}

/// Write `layer` to `path`, one hash per line
pub fn write_layer_file(path: &Path, layer: &Layer) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::storage(path, e))?;
    let mut writer = BufWriter::new(file);
    for hash in layer {
        writeln!(writer, "{hash}").map_err(|e| Error::storage(path, e))?;
    }
    writer.flush().map_err(|e| Error::storage(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| Error::storage(path, e))
}

/// Move `from` to `to`, copying when a rename is not possible (for example
/// across filesystems). The copy is synced before `from` is removed.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::storage(from, e)),
        Err(e) => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "Rename failed, copying"
            );
            copy_then_remove(from, to)
        }
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| Error::storage(to, e))?;
    File::open(to)
        .and_then(|file| file.sync_all())
        .map_err(|e| Error::storage(to, e))?;
    fs::remove_file(from).map_err(|e| Error::storage(from, e))
}

/// Read a layer file written by [`write_layer_file`] or [`ScratchFile`]
pub fn read_layer_file(path: &Path) -> Result<Layer> {
    let file = File::open(path).map_err(|e| Error::storage(path, e))?;
    let mut layer = Layer::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::storage(path, e))?;
        let line = line.trim();
        if !line.is_empty() {
            layer.push(NodeHash::from_encoded(line));
        }
    }
    Ok(layer)
}
