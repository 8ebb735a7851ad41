// MinIO Rust Library for Overture Maps GeoParquet Extraction
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Output encodings for extracted features.
//!
//! A [`FeatureSink`] wraps one of three writers behind a single
//! `open → write_batch* → close` lifecycle:
//!
//! | Format | Memory | Notes |
//! |---|---|---|
//! | [`OutputFormat::GeoJson`] | all features | document written on [`FeatureSink::close`] |
//! | [`OutputFormat::GeoJsonSeq`] | one feature | one line per feature, flushed |
//! | [`OutputFormat::GeoParquet`] | one batch | `geo` metadata written on close |
//!
//! A FeatureCollection cannot be terminated before the last feature is known, so that
//! format is not streaming.
//!
//! File targets are written to `<path>.partial` and renamed on close. On
//! [`FeatureSink::abort`] the partial file is removed.

mod geojson;
mod geoparquet;

pub use geojson::{FeatureCollectionWriter, FeatureSequenceWriter, batch_to_features};
pub use geoparquet::{GeoParquetWriter, geoarrow_schema};

use crate::error::{Error, Result};
use crate::geo::BoundingBox;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const PARTIAL_SUFFIX: &str = ".partial";

/// Output encoding selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Single GeoJSON FeatureCollection document
    #[value(name = "geojson")]
    GeoJson,
    /// Newline-delimited GeoJSON features
    #[value(name = "geojsonseq")]
    GeoJsonSeq,
    /// GeoParquet with WKB geometry
    #[value(name = "geoparquet", alias = "parquet")]
    GeoParquet,
}

/// Lifecycle of a sink. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    Writing,
    Closed,
}

/// Where encoded bytes go.
pub enum OutputTarget {
    Stdout(io::Stdout),
    File {
        writer: BufWriter<File>,
        partial: PathBuf,
        path: PathBuf,
    },
    Writer(Box<dyn Write + Send>),
}

impl OutputTarget {
    pub fn stdout() -> Self {
        OutputTarget::Stdout(io::stdout())
    }

    /// Create `<path>.partial`; it becomes `path` on commit.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);
        let file = File::create(&partial)?;
        Ok(OutputTarget::File {
            writer: BufWriter::new(file),
            partial,
            path,
        })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        OutputTarget::Writer(Box::new(writer))
    }

    /// Final destination, for file targets.
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputTarget::File { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The `.partial` file being written, for file targets.
    pub fn partial_path(&self) -> Option<&Path> {
        match self {
            OutputTarget::File { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Flush and, for files, move the partial file into place.
    /// A file target that cannot be moved into place leaves nothing behind.
    pub fn commit(self) -> Result<()> {
        match self {
            OutputTarget::Stdout(mut out) => out.flush()?,
            OutputTarget::Writer(mut w) => w.flush()?,
            OutputTarget::File {
                writer,
                partial,
                path,
            } => {
                let moved = writer
                    .into_inner()
                    .map_err(|e| e.into_error())
                    .and_then(|file| {
                        file.sync_all()?;
                        drop(file);
                        std::fs::rename(&partial, &path)
                    });
                if let Err(e) = moved {
                    remove_partial(&partial);
                    return Err(e.into());
                }
                log::debug!("wrote {}", path.display());
            }
        }
        Ok(())
    }

    /// Drop the output; a partial file is deleted, stdout is left as is.
    pub fn discard(self) {
        if let OutputTarget::File {
            writer, partial, ..
        } = self
        {
            drop(writer);
            remove_partial(&partial);
        }
    }
}

fn remove_partial(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(()) => log::debug!("removed {}", partial.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {e}", partial.display()),
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputTarget::Stdout(out) => out.write(buf),
            OutputTarget::File { writer, .. } => writer.write(buf),
            OutputTarget::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputTarget::Stdout(out) => out.flush(),
            OutputTarget::File { writer, .. } => writer.flush(),
            OutputTarget::Writer(w) => w.flush(),
        }
    }
}

/// In-memory target that can be read back after the sink has taken ownership.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("shared buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a closed sink wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkSummary {
    pub rows: usize,
    pub batches: usize,
    /// Envelope of all written features, when known
    pub extent: Option<BoundingBox>,
}

enum FormatWriter {
    Collection(FeatureCollectionWriter),
    Sequence(FeatureSequenceWriter),
    GeoParquet(GeoParquetWriter),
}

impl FormatWriter {
    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        match self {
            FormatWriter::Collection(w) => w.write(batch),
            FormatWriter::Sequence(w) => w.write(batch),
            FormatWriter::GeoParquet(w) => w.write(batch),
        }
    }

    fn finish(self, schema: Option<SchemaRef>) -> Result<(OutputTarget, Option<BoundingBox>)> {
        match self {
            FormatWriter::Collection(w) => w.finish().map(|t| (t, None)),
            FormatWriter::Sequence(w) => w.finish().map(|t| (t, None)),
            FormatWriter::GeoParquet(w) => w.finish(schema),
        }
    }

    fn into_target(self) -> Option<OutputTarget> {
        match self {
            FormatWriter::Collection(w) => Some(w.into_target()),
            FormatWriter::Sequence(w) => Some(w.into_target()),
            FormatWriter::GeoParquet(w) => w.into_target(),
        }
    }
}

/// True when two schemas have the same field names and types, in order.
fn same_shape(a: &SchemaRef, b: &SchemaRef) -> bool {
    a.fields().len() == b.fields().len()
        && a
            .fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
}

/// Encodes record batches in one [`OutputFormat`].
pub struct FeatureSink {
    format: OutputFormat,
    state: SinkState,
    schema: Option<SchemaRef>,
    rows: usize,
    batches: usize,
    writer: Option<FormatWriter>,
    partial: Option<PathBuf>,
}

impl FeatureSink {
    pub fn open(format: OutputFormat, target: OutputTarget) -> Self {
        let partial = target.partial_path().map(Path::to_path_buf);
        let writer = match format {
            OutputFormat::GeoJson => FormatWriter::Collection(FeatureCollectionWriter::new(target)),
            OutputFormat::GeoJsonSeq => FormatWriter::Sequence(FeatureSequenceWriter::new(target)),
            OutputFormat::GeoParquet => FormatWriter::GeoParquet(GeoParquetWriter::new(target)),
        };
        Self {
            format,
            state: SinkState::Open,
            schema: None,
            rows: 0,
            batches: 0,
            writer: Some(writer),
            partial,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Fix the schema before any batch arrives, so an empty GeoParquet file still
    /// carries the source columns. Ignored once a schema is known.
    pub fn declare_schema(&mut self, schema: SchemaRef) -> Result<()> {
        if self.state == SinkState::Closed {
            return Err(Error::SinkState("schema declared on a closed sink".to_string()));
        }
        if self.schema.is_none() {
            self.schema = Some(schema);
        }
        Ok(())
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if self.state == SinkState::Closed {
            return Err(Error::SinkState("write after close".to_string()));
        }
        match &self.schema {
            Some(expected) if !same_shape(expected, &batch.schema()) => {
                return Err(Error::SinkState(format!(
                    "batch schema does not match the first batch: expected {:?}, got {:?}",
                    expected.fields().iter().map(|f| f.name()).collect::<Vec<_>>(),
                    batch.schema().fields().iter().map(|f| f.name()).collect::<Vec<_>>(),
                )));
            }
            Some(_) => {}
            None => self.schema = Some(batch.schema()),
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::SinkState("sink has no writer".to_string()))?;
        self.state = SinkState::Writing;
        if batch.num_rows() == 0 {
            return Ok(());
        }
        writer.write(batch)?;
        self.rows += batch.num_rows();
        self.batches += 1;
        Ok(())
    }

    /// Finish the document and commit the target.
    pub fn close(&mut self) -> Result<SinkSummary> {
        if self.state == SinkState::Closed {
            return Err(Error::SinkState("sink closed twice".to_string()));
        }
        self.state = SinkState::Closed;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::SinkState("sink has no writer".to_string()))?;
        let extent = match writer
            .finish(self.schema.clone())
            .and_then(|(target, extent)| target.commit().map(|_| extent))
        {
            Ok(extent) => extent,
            Err(e) => {
                if let Some(partial) = &self.partial {
                    remove_partial(partial);
                }
                return Err(e);
            }
        };
        log::info!(
            "{:?} sink closed: {} features in {} batches",
            self.format,
            self.rows,
            self.batches
        );
        Ok(SinkSummary {
            rows: self.rows,
            batches: self.batches,
            extent,
        })
    }

    /// Abandon the output. Safe to call in any state.
    pub fn abort(&mut self) {
        self.state = SinkState::Closed;
        if let Some(target) = self.writer.take().and_then(FormatWriter::into_target) {
            log::debug!("aborting {:?} sink after {} features", self.format, self.rows);
            target.discard();
        } else if let Some(partial) = &self.partial {
            remove_partial(partial);
        }
    }
}
