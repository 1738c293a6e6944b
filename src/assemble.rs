//! Writes the shaded jar described by a [`ShadePlan`].
//!
//! Entries are copied byte for byte from their origin; only their paths change.
//! Constant pools inside relocated classes still name the original classes.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::write::{FileOptions, ZipWriter};

use crate::graph::SourceFile;
use crate::input::MANIFEST_NAME;
use crate::shade::ShadePlan;

#[derive(Debug, Clone, Serialize)]
pub struct AssembleSummary {
    pub output: String,
    pub manifest_written: bool,
    pub resources_written: usize,
    pub classes_written: usize,
    pub duplicates_skipped: usize,
    pub dropped_classes: usize,
    /// Always false: class bytes are copied without rewriting their references.
    pub bytecode_remapped: bool,
}

/// Re-reads entry bytes, keeping each input jar open once.
#[derive(Default)]
struct SourceReader {
    archives: HashMap<PathBuf, ZipArchive<File>>,
}

impl SourceReader {
    fn read(&mut self, source: &SourceFile) -> Result<Vec<u8>> {
        match source {
            SourceFile::File { path } => {
                std::fs::read(path).with_context(|| format!("Failed to read: {}", path.display()))
            }
            SourceFile::JarEntry { jar, entry } => {
                let archive = match self.archives.entry(jar.clone()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(v) => {
                        let file = File::open(jar)
                            .with_context(|| format!("Failed to open jar: {}", jar.display()))?;
                        let archive = ZipArchive::new(file).with_context(|| {
                            format!("Failed to read zip structure: {}", jar.display())
                        })?;
                        v.insert(archive)
                    }
                };
                let mut file = archive
                    .by_name(entry)
                    .with_context(|| format!("Missing entry {entry} in {}", jar.display()))?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)
                    .with_context(|| format!("Failed to extract {entry} from {}", jar.display()))?;
                Ok(bytes)
            }
        }
    }
}

/// Removes the temporary jar unless it was moved into place.
struct TempOutput {
    path: PathBuf,
    committed: bool,
}

impl TempOutput {
    fn commit(mut self, output: &Path) -> Result<()> {
        if output.exists() {
            std::fs::remove_file(output).with_context(|| {
                format!("Failed to replace existing output: {}", output.display())
            })?;
        }
        std::fs::rename(&self.path, output).with_context(|| {
            format!("Failed to move output jar into place: {}", output.display())
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if !self.committed
            && self.path.exists()
            && let Err(err) = std::fs::remove_file(&self.path)
        {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temporary jar"
            );
        }
    }
}

struct JarSink {
    zip: ZipWriter<File>,
    options: FileOptions,
    written: HashSet<String>,
    duplicates: usize,
}

impl JarSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<bool> {
        if !self.written.insert(name.to_string()) {
            tracing::warn!(entry = %name, "duplicate output entry skipped");
            self.duplicates += 1;
            return Ok(false);
        }
        self.zip
            .start_file(name, self.options)
            .with_context(|| format!("Failed to start entry: {name}"))?;
        self.zip
            .write_all(bytes)
            .with_context(|| format!("Failed to write entry: {name}"))?;
        Ok(true)
    }
}

pub fn write_shaded_jar(plan: &ShadePlan, output: &Path) -> Result<AssembleSummary> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let mut tmp_os = output.as_os_str().to_os_string();
    tmp_os.push(".tmp");
    let tmp = TempOutput {
        path: PathBuf::from(tmp_os),
        committed: false,
    };

    let file = File::create(&tmp.path)
        .with_context(|| format!("Failed to create output jar: {}", tmp.path.display()))?;
    let mut sink = JarSink {
        zip: ZipWriter::new(file),
        options: FileOptions::default().compression_method(zip::CompressionMethod::Deflated),
        written: HashSet::new(),
        duplicates: 0,
    };
    let mut reader = SourceReader::default();

    let mut manifest_written = false;
    if let Some(manifest) = plan.manifest.as_ref() {
        let bytes = reader.read(&manifest.source_file)?;
        manifest_written = sink.put(MANIFEST_NAME, &bytes)?;
    }

    let mut resources_written = 0usize;
    for resource in &plan.resources {
        let bytes = reader.read(&resource.source_file)?;
        if sink.put(&resource.resource_name, &bytes)? {
            resources_written += 1;
        }
    }

    let mut classes_written = 0usize;
    for class in &plan.retained {
        let bytes = reader.read(&class.source)?;
        if sink.put(&class.output_path, &bytes)? {
            classes_written += 1;
        }
    }

    let duplicates_skipped = sink.duplicates;
    sink.zip
        .finish()
        .with_context(|| format!("Failed to finish output jar: {}", tmp.path.display()))?;
    tmp.commit(output)?;

    tracing::info!(
        output = %output.display(),
        classes = classes_written,
        resources = resources_written,
        dropped = plan.dropped.len(),
        "wrote shaded jar"
    );

    Ok(AssembleSummary {
        output: output.to_string_lossy().to_string(),
        manifest_written,
        resources_written,
        classes_written,
        duplicates_skipped,
        dropped_classes: plan.dropped.len(),
        bytecode_remapped: false,
    })
}
