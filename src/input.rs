use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use zip::ZipArchive;

use crate::graph::SourceFile;

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Class,
    Manifest,
    Resource,
}

#[derive(Debug, Clone)]
pub struct InputEntry {
    pub name: String,
    pub bytes: Vec<u8>,
    pub source: SourceFile,
}

impl InputEntry {
    pub fn kind(&self) -> EntryKind {
        entry_kind(&self.name)
    }
}

/// Classifies an archive path. Module descriptors and multi-release
/// variants are never relocated, so they travel as plain resources.
pub fn entry_kind(name: &str) -> EntryKind {
    if name.eq_ignore_ascii_case(MANIFEST_NAME) {
        return EntryKind::Manifest;
    }
    if !name.ends_with(".class") {
        return EntryKind::Resource;
    }
    let file_name = name.rsplit('/').next();
    if name.starts_with("META-INF/versions/") || file_name == Some("module-info.class") {
        return EntryKind::Resource;
    }
    EntryKind::Class
}

pub fn load_inputs(paths: &[PathBuf]) -> Result<Vec<InputEntry>> {
    let mut entries = Vec::new();
    for path in paths {
        let before = entries.len();
        if path.is_dir() {
            load_directory(path, &mut entries)?;
        } else if is_archive(path) {
            load_jar(path, &mut entries)?;
        } else if path.exists() {
            anyhow::bail!("Unsupported input (expected a jar or directory): {}", path.display());
        } else {
            anyhow::bail!("Input not found: {}", path.display());
        }
        tracing::debug!(input = %path.display(), entries = entries.len() - before, "loaded input");
    }
    Ok(entries)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

pub fn load_jar(jar_path: &Path, out: &mut Vec<InputEntry>) -> Result<()> {
    let file = File::open(jar_path)
        .with_context(|| format!("Failed to open jar: {}", jar_path.display()))?;
    // SAFETY: The file is opened read-only and outlives the mapping, which is
    // dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", jar_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", jar_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {i} of {}", jar_path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to extract {name} from {}", jar_path.display()))?;
        out.push(InputEntry {
            source: SourceFile::JarEntry {
                jar: jar_path.to_path_buf(),
                entry: name.clone(),
            },
            name,
            bytes,
        });
    }
    Ok(())
}

pub fn load_directory(dir: &Path, out: &mut Vec<InputEntry>) -> Result<()> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .follow_links(true)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                    let _ = tx.send(Ok(entry.into_path()));
                }
                Ok(_) => {}
                Err(err) => {
                    let _ = tx.send(Err(err));
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<PathBuf> = Vec::new();
    let mut errors: Vec<ignore::Error> = Vec::new();
    for item in rx {
        match item {
            Ok(path) => files.push(path),
            Err(err) => errors.push(err),
        }
    }
    if let Some(first) = errors.into_iter().next() {
        return Err(first)
            .with_context(|| format!("Failed to walk input directory: {}", dir.display()));
    }
    files.sort();

    for path in files {
        let Some(name) = relative_entry_name(dir, &path) else {
            continue;
        };
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read: {}", path.display()))?;
        out.push(InputEntry {
            name,
            bytes,
            source: SourceFile::File { path },
        });
    }
    Ok(())
}

fn relative_entry_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
