use crate::collection::MelodyCollection;
use crate::error::{MelodyError, Result};
use crate::model::melody::Melody;
use crate::readers::{MelodyReader, default_readers, reader_for};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// A file that was skipped while loading a collection, and why.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Melodies held in memory, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMelodyCollection {
    name: String,
    melodies: BTreeMap<String, Melody>,
    warnings: Vec<LoadWarning>,
    #[cfg(test)]
    extraction_dir: Option<PathBuf>,
}

impl InMemoryMelodyCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Loads every MIDI and ABC file under `path`, a directory (searched recursively)
    /// or a `.zip` archive. The collection is named after the path's stem unless `name` is given.
    ///
    /// Files that fail to parse are skipped and recorded in [`Self::load_warnings`].
    pub fn load<P: AsRef<Path>>(path: P, name: Option<&str>) -> Result<Self> {
        Self::load_with(path, name, &default_readers())
    }

    pub fn load_with<P: AsRef<Path>>(
        path: P,
        name: Option<&str>,
        readers: &[Box<dyn MelodyReader>],
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MelodyError::NotFound(format!(
                "path does not exist: {}",
                path.display()
            )));
        }

        let name = name.map(str::to_string).unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let mut collection = Self::new(name);

        if path.is_dir() {
            collection.load_directory(path, readers)?;
        } else if path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        {
            collection.load_zip(path, readers)?;
        } else {
            return Err(MelodyError::InvalidArgument(format!(
                "path must be a directory or a ZIP file: {}",
                path.display()
            )));
        }

        info!(
            "Loaded {} melodies into collection '{}' ({} skipped)",
            collection.size(),
            collection.name,
            collection.warnings.len()
        );

        Ok(collection)
    }

    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    fn load_directory(&mut self, dir: &Path, readers: &[Box<dyn MelodyReader>]) -> Result<()> {
        let mut files = Vec::new();
        self.collect_files(dir, &mut files)
            .map_err(|e| MelodyError::io(dir, e))?;
        files.sort();

        let accepted: Vec<(PathBuf, &dyn MelodyReader)> = files
            .into_iter()
            .filter_map(|file| {
                let file_name = file.file_name()?.to_str()?.to_string();
                reader_for(readers, &file_name).map(|reader| (file, reader))
            })
            .collect();

        if accepted.is_empty() {
            warn!("No melody files found in directory: {}", dir.display());
            return Ok(());
        }
        info!(
            "Found {} melody files in directory: {}",
            accepted.len(),
            dir.display()
        );

        for (file, reader) in accepted {
            let melody_id = stem(&file);
            self.load_file(&file, &melody_id, &file, reader);
        }

        Ok(())
    }

    /// Recursively gathers regular files. Unreadable entries and subdirectories become warnings.
    fn collect_files(&mut self, dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
        let entries = fs::read_dir(dir)?.map(|entry| entry.map(|entry| entry.path()));
        self.collect_entries(dir, entries, files);
        Ok(())
    }

    fn collect_entries(
        &mut self,
        dir: &Path,
        entries: impl IntoIterator<Item = io::Result<PathBuf>>,
        files: &mut Vec<PathBuf>,
    ) {
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    self.skip(dir, format!("unreadable directory entry: {e}"));
                    continue;
                }
            };

            if path.is_dir() {
                if let Err(e) = self.collect_files(&path, files) {
                    self.skip(&path, format!("unreadable directory: {e}"));
                }
            } else if path.is_file() {
                files.push(path);
            }
        }
    }

    fn load_zip(&mut self, zip_path: &Path, readers: &[Box<dyn MelodyReader>]) -> Result<()> {
        let file = File::open(zip_path).map_err(|e| MelodyError::io(zip_path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| MelodyError::Archive {
            path: zip_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut members: Vec<(String, usize)> = Vec::new();
        for index in 0..archive.len() {
            match archive.by_index(index) {
                Ok(entry) if entry.is_dir() => {}
                Ok(entry) => {
                    if reader_for(readers, entry.name()).is_some() {
                        members.push((entry.name().to_string(), index));
                    }
                }
                Err(e) => self.skip(&zip_path.join(format!("#{index}")), e.to_string()),
            }
        }
        members.sort();

        if members.is_empty() {
            warn!("No melody files found in ZIP archive: {}", zip_path.display());
            return Ok(());
        }
        info!(
            "Found {} melody files in ZIP archive: {}",
            members.len(),
            zip_path.display()
        );

        // removed on drop, whichever way this function exits
        let temp_dir = tempfile::tempdir().map_err(|e| MelodyError::io(std::env::temp_dir(), e))?;
        #[cfg(test)]
        {
            self.extraction_dir = Some(temp_dir.path().to_path_buf());
        }

        for (name, index) in members {
            let member_path = zip_path.join(&name);
            let extracted = match extract(&mut archive, index, temp_dir.path()) {
                Ok(extracted) => extracted,
                Err(reason) => {
                    self.skip(&member_path, format!("failed to extract: {reason}"));
                    continue;
                }
            };

            if let Some(reader) = reader_for(readers, &name) {
                let melody_id = stem(Path::new(&name));
                self.load_file(&extracted, &melody_id, &member_path, reader);
            }
        }

        Ok(())
    }

    /// Parses one file into the collection, recording a warning instead of failing.
    /// `display_path` is what warnings report, which differs from `path` for archive members.
    fn load_file(
        &mut self,
        path: &Path,
        melody_id: &str,
        display_path: &Path,
        reader: &dyn MelodyReader,
    ) {
        if self.melodies.contains_key(melody_id) {
            self.skip(
                display_path,
                format!("duplicate melody id '{melody_id}'"),
            );
            return;
        }

        match reader.read(melody_id, path) {
            Ok(melody) => {
                debug!(
                    "Successfully loaded melody: {} ({} notes)",
                    melody_id,
                    melody.len()
                );
                self.melodies.insert(melody_id.to_string(), melody);
            }
            Err(e) => self.skip(display_path, e.to_string()),
        }
    }

    fn skip(&mut self, path: &Path, reason: String) {
        warn!("Skipping {}: {}..!", path.display(), reason);
        self.warnings.push(LoadWarning {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Copies archive member `index` below `dest`, returning where it landed.
fn extract(
    archive: &mut ZipArchive<File>,
    index: usize,
    dest: &Path,
) -> std::result::Result<PathBuf, String> {
    let mut entry = archive.by_index(index).map_err(|e| e.to_string())?;
    let relative = entry
        .enclosed_name()
        .ok_or_else(|| format!("unsafe member path '{}'", entry.name()))?;

    let target = dest.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let mut out = File::create(&target).map_err(|e| e.to_string())?;
    io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;

    Ok(target)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl MelodyCollection for InMemoryMelodyCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&mut self, melody: Melody) -> Result<()> {
        if self.melodies.contains_key(melody.id()) {
            return Err(MelodyError::InvalidArgument(format!(
                "melody with id '{}' already exists in collection",
                melody.id()
            )));
        }

        debug!("Added melody to collection: {}", melody.id());
        self.melodies.insert(melody.id().to_string(), melody);
        Ok(())
    }

    fn get(&self, melody_id: &str) -> Result<&Melody> {
        self.melodies
            .get(melody_id)
            .ok_or_else(|| MelodyError::NotFound(format!("no melody with id '{melody_id}'")))
    }

    fn size(&self) -> usize {
        self.melodies.len()
    }

    fn contains(&self, melody_id: &str) -> bool {
        self.melodies.contains_key(melody_id)
    }

    fn remove(&mut self, melody_id: &str) -> Result<Melody> {
        let melody = self
            .melodies
            .remove(melody_id)
            .ok_or_else(|| MelodyError::NotFound(format!("no melody with id '{melody_id}'")))?;
        debug!("Removed melody from collection: {}", melody_id);
        Ok(melody)
    }

    fn clear(&mut self) {
        self.melodies.clear();
        debug!("Cleared all melodies from collection");
    }

    fn iter(&self) -> impl Iterator<Item = &Melody> {
        self.melodies.values()
    }
}

impl fmt::Display for InMemoryMelodyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InMemoryMelodyCollection(name='{}', size={})",
            self.name,
            self.size()
        )
    }
}
