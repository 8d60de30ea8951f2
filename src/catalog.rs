use crate::messages::Recording;
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Source of the recordings list shown to the user
pub trait RecordingCatalog {
    /// Known recordings, newest first
    fn list(&self) -> io::Result<Vec<Recording>>;

    /// Where the next recording should be written
    fn next_recording_path(&self) -> io::Result<PathBuf>;
}

/// Catalog backed by a directory of audio files
pub struct DirectoryCatalog {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryCatalog {
    pub fn new(dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            extensions,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecordingCatalog for DirectoryCatalog {
    fn list(&self) -> io::Result<Vec<Recording>> {
        list_recordings(&self.dir, &self.extensions)
    }

    fn next_recording_path(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(self.dir.join(recording_file_name(&mut rand::rng())))
    }
}

/// List audio files in `dir`, sorted by modification time, newest first
///
/// A missing directory is an empty catalog, not an error.
pub fn list_recordings(dir: &Path, extensions: &[String]) -> io::Result<Vec<Recording>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found: Vec<(Option<SystemTime>, Recording)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_audio_extension(path, extensions))
        .map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok();
            (modified, Recording::from_path(path))
        })
        .collect();

    found.sort_by(|(a_time, a), (b_time, b)| b_time.cmp(a_time).then_with(|| b.name.cmp(&a.name)));

    Ok(found.into_iter().map(|(_, recording)| recording).collect())
}

fn has_audio_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            extensions.iter().any(|known| known.eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

fn recording_file_name(rng: &mut impl Rng) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    format!("memo_{}_{:08x}.wav", timestamp, rng.random::<u32>())
}
