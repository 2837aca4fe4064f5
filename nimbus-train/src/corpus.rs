//! Training corpus discovery
//!
//! Two layouts are supported: RAVDESS (`<dir>/<actor>/*.wav`, emotion
//! encoded in the file name) and one sub-directory per label.

use nimbus_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// RAVDESS emotion codes (third dash-separated field of the file name)
pub const RAVDESS_EMOTIONS: [(&str, &str); 8] = [
    ("01", "neutral"),
    ("02", "calm"),
    ("03", "happy"),
    ("04", "sad"),
    ("05", "angry"),
    ("06", "fearful"),
    ("07", "disgust"),
    ("08", "surprised"),
];

/// Audio file extensions accepted in per-label folders
const FOLDER_EXTENSIONS: [&str; 2] = ["wav", "mp3"];

/// One audio file and its label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledClip {
    pub path: PathBuf,
    pub label: String,
}

/// Emotion encoded in a RAVDESS file name, e.g. `03-01-05-01-02-01-12.wav`
pub fn ravdess_emotion(file_name: &str) -> Option<&'static str> {
    let code = file_name.split('-').nth(2)?;
    RAVDESS_EMOTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, emotion)| *emotion)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| Error::InvalidInput(format!("Cannot read {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Scan a RAVDESS directory (`<dir>/<actor>/*.wav`)
///
/// Files whose name does not carry a known emotion code are skipped.
pub fn scan_ravdess(data_dir: &Path) -> Result<Vec<LabeledClip>> {
    let mut clips = Vec::new();

    for actor_dir in sorted_entries(data_dir)? {
        if !actor_dir.is_dir() {
            continue;
        }
        debug!("Scanning {}", actor_dir.display());

        for path in sorted_entries(&actor_dir)? {
            if !path.is_file() || !has_extension(&path, &["wav"]) {
                continue;
            }
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match ravdess_emotion(file_name) {
                Some(emotion) => clips.push(LabeledClip {
                    path: path.clone(),
                    label: emotion.to_string(),
                }),
                None => warn!("Skipping {}: no RAVDESS emotion code", path.display()),
            }
        }
    }

    info!("Found {} RAVDESS clips in {}", clips.len(), data_dir.display());
    Ok(clips)
}

/// Scan a directory with one sub-directory per label
///
/// With `emotions` set only those folders are used; missing ones are
/// skipped with a warning. Otherwise every sub-directory is a label.
pub fn scan_folders(data_dir: &Path, emotions: Option<&[String]>) -> Result<Vec<LabeledClip>> {
    let label_dirs: Vec<(String, PathBuf)> = match emotions {
        Some(list) => list
            .iter()
            .map(|label| (label.clone(), data_dir.join(label)))
            .collect(),
        None => sorted_entries(data_dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                let label = p.file_name()?.to_str()?.to_string();
                Some((label, p))
            })
            .collect(),
    };

    let mut clips = Vec::new();
    for (label, dir) in label_dirs {
        if !dir.is_dir() {
            warn!("Skipping {}: not a directory", dir.display());
            continue;
        }

        let before = clips.len();
        for path in sorted_entries(&dir)? {
            if path.is_file() && has_extension(&path, &FOLDER_EXTENSIONS) {
                clips.push(LabeledClip {
                    path,
                    label: label.clone(),
                });
            }
        }
        debug!("{}: {} clips", label, clips.len() - before);
    }

    info!("Found {} labeled clips in {}", clips.len(), data_dir.display());
    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_ravdess_emotion_codes() {
        assert_eq!(ravdess_emotion("03-01-05-01-02-01-12.wav"), Some("angry"));
        assert_eq!(ravdess_emotion("03-01-01-01-01-01-01.wav"), Some("neutral"));
        assert_eq!(ravdess_emotion("03-01-08-02-02-02-24.wav"), Some("surprised"));
        assert_eq!(ravdess_emotion("03-01-09-01-01-01-01.wav"), None);
        assert_eq!(ravdess_emotion("recording.wav"), None);
    }

    #[test]
    fn test_scan_ravdess() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Actor_01/03-01-03-01-01-01-01.wav"));
        touch(&dir.path().join("Actor_01/03-01-04-01-01-01-01.wav"));
        touch(&dir.path().join("Actor_02/03-01-03-02-01-01-02.wav"));
        touch(&dir.path().join("Actor_02/notes.txt"));
        touch(&dir.path().join("Actor_02/badname.wav"));
        touch(&dir.path().join("readme.md"));

        let clips = scan_ravdess(dir.path()).unwrap();
        let labels: Vec<&str> = clips.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["happy", "sad", "happy"]);
    }

    #[test]
    fn test_scan_folders_all_and_selected() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("happy/a.wav"));
        touch(&dir.path().join("happy/b.MP3"));
        touch(&dir.path().join("sad/c.wav"));
        touch(&dir.path().join("sad/c.txt"));
        touch(&dir.path().join("stray.wav"));

        let clips = scan_folders(dir.path(), None).unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0].label, "happy");
        assert_eq!(clips[2].label, "sad");

        let selected = vec!["sad".to_string(), "missing".to_string()];
        let clips = scan_folders(dir.path(), Some(&selected)).unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].label, "sad");
    }

    #[test]
    fn test_missing_directory_is_error() {
        assert!(scan_ravdess(Path::new("/nonexistent/nimbus-corpus")).is_err());
    }
}
