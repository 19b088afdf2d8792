// ============================================================
// Layer 4 — Clip Folder Loader
// ============================================================
// Indexes a directory of pre-extracted video frames laid out
// like an ImageFolder, one level deeper:
//
//   root/
//     └── <class>/            ← sorted; position = label
//           └── <clip>/       ← one video
//                 ├── 0001.jpg
//                 ├── 0002.jpg
//                 └── ...     ← sorted by filename = time order
//
// Indexing only lists files; decoding happens lazily in
// load() so a large dataset never sits in memory at once.
//
// A clip longer than the grid needs is subsampled at a uniform
// temporal stride. Clips that are too short are skipped with
// a warning rather than padded.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::ClipTransform;
use crate::domain::clip::VideoClip;
use crate::domain::traits::ClipSource;
use crate::error::{PretrainError, PretrainResult};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Location and label of one indexed clip
#[derive(Debug, Clone)]
pub struct ClipEntry {
    pub dir:    PathBuf,
    pub label:  usize,
    /// Exactly `frames_per_clip` paths, in temporal order
    pub frames: Vec<PathBuf>,
}

pub struct ClipFolder {
    classes:   Vec<String>,
    entries:   Vec<ClipEntry>,
    transform: ClipTransform,
}

impl ClipFolder {
    /// Walk `root` and index every clip with at least `frames_per_clip` frames.
    pub fn open(
        root:            impl AsRef<Path>,
        frames_per_clip: usize,
        transform:       ClipTransform,
    ) -> PretrainResult<Self> {
        let root = root.as_ref().to_path_buf();
        let classes = sorted_subdirs(&root)?;

        let mut entries = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            for clip_dir in sorted_subdirs(&root.join(class))? {
                let dir = root.join(class).join(&clip_dir);
                let all = sorted_frames(&dir)?;
                if all.len() < frames_per_clip {
                    tracing::warn!(
                        "Skipping '{}': {} frames, need {}",
                        dir.display(), all.len(), frames_per_clip
                    );
                    continue;
                }
                let frames = uniform_indices(all.len(), frames_per_clip)
                    .into_iter()
                    .map(|i| all[i].clone())
                    .collect();
                entries.push(ClipEntry { dir, label, frames });
            }
        }

        tracing::info!(
            "Indexed {} clips in {} classes under '{}'",
            entries.len(), classes.len(), root.display()
        );
        Ok(Self { classes, entries, transform })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }
}

impl ClipSource for ClipFolder {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn load(&self, index: usize) -> PretrainResult<VideoClip> {
        let entry = self.entries.get(index).ok_or_else(|| {
            PretrainError::InvalidConfig(format!("clip {index} out of range"))
        })?;

        let mut rng = rand::thread_rng();
        let mut params = None;
        let size = self.transform.frame_size as usize;
        let mut pixels = Vec::with_capacity(entry.frames.len() * 3 * size * size);

        for path in &entry.frames {
            let frame = image::open(path)
                .map_err(|e| PretrainError::image(path, e))?
                .to_rgb8();
            // sample the crop from the first frame, reuse it for the rest
            let p = *params.get_or_insert_with(|| {
                self.transform.sample_params(frame.width(), frame.height(), &mut rng)
            });
            pixels.extend(self.transform.apply(&frame, &p));
        }

        let source = entry.dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(VideoClip::new(source, entry.label, entry.frames.len(), 3, size, size, pixels))
    }
}

/// `count` indices spread evenly over `0..len` (len >= count)
pub fn uniform_indices(len: usize, count: usize) -> Vec<usize> {
    (0..count).map(|i| i * len / count).collect()
}

fn sorted_subdirs(dir: &Path) -> PretrainResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PretrainError::io(dir, e))? {
        let entry = entry.map_err(|e| PretrainError::io(dir, e))?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn sorted_frames(dir: &Path) -> PretrainResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PretrainError::io(dir, e))? {
        let path = entry.map_err(|e| PretrainError::io(dir, e))?.path();
        let is_frame = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_clip(dir: &Path, frames: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..frames {
            let img = RgbImage::from_pixel(12, 10, Rgb([(i * 10) as u8, 0, 0]));
            img.save(dir.join(format!("{i:04}.png"))).unwrap();
        }
    }

    #[test]
    fn test_uniform_indices_cover_the_clip() {
        assert_eq!(uniform_indices(16, 16), (0..16).collect::<Vec<_>>());
        assert_eq!(uniform_indices(32, 4), vec![0, 8, 16, 24]);
        assert_eq!(uniform_indices(5, 2), vec![0, 2]);
    }

    #[test]
    fn test_indexes_classes_and_skips_short_clips() {
        let tmp = tempfile::tempdir().unwrap();
        write_clip(&tmp.path().join("b_class/clip1"), 4);
        write_clip(&tmp.path().join("a_class/clip1"), 8);
        write_clip(&tmp.path().join("a_class/short"), 2);

        let folder = ClipFolder::open(tmp.path(), 4, ClipTransform::eval(6)).unwrap();
        assert_eq!(folder.classes(), &["a_class".to_string(), "b_class".to_string()]);
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.entries()[0].label, 0);
        assert_eq!(folder.entries()[1].label, 1);
        // 8 frames subsampled to 4 at stride 2
        let names: Vec<_> = folder.entries()[0].frames.iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["0000.png", "0002.png", "0004.png", "0006.png"]);
    }

    #[test]
    fn test_load_decodes_frames_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_clip(&tmp.path().join("only/clip"), 4);

        let folder = ClipFolder::open(tmp.path(), 4, ClipTransform::eval(6)).unwrap();
        let clip = folder.load(0).unwrap();
        assert_eq!(clip.dims(), [4, 3, 6, 6]);
        assert_eq!(clip.source, "clip");
        // red channel grows with the frame index
        assert!(clip.frame(3)[0] > clip.frame(0)[0]);
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let err = ClipFolder::open("/definitely/not/here", 16, ClipTransform::eval(8));
        assert!(matches!(err, Err(PretrainError::Io { .. })));
    }
}
