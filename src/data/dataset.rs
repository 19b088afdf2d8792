use burn::data::dataset::Dataset;

use crate::domain::clip::VideoClip;
use crate::domain::traits::ClipSource;

/// Burn dataset over any [`ClipSource`].
///
/// Burn's iterator ends at the first `None`, so a clip that fails
/// to decode is replaced by the next one that does (wrapping
/// around). `None` comes back only past the end or when no clip
/// in the source decodes at all.
pub struct ClipDataset {
    source: Box<dyn ClipSource>,
}

impl ClipDataset {
    pub fn new(source: impl ClipSource + 'static) -> Self {
        Self { source: Box::new(source) }
    }

    pub fn from_boxed(source: Box<dyn ClipSource>) -> Self {
        Self { source }
    }

    pub fn clip_count(&self) -> usize { self.source.len() }
}

impl Dataset<VideoClip> for ClipDataset {
    fn get(&self, index: usize) -> Option<VideoClip> {
        let len = self.source.len();
        if index >= len {
            return None;
        }
        for offset in 0..len {
            let candidate = (index + offset) % len;
            match self.source.load(candidate) {
                Ok(clip) => {
                    if offset > 0 {
                        tracing::warn!("Clip {index} unreadable, substituted clip {candidate}");
                    }
                    return Some(clip);
                }
                Err(e) => tracing::warn!("Cannot load clip {candidate}: {e}"),
            }
        }
        tracing::error!("No clip in the dataset could be loaded");
        None
    }

    fn len(&self) -> usize {
        self.source.len()
    }
}
