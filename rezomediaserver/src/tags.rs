//! Tag extraction seam.
//!
//! The server only depends on the [`TagReader`] contract; the default
//! implementation reads tags with lofty in a blocking task.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::{config::ParseOptions, prelude::*, probe::Probe};

use crate::errors::ServeError;

/// Structured audio metadata for one file.
#[derive(Debug, Clone, Default)]
pub struct AudioTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_secs: Option<u32>,
}

/// Collaborator contract: takes a file path, returns structured metadata.
#[async_trait]
pub trait TagReader: Send + Sync {
    async fn read_tags(&self, path: &Path) -> Result<AudioTags, ServeError>;
}

/// Default reader backed by lofty.
#[derive(Debug, Default)]
pub struct LoftyTagReader;

#[async_trait]
impl TagReader for LoftyTagReader {
    async fn read_tags(&self, path: &Path) -> Result<AudioTags, ServeError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_tags_blocking(&path))
            .await
            .map_err(|err| ServeError::Tag(format!("tag task failed: {err}")))?
    }
}

fn read_tags_blocking(path: &Path) -> Result<AudioTags, ServeError> {
    let tagged = Probe::open(path)
        .and_then(|probe| probe.options(ParseOptions::new()).read())
        .map_err(|err| ServeError::Tag(format!("{}: {}", path.display(), err)))?;

    let duration = tagged.properties().duration().as_secs();
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    Ok(AudioTags {
        title: tag.and_then(|t| t.title().map(|s| s.into_owned())),
        artist: tag.and_then(|t| t.artist().map(|s| s.into_owned())),
        album: tag.and_then(|t| t.album().map(|s| s.into_owned())),
        track_number: tag.and_then(|t| t.track()),
        disc_number: tag.and_then(|t| t.disk()),
        duration_secs: (duration > 0).then_some(duration as u32),
    })
}
