//! Filesystem-to-DIDL mapping for the local content directory.
//!
//! Object ids are slash-delimited relative paths under the storage root.
//! Subdirectories become containers, files with recognized audio
//! extensions become items, everything else is omitted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};

use rezodidl::{CLASS_MUSIC_TRACK, CLASS_STORAGE_FOLDER, Container, DIDLLite, Item, Resource};

use crate::errors::ServeError;
use crate::tags::{AudioTags, TagReader};

/// Extensions served as audio items.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "opus", "m4a", "aac", "wav", "aiff", "wma",
];

/// Characters kept verbatim in resource URL path segments.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Maps ContentDirectory browse requests onto the storage root.
pub struct ContentHandler {
    root: PathBuf,
    tags: Arc<dyn TagReader>,
}

impl ContentHandler {
    pub fn new(root: PathBuf, tags: Arc<dyn TagReader>) -> Self {
        Self { root, tags }
    }

    /// Metadata browse: one self-describing container record for the id.
    pub fn browse_metadata(&self, object_id: &str) -> Result<DIDLLite, ServeError> {
        let relative = normalize_object_id(object_id)?;

        let (id, parent, title) = if relative.is_empty() {
            ("0".to_string(), "-1".to_string(), "Music".to_string())
        } else {
            let title = relative
                .rsplit('/')
                .next()
                .unwrap_or(relative.as_str())
                .to_string();
            let parent = match relative.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None => "0".to_string(),
            };
            (relative.clone(), parent, title)
        };

        let mut didl = DIDLLite::empty();
        didl.containers.push(Container {
            id,
            parent_id: parent,
            restricted: Some("1".to_string()),
            child_count: None,
            title,
            class: CLASS_STORAGE_FOLDER.to_string(),
        });
        Ok(didl)
    }

    /// Direct-children browse of a directory under the storage root.
    ///
    /// `host` is the observed requesting host (including port), used to
    /// build resource URLs that resolve for multi-homed or proxied access.
    pub async fn browse_children(
        &self,
        object_id: &str,
        host: &str,
    ) -> Result<DIDLLite, ServeError> {
        let relative = normalize_object_id(object_id)?;
        let directory = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&relative)
        };

        if !directory.is_dir() {
            return Err(ServeError::NotFound(object_id.to_string()));
        }

        let mut names: Vec<(String, bool)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "Skipping non-UTF-8 name");
                continue;
            };
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            names.push((name, file_type.is_dir()));
        }
        // Directory order is OS-dependent; listings are sorted by name.
        names.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

        let mut didl = DIDLLite::empty();
        let parent_id = if relative.is_empty() { "0" } else { &relative };

        for (name, is_dir) in names {
            let child_id = if relative.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", relative, name)
            };

            if is_dir {
                didl.containers.push(Container {
                    id: child_id,
                    parent_id: parent_id.to_string(),
                    restricted: Some("1".to_string()),
                    child_count: None,
                    title: name,
                    class: CLASS_STORAGE_FOLDER.to_string(),
                });
                continue;
            }

            let Some(extension) = extension_of(&name) else {
                continue;
            };
            if !AUDIO_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }

            let path = directory.join(&name);
            // Metadata failure never hides a file: fall back to a
            // filename-derived title and empty fields.
            let tags = match self.tags.read_tags(&path).await {
                Ok(tags) => tags,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Tag extraction failed; using fallback metadata");
                    AudioTags::default()
                }
            };

            didl.items
                .push(self.item_for(&child_id, parent_id, &name, &extension, tags, host));
        }

        Ok(didl)
    }

    fn item_for(
        &self,
        id: &str,
        parent_id: &str,
        file_name: &str,
        extension: &str,
        tags: AudioTags,
        host: &str,
    ) -> Item {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let title = tags
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| stem.to_string());

        // Every path segment is percent-encoded independently.
        let encoded_path = id
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!("http://{}/media/{}", host, encoded_path);

        Item {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            restricted: Some("1".to_string()),
            title,
            class: CLASS_MUSIC_TRACK.to_string(),
            artist: tags.artist,
            creator: None,
            album: tags.album,
            genre: None,
            date: None,
            original_track_number: tags.track_number.map(|n| n.to_string()),
            original_disc_number: tags.disc_number.map(|n| n.to_string()),
            duration: None,
            resources: vec![Resource {
                protocol_info: format!("http-get:*:{}:*", mime_for(extension)),
                duration: tags.duration_secs.map(format_hhmmss),
                size: None,
                url,
            }],
        }
    }

    /// Resolves an object id to a file path for the streaming route.
    pub fn resolve_file(&self, object_id: &str) -> Result<PathBuf, ServeError> {
        let relative = normalize_object_id(object_id)?;
        if relative.is_empty() {
            return Err(ServeError::InvalidObjectId(object_id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Normalizes an object id to a clean relative path: separators become
/// forward slashes, the root aliases ("", "0") become empty, and dot or
/// empty segments are rejected.
pub fn normalize_object_id(object_id: &str) -> Result<String, ServeError> {
    let normalized = object_id.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');

    if trimmed.is_empty() || trimmed == "0" {
        return Ok(String::new());
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ServeError::InvalidObjectId(object_id.to_string()));
        }
        segments.push(segment);
    }

    Ok(segments.join("/"))
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub(crate) fn mime_for(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "aiff" => "audio/aiff",
        "wma" => "audio/x-ms-wma",
        _ => "application/octet-stream",
    }
}

pub(crate) fn format_hhmmss(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, secs)
}
