use base64::Engine;
use sentinel_core::llm::MediaPayload;
use sentinel_core::scanner::FrameSource;
use std::path::PathBuf;
use tracing::debug;

/// Camera feed backed by a snapshot file that a grabber overwrites in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotFeed {
    pub name: String,
    pub location: String,
    pub snapshot: PathBuf,
}

impl SnapshotFeed {
    /// Parses `name|location|path` entries separated by `;`.
    pub fn parse_list(value: &str) -> Vec<SnapshotFeed> {
        value
            .split(';')
            .filter_map(|entry| {
                let mut parts = entry.split('|').map(str::trim);
                let name = parts.next().filter(|s| !s.is_empty())?;
                let location = parts.next().filter(|s| !s.is_empty())?;
                let snapshot = parts.next().filter(|s| !s.is_empty())?;
                Some(SnapshotFeed {
                    name: name.to_string(),
                    location: location.to_string(),
                    snapshot: PathBuf::from(snapshot),
                })
            })
            .collect()
    }

    fn mime_type(&self) -> Option<&'static str> {
        let ext = self.snapshot.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            _ => None,
        }
    }
}

impl FrameSource for SnapshotFeed {
    fn feed_name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn capture(&self) -> Option<MediaPayload> {
        let mime_type = self.mime_type()?;
        let bytes = match std::fs::read(&self.snapshot) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(err) => {
                debug!(feed = %self.name, error = %err, "snapshot unavailable");
                return None;
            }
        };
        Some(MediaPayload {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }
}
