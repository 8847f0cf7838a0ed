//! Per-device identity.
//!
//! The participant id is generated once and reused for every session this
//! device joins, so rejoining replaces the previous record instead of
//! adding a duplicate.  The last display name is remembered alongside it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use convoy_shared::ParticipantId;

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Identity {
    /// Load the identity stored in `dir`, creating a new one if there is
    /// none or it cannot be read.
    pub fn load_or_create(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(IDENTITY_FILE);

        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str::<Identity>(&raw) {
                Ok(mut identity) => {
                    identity.path = path;
                    return Ok(identity);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable identity, generating a new one");
                }
            }
        }

        let identity = Self {
            participant_id: ParticipantId::generate(),
            display_name: None,
            path,
        };
        identity.save()?;
        tracing::info!(participant = %identity.participant_id, "Created device identity");
        Ok(identity)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = Identity::load_or_create(dir.path()).unwrap();
        assert!(first.participant_id.as_str().starts_with("user_"));

        first.display_name = Some("Asha".into());
        first.save().unwrap();

        let again = Identity::load_or_create(dir.path()).unwrap();
        assert_eq!(again.participant_id, first.participant_id);
        assert_eq!(again.display_name.as_deref(), Some("Asha"));
    }

    #[test]
    fn test_corrupt_identity_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "{ not json").unwrap();

        let identity = Identity::load_or_create(dir.path()).unwrap();
        let reloaded = Identity::load_or_create(dir.path()).unwrap();
        assert_eq!(identity.participant_id, reloaded.participant_id);
    }
}
