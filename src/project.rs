use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::{
    audio::Waveform,
    document::{Document, DocumentError},
    timing::Tempo,
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to access project file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to write project file: {0}")]
    Serialize(#[from] ron::Error),
    #[error("invalid item in project: {0}")]
    Invalid(#[from] DocumentError),
    #[error("tempo {0} BPM is below the minimum of {min} BPM", min = Tempo::MIN_BPM)]
    TempoTooSlow(u32),
}

/// A melody saved to disk together with how it should be played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub tempo: Tempo,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub loop_enabled: bool,
    pub items: Document,
}

impl Project {
    pub fn new(name: impl Into<String>, items: Document) -> Self {
        Self {
            name: name.into(),
            tempo: Tempo::default(),
            waveform: Waveform::default(),
            loop_enabled: false,
            items,
        }
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.tempo.bpm() < Tempo::MIN_BPM {
            return Err(ProjectError::TempoTooSlow(self.tempo.bpm()));
        }
        self.items.validate()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        tracing::debug!("saved project to {}", path.display());

        Ok(())
    }

    /// Reads and validates a project. Items are checked the same way the
    /// editing operations check them.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let ron_string = fs::read_to_string(path)?;
        let project: Project = ron::from_str(&ron_string)?;
        project.validate()?;

        tracing::debug!(
            items = project.items.len(),
            "loaded project {:?} from {}",
            project.name,
            path.display()
        );
        Ok(project)
    }
}
