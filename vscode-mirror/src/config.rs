use std::collections::BTreeSet;
use std::path::Path;

use crate::error::MirrorError;
use crate::inventory::{self, Sections};

static EMPTY: BTreeSet<String> = BTreeSet::new();

/// Wanted extension identifiers, grouped in named sections.
///
/// The reserved `all_extensions` section always holds the union of every
/// source: config file sections, positional arguments and, on request, the
/// locally installed editor. Identifiers from the command line and the local
/// editor keep their original case, the gallery accepts either.
pub struct Config {
    pub sections: Sections,
}

impl Config {
    pub async fn load(
        config_file: Option<&Path>,
        extension_ids: &[String],
        use_local: bool,
    ) -> Result<Self, MirrorError> {
        let mut sections = match config_file {
            Some(file) => match tokio::fs::read_to_string(file).await {
                Ok(content) => inventory::parse_sections(&content),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Sections::new(),
                Err(err) => return Err(err.into()),
            },
            None => Sections::new(),
        };

        let mut all: BTreeSet<String> = extension_ids.iter().cloned().collect();

        if use_local {
            all.extend(installed_extensions().await?);
        }

        for entries in sections.values() {
            all.extend(entries.iter().cloned());
        }

        sections.insert("all_extensions".to_owned(), all);

        Ok(Self { sections })
    }

    /// Every identifier the run should mirror.
    pub fn all_extensions(&self) -> &BTreeSet<String> {
        self.sections.get("all_extensions").unwrap_or(&EMPTY)
    }
}

/// Identifiers reported by the locally installed editor.
pub async fn installed_extensions() -> Result<Vec<String>, MirrorError> {
    let output = tokio::process::Command::new("code")
        .arg("--list-extensions")
        .output()
        .await?;

    if !output.status.success() {
        return Err(MirrorError::CommandFailed {
            command: "code --list-extensions".to_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .map(str::to_owned)
        .collect())
}
