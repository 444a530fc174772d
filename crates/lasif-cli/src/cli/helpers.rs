use super::CliError;
use anyhow::Context;
use globset::{Glob, GlobSetBuilder};
use lasif_core::domain::{Iteration, LasifError, ProjectConfig};
use lasif_core::sources::JsonProjectArchive;
use std::fmt::Display;
use std::io::Write;
use std::path::Path;

pub(super) struct ProjectContext {
    pub(super) config: ProjectConfig,
    pub(super) archive: JsonProjectArchive,
}

impl ProjectContext {
    pub(super) fn load(root: &Path) -> Result<Self, CliError> {
        let config = ProjectConfig::load(root)?;
        let archive = JsonProjectArchive::new(&config.paths);
        Ok(Self { config, archive })
    }

    pub(super) fn iteration(&self, name: &str) -> Result<Iteration, CliError> {
        Ok(self.archive.load_iteration(name)?)
    }
}

pub(super) fn emit(line: impl Display) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line).context("failed to write to stdout")?;
    Ok(())
}

/// Events of `iteration` matching any of `patterns`, sorted; every event when
/// no pattern is given.
pub(super) fn select_events(
    iteration: &Iteration,
    patterns: &[String],
) -> Result<Vec<String>, CliError> {
    if patterns.is_empty() {
        return Ok(iteration.events.keys().cloned().collect());
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|error| {
            CliError::Usage(format!("invalid event pattern '{}': {}", pattern, error))
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|error| CliError::Usage(format!("invalid event patterns: {}", error)))?;

    let selected: Vec<String> = iteration
        .events
        .keys()
        .filter(|name| set.is_match(name.as_str()))
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(CliError::Workflow(LasifError::not_found(
            "DATA.EVENT_SELECTION",
            format!(
                "no event of iteration '{}' matches {}",
                iteration.name,
                patterns.join(", ")
            ),
        )));
    }
    Ok(selected)
}
