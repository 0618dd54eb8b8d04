// =============================================================================
// output.rs — THE THREE FILES
// =============================================================================
//
// latest.yaml  the mapping of the three kept buckets, published keys
// url.txt      every candidate that passed the keyword policy, one per line
// v2ray.txt    inline proxy links from the channel pages, one per line
//
// Every file is rewritten from scratch on each run. Each entry is followed by
// exactly one newline, so an empty list gives an empty file. The output
// directory is created if it is not there yet.
// =============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Candidate, CollectedData};

pub const LATEST_FILE: &str = "latest.yaml";
pub const URL_LIST_FILE: &str = "url.txt";
pub const INLINE_LINKS_FILE: &str = "v2ray.txt";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error on {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Write all three artifacts. Stops at the first failure.
    pub fn write_all(
        &self,
        collected: &CollectedData,
        candidates: &[Candidate],
        inline_links: &[String],
    ) -> Result<(), OutputError> {
        fs::create_dir_all(&self.dir).map_err(|source| OutputError::Io {
            path: self.dir.clone(),
            source,
        })?;

        self.write_latest(collected)?;
        self.write_lines(URL_LIST_FILE, candidates.iter().map(Candidate::as_str))?;
        self.write_lines(INLINE_LINKS_FILE, inline_links.iter().map(String::as_str))?;

        info!(
            dir = %self.dir.display(),
            subscriptions = collected.subscriptions.len(),
            clash = collected.clash.len(),
            v2 = collected.v2.len(),
            candidates = candidates.len(),
            inline_links = inline_links.len(),
            "Artifacts written"
        );
        Ok(())
    }

    fn write_latest(&self, collected: &CollectedData) -> Result<(), OutputError> {
        let path = self.path_of(LATEST_FILE);
        let yaml = serde_yaml::to_string(collected).map_err(|source| OutputError::Yaml {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, yaml).map_err(|source| OutputError::Io { path, source })
    }

    fn write_lines<'a, I>(&self, file: &str, lines: I) -> Result<(), OutputError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let path = self.path_of(file);
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(&path, contents).map_err(|source| OutputError::Io { path, source })
    }

    /// The previous run's latest.yaml, if there is one.
    ///
    /// A missing file is `Ok(None)`. A file that exists but does not parse is
    /// an error; the caller decides whether that matters.
    pub fn load_previous(&self) -> Result<Option<CollectedData>, OutputError> {
        let path = self.path_of(LATEST_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(OutputError::Io { path, source }),
        };

        if raw.trim().is_empty() {
            warn!(path = %path.display(), "Previous results file is empty");
            return Ok(Some(CollectedData::default()));
        }

        serde_yaml::from_str(&raw)
            .map(Some)
            .map_err(|source| OutputError::Yaml { path, source })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
