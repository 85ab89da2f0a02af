use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use super::ContentResolver;
use crate::error::PrimitiveError;

/// In-memory content keys, mostly useful for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSources {
    sources: HashMap<String, String>,
}

impl StaticSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script under `key`, replacing any previous one.
    pub fn with(mut self, key: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(key, source);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(key.into(), source.into());
    }
}

impl ContentResolver for StaticSources {
    fn resolve_content_key(&self, key: &str) -> Result<String, PrimitiveError> {
        self.sources
            .get(key)
            .cloned()
            .ok_or_else(|| PrimitiveError::UnknownContentKey(key.to_string()))
    }
}

/// Content keys are relative paths below a root directory.
///
/// Keys that are absolute or climb out of the root are rejected.
#[derive(Debug, Clone)]
pub struct DirectorySources {
    root: PathBuf,
}

impl DirectorySources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PrimitiveError> {
        let relative = Path::new(key);

        let contained = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if !contained {
            return Err(PrimitiveError::MalformedInput(format!(
                "content key '{}' is not a relative path",
                key
            )));
        }

        Ok(self.root.join(relative))
    }
}

impl ContentResolver for DirectorySources {
    fn resolve_content_key(&self, key: &str) -> Result<String, PrimitiveError> {
        let path = self.path_for(key)?;

        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PrimitiveError::UnknownContentKey(key.to_string()),
            _ => PrimitiveError::Unavailable(format!("{}: {}", path.display(), e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_sources() {
        let sources = StaticSources::new().with("main", "postMessage(1)");

        assert_eq!(sources.resolve_content_key("main").unwrap(), "postMessage(1)");
        assert_eq!(
            sources.resolve_content_key("other").unwrap_err(),
            PrimitiveError::UnknownContentKey("other".to_string())
        );
    }

    #[test]
    fn test_directory_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/util.js"), "var util = 1;").unwrap();

        let sources = DirectorySources::new(dir.path());

        assert_eq!(
            sources.resolve_content_key("lib/util.js").unwrap(),
            "var util = 1;"
        );
        assert!(matches!(
            sources.resolve_content_key("lib/missing.js"),
            Err(PrimitiveError::UnknownContentKey(_))
        ));
    }

    #[test]
    fn test_directory_sources_stay_below_root() {
        let sources = DirectorySources::new("/srv/scripts");

        for key in ["../secret.js", "lib/../../secret.js", "/etc/passwd", ""] {
            assert!(
                matches!(
                    sources.resolve_content_key(key),
                    Err(PrimitiveError::MalformedInput(_))
                ),
                "{} should be rejected",
                key
            );
        }
    }
}
