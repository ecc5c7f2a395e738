use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::ast::Macro;
use crate::config::MacroConfig;
use crate::error::{MacroError, Result};
use crate::parser::{Directive, classify, parse_definition};
use crate::processor::{MacroRegistry, expand_script};

/// Read access to quest-pack files
pub trait QuestResources {
    /// Lines of the file at `path`, relative to the quest-pack root.
    /// Returns `Ok(None)` when the file does not exist.
    fn read_lines(&self, path: &str) -> io::Result<Option<Vec<String>>>;
}

/// Quest-pack files on disk under a fixed root directory
#[derive(Debug, Clone)]
pub struct FsQuestResources {
    root: PathBuf,
}

impl FsQuestResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &MacroConfig) -> Self {
        Self::new(config.quest_pack_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl QuestResources for FsQuestResources {
    fn read_lines(&self, path: &str) -> io::Result<Option<Vec<String>>> {
        let full_path = self.root.join(path);
        if !full_path.is_file() {
            debug!("quest pack file not found: {:?}", full_path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(&full_path)?;
        debug!("read quest pack file {:?}", full_path);
        Ok(Some(content.lines().map(str::to_string).collect()))
    }
}

/// In-memory quest-pack files.
///
/// Serves hosts that keep quest packs in memory, and counts every read so
/// callers can check that repeated imports are served from the session cache.
#[derive(Debug, Default)]
pub struct MemoryQuestResources {
    files: HashMap<String, Vec<String>>,
    reads: AtomicUsize,
}

impl MemoryQuestResources {
    pub fn insert(&mut self, path: &str, lines: &[&str]) {
        let lines = lines.iter().map(|l| l.to_string()).collect();
        self.files.insert(path.to_string(), lines);
    }

    /// Number of `read_lines` calls so far, including misses
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl QuestResources for MemoryQuestResources {
    fn read_lines(&self, path: &str) -> io::Result<Option<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.files.get(path).cloned())
    }
}

/// `(name, file)` of an `import macro <Name> from <File>` directive
pub(crate) fn import_target<'a>(tokens: &[&'a str]) -> Option<(&'a str, &'a str)> {
    match tokens {
        [_, _, name, from, file] if from.eq_ignore_ascii_case("from") => Some((*name, *file)),
        _ => None,
    }
}

/// Cache key; macro names match case-insensitively
fn qualified_name(file: &str, name: &str) -> String {
    format!("{file}::{}", name.to_ascii_lowercase())
}

/// One compilation session: quest-pack access plus the cache of imported macros.
///
/// Imports are cached by file and macro name for the lifetime of the
/// session, misses included. The cache lock is held across lookup, load and
/// insert, so concurrent compilations never parse the same import twice.
pub struct MacroSession<R = FsQuestResources> {
    resources: R,
    cache: Mutex<HashMap<String, Option<Arc<Macro>>>>,
}

impl MacroSession<FsQuestResources> {
    pub fn from_config(config: &MacroConfig) -> Self {
        Self::new(FsQuestResources::from_config(config))
    }
}

impl<R: QuestResources> MacroSession<R> {
    pub fn new(resources: R) -> Self {
        Self {
            resources,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    /// Resolve an `import macro <Name> from <File>` directive.
    ///
    /// Returns `Ok(None)` when the file is missing or does not define the
    /// macro; the caller decides whether that fails compilation.
    pub fn import(&self, line: &str) -> Result<Option<Arc<Macro>>> {
        let target = match classify(line) {
            Directive::Import(tokens) => import_target(&tokens),
            _ => None,
        };
        let Some((name, file)) = target else {
            return Err(MacroError::MalformedImport {
                text: line.trim().to_string(),
            });
        };

        let key = qualified_name(file, name);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            debug!("import cache hit: {key}");
            return Ok(cached.clone());
        }

        debug!("import cache miss: {key}");
        let loaded = self.load(name, file)?;
        cache.insert(key, loaded.clone());
        Ok(loaded)
    }

    fn load(&self, name: &str, file: &str) -> Result<Option<Arc<Macro>>> {
        let Some(lines) = self.resources.read_lines(file)? else {
            return Ok(None);
        };

        let start = lines.iter().position(|line| match classify(line) {
            Directive::Definition(tokens) => tokens
                .get(1)
                .is_some_and(|declared| declared.eq_ignore_ascii_case(name)),
            _ => false,
        });
        let Some(start) = start else {
            return Ok(None);
        };

        let mut scope = MacroRegistry::new();
        let (definition, _) = parse_definition(lines.as_slice(), start, &mut scope).map_err(|e| {
            MacroError::Imported {
                file: file.to_string(),
                source: Box::new(e),
            }
        })?;
        Ok(Some(Arc::new(definition)))
    }

    /// Number of cached imports, misses included
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Expand every macro directive in a quest script block
    pub fn expand_script<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<String>> {
        expand_script(lines, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::resolve_macro;

    fn greet_pack() -> MemoryQuestResources {
        let mut resources = MemoryQuestResources::default();
        resources.insert(
            "common/greet.txt",
            &[
                "-- shared macros",
                "macro Other",
                "other",
                "end macro",
                "macro Greet &name",
                "  macro Line &text",
                "    say &text",
                "  end macro",
                "  greet &name",
                "  macro l1: Line bye",
                "end macro",
            ],
        );
        resources
    }

    #[test]
    fn test_import_and_expand() {
        let session = MacroSession::new(greet_pack());
        let imported = session
            .import("import macro Greet from common/greet.txt")
            .unwrap()
            .unwrap();
        assert_eq!(imported.name(), "Greet");

        let mut registry = MacroRegistry::new();
        registry.define(imported);
        let lines = resolve_macro("macro g: Greet 1001", &registry).unwrap();
        assert_eq!(lines, ["greet 1001", "say bye"]);
    }

    #[test]
    fn test_import_is_cached() {
        let session = MacroSession::new(greet_pack());
        let directive = "import macro Greet from common/greet.txt";

        let first = session.import(directive).unwrap().unwrap();
        let second = session.import(directive).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.resources().reads(), 1);
        assert_eq!(session.cached_len(), 1);
    }

    #[test]
    fn test_import_name_is_case_insensitive() {
        let session = MacroSession::new(greet_pack());
        let lower = session
            .import("import macro greet from common/greet.txt")
            .unwrap()
            .unwrap();
        let exact = session
            .import("import macro Greet from common/greet.txt")
            .unwrap()
            .unwrap();

        assert_eq!(lower.name(), "Greet");
        assert!(Arc::ptr_eq(&lower, &exact));
        assert_eq!(session.resources().reads(), 1);
        assert_eq!(session.cached_len(), 1);
    }

    #[test]
    fn test_concurrent_imports_parse_once() {
        let session = MacroSession::new(greet_pack());
        let directive = "import macro Greet from common/greet.txt";

        let imported: Vec<Arc<Macro>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| session.import(directive).unwrap().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(session.resources().reads(), 1);
        assert!(imported.iter().all(|m| Arc::ptr_eq(m, &imported[0])));
    }

    #[test]
    fn test_import_parse_error_names_file() {
        let mut resources = MemoryQuestResources::default();
        resources.insert("bad.txt", &["intro", "macro Bad", "macro x: Missing", "end macro"]);
        let session = MacroSession::new(resources);

        let err = session.import("import macro Bad from bad.txt").unwrap_err();
        match err {
            MacroError::Imported { file, source } => {
                assert_eq!(file, "bad.txt");
                assert!(matches!(*source, MacroError::UnknownMacro { line: 3, .. }));
            }
            other => panic!("Expected Imported error, got {other:?}"),
        }
    }

    #[test]
    fn test_import_missing_file() {
        let session = MacroSession::new(MemoryQuestResources::default());
        let directive = "import macro Greet from missing.txt";

        assert!(session.import(directive).unwrap().is_none());
        assert!(session.import(directive).unwrap().is_none());
        assert_eq!(session.resources().reads(), 1);
    }

    #[test]
    fn test_import_missing_macro() {
        let session = MacroSession::new(greet_pack());
        assert!(
            session
                .import("import macro Absent from common/greet.txt")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_import_whole_word_name() {
        let mut resources = MemoryQuestResources::default();
        resources.insert("a.txt", &["macro GreetAll", "all", "end macro"]);
        let session = MacroSession::new(resources);
        assert!(session.import("import macro Greet from a.txt").unwrap().is_none());
    }

    #[test]
    fn test_malformed_import() {
        let session = MacroSession::new(greet_pack());
        for line in [
            "import macro Greet",
            "import macro Greet from a.txt extra",
            "import macro Greet in a.txt",
            "macro Greet",
        ] {
            assert!(
                matches!(session.import(line), Err(MacroError::MalformedImport { .. })),
                "{line}"
            );
        }
        assert_eq!(session.resources().reads(), 0);
    }

    #[test]
    fn test_fs_resources() {
        let dir = tempfile::tempdir().unwrap();
        let config = MacroConfig {
            streaming_assets: dir.path().to_path_buf(),
            ..MacroConfig::default()
        };
        let packs = config.quest_pack_root();
        std::fs::create_dir_all(packs.join("shared")).unwrap();
        std::fs::write(
            packs.join("shared/macros.txt"),
            "macro Clear\nclear _$_\nend macro\n",
        )
        .unwrap();

        let session = MacroSession::from_config(&config);
        assert_eq!(session.resources().root(), packs);

        let imported = session
            .import("import macro Clear from shared/macros.txt")
            .unwrap()
            .unwrap();
        assert_eq!(imported.body().unwrap(), ["clear _$_"]);
        assert!(
            session
                .import("import macro Clear from shared/none.txt")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_session_expand_script() {
        let session = MacroSession::new(greet_pack());
        let out = session
            .expand_script(&[
                "import macro Greet from common/greet.txt",
                "macro a: Greet 1",
                "macro b: Greet 2",
            ])
            .unwrap();
        assert_eq!(out, ["greet 1", "say bye", "greet 2", "say bye"]);
        assert_eq!(session.resources().reads(), 1);
    }

    #[test]
    fn test_session_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<MacroSession<FsQuestResources>>();
        assert_sync::<MacroSession<MemoryQuestResources>>();
    }
}
