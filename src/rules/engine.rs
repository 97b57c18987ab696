//! Rule matching and hot reload
//!
//! `RuleSet` is an immutable, fully parsed snapshot. `RuleEngine` owns the
//! active snapshot and swaps it only after a changed rule file parses cleanly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

use super::normalize::{normalize_basic, normalize_compact};
use super::schema::RuleFile;
use crate::error::{ProxyError, Result};
use crate::logger::log;

/// A trigger phrase with its normalized forms computed once at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub phrase: String,
    basic: String,
    compact: String,
}

impl Trigger {
    pub fn new(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        Self {
            basic: normalize_basic(&phrase),
            compact: normalize_compact(&phrase),
            phrase,
        }
    }

    /// Compact form first, then basic form; empty forms never match.
    fn matches(&self, basic: &str, compact: &str) -> bool {
        (!self.compact.is_empty() && compact.contains(&self.compact))
            || (!self.basic.is_empty() && basic.contains(&self.basic))
    }
}

/// Ordered trigger phrases and the text that replaces a matching transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub triggers: Vec<Trigger>,
    pub replacement: String,
}

impl Rule {
    pub fn new<I, S>(triggers: I, replacement: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            triggers: triggers.into_iter().map(Trigger::new).collect(),
            replacement: replacement.into(),
        }
    }
}

/// Fully parsed rules in file order, tagged with the file's modification time
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    modified: Option<SystemTime>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            modified: None,
        }
    }

    /// Build from a parsed document. Entries with an empty or missing `set` are dropped.
    pub fn from_file(file: RuleFile, modified: Option<SystemTime>) -> Self {
        let rules = file
            .rules
            .into_iter()
            .filter_map(|entry| match entry.set {
                Some(set) if !set.is_empty() => Some(Rule::new(entry.any, set)),
                _ => None,
            })
            .collect();
        Self { rules, modified }
    }

    /// Read and parse a rule file
    pub async fn read(path: &Path) -> Result<Self> {
        let modified = tokio::fs::metadata(path).await?.modified().ok();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProxyError::RuleFile(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let file = RuleFile::from_yaml(&content).map_err(|e| {
            ProxyError::RuleFile(format!("failed to parse '{}': {}", path.display(), e))
        })?;
        Ok(Self::from_file(file, modified))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Return the replacement of the first matching rule/trigger pair, or the
    /// basic-normalized input when nothing matches.
    pub fn apply(&self, text: &str) -> String {
        let basic = normalize_basic(text);
        let compact = normalize_compact(text);

        self.rules
            .iter()
            .find(|rule| rule.triggers.iter().any(|t| t.matches(&basic, &compact)))
            .map(|rule| rule.replacement.clone())
            .unwrap_or(basic)
    }
}

/// Active snapshot plus the modification time it was parsed from
struct EngineState {
    rules: Arc<RuleSet>,
    /// mtime of the last successful parse; `None` until the file has loaded once
    loaded_mtime: Option<SystemTime>,
}

/// Owner of the active rule set with change-aware reload
pub struct RuleEngine {
    path: PathBuf,
    state: RwLock<EngineState>,
}

impl RuleEngine {
    /// Load the rule file for the first time.
    ///
    /// Never fails: a missing or invalid file leaves the engine with an empty
    /// rule set, which makes the proxy a normalizing pass-through.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let engine = Self::with_rules(path, RuleSet::default());
        let mut state = engine.state.write().await;

        match tokio::fs::metadata(&engine.path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!(path = %engine.path.display(), "Rules file not found");
            }
            _ => engine.reload_locked(&mut state).await,
        }

        drop(state);
        engine
    }

    /// Build an engine around an in-memory rule set without touching the file
    pub fn with_rules(path: impl Into<PathBuf>, rules: RuleSet) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(EngineState {
                rules: Arc::new(rules),
                loaded_mtime: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot without checking the file
    pub async fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.state.read().await.rules)
    }

    /// Re-parse the rule file if its mtime differs from the last successful load,
    /// then return the active snapshot.
    ///
    /// A missing file counts as "no change". Cheap enough to call per transcript:
    /// the common path is one `stat` and a read lock.
    pub async fn reload_if_changed(&self) -> Arc<RuleSet> {
        let Some(mtime) = self.file_mtime().await else {
            return self.current().await;
        };

        {
            let state = self.state.read().await;
            if state.loaded_mtime == Some(mtime) {
                return Arc::clone(&state.rules);
            }
        }

        let mut state = self.state.write().await;
        // another connection may have reloaded while we waited for the lock
        if state.loaded_mtime != Some(mtime) {
            self.reload_locked(&mut state).await;
        }
        Arc::clone(&state.rules)
    }

    /// Convenience: match against the current snapshot
    pub async fn apply(&self, text: &str) -> String {
        self.current().await.apply(text)
    }

    async fn file_mtime(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
    }

    async fn reload_locked(&self, state: &mut EngineState) {
        let never_loaded = state.loaded_mtime.is_none();

        match RuleSet::read(&self.path).await {
            Ok(rules) => {
                log::info!(
                    count = rules.len(),
                    path = %self.path.display(),
                    "Rules reloaded"
                );
                state.loaded_mtime = rules.modified();
                state.rules = Arc::new(rules);
            }
            Err(e) if never_loaded => {
                log::error!(path = %self.path.display(), error = %e, "Failed to load rules");
            }
            Err(e) => {
                log::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to reload rules, keeping previous set"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn light_rules() -> RuleSet {
        RuleSet::new(vec![Rule::new(["turn off light"], "LIGHT_OFF")])
    }

    /// Rewrite the file and push its mtime forward so the change is always visible
    fn rewrite(file: &NamedTempFile, content: &str, bump_secs: u64) {
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.path())
            .unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(bump_secs))
            .unwrap();
    }

    #[test]
    fn test_apply_compact_match() {
        let rules = light_rules();
        assert_eq!(rules.apply("turn, off   light!"), "LIGHT_OFF");
        assert_eq!(rules.apply("please TURN OFF the light"), "please TURN OFF the light");
        assert_eq!(rules.apply("Turn off light now"), "LIGHT_OFF");
    }

    #[test]
    fn test_apply_no_match_returns_basic() {
        let rules = light_rules();
        assert_eq!(rules.apply("  what time is it?  "), "what time is it");
    }

    #[test]
    fn test_apply_empty_ruleset_is_basic_normalization() {
        let rules = RuleSet::default();
        for s in ["", "  hi  ", "a, b. c", "전등 꺼!", "x?!"] {
            assert_eq!(rules.apply(s), normalize_basic(s));
        }
    }

    #[test]
    fn test_apply_first_rule_wins() {
        let rules = RuleSet::new(vec![
            Rule::new(["light"], "FIRST"),
            Rule::new(["turn off light"], "SECOND"),
        ]);
        assert_eq!(rules.apply("turn off light"), "FIRST");

        let reversed = RuleSet::new(vec![
            Rule::new(["turn off light"], "SECOND"),
            Rule::new(["light"], "FIRST"),
        ]);
        assert_eq!(reversed.apply("turn off light"), "SECOND");
    }

    #[test]
    fn test_apply_basic_form_match() {
        // "→" has an empty compact form, so only the basic comparison can hit
        let rules = RuleSet::new(vec![Rule::new(["!!", "→"], "ARROW")]);
        assert_eq!(rules.apply("a → b"), "ARROW");
        assert_eq!(rules.apply("a b"), "a b");
    }

    #[test]
    fn test_apply_hangul_spacing_noise() {
        let rules = RuleSet::new(vec![Rule::new(["전등 꺼"], "전등 꺼")]);
        assert_eq!(rules.apply("전, 등 꺼?"), "전등 꺼");
        assert_eq!(rules.apply("전등꺼 줘"), "전등 꺼");
    }

    #[test]
    fn test_apply_empty_trigger_never_matches() {
        let rules = RuleSet::new(vec![Rule::new(["", " ,. "], "NEVER")]);
        assert_eq!(rules.apply("anything"), "anything");
    }

    #[test]
    fn test_from_file_skips_empty_replacement() {
        let file = RuleFile::from_yaml(
            "rules:\n  - any: [a]\n    set: \"\"\n  - any: [b]\n  - any: [c]\n    set: C\n",
        )
        .unwrap();
        let rules = RuleSet::from_file(file, None);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].replacement, "C");
        assert_eq!(rules.apply("a b c"), "C");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let engine = RuleEngine::load("/nonexistent/rules.yaml").await;
        assert!(engine.current().await.is_empty());
        assert_eq!(engine.apply(" hi, there ").await, "hi there");
        // still missing on reload: no change
        assert!(engine.reload_if_changed().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_invalid_file_is_empty() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "rules: [ {{ any: [oops").unwrap();

        let engine = RuleEngine::load(file.path()).await;
        assert!(engine.current().await.is_empty());
    }

    #[tokio::test]
    async fn test_reload_keeps_previous_on_parse_failure() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        rewrite(&file, "rules:\n  - any: [turn off light]\n    set: LIGHT_OFF\n", 0);

        let engine = RuleEngine::load(file.path()).await;
        assert_eq!(engine.apply("turn off light").await, "LIGHT_OFF");

        rewrite(&file, "rules: [ {{ broken", 5);
        let rules = engine.reload_if_changed().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.apply("turn off light"), "LIGHT_OFF");
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_rules() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        rewrite(&file, "rules:\n  - any: [turn off light]\n    set: LIGHT_OFF\n", 0);

        let engine = RuleEngine::load(file.path()).await;
        let before = engine.reload_if_changed().await;

        rewrite(&file, "rules:\n  - any: [turn off light]\n    set: LIGHTS_DOWN\n", 5);
        let after = engine.reload_if_changed().await;

        assert_eq!(before.apply("turn off light"), "LIGHT_OFF");
        assert_eq!(after.apply("turn off light"), "LIGHTS_DOWN");
        assert_eq!(engine.apply("turn off light").await, "LIGHTS_DOWN");
    }

    #[tokio::test]
    async fn test_reload_unchanged_mtime_is_noop() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        rewrite(&file, "rules:\n  - any: [x]\n    set: X\n", 0);

        let engine = RuleEngine::load(file.path()).await;
        let first = engine.reload_if_changed().await;
        let second = engine.reload_if_changed().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_reload_after_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");

        let engine = RuleEngine::load(&path).await;
        assert!(engine.current().await.is_empty());

        std::fs::write(&path, "rules:\n  - any: [hello]\n    set: HI\n").unwrap();
        assert_eq!(engine.reload_if_changed().await.apply("hello world"), "HI");
    }

    #[tokio::test]
    async fn test_reload_after_file_removed_keeps_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules:\n  - any: [hello]\n    set: HI\n").unwrap();

        let engine = RuleEngine::load(&path).await;
        std::fs::remove_file(&path).unwrap();
        assert_eq!(engine.reload_if_changed().await.apply("hello"), "HI");
    }
}
