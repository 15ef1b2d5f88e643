//! Hierarchical configuration.
//!
//! Keys live in a `section.subsection.name` namespace. Reads walk the
//! scope chain system → user → repository, later scopes overriding
//! earlier ones per key tuple. Values are strings with typed accessors
//! for booleans, integers with `k`/`m`/`g` suffixes, and durations with
//! a unit token.

mod file;
mod parse;
mod values;

pub use file::{ConfigEntry, ConfigFile};
pub use values::{parse_bool, parse_duration_ms, parse_int};

use bstr::BStr;

/// Errors of the config layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("not a boolean: {0}")]
    BadBool(String),

    #[error("not an integer: {0}")]
    BadInt(String),

    #[error("not a duration: {0}")]
    BadDuration(String),

    #[error("unknown duration unit: {0}")]
    UnknownUnit(String),
}

/// The merged view over the three scopes.
#[derive(Debug, Default, Clone)]
pub struct Config {
    system: ConfigFile,
    user: ConfigFile,
    repo: ConfigFile,
}

impl Config {
    pub fn new(system: ConfigFile, user: ConfigFile, repo: ConfigFile) -> Self {
        Self { system, user, repo }
    }

    /// A config with only the repository scope populated.
    pub fn repo_only(repo: ConfigFile) -> Self {
        Self {
            repo,
            ..Default::default()
        }
    }

    pub fn repo_scope(&self) -> &ConfigFile {
        &self.repo
    }

    pub fn repo_scope_mut(&mut self) -> &mut ConfigFile {
        &mut self.repo
    }

    /// The effective value of a key: the last definition in the most
    /// specific scope that has one.
    pub fn get(&self, section: &str, subsection: Option<&str>, name: &str) -> Option<&BStr> {
        for scope in [&self.repo, &self.user, &self.system] {
            if let Some(value) = scope.get(section, subsection, name) {
                return value;
            }
        }
        None
    }

    /// Every value of a multi-valued key, outermost scope first.
    pub fn get_all(&self, section: &str, subsection: Option<&str>, name: &str) -> Vec<&BStr> {
        let mut out = Vec::new();
        for scope in [&self.system, &self.user, &self.repo] {
            out.extend(scope.get_all(section, subsection, name).into_iter().flatten());
        }
        out
    }

    pub fn get_str(&self, section: &str, subsection: Option<&str>, name: &str) -> Option<String> {
        self.get(section, subsection, name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Boolean read; a key present with no value reads true.
    pub fn get_bool(
        &self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
        default: bool,
    ) -> Result<bool, ConfigError> {
        for scope in [&self.repo, &self.user, &self.system] {
            if let Some(value) = scope.get(section, subsection, name) {
                return parse_bool(value);
            }
        }
        Ok(default)
    }

    /// Integer read with `k`/`m`/`g` (×1024ⁿ) suffixes.
    pub fn get_int(
        &self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
        default: i64,
    ) -> Result<i64, ConfigError> {
        match self.get(section, subsection, name) {
            Some(value) => parse_int(value),
            None => Ok(default),
        }
    }

    /// Duration read in milliseconds; the value carries its unit token
    /// (`"5.2 sec"`, `"500 ms"`, `"1 min"`).
    pub fn get_duration_ms(
        &self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
        default_ms: i64,
    ) -> Result<i64, ConfigError> {
        match self.get(section, subsection, name) {
            Some(value) => parse_duration_ms(value),
            None => Ok(default_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(system: &str, user: &str, repo: &str) -> Config {
        Config::new(
            ConfigFile::parse(system).unwrap(),
            ConfigFile::parse(user).unwrap(),
            ConfigFile::parse(repo).unwrap(),
        )
    }

    #[test]
    fn repo_overrides_user_overrides_system() {
        let cfg = config(
            "[core]\n\teditor = ed\n\tpager = more\n\tautocrlf = false\n",
            "[core]\n\teditor = vim\n",
            "[core]\n\teditor = nano\n",
        );
        assert_eq!(cfg.get_str("core", None, "editor").as_deref(), Some("nano"));
        assert_eq!(cfg.get_str("core", None, "pager").as_deref(), Some("more"));
        assert!(!cfg.get_bool("core", None, "autocrlf", true).unwrap());
    }

    #[test]
    fn subsection_is_part_of_the_key() {
        let cfg = config(
            "",
            "",
            "[remote \"origin\"]\n\turl = https://example.com/a.git\n[remote \"backup\"]\n\turl = https://example.com/b.git\n",
        );
        assert_eq!(
            cfg.get_str("remote", Some("origin"), "url").as_deref(),
            Some("https://example.com/a.git")
        );
        assert_eq!(
            cfg.get_str("remote", Some("backup"), "url").as_deref(),
            Some("https://example.com/b.git")
        );
        assert_eq!(cfg.get_str("remote", None, "url"), None);
    }

    #[test]
    fn multivalued_keys_accumulate_across_scopes() {
        let cfg = config(
            "[fetch]\n\trefspec = +refs/heads/*:refs/remotes/sys/*\n",
            "",
            "[fetch]\n\trefspec = +refs/heads/*:refs/remotes/origin/*\n\trefspec = +refs/tags/*:refs/tags/*\n",
        );
        let all = cfg.get_all("fetch", None, "refspec");
        assert_eq!(all.len(), 3);
        assert!(all[0].to_string().contains("sys"));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = config("", "", "");
        assert_eq!(cfg.get_int("pack", None, "window", 10).unwrap(), 10);
        assert!(cfg.get_bool("core", None, "bare", true).unwrap());
        assert_eq!(
            cfg.get_duration_ms("http", None, "timeout", 30_000).unwrap(),
            30_000
        );
    }
}
