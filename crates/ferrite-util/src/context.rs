//! Injectable view of the host environment.
//!
//! Anything that would otherwise reach for a process global (environment
//! variables, the home directory, the clock, the hostname) goes through a
//! `RuntimeContext` handed in by the caller, so tests can substitute a
//! fixed environment without touching the process.

use std::path::PathBuf;

use crate::ident::GitTime;

/// Host facts the core is allowed to observe.
pub trait RuntimeContext: Send + Sync {
    /// An environment variable, or `None` when unset.
    fn env(&self, name: &str) -> Option<String>;

    /// The current user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// The local hostname, for reflog identities on hosts without config.
    fn hostname(&self) -> String;

    /// The current time with local zone offset.
    fn now(&self) -> GitTime;
}

/// Context backed by the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostContext;

impl RuntimeContext for HostContext {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }

    fn hostname(&self) -> String {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into())
    }

    fn now(&self) -> GitTime {
        GitTime::now()
    }
}

/// Fixed context for tests: a frozen clock and a closed set of variables.
#[derive(Debug, Default, Clone)]
pub struct FixedContext {
    pub vars: Vec<(String, String)>,
    pub home: Option<PathBuf>,
    pub host: String,
    pub time: Option<GitTime>,
}

impl RuntimeContext for FixedContext {
    fn env(&self, name: &str) -> Option<String> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn hostname(&self) -> String {
        if self.host.is_empty() {
            "test-host".into()
        } else {
            self.host.clone()
        }
    }

    fn now(&self) -> GitTime {
        self.time.unwrap_or(GitTime {
            seconds: 0,
            offset_minutes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_context_is_hermetic() {
        let ctx = FixedContext {
            vars: vec![("GIT_DIR".into(), "/tmp/repo/.git".into())],
            home: Some(PathBuf::from("/home/test")),
            host: String::new(),
            time: Some(GitTime::new(1234567890, 60)),
        };
        assert_eq!(ctx.env("GIT_DIR").as_deref(), Some("/tmp/repo/.git"));
        assert_eq!(ctx.env("UNSET"), None);
        assert_eq!(ctx.home_dir(), Some(PathBuf::from("/home/test")));
        assert_eq!(ctx.hostname(), "test-host");
        assert_eq!(ctx.now().seconds, 1234567890);
    }
}
