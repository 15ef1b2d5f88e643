//! Repository assembly.
//!
//! A `Repository` wires the three stores of a git directory together:
//! refs, objects and configuration, plus the optional working tree
//! around it. `RepoCache` keeps one instance per canonical path with
//! reference counting, so concurrent openers share pack handles and
//! caches instead of re-mapping everything.

mod cache;

pub use cache::RepoCache;

use std::path::{Path, PathBuf};

use ferrite_config::{Config, ConfigFile};
use ferrite_hash::Oid;
use ferrite_odb::ObjectStore;
use ferrite_refs::{RefName, RefStore};
use ferrite_util::RuntimeContext;

/// Errors of repository discovery and assembly.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any parent): {0}")]
    NotFound(PathBuf),

    #[error("repository at {0} already exists")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Refs(#[from] ferrite_refs::RefError),

    #[error(transparent)]
    Config(#[from] ferrite_config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An opened repository.
pub struct Repository {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    odb: ObjectStore,
    refs: RefStore,
    config: Config,
}

impl Repository {
    /// Open the repository whose git directory is `git_dir`.
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self, RepoError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        if !git_dir.join("objects").is_dir() || !git_dir.join("HEAD").is_file() {
            return Err(RepoError::NotFound(git_dir));
        }

        let repo_config = ConfigFile::load(git_dir.join("config"))?;
        let config = Config::repo_only(repo_config);

        let bare = config.get_bool("core", None, "bare", false).unwrap_or(false);
        let work_tree = if bare {
            None
        } else {
            git_dir.parent().map(Path::to_path_buf)
        };

        Ok(Self {
            odb: ObjectStore::open(git_dir.join("objects"))?,
            refs: RefStore::new(&git_dir),
            config,
            work_tree,
            git_dir,
        })
    }

    /// Walk upward from `start` looking for `.git` (or a bare layout).
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        let start = start.as_ref();
        let mut current = Some(start.to_path_buf());
        while let Some(dir) = current {
            let dotgit = dir.join(".git");
            if dotgit.is_dir() {
                return Self::open(dotgit);
            }
            // Bare repository checked out directly.
            if dir.join("objects").is_dir() && dir.join("HEAD").is_file() {
                return Self::open(&dir);
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        Err(RepoError::NotFound(start.to_path_buf()))
    }

    /// Create a fresh (bare or non-bare) repository layout.
    pub fn init(
        target: impl AsRef<Path>,
        bare: bool,
        _ctx: &dyn RuntimeContext,
    ) -> Result<Self, RepoError> {
        let target = target.as_ref();
        let git_dir = if bare {
            target.to_path_buf()
        } else {
            target.join(".git")
        };
        if git_dir.join("HEAD").exists() {
            return Err(RepoError::AlreadyExists(git_dir));
        }

        std::fs::create_dir_all(git_dir.join("objects/pack"))?;
        std::fs::create_dir_all(git_dir.join("objects/info"))?;
        std::fs::create_dir_all(git_dir.join("refs/heads"))?;
        std::fs::create_dir_all(git_dir.join("refs/tags"))?;
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;

        let mut config = ConfigFile::default();
        config.set("core", None, "repositoryformatversion", "0");
        config.set("core", None, "filemode", "true");
        config.set("core", None, "bare", if bare { "true" } else { "false" });
        std::fs::write(git_dir.join("config"), config.render())?;

        Self::open(git_dir)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.work_tree.is_none()
    }

    pub fn odb(&self) -> &ObjectStore {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve HEAD; `Ok(None)` in a freshly initialized repository.
    pub fn head(&self) -> Result<Option<Oid>, RepoError> {
        Ok(self.refs.head()?)
    }

    /// The branch HEAD points at, when it is symbolic.
    pub fn head_branch(&self) -> Result<Option<RefName>, RepoError> {
        Ok(self.refs.head_target()?)
    }

    /// The path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }
}
