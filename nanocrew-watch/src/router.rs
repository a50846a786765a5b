//! Bidirectional `agent name ⇄ watched paths` index.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use nanocrew_primitives::AgentName;

/// One entry in an agent's [`crate::WatchRegistration`].
///
/// `is_dir` is recorded at registration time rather than re-derived from
/// the filesystem on every match: the workspace layout fixes which entries
/// are directories (`skills/`) independent of whether anything has been
/// created on disk yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchedPath {
    /// The absolute path being watched.
    pub path: PathBuf,
    /// Whether this entry is a directory (watched recursively) or a file.
    pub is_dir: bool,
}

impl WatchedPath {
    /// Creates a file entry.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Routes a changed filesystem path back to every agent it affects.
///
/// Keeps `agent → [paths]` and `path → {agents}` in lockstep: the only way
/// to mutate either map is through [`register`](Self::register) and
/// [`unregister`](Self::unregister), so the two views can never drift apart.
#[derive(Default)]
pub struct WatchRouter {
    agent_paths: HashMap<AgentName, Vec<WatchedPath>>,
    path_to_agents: HashMap<PathBuf, (bool, HashSet<AgentName>)>,
}

impl WatchRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` against `paths`, returning the same list back for
    /// convenience (mirrors the donor's "register and get paths to watch"
    /// call shape).
    pub fn register(&mut self, name: AgentName, paths: Vec<WatchedPath>) -> &[WatchedPath] {
        for entry in &paths {
            let slot = self
                .path_to_agents
                .entry(entry.path.clone())
                .or_insert_with(|| (entry.is_dir, HashSet::new()));
            slot.1.insert(name.clone());
        }
        self.agent_paths.insert(name.clone(), paths);
        self.agent_paths.get(&name).expect("just inserted")
    }

    /// Removes `name` and every path-mapping it contributed, returning the
    /// paths it had been watching.
    pub fn unregister(&mut self, name: &AgentName) -> Vec<WatchedPath> {
        let paths = self.agent_paths.remove(name).unwrap_or_default();
        for entry in &paths {
            if let Some((_, agents)) = self.path_to_agents.get_mut(&entry.path) {
                agents.remove(name);
                if agents.is_empty() {
                    self.path_to_agents.remove(&entry.path);
                }
            }
        }
        paths
    }

    /// Returns every agent name affected by a change at `changed_path`.
    ///
    /// A registered path affects an agent if it equals `changed_path`
    /// exactly, or if it is a registered *directory* path under which
    /// `changed_path` lies (checked via relative-path containment, not
    /// string prefix matching).
    #[must_use]
    pub fn get_affected_agents(&self, changed_path: &Path) -> HashSet<AgentName> {
        let mut affected = HashSet::new();
        for (registered_path, (is_dir, agents)) in &self.path_to_agents {
            if registered_path == changed_path {
                affected.extend(agents.iter().cloned());
            } else if *is_dir && changed_path.strip_prefix(registered_path).is_ok() {
                affected.extend(agents.iter().cloned());
            }
        }
        affected
    }

    /// Returns the paths currently registered for `name`, if any.
    #[must_use]
    pub fn paths_for_agent(&self, name: &AgentName) -> &[WatchedPath] {
        self.agent_paths.get(name).map_or(&[], Vec::as_slice)
    }
}
