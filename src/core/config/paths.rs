use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem locations used by the service.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Parent of the per-knowledge-base index directories.
    pub index_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::with_data_dir(project_root, data_dir)
    }

    pub fn with_data_dir(project_root: PathBuf, data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let index_dir = data_dir.join("vector_index");

        for dir in [&data_dir, &log_dir, &index_dir] {
            if let Err(err) = fs::create_dir_all(dir) {
                eprintln!("failed to create {}: {}", dir.display(), err);
            }
        }

        AppPaths {
            project_root,
            data_dir,
            log_dir,
            index_dir,
        }
    }

    /// Default SQLite URL for a backing database living in the data directory.
    pub fn default_database_url(&self, database_name: &str) -> String {
        format!(
            "sqlite://{}",
            self.data_dir
                .join(format!("{}.db", database_name))
                .to_string_lossy()
        )
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("SUPPORT_RAG_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("SUPPORT_RAG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("SupportRag");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("SupportRag");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("support-rag")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
