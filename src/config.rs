use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{info, warn};

use crate::writer::HeaderCells;

pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory the server runs from; template files may live here.
    pub root: PathBuf,
    /// Served at `/`. Template files are looked up here first.
    pub public_dir: PathBuf,
    pub data_dir: PathBuf,
    pub header_cells: HeaderCells,
}

impl Config {
    pub fn load() -> Self {
        let root: PathBuf = try_load("APP_ROOT", ".");
        let public_dir = match var("PUBLIC_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => pick_public_dir(&root),
        };

        Self {
            host: try_load("HOST", "0.0.0.0"),
            port: try_load("PORT", "3000"),
            data_dir: try_load("DATA_DIR", &root.join("data").to_string_lossy()),
            header_cells: HeaderCells {
                full_name: try_load("NAME_CELL", "D3"),
                phone: try_load("PHONE_CELL", "AC3"),
            },
            public_dir,
            root,
        }
    }

    /// Defaults rooted at `root`, ignoring the environment.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_dir: pick_public_dir(&root),
            data_dir: root.join("data"),
            header_cells: HeaderCells::default(),
            root,
        }
    }

    /// Places a shared file is looked for, in order.
    pub fn candidates(&self, file_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.public_dir.join(file_name)];
        let fallback = self.root.join(file_name);
        if !paths.contains(&fallback) {
            paths.push(fallback);
        }
        paths
    }

    /// First existing candidate for `file_name`.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        self.candidates(file_name).into_iter().find(|p| p.is_file())
    }

    pub fn converter_path(&self) -> Option<PathBuf> {
        self.resolve("converter.json")
    }

    pub fn export_template_path(&self) -> Option<PathBuf> {
        self.resolve("alltmp.xlsx")
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `<root>/public` when it is a directory, otherwise the root itself.
fn pick_public_dir(root: &Path) -> PathBuf {
    let public = root.join("public");
    if public.is_dir() {
        public
    } else {
        root.to_path_buf()
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        match default.parse() {
            Ok(v) => v,
            Err(_) => unreachable!("default for {key} must parse"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataStore;

    #[test]
    fn test_public_dir_falls_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        assert_eq!(config.public_dir, dir.path());
        assert_eq!(config.candidates("template.xlsx").len(), 1);

        std::fs::create_dir(dir.path().join("public")).unwrap();
        let config = Config::with_root(dir.path());
        assert_eq!(config.public_dir, dir.path().join("public"));
        assert_eq!(config.candidates("template.xlsx").len(), 2);
    }

    #[test]
    fn test_resolve_prefers_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("converter.json"), "[]").unwrap();
        let config = Config::with_root(dir.path());
        assert_eq!(config.converter_path(), Some(dir.path().join("converter.json")));

        std::fs::write(dir.path().join("public/converter.json"), "[]").unwrap();
        assert_eq!(
            config.converter_path(),
            Some(dir.path().join("public/converter.json"))
        );
        assert_eq!(config.resolve("template.xlsx"), None);
        assert_eq!(config.export_template_path(), None);
    }

    #[test]
    fn test_store_finds_template_through_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("public")).unwrap();
        std::fs::write(dir.path().join("template.xlsx"), "root").unwrap();
        let config = Config::with_root(dir.path());

        let store = DataStore::new(config.data_dir.clone(), config.candidates("template.xlsx"));
        assert_eq!(store.template_path().unwrap(), dir.path().join("template.xlsx"));

        std::fs::write(dir.path().join("public/template.xlsx"), "public").unwrap();
        assert_eq!(
            store.template_path().unwrap(),
            dir.path().join("public/template.xlsx")
        );
    }
}
