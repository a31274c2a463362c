// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::{ServiceConfig, validate_name};
use crate::errors::StoreError;

/// Persistent storage of service configurations.
pub trait ConfigStore {
    fn load(&self, name: &str) -> Result<ServiceConfig, StoreError>;
    fn save(&self, config: &ServiceConfig) -> Result<(), StoreError>;
    fn remove(&self, name: &str) -> Result<(), StoreError>;
    fn list_all(&self) -> Result<Vec<ServiceConfig>, StoreError>;
}

/// One `<name>.yaml` document per service.
#[derive(Debug, Clone)]
pub struct YamlConfigStore {
    dir: PathBuf,
}

impl YamlConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name).map_err(|_| StoreError::InvalidName(name.to_string()))?;
        Ok(self.dir.join(format!("{name}.yaml")))
    }

    /// Existing document for `name`, preferring `.yaml` over `.yml`.
    fn existing_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let yaml = self.path_for(name)?;
        if yaml.is_file() {
            return Ok(yaml);
        }
        let yml = yaml.with_extension("yml");
        if yml.is_file() {
            return Ok(yml);
        }
        Err(StoreError::NotFound(name.to_string()))
    }
}

fn parse_config(path: &Path) -> Result<ServiceConfig, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        action: "reading",
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: ServiceConfig =
        serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if config.name.is_empty()
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    {
        config.name = stem.to_string();
    }
    Ok(config)
}

impl ConfigStore for YamlConfigStore {
    fn load(&self, name: &str) -> Result<ServiceConfig, StoreError> {
        let path = self.existing_path(name)?;
        debug!("loading service '{name}' from {}", path.display());
        parse_config(&path)
    }

    /// Written to a temporary file first so readers never see a partial document.
    fn save(&self, config: &ServiceConfig) -> Result<(), StoreError> {
        let path = self.path_for(&config.name)?;
        let contents = serde_yaml::to_string(config).map_err(|source| StoreError::Serialize {
            name: config.name.clone(),
            source,
        })?;

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            action: "creating",
            path: self.dir.clone(),
            source,
        })?;
        let tmp = self.dir.join(format!(".{}.yaml.tmp", config.name));
        std::fs::write(&tmp, contents).map_err(|source| StoreError::Io {
            action: "writing",
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            action: "renaming",
            path: path.clone(),
            source,
        })?;
        debug!("saved service '{}' to {}", config.name, path.display());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.existing_path(name)?;
        std::fs::remove_file(&path).map_err(|source| StoreError::Io {
            action: "removing",
            path,
            source,
        })
    }

    /// Files that fail to parse are logged and skipped.
    fn list_all(&self) -> Result<Vec<ServiceConfig>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("config directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "reading",
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut yaml_files: Vec<_> = entries
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping unreadable entry in {}: {e}", self.dir.display());
                    None
                }
            })
            .filter(|e| {
                let path = e.path();
                let is_yaml = path
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml");
                let is_hidden = e.file_name().to_string_lossy().starts_with('.');
                if !is_yaml || is_hidden {
                    debug!("skipping non-config file: {}", path.display());
                }
                is_yaml && !is_hidden
            })
            .collect();

        yaml_files.sort_by_key(|e| e.file_name());

        let mut configs = Vec::new();
        for entry in yaml_files {
            let path = entry.path();
            match parse_config(&path) {
                Ok(config) => configs.push(config),
                Err(e) => warn!("skipping {}: {e}", path.display()),
            }
        }
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecoveryAction, RecoveryKind, StartType, StopSignal};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::fs;

    fn store() -> (tempfile::TempDir, YamlConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlConfigStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let mut cfg = ServiceConfig::new("otel-agent", "/opt/datadog-agent/embedded/bin/otel-agent");
        cfg.args = vec!["run".into()];
        cfg.start_type = StartType::DelayedAutoStart;
        cfg.stop_signals.insert(StopSignal::Interrupt);
        cfg.env.insert("DD_LOG_LEVEL".into(), "debug".into());
        cfg.set_recovery_action(RecoveryAction::restart(1, 5, 3, 600));

        store.save(&cfg).unwrap();
        assert_eq!(store.load("otel-agent").unwrap(), cfg);
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = store();
        assert!(matches!(store.load("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(StoreError::InvalidName(_))
        ));
        let cfg = ServiceConfig::new("a/b", "/bin/true");
        assert!(matches!(store.save(&cfg), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = store();
        store.save(&ServiceConfig::new("svc", "/bin/true")).unwrap();
        store.remove("svc").unwrap();
        assert!(matches!(store.load("svc"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove("svc"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let (dir, store) = store();
        fs::write(dir.path().join("legacy.yml"), "executable: /usr/bin/true\n").unwrap();
        assert_eq!(store.load("legacy").unwrap().name, "legacy");
    }

    #[test]
    fn test_list_sorted_and_skips_invalid() {
        let (dir, store) = store();
        fs::write(dir.path().join("charlie.yaml"), "executable: /c\n").unwrap();
        fs::write(dir.path().join("alpha.yaml"), "executable: /a\n").unwrap();
        fs::write(dir.path().join("bravo.yml"), "executable: /b\n").unwrap();
        fs::write(dir.path().join("bad.yaml"), "not: valid: yaml: [").unwrap();
        fs::write(dir.path().join("readme.txt"), "not a config").unwrap();
        fs::write(dir.path().join(".half.yaml.tmp"), "executable: /x\n").unwrap();

        let names: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let store = YamlConfigStore::new("/nonexistent/services.d");
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlConfigStore::new(dir.path().join("nested/services.d"));
        store.save(&ServiceConfig::new("svc", "/bin/true")).unwrap();
        assert!(dir.path().join("nested/services.d/svc.yaml").is_file());
    }

    fn recovery_action() -> impl Strategy<Value = RecoveryAction> {
        (
            any::<i32>(),
            any::<bool>(),
            any::<bool>(),
            0u64..100_000,
            any::<u32>(),
            0u64..100_000,
            proptest::option::of("/[a-z]{1,12}"),
            proptest::collection::vec("[a-zA-Z0-9=-]{0,8}", 0..3),
        )
            .prop_map(
                |(exit_code, restart, run_program, delay_sec, max_restarts, reset_after_sec, program, arguments)| {
                    RecoveryAction {
                        exit_code,
                        action: RecoveryKind {
                            restart,
                            run_program,
                        },
                        delay_sec,
                        max_restarts,
                        reset_after_sec,
                        program,
                        arguments,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_recovery_table_survives_storage(
            actions in proptest::collection::vec(recovery_action(), 0..8)
        ) {
            let (_dir, store) = store();
            let mut cfg = ServiceConfig::new("svc", "/opt/app/agent");
            cfg.recovery_actions = actions
                .into_iter()
                .map(|a| (a.exit_code, a))
                .collect::<BTreeMap<_, _>>();

            store.save(&cfg).unwrap();
            let loaded = store.load("svc").unwrap();
            prop_assert_eq!(loaded.recovery_actions, cfg.recovery_actions);
        }
    }
}
