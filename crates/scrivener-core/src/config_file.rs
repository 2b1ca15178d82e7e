use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::detect::RankingPolicy;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub translators: Option<TranslatorsConfig>,
    pub sandbox: Option<SandboxConfig>,
    pub fetch: Option<FetchSection>,
    pub sessions: Option<SessionsConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslatorsConfig {
    /// Extra manifest directories, loaded after the built-in set.
    pub dirs: Option<Vec<String>>,
    pub builtin: Option<bool>,
    /// `priority-first` or `specificity-first`.
    pub ranking: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub timeout_secs: Option<u64>,
    pub max_items: Option<usize>,
    pub max_fetches: Option<usize>,
    pub max_delegate_depth: Option<usize>,
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchSection {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_redirects: Option<usize>,
    pub max_response_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub log_dir: Option<String>,
}

/// Platform config directory path: `<config_dir>/scrivener/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scrivener").join("config.toml"))
}

/// Load config by cascading CWD `.scrivener.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".scrivener.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let t0 = base.translators.unwrap_or_default();
    let t1 = overlay.translators.unwrap_or_default();
    let s0 = base.sandbox.unwrap_or_default();
    let s1 = overlay.sandbox.unwrap_or_default();
    let f0 = base.fetch.unwrap_or_default();
    let f1 = overlay.fetch.unwrap_or_default();
    let ss0 = base.sessions.unwrap_or_default();
    let ss1 = overlay.sessions.unwrap_or_default();
    let sv0 = base.server.unwrap_or_default();
    let sv1 = overlay.server.unwrap_or_default();

    ConfigFile {
        translators: Some(TranslatorsConfig {
            dirs: t1.dirs.or(t0.dirs),
            builtin: t1.builtin.or(t0.builtin),
            ranking: t1.ranking.or(t0.ranking),
        }),
        sandbox: Some(SandboxConfig {
            timeout_secs: s1.timeout_secs.or(s0.timeout_secs),
            max_items: s1.max_items.or(s0.max_items),
            max_fetches: s1.max_fetches.or(s0.max_fetches),
            max_delegate_depth: s1.max_delegate_depth.or(s0.max_delegate_depth),
            max_concurrent: s1.max_concurrent.or(s0.max_concurrent),
        }),
        fetch: Some(FetchSection {
            user_agent: f1.user_agent.or(f0.user_agent),
            proxy: f1.proxy.or(f0.proxy),
            timeout_secs: f1.timeout_secs.or(f0.timeout_secs),
            max_redirects: f1.max_redirects.or(f0.max_redirects),
            max_response_bytes: f1.max_response_bytes.or(f0.max_response_bytes),
        }),
        sessions: Some(SessionsConfig {
            ttl_secs: ss1.ttl_secs.or(ss0.ttl_secs),
        }),
        server: Some(ServerConfig {
            bind: sv1.bind.or(sv0.bind),
            log_dir: sv1.log_dir.or(sv0.log_dir),
        }),
    }
}

impl ConfigFile {
    /// Apply every value present in the file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(t) = &self.translators {
            if let Some(dirs) = &t.dirs {
                config.translator_dirs = dirs.iter().map(PathBuf::from).collect();
            }
            if let Some(builtin) = t.builtin {
                config.include_builtin = builtin;
            }
            if let Some(name) = &t.ranking {
                match RankingPolicy::parse(name) {
                    Some(policy) => config.ranking = policy,
                    None => {
                        tracing::warn!(ranking = %name, "unknown ranking policy, keeping default")
                    }
                }
            }
        }
        if let Some(s) = &self.sandbox {
            if let Some(secs) = s.timeout_secs {
                config.limits.timeout = Duration::from_secs(secs);
            }
            if let Some(n) = s.max_items {
                config.limits.max_items = n;
            }
            if let Some(n) = s.max_fetches {
                config.limits.max_fetches = n;
            }
            if let Some(n) = s.max_delegate_depth {
                config.limits.max_delegate_depth = n;
            }
            if let Some(n) = s.max_concurrent {
                config.max_concurrent_runs = n;
            }
        }
        if let Some(f) = &self.fetch {
            if let Some(ua) = &f.user_agent {
                config.fetch.user_agent = ua.clone();
            }
            if f.proxy.is_some() {
                config.fetch.proxy = f.proxy.clone();
            }
            if let Some(secs) = f.timeout_secs {
                config.fetch.timeout = Duration::from_secs(secs);
            }
            if let Some(n) = f.max_redirects {
                config.fetch.max_redirects = n;
            }
            if let Some(n) = f.max_response_bytes {
                config.fetch.max_response_bytes = n;
            }
        }
        if let Some(secs) = self.sessions.as_ref().and_then(|s| s.ttl_secs) {
            config.session_ttl = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_section_round_trip_toml() {
        let config = ConfigFile {
            sandbox: Some(SandboxConfig {
                timeout_secs: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sandbox.unwrap().timeout_secs, Some(5));
    }

    #[test]
    fn merge_overlay_wins_and_base_is_kept() {
        let base: ConfigFile = toml::from_str(
            "[sessions]\nttl_secs = 60\n[fetch]\nuser_agent = \"base\"\nproxy = \"http://p:1\"\n",
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str("[fetch]\nuser_agent = \"cwd\"\n").unwrap();
        let merged = merge(base, overlay);
        let fetch = merged.fetch.unwrap();
        assert_eq!(fetch.user_agent.as_deref(), Some("cwd"));
        assert_eq!(fetch.proxy.as_deref(), Some("http://p:1"));
        assert_eq!(merged.sessions.unwrap().ttl_secs, Some(60));
    }

    #[test]
    fn apply_onto_defaults() {
        let file: ConfigFile = toml::from_str(
            "[translators]\nranking = \"specificity-first\"\nbuiltin = false\ndirs = [\"/srv/t\"]\n\
             [sandbox]\ntimeout_secs = 3\nmax_concurrent = 2\n[sessions]\nttl_secs = 30\n",
        )
        .unwrap();
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.ranking, RankingPolicy::SpecificityFirst);
        assert!(!config.include_builtin);
        assert_eq!(config.translator_dirs, vec![PathBuf::from("/srv/t")]);
        assert_eq!(config.limits.timeout, Duration::from_secs(3));
        assert_eq!(config.max_concurrent_runs, 2);
        assert_eq!(config.session_ttl, Duration::from_secs(30));
        // Untouched values keep their defaults.
        assert_eq!(config.limits.max_items, 100);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_path(&dir.path().join("nope.toml")).is_none());
    }
}
