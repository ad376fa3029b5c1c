//! PHP interpreter discovery for a site.

use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::config::AddonConfig;
use crate::paths::get_php_exe_path;
use crate::site::SiteRecord;

const RUNTIME_DIR_PREFIX: &str = "php-";

/// Parse a runtime directory name such as `php-8.2.27+0`.
fn runtime_version(dir_name: &str) -> Option<Version> {
    let raw = dir_name.strip_prefix(RUNTIME_DIR_PREFIX)?;
    Version::parse(raw).ok()
}

/// `wanted` is one to three dot-separated numbers; each given component must match.
fn matches_requested(version: &Version, wanted: &str) -> bool {
    let parts: Vec<u64> = match wanted.split('.').map(str::parse).collect() {
        Ok(parts) => parts,
        Err(_) => return false,
    };
    let actual = [version.major, version.minor, version.patch];
    !parts.is_empty() && parts.len() <= 3 && parts.iter().zip(actual.iter()).all(|(a, b)| a == b)
}

/// Highest runtime under `runtime_dir` matching `wanted`, as a PHP executable path.
pub fn find_runtime(runtime_dir: &Path, wanted: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(runtime_dir).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let version = runtime_version(&name)?;
            if !matches_requested(&version, wanted) {
                return None;
            }
            let exe = get_php_exe_path(&entry.path());
            exe.is_file().then_some((version, exe))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, exe)| exe)
}

/// Resolve the interpreter for `site`.
///
/// Order: host runtime matching the site's PHP service version, the configured
/// `php_binary`, then `php` from PATH. Never fails.
pub fn resolve_php(config: &AddonConfig, site: &SiteRecord) -> PathBuf {
    if let Some(wanted) = site.php_version() {
        if let Some(exe) = find_runtime(&config.php_runtime_dir, wanted) {
            log::debug!("Using PHP {} for site {}: {:?}", wanted, site.id, exe);
            return exe;
        }
        log::warn!(
            "No bundled PHP {} found in {:?} for site {}, falling back",
            wanted,
            config.php_runtime_dir,
            site.id
        );
    }

    if !config.php_binary.trim().is_empty() {
        return PathBuf::from(config.php_binary.trim());
    }
    PathBuf::from("php")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{DbCredentials, SiteService};
    use std::collections::HashMap;

    fn install_runtime(root: &Path, name: &str) -> PathBuf {
        let exe = get_php_exe_path(&root.join(name));
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"").unwrap();
        exe
    }

    fn site_with_php(version: Option<&str>) -> SiteRecord {
        let mut services = HashMap::new();
        if let Some(v) = version {
            services.insert(
                "php".to_string(),
                SiteService {
                    name: "php".to_string(),
                    role: "php".to_string(),
                    version: v.to_string(),
                    ports: HashMap::new(),
                },
            );
        }
        SiteRecord {
            id: "abc".to_string(),
            name: "Demo".to_string(),
            domain: "demo.local".to_string(),
            path: PathBuf::from("/tmp/demo"),
            services,
            mysql: DbCredentials::default(),
            custom_options: HashMap::new(),
        }
    }

    #[test]
    fn parses_build_suffixed_directory_names() {
        assert_eq!(
            runtime_version("php-8.2.27+0"),
            Some(Version::parse("8.2.27+0").unwrap())
        );
        assert_eq!(runtime_version("mysql-8.0.16+6"), None);
        assert_eq!(runtime_version("php-latest"), None);
    }

    #[test]
    fn version_prefix_matching() {
        let v = Version::new(8, 2, 27);
        assert!(matches_requested(&v, "8"));
        assert!(matches_requested(&v, "8.2"));
        assert!(matches_requested(&v, "8.2.27"));
        assert!(!matches_requested(&v, "8.1"));
        assert!(!matches_requested(&v, "8.20"));
        assert!(!matches_requested(&v, "8.x"));
        assert!(!matches_requested(&v, ""));
    }

    #[test]
    fn picks_highest_matching_runtime() {
        let tmp = tempfile::TempDir::new().unwrap();
        install_runtime(tmp.path(), "php-8.1.30+0");
        install_runtime(tmp.path(), "php-8.2.10+0");
        let best = install_runtime(tmp.path(), "php-8.2.27+1");
        install_runtime(tmp.path(), "php-8.3.4+0");

        assert_eq!(find_runtime(tmp.path(), "8.2"), Some(best));
        assert!(find_runtime(tmp.path(), "7.4").is_none());
    }

    #[test]
    fn skips_runtime_directories_without_binary() {
        let tmp = tempfile::TempDir::new().unwrap();
        let usable = install_runtime(tmp.path(), "php-8.2.10+0");
        fs::create_dir_all(tmp.path().join("php-8.2.30+0")).unwrap();
        assert_eq!(find_runtime(tmp.path(), "8.2"), Some(usable));
    }

    #[test]
    fn falls_back_to_configured_binary_then_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = AddonConfig {
            php_runtime_dir: tmp.path().to_path_buf(),
            ..AddonConfig::default()
        };
        let site = site_with_php(Some("8.2"));
        assert_eq!(resolve_php(&config, &site), PathBuf::from("php"));

        config.php_binary = "/opt/php/bin/php".to_string();
        assert_eq!(resolve_php(&config, &site), PathBuf::from("/opt/php/bin/php"));

        let bundled = install_runtime(tmp.path(), "php-8.2.27+0");
        assert_eq!(resolve_php(&config, &site), bundled);
        assert_eq!(
            resolve_php(&config, &site_with_php(None)),
            PathBuf::from("/opt/php/bin/php")
        );
    }
}
