//! Site records as the host stores them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Custom option keys this addon writes onto a host site.
pub const SITE_TYPE_KEY: &str = "siteType";
pub const SITE_TYPE_LARAVEL: &str = "laravel";
pub const LARAVEL_VERSION_KEY: &str = "laravelVersion";
pub const STARTER_KIT_KEY: &str = "starterKit";
pub const CREATED_AT_KEY: &str = "createdAt";

/// Directory under the site root that holds the Laravel project.
pub const APP_SUBDIR: &str = "app";

/// A runtime component attached to a site, such as its PHP or MySQL service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteService {
    pub name: String,
    pub role: String,
    pub version: String,
    #[serde(default)]
    pub ports: HashMap<String, Vec<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DbCredentials {
    fn default() -> Self {
        Self {
            database: "local".to_string(),
            user: "root".to_string(),
            password: "root".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub path: PathBuf,
    #[serde(default)]
    pub services: HashMap<String, SiteService>,
    #[serde(default)]
    pub mysql: DbCredentials,
    #[serde(default)]
    pub custom_options: HashMap<String, String>,
}

impl SiteRecord {
    pub fn service_by_role(&self, role: &str) -> Option<&SiteService> {
        self.services.values().find(|s| s.role == role)
    }

    pub fn php_version(&self) -> Option<&str> {
        self.service_by_role("php").map(|s| s.version.as_str())
    }

    /// First port the database service declares, if any.
    pub fn mysql_port(&self) -> Option<u16> {
        let service = self.service_by_role("mysql")?;
        service
            .ports
            .get("MYSQL")
            .or_else(|| service.ports.values().next())
            .and_then(|ports| ports.first().copied())
    }

    pub fn is_laravel(&self) -> bool {
        self.custom_options.get(SITE_TYPE_KEY).map(String::as_str) == Some(SITE_TYPE_LARAVEL)
    }

    pub fn root(&self) -> &Path {
        &self.path
    }

    /// Laravel project root (`<site>/app`).
    pub fn app_dir(&self) -> PathBuf {
        self.path.join(APP_SUBDIR)
    }

    pub fn env_path(&self) -> PathBuf {
        self.app_dir().join(".env")
    }

    pub fn log_path(&self) -> PathBuf {
        self.app_dir().join("storage").join("logs").join("laravel.log")
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom_options.get(key).map(String::as_str)
    }
}

/// What the addon asks the host for when a new site is created.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub domain: String,
    pub php_version: Option<String>,
}
