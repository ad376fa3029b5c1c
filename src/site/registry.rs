//! Access to the host's site store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::socket::find_mysql_socket;
use super::types::{DbCredentials, NewSite, SiteRecord, SiteService};
use crate::error::{AppError, Result};

const DEFAULT_PHP_VERSION: &str = "8.3";
const DEFAULT_MYSQL_VERSION: &str = "8.0";
const DB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The host application's site data store, seen from the addon.
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    fn get_site(&self, site_id: &str) -> Result<Option<SiteRecord>>;

    fn list_sites(&self) -> Result<Vec<SiteRecord>>;

    /// Ask the host to provision a new site.
    fn add_site(&self, new_site: &NewSite) -> Result<SiteRecord>;

    /// Merge `options` into the site's custom options. Existing keys not in
    /// `options` are left alone.
    fn update_custom_options(&self, site_id: &str, options: HashMap<String, String>) -> Result<()>;

    /// Directory where the host keeps per-site runtime files, when known.
    fn run_data_dir(&self) -> Option<PathBuf>;

    /// Wait until the site's database accepts connections. Returns false if
    /// `timeout` elapsed first.
    async fn wait_for_database(&self, site: &SiteRecord, timeout: Duration) -> bool;

    fn require_site(&self, site_id: &str) -> Result<SiteRecord> {
        self.get_site(site_id)?
            .ok_or_else(|| AppError::site_not_found(site_id))
    }
}

/// Registry backed by the host's `sites.json` file.
pub struct JsonSiteRegistry {
    sites_file: PathBuf,
    sites_root: PathBuf,
    run_data_dir: Option<PathBuf>,
    lock: Mutex<()>,
}

impl JsonSiteRegistry {
    pub fn new(sites_file: PathBuf, sites_root: PathBuf, run_data_dir: Option<PathBuf>) -> Self {
        Self {
            sites_file,
            sites_root,
            run_data_dir,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, SiteRecord>> {
        if !self.sites_file.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.sites_file)
            .map_err(|e| AppError::io(format!("Failed to read sites file: {}", e)))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, sites: &HashMap<String, SiteRecord>) -> Result<()> {
        if let Some(parent) = self.sites_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(sites)?;
        fs::write(&self.sites_file, content)
            .map_err(|e| AppError::io(format!("Failed to write sites file: {}", e)))
    }

    /// Read-modify-write the sites file while holding the registry lock.
    fn with_sites_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, SiteRecord>) -> Result<T>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sites = self.load()?;
        let result = f(&mut sites)?;
        self.save(&sites)?;
        Ok(result)
    }

    fn unique_site_dir(&self, name: &str) -> PathBuf {
        let slug = slugify(name);
        let mut candidate = self.sites_root.join(&slug);
        let mut n = 1;
        while candidate.exists() {
            n += 1;
            candidate = self.sites_root.join(format!("{}-{}", slug, n));
        }
        candidate
    }
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let parts: Vec<&str> = slug.split('-').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        "site".to_string()
    } else {
        parts.join("-")
    }
}

async fn database_reachable(socket: Option<&Path>, port: Option<u16>) -> bool {
    if socket.is_some_and(Path::exists) {
        return true;
    }
    if let Some(port) = port {
        return tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok();
    }
    false
}

#[async_trait]
impl SiteRegistry for JsonSiteRegistry {
    fn get_site(&self, site_id: &str) -> Result<Option<SiteRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(site_id))
    }

    fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut sites: Vec<SiteRecord> = self.load()?.into_values().collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    fn add_site(&self, new_site: &NewSite) -> Result<SiteRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let path = self.unique_site_dir(&new_site.name);
        fs::create_dir_all(&path)
            .map_err(|e| AppError::io(format!("Failed to create site dir: {}", e)))?;

        let php_version = new_site
            .php_version
            .clone()
            .unwrap_or_else(|| DEFAULT_PHP_VERSION.to_string());
        let services = HashMap::from([
            (
                "php".to_string(),
                SiteService {
                    name: "php".to_string(),
                    role: "php".to_string(),
                    version: php_version,
                    ports: HashMap::new(),
                },
            ),
            (
                "mysql".to_string(),
                SiteService {
                    name: "mysql".to_string(),
                    role: "mysql".to_string(),
                    version: DEFAULT_MYSQL_VERSION.to_string(),
                    ports: HashMap::new(),
                },
            ),
        ]);

        let site = SiteRecord {
            id: id.clone(),
            name: new_site.name.clone(),
            domain: new_site.domain.clone(),
            path,
            services,
            mysql: DbCredentials::default(),
            custom_options: HashMap::new(),
        };

        let record = site.clone();
        self.with_sites_mut(move |sites| {
            sites.insert(id, record);
            Ok(())
        })?;

        log::info!("Provisioned site {} ({}) at {:?}", site.name, site.id, site.path);
        Ok(site)
    }

    fn update_custom_options(&self, site_id: &str, options: HashMap<String, String>) -> Result<()> {
        self.with_sites_mut(|sites| {
            let site = sites
                .get_mut(site_id)
                .ok_or_else(|| AppError::site_not_found(site_id))?;
            site.custom_options.extend(options);
            Ok(())
        })
    }

    fn run_data_dir(&self) -> Option<PathBuf> {
        self.run_data_dir.clone()
    }

    async fn wait_for_database(&self, site: &SiteRecord, timeout: Duration) -> bool {
        if site.service_by_role("mysql").is_none() {
            return true;
        }
        let socket = find_mysql_socket(&site.id, self.run_data_dir.as_deref());
        let port = site.mysql_port();
        let deadline = Instant::now() + timeout;

        loop {
            if database_reachable(socket.as_deref(), port).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DB_POLL_INTERVAL).await;
        }
    }
}
