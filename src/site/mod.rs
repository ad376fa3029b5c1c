//! Bridge to the host's site data.
//!
//! The host owns site records; the addon reads paths, services and database
//! credentials from them and writes its own fields into the custom options.

mod registry;
mod socket;
mod types;

pub use registry::{JsonSiteRegistry, SiteRegistry};
pub use socket::find_mysql_socket;
pub use types::{
    DbCredentials, NewSite, SiteRecord, SiteService, CREATED_AT_KEY, LARAVEL_VERSION_KEY,
    SITE_TYPE_KEY, SITE_TYPE_LARAVEL, STARTER_KIT_KEY,
};
