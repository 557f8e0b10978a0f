//! nodeplane reverse-proxy configuration
//!
//! Turns an application's handler declarations into nginx site files and
//! keeps the files under the sites directory in line with them.
//!
//! ```text
//! handlers ─► rules::build_location_rules ─► ProxyConfigBuilder ─► text
//!                                                                   │
//!                        ProxyDaemon ◄── ProxyReconciler::apply ◄───┘
//! ```

pub mod builder;
pub mod daemon;
pub mod error;
mod files;
pub mod layout;
pub mod reconciler;
pub mod rules;
pub mod service;

// Re-exports
pub use builder::{
    DEFAULT_MESSAGING_PORT, DEFAULT_UPLOAD_PORT, Language, NetworkEndpoints, ProxyConfig,
    ProxyConfigBuilder, RESERVED_CHANNEL_PATH,
};
pub use daemon::{DEFAULT_NGINX_BINARY, NginxDaemon, ProxyDaemon};
pub use error::{ProxyError, Result};
pub use layout::{SiteLayout, app_listen_port, https_port_for};
pub use reconciler::ProxyReconciler;
pub use rules::{
    Handler, HandlerKind, RouteRule, Scheme, SecurePartition, SecurePolicy, Upstream,
    build_location_rules, classify,
};
pub use service::{ROUTE_TABLE_VERSION, ServiceRouteTable};
