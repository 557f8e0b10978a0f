//! Render proxy configuration text from routing declarations
//!
//! Rendering is a pure projection: the same inputs always produce the
//! same bytes, which is what lets the reconciler skip unchanged configs.

use crate::error::{ProxyError, Result};
use crate::layout::{SiteLayout, https_port_for};
use crate::rules::{
    Handler, HandlerKind, RouteRule, Scheme, Upstream, build_location_rules, config_token_error,
    location_path_error,
};
use crate::service::ServiceRouteTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// Path forwarded to the platform messaging endpoint on every host
pub const RESERVED_CHANNEL_PATH: &str = "/reserved-channel-path";

/// Port of the platform messaging endpoint
pub const DEFAULT_MESSAGING_PORT: u16 = 5280;

/// Port of the platform upload-handling backend
pub const DEFAULT_UPLOAD_PORT: u16 = 6106;

const APP_TEMPLATE: &str = "app.conf";
const LOCATION_TEMPLATE: &str = "location.conf";
const SHARED_TEMPLATE: &str = "shared.conf";
const SERVICE_TEMPLATE: &str = "service.conf";
const MAIN_TEMPLATE: &str = "main.conf";

/// Runtime language of a deployed application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Java,
    Go,
    Php,
}

impl Language {
    /// Whether the application gets a dedicated large-upload pool
    pub fn needs_upload_pool(self) -> bool {
        matches!(self, Language::Java)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
            Language::Go => write!(f, "go"),
            Language::Php => write!(f, "php"),
        }
    }
}

fn default_upload_port() -> u16 {
    DEFAULT_UPLOAD_PORT
}

fn default_messaging_port() -> u16 {
    DEFAULT_MESSAGING_PORT
}

/// Addresses and ports an application is reachable at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    pub public_ip: String,
    pub private_ip: String,
    /// Public HTTP port; the HTTPS port is derived from it
    pub http_port: u16,
    /// Port the application server listens on at `private_ip`
    pub backend_port: u16,
    #[serde(default = "default_upload_port")]
    pub upload_port: u16,
    /// Host of the platform messaging endpoint
    pub messaging_host: String,
    #[serde(default = "default_messaging_port")]
    pub messaging_port: u16,
}

/// Rendered configuration for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub app: String,
    pub text: String,
}

/// Backend pool names of one application
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pools {
    http: String,
    https: String,
    upload: Option<String>,
}

impl Pools {
    fn for_app(app: &str, language: Language) -> Self {
        Self {
            http: format!("nodeplane_{}", app),
            https: format!("nodeplane_ssl_{}", app),
            upload: language
                .needs_upload_pool()
                .then(|| format!("nodeplane_{}_upload", app)),
        }
    }

    fn app_pool(&self, scheme: Scheme) -> &str {
        match scheme {
            Scheme::Http => &self.http,
            Scheme::Https => &self.https,
        }
    }
}

#[derive(Serialize)]
struct LocationView<'a> {
    path: &'a str,
    kind: &'static str,
    alias: Option<String>,
    expiration: Option<&'a str>,
    pool: Option<&'a str>,
}

#[derive(Serialize)]
struct ServiceRouteView<'a> {
    path: &'a str,
    backend: &'a str,
}

/// Renders per-application, per-service and main proxy configuration
pub struct ProxyConfigBuilder {
    tera: Tera,
    layout: SiteLayout,
}

impl ProxyConfigBuilder {
    pub fn new(layout: SiteLayout) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (APP_TEMPLATE, include_str!("../templates/app.conf.tera")),
            (LOCATION_TEMPLATE, include_str!("../templates/location.conf.tera")),
            (SHARED_TEMPLATE, include_str!("../templates/shared.conf.tera")),
            (SERVICE_TEMPLATE, include_str!("../templates/service.conf.tera")),
            (MAIN_TEMPLATE, include_str!("../templates/main.conf.tera")),
        ])?;

        Ok(Self { tera, layout })
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    /// Render the plain and encrypted virtual hosts of `app`
    pub fn build(
        &self,
        app: &str,
        endpoints: &NetworkEndpoints,
        handlers: &[Handler],
        language: Language,
    ) -> Result<ProxyConfig> {
        SiteLayout::validate_name("application", app)?;
        let pools = Pools::for_app(app, language);
        validate_handlers(app, handlers, &pools)?;
        let https_port = https_port_for(endpoints.http_port)?;

        let http_rules = build_location_rules(handlers, Scheme::Http);
        let https_rules = build_location_rules(handlers, Scheme::Https);

        let mut context = Context::new();
        context.insert("app", app);
        context.insert("http_pool", &pools.http);
        context.insert("https_pool", &pools.https);
        context.insert("upload_pool", &pools.upload);
        context.insert(
            "backend",
            &format!("{}:{}", endpoints.private_ip, endpoints.backend_port),
        );
        context.insert(
            "upload_backend",
            &format!("{}:{}", endpoints.private_ip, endpoints.upload_port),
        );
        context.insert("http_port", &endpoints.http_port);
        context.insert("https_port", &https_port);
        context.insert("public_ip", &endpoints.public_ip);
        context.insert(
            "error_log",
            &path_str(&self.layout.log_dir.join(format!("nodeplane-{}.error.log", app))),
        );
        context.insert(
            "cache_dir",
            &path_str(&self.layout.apps_dir.join(app).join("cache")),
        );
        context.insert("cert_path", &path_str(&self.layout.cert_path()));
        context.insert("key_path", &path_str(&self.layout.key_path()));
        context.insert(
            "http_locations",
            &self.render_locations(app, &http_rules, Scheme::Http, &pools)?,
        );
        context.insert(
            "https_locations",
            &self.render_locations(app, &https_rules, Scheme::Https, &pools)?,
        );
        context.insert("shared_locations", &self.render_shared(endpoints, &pools)?);

        let text = self.tera.render(APP_TEMPLATE, &context)?;
        debug!(
            app,
            %language,
            http_rules = http_rules.len(),
            https_rules = https_rules.len(),
            "Rendered application proxy config"
        );

        Ok(ProxyConfig {
            app: app.to_string(),
            text,
        })
    }

    /// Render a platform service file from its route table
    pub fn build_service(&self, table: &ServiceRouteTable) -> Result<String> {
        let routes: Vec<ServiceRouteView<'_>> = table
            .routes
            .iter()
            .map(|(path, backend)| ServiceRouteView { path, backend })
            .collect();

        let mut context = Context::new();
        context.insert("listen_port", &table.listen_port);
        context.insert("cert_path", &path_str(&self.layout.cert_path()));
        context.insert("key_path", &path_str(&self.layout.key_path()));
        context.insert(
            "error_log",
            &path_str(&self.layout.log_dir.join(format!("{}.error.log", table.service))),
        );
        context.insert("routes", &routes);

        Ok(self.tera.render(SERVICE_TEMPLATE, &context)?)
    }

    /// Render the main configuration including every site file
    pub fn build_main(&self) -> Result<String> {
        let mut context = Context::new();
        context.insert("root", &path_str(&self.layout.root));
        context.insert("log_dir", &path_str(&self.layout.log_dir));
        context.insert("sites_enabled", &path_str(&self.layout.sites_enabled));

        Ok(self.tera.render(MAIN_TEMPLATE, &context)?)
    }

    fn render_locations(
        &self,
        app: &str,
        rules: &[RouteRule],
        scheme: Scheme,
        pools: &Pools,
    ) -> Result<String> {
        let mut blocks = Vec::with_capacity(rules.len());

        for rule in rules {
            let view = match &rule.target {
                Upstream::StaticFiles { dir, expiration } => LocationView {
                    path: &rule.path_pattern,
                    kind: "static",
                    alias: Some(path_str(&self.layout.apps_dir.join(app).join("app").join(dir))),
                    expiration: expiration.as_deref(),
                    pool: None,
                },
                Upstream::AppBackend => LocationView {
                    path: &rule.path_pattern,
                    kind: "proxy",
                    alias: None,
                    expiration: None,
                    pool: Some(pools.app_pool(scheme)),
                },
                Upstream::UploadBackend => LocationView {
                    path: &rule.path_pattern,
                    kind: "proxy",
                    alias: None,
                    expiration: None,
                    pool: pools.upload.as_deref(),
                },
            };

            let rendered = self
                .tera
                .render(LOCATION_TEMPLATE, &Context::from_serialize(&view)?)?;
            blocks.push(rendered.trim_end().to_string());
        }

        let mut text = blocks.join("\n\n");
        text.push('\n');
        Ok(text)
    }

    fn render_shared(&self, endpoints: &NetworkEndpoints, pools: &Pools) -> Result<String> {
        let mut context = Context::new();
        context.insert("upload_pool", &pools.upload);
        context.insert("channel_path", RESERVED_CHANNEL_PATH);
        context.insert(
            "channel_backend",
            &format!("{}:{}", endpoints.messaging_host, endpoints.messaging_port),
        );

        let mut text = self.tera.render(SHARED_TEMPLATE, &context)?.trim_end().to_string();
        text.push('\n');
        Ok(text)
    }
}

fn validate_handlers(app: &str, handlers: &[Handler], pools: &Pools) -> Result<()> {
    for handler in handlers {
        let invalid = |reason: &str| ProxyError::InvalidHandler {
            app: app.to_string(),
            url: handler.url.clone(),
            reason: reason.to_string(),
        };

        if let Some(reason) = location_path_error(&handler.url) {
            return Err(invalid(reason));
        }
        if handler.url == RESERVED_CHANNEL_PATH {
            return Err(invalid("url is reserved for the messaging endpoint"));
        }
        match &handler.kind {
            HandlerKind::Static { dir, expiration } => {
                if dir.split('/').any(|part| part == "..") {
                    return Err(invalid("static dir must stay inside the application"));
                }
                if let Some(reason) = config_token_error(dir).filter(|_| !dir.is_empty()) {
                    return Err(invalid(&format!("static dir {}", reason)));
                }
                if let Some(reason) = expiration.as_deref().and_then(config_token_error) {
                    return Err(invalid(&format!("expiration {}", reason)));
                }
            }
            HandlerKind::Upload if pools.upload.is_none() => {
                return Err(invalid("language has no upload backend"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
