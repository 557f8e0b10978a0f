use crate::manifest::RoutingManifest;
use crate::runtime::Runtime;
use colored::Colorize;
use nodeplane_proxy::ProxyConfig;
use std::path::Path;

fn build(runtime: &Runtime, app: &str, manifest: &Path) -> anyhow::Result<ProxyConfig> {
    let manifest = RoutingManifest::load(manifest)?;
    let endpoints = manifest.network_endpoints(&runtime.config.proxy)?;
    let config = runtime
        .builder()?
        .build(app, &endpoints, &manifest.handlers, manifest.language)?;
    Ok(config)
}

pub fn render(runtime: &Runtime, app: &str, manifest: &Path) -> anyhow::Result<()> {
    let config = build(runtime, app, manifest)?;
    print!("{}", config.text);
    Ok(())
}

pub async fn apply(runtime: &Runtime, app: &str, manifest: &Path) -> anyhow::Result<()> {
    let config = build(runtime, app, manifest)?;
    let reconciler = runtime.reconciler()?;

    if reconciler.apply_config(&config).await? {
        println!("{}", format!("✓ Applied proxy config for {}", app).green());
    } else {
        println!("{}", format!("Proxy config for {} is up to date", app).dimmed());
    }
    Ok(())
}

pub async fn remove(runtime: &Runtime, app: &str) -> anyhow::Result<()> {
    if runtime.reconciler()?.remove_application(app).await? {
        println!("{}", format!("✓ Removed proxy config for {}", app).green());
    } else {
        println!("{}", format!("No proxy config for {}", app).dimmed());
    }
    Ok(())
}

pub async fn add_service(
    runtime: &Runtime,
    service: &str,
    host: &str,
    port: u16,
    listen_port: u16,
    path: &str,
) -> anyhow::Result<()> {
    let table = runtime
        .reconciler()?
        .register_service_route(service, host, port, listen_port, path)
        .await?;

    println!(
        "{}",
        format!("✓ {} on :{} now routes", service, table.listen_port).green()
    );
    for (path, backend) in &table.routes {
        println!("  {} → {}", path.cyan(), backend);
    }
    Ok(())
}

pub async fn init(runtime: &Runtime) -> anyhow::Result<()> {
    runtime.reconciler()?.initialize().await?;
    println!("{}", "✓ Proxy initialized".green());
    Ok(())
}

pub async fn clear(runtime: &Runtime) -> anyhow::Result<()> {
    let removed = runtime.reconciler()?.clear_sites_enabled().await?;
    println!(
        "{}",
        format!("✓ Removed {} application config(s)", removed).green()
    );
    Ok(())
}
