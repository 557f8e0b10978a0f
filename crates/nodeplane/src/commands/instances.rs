use crate::runtime::{Runtime, load_credentials};
use colored::Colorize;
use nodeplane_cloud::{InstanceRecord, RoleAssignment};
use std::path::Path;
use tokio::sync::watch;
use tracing::warn;

pub async fn spawn(
    runtime: &Runtime,
    count: usize,
    credentials: &Path,
    roles: Vec<String>,
    disks: Vec<String>,
) -> anyhow::Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    if disks.len() > count {
        anyhow::bail!("{} disks given for {} instances", disks.len(), count);
    }

    let credentials = load_credentials(credentials)?;
    let roles = role_assignment(roles);
    let disks = pad_disks(disks, count);

    // Ctrl-C stops the guard and the poll loop instead of killing mid-call
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling provisioning");
            let _ = shutdown_tx.send(true);
        }
    });

    let provisioner = runtime.provisioner(shutdown_rx)?;
    println!(
        "{}",
        format!("Spawning {} instance(s) via {}...", count, provisioner.client().endpoint()).blue()
    );

    let records = provisioner.spawn(count, &credentials, roles, &disks).await?;

    println!("{}", format!("✓ {} instance(s) running", records.len()).green());
    print_records(&records);
    Ok(())
}

pub async fn terminate(runtime: &Runtime, credentials: &Path, ids: Vec<String>) -> anyhow::Result<()> {
    let credentials = load_credentials(credentials)?;
    let client = runtime.client(None)?;

    println!("{}", format!("Terminating {}...", ids.join(", ")).blue());
    let result = client.terminate_instances(&credentials, ids).await?;

    println!("{}", "✓ Terminate requested".green());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn attach_disk(
    runtime: &Runtime,
    credentials: &Path,
    disk: &str,
    instance: &str,
) -> anyhow::Result<()> {
    let credentials = load_credentials(credentials)?;
    let client = runtime.client(None)?;

    let location = client.attach_disk(&credentials, disk, instance).await?;

    println!(
        "{}",
        format!("✓ Disk {} attached to {} at {}", disk, instance, location).green()
    );
    Ok(())
}

pub async fn queues(runtime: &Runtime) -> anyhow::Result<()> {
    let client = runtime.client(None)?;
    let queues = client.queues_in_use().await?;
    println!("{}", serde_json::to_string_pretty(&queues)?);
    Ok(())
}

fn role_assignment(mut roles: Vec<String>) -> RoleAssignment {
    if roles.len() == 1 {
        RoleAssignment::Broadcast(roles.remove(0))
    } else {
        RoleAssignment::PerInstance(roles)
    }
}

fn pad_disks(disks: Vec<String>, count: usize) -> Vec<Option<String>> {
    let mut padded: Vec<Option<String>> = disks.into_iter().map(Some).collect();
    padded.resize(count, None);
    padded
}

fn print_records(records: &[InstanceRecord]) {
    println!();
    println!(
        "  {:<20} {:<16} {:<16} {:<12} {}",
        "INSTANCE".bold(),
        "PUBLIC IP".bold(),
        "PRIVATE IP".bold(),
        "ROLE".bold(),
        "DISK".bold()
    );
    for record in records {
        println!(
            "  {:<20} {:<16} {:<16} {:<12} {}",
            record.instance_id.cyan(),
            record.public_ip,
            record.private_ip,
            record.role,
            record.disk.as_deref().unwrap_or("-").dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_role_is_broadcast() {
        assert_eq!(
            role_assignment(vec!["appengine".to_string()]),
            RoleAssignment::Broadcast("appengine".to_string())
        );
        assert!(matches!(
            role_assignment(vec!["database".to_string(), "taskqueue".to_string()]),
            RoleAssignment::PerInstance(roles) if roles.len() == 2
        ));
    }

    #[test]
    fn test_pad_disks() {
        assert_eq!(
            pad_disks(vec!["disk-a".to_string()], 3),
            vec![Some("disk-a".to_string()), None, None]
        );
        assert_eq!(pad_disks(Vec::new(), 2), vec![None, None]);
    }
}
