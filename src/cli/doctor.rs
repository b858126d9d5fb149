//! Environment readiness check.

use crate::config::{load_clients, Settings};
use crate::driver::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability, credentials, the client registry, and the
/// download directory.
pub async fn run() -> Result<()> {
    println!("Harvester Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set HARVESTER_CHROMIUM_PATH."
        ),
    }

    let settings = Settings::from_env();

    // Check credentials
    let creds_ok = settings.credentials_for(None).is_ok();
    if creds_ok {
        println!("[OK] Account credentials configured");
    } else {
        println!("[!!] REPLY_EMAIL / REPLY_PASSWORD not set (per-client overrides may still work)");
    }

    // Check client registry
    match load_clients(&settings.clients_file) {
        Ok(clients) if clients.is_empty() => println!(
            "[!!] Client registry {} is empty or missing",
            settings.clients_file.display()
        ),
        Ok(clients) => println!(
            "[OK] Client registry {} ({} clients)",
            settings.clients_file.display(),
            clients.len()
        ),
        Err(e) => println!("[!!] Client registry unreadable: {e:#}"),
    }

    // Check download directory
    match std::fs::create_dir_all(&settings.download_dir) {
        Ok(()) => println!(
            "[OK] Download directory {} is writable",
            settings.download_dir.display()
        ),
        Err(e) => println!(
            "[!!] Download directory {}: {e}",
            settings.download_dir.display()
        ),
    }

    println!();
    if chromium_path.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
