//! `harvester workspaces` — list the workspaces visible to the account.

use crate::acquisition::clock::SystemClock;
use crate::config::Settings;
use crate::driver::chromium::ChromiumDriver;
use crate::session;
use anyhow::Result;

/// Run the workspaces command.
pub async fn run(no_headless: bool) -> Result<()> {
    let mut settings = Settings::from_env();
    if no_headless {
        settings.headless = false;
    }
    let creds = settings.credentials_for(None)?;

    let staging = std::env::temp_dir().join("harvester-workspaces");
    let driver = ChromiumDriver::launch(settings.headless, &staging).await?;
    let clock = SystemClock;

    let result = async {
        session::login(&driver, &clock, &creds).await?;
        session::fetch_workspaces(&driver, &clock).await
    }
    .await;
    let _ = driver.shutdown().await;

    let workspaces = result?;
    if workspaces.is_empty() {
        println!("No workspaces found for this account.");
        return Ok(());
    }

    println!("{:>10}  NAME", "TEAM ID");
    for workspace in workspaces {
        println!("{:>10}  {}", workspace.team_id, workspace.name);
    }
    Ok(())
}
