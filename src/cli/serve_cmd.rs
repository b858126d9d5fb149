//! `harvester serve` — start the HTTP/SSE API.

use crate::config::Settings;
use crate::server;
use anyhow::Result;

/// Run the serve command.
pub async fn run(port: u16) -> Result<()> {
    let settings = Settings::from_env();
    server::start(port, settings).await
}
