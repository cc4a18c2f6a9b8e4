// Declare the modules
pub mod admin;
pub mod advisor;
pub mod api;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod models;
pub mod notify;
pub mod session;
pub mod state;
pub mod storage;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use advisor::Advisor;
pub use chat::SendOutcome;
pub use config::AdvisorConfig;
pub use error::{AdvisorError, AdvisorResult};

use anyhow::Context;

pub fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let config = AdvisorConfig::from_env()?;
    log::info!(
        "Starting sales advisor against {} (LLM service {})",
        config.api_base_url,
        config.llm_api_base_url
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let advisor = Advisor::from_config(&config).await?;
        if let Err(e) = advisor.restore_identity().await {
            log::error!("Failed to restore saved identity: {}", e);
        }
        cli::run_repl(advisor).await
    })
}
