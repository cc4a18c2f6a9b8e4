use anyhow::{Context, Result};
use keyring::Entry;
use std::path::PathBuf;
use std::time::Duration;

const KEYRING_SERVICE: &str = "sales_advisor_llm_api_key";
const KEYRING_USER: &str = "llm";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const STORE_FILE_NAME: &str = "sales-advisor.sqlite";

// Model metadata written with every persisted prompt. The LLM service does not
// report these, so fixed values are recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptDefaults {
    pub model_name: String,
    pub temperature: f64,
    pub token_usage: i64,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            model_name: "llama3.2:latest".to_string(),
            temperature: 1.0,
            token_usage: 100,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    /// Backend root; endpoints live under `{api_base_url}/api/v1`.
    pub api_base_url: String,
    pub llm_api_base_url: String,
    /// Where to find the LLM API key: `env:VAR_NAME`, `keyring`, or unset.
    pub llm_api_key_ref: Option<String>,
    pub request_timeout: Duration,
    pub store_path: PathBuf,
    pub prompt_defaults: PromptDefaults,
}

impl AdvisorConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    ///
    /// `ADVISOR_API_URL` and `ADVISOR_LLM_API_URL` are required; everything
    /// else has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("Missing required setting '{}'", key))
        };

        let api_base_url = required("ADVISOR_API_URL")?;
        let llm_api_base_url = required("ADVISOR_LLM_API_URL")?;

        let request_timeout = match lookup("ADVISOR_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid ADVISOR_TIMEOUT_SECS '{}'", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let store_path = match lookup("ADVISOR_STORE_PATH") {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .context("Could not determine a local data directory; set ADVISOR_STORE_PATH")?
                .join("sales-advisor")
                .join(STORE_FILE_NAME),
        };

        let mut prompt_defaults = PromptDefaults::default();
        if let Some(name) = lookup("ADVISOR_MODEL_NAME") {
            prompt_defaults.model_name = name;
        }
        if let Some(raw) = lookup("ADVISOR_TEMPERATURE") {
            prompt_defaults.temperature = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid ADVISOR_TEMPERATURE '{}'", raw))?;
        }
        if let Some(raw) = lookup("ADVISOR_TOKEN_USAGE") {
            prompt_defaults.token_usage = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid ADVISOR_TOKEN_USAGE '{}'", raw))?;
        }

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            llm_api_base_url: llm_api_base_url.trim_end_matches('/').to_string(),
            llm_api_key_ref: lookup("ADVISOR_LLM_API_KEY_REF").filter(|r| !r.trim().is_empty()),
            request_timeout,
            store_path,
            prompt_defaults,
        })
    }
}

// --- API Key Retrieval ---

/// Resolves the LLM API key reference. `None` means the service is called
/// without credentials.
pub fn get_api_key(key_ref: Option<&str>) -> Result<Option<String>> {
    match key_ref {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).map(Some).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))
        }
        Some("keyring") => {
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
                .context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for service: {}", KEYRING_SERVICE);
            entry
                .get_password()
                .map(Some)
                .context("Failed to get LLM API key from keyring. Please store it first.")
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api key reference format: {}", other)),
        None => Ok(None),
    }
}

/// Stores the LLM API key in the OS keyring.
pub fn set_api_key_in_keyring(api_key: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring for service: {}", KEYRING_SERVICE);
    entry
        .set_password(api_key)
        .context("Failed to set LLM API key in keyring")
}
