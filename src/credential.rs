/// Credential persistence: one string under a fixed key.
///
/// Resolution order is an env var override (headless systems, CI), then the
/// OS keychain (macOS Keychain, Windows Credential Manager, Linux Secret
/// Service). The rest of the crate treats the credential as an opaque
/// non-empty string and never interprets its format.
use crate::error::StreamError;

const KEYCHAIN_SERVICE: &str = "ekstream";
const KEYCHAIN_ACCOUNT: &str = "api-key";
pub const ENV_OVERRIDE: &str = "EKSTREAM_API_KEY";

/// Resolve the API credential.
///
/// # Errors
///
/// Returns [`StreamError::Credential`] when neither the env var nor the
/// keychain yields a non-empty value.
pub fn load_credential() -> Result<String, StreamError> {
    if let Ok(value) = std::env::var(ENV_OVERRIDE) {
        if !value.trim().is_empty() {
            tracing::debug!(env_var = ENV_OVERRIDE, "credential resolved from environment");
            return Ok(value);
        }
    }

    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|err| StreamError::Credential(format!("keyring entry creation failed: {err}")))?;
    entry.get_password().map_err(|err| {
        StreamError::Credential(format!(
            "no stored credential ({err}); set {ENV_OVERRIDE} or store one with --set-key"
        ))
    })
}

/// Store the API credential under the fixed key.
///
/// # Errors
///
/// Returns [`StreamError::Credential`] when the value is empty or the
/// keychain write fails.
pub fn save_credential(value: &str) -> Result<(), StreamError> {
    if value.trim().is_empty() {
        return Err(StreamError::Credential(
            "refusing to store an empty credential".to_string(),
        ));
    }
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|err| StreamError::Credential(format!("keyring entry creation failed: {err}")))?;
    entry
        .set_password(value)
        .map_err(|err| StreamError::Credential(format!("keyring set_password failed: {err}")))
}
