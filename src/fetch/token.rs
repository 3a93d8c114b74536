//! Token selection state machine for C2, unit-tested in isolation from any
//! network access.
//!
//! Selects one token per attempt from, in order: `GITHUB_APM_PAT` or
//! `ADO_APM_PAT` (host-family specific), then `GITHUB_TOKEN`, then
//! `~/.apm/config.yml`'s per-host `tokens` table, then none. The first
//! attempt always goes unauthenticated; only an auth-shaped failure triggers
//! a single retry with the strongest available token.

use crate::config::GlobalConfig;
use crate::core::{ApmError, Environment};
use crate::reference::host::HostFamily;
use anyhow::Result;
use std::future::Future;

/// The strongest token available for `family`/`host`, or `None` if none is
/// set anywhere in the environment-variable or global-config chain.
pub fn select_token(family: HostFamily, host: &str, env: &Environment) -> Option<String> {
    let host_specific = if family.is_azure_devops() {
        env.get("ADO_APM_PAT")
    } else {
        env.get("GITHUB_APM_PAT")
    };
    if let Some(token) = host_specific.or_else(|| env.get("GITHUB_TOKEN")) {
        return Some(token.to_string());
    }
    global_config_token(host)
}

/// Last-resort token source: `~/.apm/config.yml`'s `tokens` map. Never hard
/// fails; a missing or unreadable file just means no token from this source.
fn global_config_token(host: &str) -> Option<String> {
    let path = GlobalConfig::default_path().ok()?;
    let config = GlobalConfig::load(&path).ok()?;
    config.token_for(host).map(str::to_string)
}

fn is_auth_shaped(err: &anyhow::Error) -> bool {
    if matches!(err.downcast_ref::<ApmError>(), Some(ApmError::AuthRequired { .. })) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("401") || msg.contains("403") || msg.contains("authentication")
}

/// Run `f` first with no credentials. If it fails with an auth-shaped error
/// and a token is available for `family`/`host`, retry once with that token.
/// A successful unauthenticated attempt short-circuits the retry entirely.
pub async fn with_retry_auth<F, Fut, T>(family: HostFamily, host: &str, env: &Environment, f: F) -> Result<T>
where
    F: Fn(Option<&str>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f(None).await {
        Ok(value) => Ok(value),
        Err(e) if is_auth_shaped(&e) => match select_token(family, host, env) {
            Some(token) => f(Some(&token)).await,
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}
