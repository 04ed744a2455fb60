use anyhow::{anyhow, Context, Result};
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_types::region::Region;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::app::error::QueryError;

/// Placeholder replaced by the environment name in the authentication command
pub const ENVIRONMENT_PLACEHOLDER: &str = "{env}";

/// Substitute the environment into an authentication command
pub fn authentication_command_for(command: &str, environment: &str) -> String {
    command.replace(ENVIRONMENT_PLACEHOLDER, environment)
}

/// Where a cached config got its credentials from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Shared config/credentials profile named after the environment
    Profile,
    /// `AWS_ACCESS_KEY_ID` and friends
    EnvironmentVariables,
}

#[derive(Debug, Clone)]
struct CachedConfig {
    config: SdkConfig,
    source: CredentialSource,
}

/// Coordinator for SDK configs across environments and regions.
///
/// An environment is the name of an AWS profile. Configs are validated with STS
/// `GetCallerIdentity` before use and cached per `(environment, region)`.
#[derive(Debug, Clone)]
pub struct CredentialCoordinator {
    /// Cache of validated configs per (environment, region)
    config_cache: Arc<RwLock<HashMap<(String, String), CachedConfig>>>,
    /// Shell command run before loading a profile, e.g. an SSO login helper
    authentication_command: Option<String>,
}

impl CredentialCoordinator {
    pub fn new(authentication_command: Option<String>) -> Self {
        Self {
            config_cache: Arc::new(RwLock::new(HashMap::new())),
            authentication_command: authentication_command
                .filter(|command| !command.trim().is_empty()),
        }
    }

    /// Get a validated SDK config for an environment in a region
    pub async fn sdk_config(
        &self,
        environment: &str,
        region: &str,
    ) -> Result<SdkConfig, QueryError> {
        let key = (environment.to_string(), region.to_string());

        if let Some(cached) = self.get_cached_config(&key).await {
            if validate(&cached.config).await.is_ok() {
                debug!(
                    "Using cached {:?} credentials for {} in {}",
                    cached.source, environment, region
                );
                return Ok(cached.config);
            }
            debug!(
                "Cached credentials for {} in {} no longer valid",
                environment, region
            );
        }

        let cached = self
            .load_fresh_config(environment, region)
            .await
            .map_err(|e| QueryError::Credentials {
                environment: environment.to_string(),
                region: region.to_string(),
                message: QueryError::remote_message(&e),
            })?;

        info!(
            "Authenticated {} in {} using {:?} credentials",
            environment, region, cached.source
        );
        let config = cached.config.clone();
        self.config_cache.write().await.insert(key, cached);
        Ok(config)
    }

    async fn get_cached_config(&self, key: &(String, String)) -> Option<CachedConfig> {
        let cache = self.config_cache.read().await;
        cache.get(key).cloned()
    }

    async fn load_fresh_config(&self, environment: &str, region: &str) -> Result<CachedConfig> {
        if let Some(command) = &self.authentication_command {
            run_authentication_command(&authentication_command_for(command, environment))
                .await
                .with_context(|| format!("Authentication command failed for {}", environment))?;
        }

        let profile_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(environment)
            .region(Region::new(region.to_string()))
            .load()
            .await;

        match validate(&profile_config).await {
            Ok(()) => {
                return Ok(CachedConfig {
                    config: profile_config,
                    source: CredentialSource::Profile,
                })
            }
            Err(e) => warn!(
                "Profile {} rejected in {}: {:#}, trying environment variables",
                environment, region, e
            ),
        }

        let env_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(EnvironmentVariableCredentialsProvider::new())
            .load()
            .await;

        validate(&env_config)
            .await
            .map(|()| CachedConfig {
                config: env_config,
                source: CredentialSource::EnvironmentVariables,
            })
            .with_context(|| format!("Could not find credentials for {}", environment))
    }
}

/// Check credentials with STS GetCallerIdentity
async fn validate(config: &SdkConfig) -> Result<()> {
    let identity = aws_sdk_sts::Client::new(config)
        .get_caller_identity()
        .send()
        .await
        .context("GetCallerIdentity failed")?;
    debug!("Credentials valid for {}", identity.arn().unwrap_or("unknown"));
    Ok(())
}

/// Run the authentication command through the platform shell and wait for it
async fn run_authentication_command(command: &str) -> Result<()> {
    info!("Running authentication command: {}", command);

    let mut process = if cfg!(windows) {
        let mut process = tokio::process::Command::new("cmd");
        process.arg("/C").arg(command);
        process
    } else {
        let mut process = tokio::process::Command::new("sh");
        process.arg("-c").arg(command);
        process
    };

    let output = process
        .output()
        .await
        .with_context(|| format!("Failed to spawn '{}'", command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "'{}' exited with {}: {}",
            command,
            output.status,
            stderr.trim()
        ));
    }
    Ok(())
}
