//! Controller configuration, read once from the environment at startup.
use models::constants::{
    CONTROLLER_INTERNAL_PORT, CREDENTIALS_SECRET_NAME, CREDENTIALS_SECRET_NAMESPACE,
    NETWORK_MANIFEST_URL,
};

use snafu::ResultExt;
use std::env;
use std::fmt;
use std::str::FromStr;
use tokio::time::Duration;
use tracing::{event, Level};

// Cloud settings, named the way the Azure SDKs name them.
const AZURE_ENVIRONMENT_ENV_VAR: &str = "AZURE_ENVIRONMENT";
const AZURE_TENANT_ID_ENV_VAR: &str = "AZURE_TENANT_ID";
const AZURE_SUBSCRIPTION_ID_ENV_VAR: &str = "AZURE_SUBSCRIPTION_ID";
const AZURE_CLIENT_ID_ENV_VAR: &str = "AZURE_CLIENT_ID";
const AZURE_CLIENT_SECRET_ENV_VAR: &str = "AZURE_CLIENT_SECRET";

const WATCH_NAMESPACE_ENV_VAR: &str = "WATCH_NAMESPACE";
const CREDENTIALS_SECRET_NAME_ENV_VAR: &str = "CREDENTIALS_SECRET_NAME";
const CREDENTIALS_SECRET_NAMESPACE_ENV_VAR: &str = "CREDENTIALS_SECRET_NAMESPACE";
const NETWORK_MANIFEST_URL_ENV_VAR: &str = "NETWORK_MANIFEST_URL";
const METRICS_PORT_ENV_VAR: &str = "METRICS_PORT";
const REQUEUE_NOT_READY_SECS_ENV_VAR: &str = "REQUEUE_NOT_READY_SECS";
const REQUEUE_ERROR_SECS_ENV_VAR: &str = "REQUEUE_ERROR_SECS";
const RESYNC_SECS_ENV_VAR: &str = "RESYNC_SECS";

const DEFAULT_AZURE_ENVIRONMENT: &str = "AzurePublicCloud";
const DEFAULT_REQUEUE_NOT_READY: Duration = Duration::from_secs(30);
const DEFAULT_REQUEUE_ERROR: Duration = Duration::from_secs(10);
const DEFAULT_RESYNC: Duration = Duration::from_secs(300);

/// The module-wide result type.
type Result<T> = std::result::Result<T, config_error::Error>;

/// Cloud identity embedded into every worker's cloud provider config.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct CloudSettings {
    pub environment: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for CloudSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudSettings")
            .field("environment", &self.environment)
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl CloudSettings {
    pub fn from_environment() -> Self {
        let required = |variable: &str| {
            env::var(variable).unwrap_or_else(|_| {
                event!(
                    Level::WARN,
                    variable,
                    "Cloud setting is unset; provisioned clusters will lack cloud provider access."
                );
                String::new()
            })
        };

        CloudSettings {
            environment: env::var(AZURE_ENVIRONMENT_ENV_VAR)
                .unwrap_or_else(|_| DEFAULT_AZURE_ENVIRONMENT.to_string()),
            tenant_id: required(AZURE_TENANT_ID_ENV_VAR),
            subscription_id: required(AZURE_SUBSCRIPTION_ID_ENV_VAR),
            client_id: required(AZURE_CLIENT_ID_ENV_VAR),
            client_secret: required(AZURE_CLIENT_SECRET_ENV_VAR),
        }
    }
}

/// Location of a secret in the management cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

/// When to run the next pass for a worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RequeuePolicy {
    /// After a pass that found the remote cluster not yet reachable.
    pub not_ready: Duration,
    /// After any other failed pass.
    pub error: Duration,
    /// After a successful pass.
    pub resync: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        RequeuePolicy {
            not_ready: DEFAULT_REQUEUE_NOT_READY,
            error: DEFAULT_REQUEUE_ERROR,
            resync: DEFAULT_RESYNC,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    pub cloud: CloudSettings,
    /// Restricts the controller to one namespace. All namespaces when `None`.
    pub watch_namespace: Option<String>,
    /// Operator credentials copied into each remote cluster.
    pub credentials: SecretRef,
    /// Network plugin manifest applied to each remote cluster.
    pub network_manifest_url: String,
    pub metrics_port: u16,
    pub requeue: RequeuePolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            cloud: CloudSettings::default(),
            watch_namespace: None,
            credentials: SecretRef {
                namespace: CREDENTIALS_SECRET_NAMESPACE.to_string(),
                name: CREDENTIALS_SECRET_NAME.to_string(),
            },
            network_manifest_url: NETWORK_MANIFEST_URL.to_string(),
            metrics_port: CONTROLLER_INTERNAL_PORT,
            requeue: RequeuePolicy::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_environment() -> Result<Self> {
        let defaults = Self::default();

        let requeue = RequeuePolicy {
            not_ready: seconds_from_env(REQUEUE_NOT_READY_SECS_ENV_VAR)?
                .unwrap_or(defaults.requeue.not_ready),
            error: seconds_from_env(REQUEUE_ERROR_SECS_ENV_VAR)?
                .unwrap_or(defaults.requeue.error),
            resync: seconds_from_env(RESYNC_SECS_ENV_VAR)?.unwrap_or(defaults.requeue.resync),
        };

        Ok(ControllerConfig {
            cloud: CloudSettings::from_environment(),
            watch_namespace: env::var(WATCH_NAMESPACE_ENV_VAR)
                .ok()
                .filter(|namespace| !namespace.is_empty()),
            credentials: SecretRef {
                namespace: env::var(CREDENTIALS_SECRET_NAMESPACE_ENV_VAR)
                    .unwrap_or(defaults.credentials.namespace),
                name: env::var(CREDENTIALS_SECRET_NAME_ENV_VAR)
                    .unwrap_or(defaults.credentials.name),
            },
            network_manifest_url: env::var(NETWORK_MANIFEST_URL_ENV_VAR)
                .unwrap_or(defaults.network_manifest_url),
            metrics_port: parse_from_env(METRICS_PORT_ENV_VAR)?.unwrap_or(defaults.metrics_port),
            requeue,
        })
    }
}

fn parse_from_env<T>(variable: &'static str) -> Result<Option<T>>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    env::var(variable)
        .ok()
        .map(|value| {
            value
                .parse()
                .context(config_error::InvalidNumberSnafu { variable, value: value.clone() })
        })
        .transpose()
}

fn seconds_from_env(variable: &'static str) -> Result<Option<Duration>> {
    Ok(parse_from_env::<u64>(variable)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        AZURE_ENVIRONMENT_ENV_VAR,
        AZURE_TENANT_ID_ENV_VAR,
        AZURE_SUBSCRIPTION_ID_ENV_VAR,
        AZURE_CLIENT_ID_ENV_VAR,
        AZURE_CLIENT_SECRET_ENV_VAR,
        WATCH_NAMESPACE_ENV_VAR,
        CREDENTIALS_SECRET_NAME_ENV_VAR,
        CREDENTIALS_SECRET_NAMESPACE_ENV_VAR,
        NETWORK_MANIFEST_URL_ENV_VAR,
        METRICS_PORT_ENV_VAR,
        REQUEUE_NOT_READY_SECS_ENV_VAR,
        REQUEUE_ERROR_SECS_ENV_VAR,
        RESYNC_SECS_ENV_VAR,
    ];

    #[test]
    fn test_from_environment() {
        // These would normally be separate unit tests for each case, but since
        // they rely on environment variables as input they are done sequentally
        // here.
        for variable in ALL_VARS {
            env::remove_var(variable);
        }

        // Defaults
        let config = ControllerConfig::from_environment().unwrap();
        assert_eq!(config.cloud.environment, "AzurePublicCloud");
        assert_eq!(config.cloud.tenant_id, "");
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.credentials.name, "capz-manager-bootstrap-credentials");
        assert_eq!(config.credentials.namespace, "capz-system");
        assert_eq!(config.network_manifest_url, NETWORK_MANIFEST_URL);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.requeue, RequeuePolicy::default());

        // Everything overridden
        env::set_var(AZURE_ENVIRONMENT_ENV_VAR, "AzureChinaCloud");
        env::set_var(AZURE_TENANT_ID_ENV_VAR, "tenant");
        env::set_var(AZURE_SUBSCRIPTION_ID_ENV_VAR, "subscription");
        env::set_var(AZURE_CLIENT_ID_ENV_VAR, "client");
        env::set_var(AZURE_CLIENT_SECRET_ENV_VAR, "secret");
        env::set_var(WATCH_NAMESPACE_ENV_VAR, "workers");
        env::set_var(CREDENTIALS_SECRET_NAME_ENV_VAR, "creds");
        env::set_var(CREDENTIALS_SECRET_NAMESPACE_ENV_VAR, "ops");
        env::set_var(NETWORK_MANIFEST_URL_ENV_VAR, "https://example.com/cni.yaml");
        env::set_var(METRICS_PORT_ENV_VAR, "9090");
        env::set_var(REQUEUE_NOT_READY_SECS_ENV_VAR, "5");
        env::set_var(REQUEUE_ERROR_SECS_ENV_VAR, "1");
        env::set_var(RESYNC_SECS_ENV_VAR, "60");

        let config = ControllerConfig::from_environment().unwrap();
        assert_eq!(
            config.cloud,
            CloudSettings {
                environment: "AzureChinaCloud".to_string(),
                tenant_id: "tenant".to_string(),
                subscription_id: "subscription".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            }
        );
        assert!(!format!("{:?}", config.cloud).contains("secret\""));
        assert_eq!(config.watch_namespace.as_deref(), Some("workers"));
        assert_eq!(
            config.credentials,
            SecretRef {
                namespace: "ops".to_string(),
                name: "creds".to_string()
            }
        );
        assert_eq!(config.network_manifest_url, "https://example.com/cni.yaml");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(
            config.requeue,
            RequeuePolicy {
                not_ready: Duration::from_secs(5),
                error: Duration::from_secs(1),
                resync: Duration::from_secs(60),
            }
        );

        // Malformed numbers
        env::set_var(METRICS_PORT_ENV_VAR, "http");
        assert!(ControllerConfig::from_environment().is_err());
        env::set_var(METRICS_PORT_ENV_VAR, "9090");
        env::set_var(RESYNC_SECS_ENV_VAR, "-1");
        assert!(ControllerConfig::from_environment().is_err());

        // An empty namespace means all namespaces
        env::set_var(RESYNC_SECS_ENV_VAR, "60");
        env::set_var(WATCH_NAMESPACE_ENV_VAR, "");
        assert_eq!(ControllerConfig::from_environment().unwrap().watch_namespace, None);

        for variable in ALL_VARS {
            env::remove_var(variable);
        }
    }
}

pub mod config_error {
    use snafu::Snafu;
    use std::num::ParseIntError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display(
            "Environment variable '{}={}' is not a valid number: '{}'",
            variable,
            value,
            source
        ))]
        InvalidNumber {
            variable: String,
            value: String,
            source: ParseIntError,
        },
    }
}
