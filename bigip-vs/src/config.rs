//! Connection configuration for the BIG-IP device.
//!
//! Every parameter can be given on the command line or through the
//! `F5_*` environment variables used by the F5 tooling.

use std::time::Duration;

use clap::builder::BoolishValueParser;

/// Default administrative partition.
pub const DEFAULT_PARTITION: &str = "Common";

/// Default login provider for token authentication.
pub const DEFAULT_AUTH_PROVIDER: &str = "tmos";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server: String,
    pub server_port: u16,
    pub user: String,
    pub password: String,
    pub validate_certs: bool,
    pub auth_provider: String,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(server: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            server_port: 443,
            user: user.into(),
            password: password.into(),
            validate_certs: true,
            auth_provider: DEFAULT_AUTH_PROVIDER.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Base URL of the management interface.
    ///
    /// A server given with an explicit scheme is used verbatim and the port
    /// setting is ignored.
    pub fn base_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            return server.to_string();
        }
        if server.contains(':') && !server.starts_with('[') {
            format!("https://[{}]:{}", server, self.server_port)
        } else {
            format!("https://{}:{}", server, self.server_port)
        }
    }
}

/// Command line / environment arguments for the device connection.
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// BIG-IP management host (or full base URL)
    #[arg(long, env = "F5_SERVER")]
    pub server: String,

    /// BIG-IP management port
    #[arg(long, env = "F5_SERVER_PORT", default_value_t = 443)]
    pub server_port: u16,

    /// Username
    #[arg(long, env = "F5_USER")]
    pub user: String,

    /// Password
    #[arg(long, env = "F5_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Validate the device TLS certificate
    #[arg(
        long,
        env = "F5_VALIDATE_CERTS",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub validate_certs: bool,

    /// Login provider used for token authentication
    #[arg(long, env = "F5_AUTH_PROVIDER", default_value = DEFAULT_AUTH_PROVIDER)]
    pub auth_provider: String,

    /// Timeout per device call in seconds
    #[arg(
        long,
        env = "F5_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,
}

impl From<ConnectionArgs> for ConnectionConfig {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            server: args.server,
            server_port: args.server_port,
            user: args.user,
            password: args.password,
            validate_certs: args.validate_certs,
            auth_provider: args.auth_provider,
            timeout: Duration::from_secs(args.timeout),
        }
    }
}
