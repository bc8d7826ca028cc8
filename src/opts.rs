//! Connection options.

use std::path::PathBuf;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::Error;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// SSL connection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Don't use SSL
    Disable,
    /// Require SSL; accept any certificate
    Require,
    /// Require SSL and a certificate chain the system trusts; ignore the hostname
    VerifyCa,
    /// Require SSL, a trusted certificate chain, and a matching hostname
    VerifyFull,
}

impl SslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            _ => Err(Error::InvalidUsage(format!(
                "Invalid sslmode: expected one of ['disable', 'require', 'verify-ca', 'verify-full'], got {}",
                s
            ))),
        }
    }
}

/// Connection options as given by the user.
///
/// Every field is optional; [`Opts::check`] fills the gaps from `PG*`
/// environment variables and validates the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    /// Hostname, IP address, or a directory holding the Unix socket when it
    /// starts with `/`.
    pub host: Option<String>,

    /// Default: `5432`
    pub port: Option<u16>,

    pub user: Option<String>,

    pub password: Option<String>,

    /// Default: server-side default (the user name)
    pub database: Option<String>,

    /// Default: `VerifyFull` over TCP, `Disable` over a Unix socket
    pub ssl_mode: Option<SslMode>,
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    /// `dir` holds the socket file `.s.PGSQL.<port>`.
    Unix { dir: PathBuf, port: u16 },
}

impl Target {
    /// Path of the Unix socket file, if this is a Unix target.
    pub fn socket_path(&self) -> Option<PathBuf> {
        match self {
            Target::Tcp { .. } => None,
            Target::Unix { dir, port } => Some(dir.join(format!(".s.PGSQL.{}", port))),
        }
    }
}

/// Validated options with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOpts {
    pub target: Target,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: SslMode,
}

impl ConnectOpts {
    /// Hostname used for TLS verification.
    pub fn tls_domain(&self) -> &str {
        match &self.target {
            Target::Tcp { host, .. } => host,
            Target::Unix { .. } => "localhost",
        }
    }
}

impl Opts {
    /// Fill defaults from the process environment and validate.
    pub fn check(&self) -> Result<ConnectOpts, Error> {
        self.check_with_env(|name| std::env::var(name).ok())
    }

    /// Fill defaults from `env` and validate.
    ///
    /// `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE` and `PGSSLMODE`
    /// are consulted for fields that are `None`. Unparsable `PGPORT` and
    /// `PGSSLMODE` values are ignored.
    pub fn check_with_env<F>(&self, env: F) -> Result<ConnectOpts, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = self
            .host
            .clone()
            .or_else(|| env("PGHOST"))
            .ok_or_else(|| Error::InvalidUsage("no host specified".into()))?;
        let user = self
            .user
            .clone()
            .or_else(|| env("PGUSER"))
            .ok_or_else(|| Error::InvalidUsage("no user specified".into()))?;
        let port = self
            .port
            .or_else(|| env("PGPORT").and_then(|v| v.parse().ok()))
            .unwrap_or(DEFAULT_PORT);
        let password = self.password.clone().or_else(|| env("PGPASSWORD"));
        let database = self.database.clone().or_else(|| env("PGDATABASE"));
        let ssl_mode = self
            .ssl_mode
            .or_else(|| env("PGSSLMODE").and_then(|v| v.parse().ok()));

        let (target, default_ssl_mode) = if host.starts_with('/') {
            (
                Target::Unix {
                    dir: PathBuf::from(host),
                    port,
                },
                SslMode::Disable,
            )
        } else {
            (Target::Tcp { host, port }, SslMode::VerifyFull)
        };

        Ok(ConnectOpts {
            target,
            user,
            password,
            database,
            ssl_mode: ssl_mode.unwrap_or(default_ssl_mode),
        })
    }
}

fn decode(component: &str, what: &str) -> Result<String, Error> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidUsage(format!("Invalid {} in URL: {}", what, e)))
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@][host][:port][/database][?host=..&user=..&password=..&sslmode=..]`
    ///
    /// The `host`, `user` and `password` query parameters take precedence over
    /// the URL's own components. A URL without a host must name a socket
    /// directory with `?host=/path`.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'postgresql://', got '{}://'",
                url.scheme()
            )));
        }

        let url_host = url.host_str().filter(|h| !h.is_empty());

        let mut opts = Opts {
            host: url_host.map(str::to_string),
            port: url.port(),
            ..Opts::default()
        };

        if !url.username().is_empty() {
            opts.user = Some(decode(url.username(), "user")?);
        }
        if let Some(password) = url.password() {
            opts.password = Some(decode(password, "password")?);
        }
        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            opts.database = Some(decode(path, "database")?);
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "host" => opts.host = Some(value.into_owned()),
                "user" => opts.user = Some(value.into_owned()),
                "password" => opts.password = Some(value.into_owned()),
                "sslmode" => opts.ssl_mode = Some(value.parse()?),
                _ => {
                    tracing::debug!(%key, "ignoring unknown connection parameter");
                }
            }
        }

        if url_host.is_none() && !opts.host.as_deref().is_some_and(|h| h.starts_with('/')) {
            return Err(Error::InvalidUsage(format!(
                "Invalid URL: no host and no ?host=/socket/dir in '{}'",
                url.as_str()
            )));
        }

        if opts.ssl_mode.is_none() {
            opts.ssl_mode = Some(if url_host.is_none() {
                SslMode::Disable
            } else {
                SslMode::VerifyFull
            });
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

impl FromStr for Opts {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}
