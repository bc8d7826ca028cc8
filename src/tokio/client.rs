//! Describe client: connection setup, retry, and `describe`.

use std::future::Future;
use std::io;

use crate::catalog::{BOOTSTRAP_SQL, CatalogLoader, TypeCatalog};
use crate::describe::{self, DescribeCollector, DescribeResult};
use crate::error::{Error, Result};
use crate::opts::{ConnectOpts, Opts, Target};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::FrontendMessage;
use crate::state::auth::Authenticator;

use super::conn::Conn;
use super::stream::Stream;
use super::tls;

/// Retries after the first attempt when opening fails with
/// [`Error::FatalConnection`].
pub const MAX_RETRIES: usize = 5;

/// A connection that has authenticated and loaded the type catalog.
///
/// `describe` takes `&mut self`, so calls on one client never interleave.
#[derive(Debug)]
pub struct Client {
    conn: Conn,
    types: TypeCatalog,
}

impl Client {
    /// Connect using a URL string or [`Opts`].
    ///
    /// Missing options are filled from `PG*` environment variables.
    pub async fn open<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let opts = opts.check()?;
        Self::open_with(&opts, Stream::connect).await
    }

    /// Connect with a custom transport factory.
    ///
    /// `connector` is called once per attempt. Attempts that fail with
    /// [`Error::FatalConnection`] are retried up to [`MAX_RETRIES`] times;
    /// any other error is returned immediately.
    pub async fn open_with<F, Fut>(opts: &ConnectOpts, mut connector: F) -> Result<Self>
    where
        F: FnMut(Target) -> Fut,
        Fut: Future<Output = io::Result<Stream>>,
    {
        let mut retries = 0;
        loop {
            match Self::try_open(opts, &mut connector).await {
                Ok(client) => return Ok(client),
                Err(e) if e.is_retryable() && retries < MAX_RETRIES => {
                    retries += 1;
                    tracing::debug!(attempt = retries + 1, error = %e, "retrying connection");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_open<F, Fut>(opts: &ConnectOpts, connector: &mut F) -> Result<Self>
    where
        F: FnMut(Target) -> Fut,
        Fut: Future<Output = io::Result<Stream>>,
    {
        tracing::debug!(addr = ?opts.target, user = %opts.user, ssl_mode = opts.ssl_mode.as_str(), "connecting");
        let stream = connector(opts.target.clone()).await?;
        let stream = tls::negotiate(stream, opts).await?;
        let mut conn = Conn::new(stream);

        let mut params = vec![("user", opts.user.as_str())];
        if let Some(database) = &opts.database {
            params.push(("database", database.as_str()));
        }
        params.push(("client_encoding", "UTF8"));
        conn.write(FrontendMessage::Startup { params: &params })
            .await?;

        authenticate(&mut conn, opts).await?;
        finish_startup(&mut conn).await?;
        let types = load_types(&mut conn).await?;

        Ok(Self { conn, types })
    }

    /// Parameter and result column types of `sql`, without executing it.
    ///
    /// A statement error comes back as [`Error::Server`] and leaves the
    /// client ready for the next call.
    pub async fn describe(&mut self, sql: &str) -> Result<DescribeResult> {
        for msg in describe::request(sql) {
            self.conn.write(msg).await?;
        }

        let mut collector = DescribeCollector::new(&self.types);
        while let Some(msg) = self.conn.recv().await? {
            if let Err(e) = collector.on_message(msg) {
                self.conn.drain().await?;
                return Err(e);
            }
        }
        Ok(collector.finish())
    }

    /// The type catalog snapshot taken when the client was opened.
    pub fn types(&self) -> &TypeCatalog {
        &self.types
    }

    pub fn is_broken(&self) -> bool {
        self.conn.is_broken()
    }

    /// Send Terminate and release the connection.
    pub async fn close(self) {
        self.conn.close().await;
    }
}

async fn authenticate(conn: &mut Conn, opts: &ConnectOpts) -> Result<()> {
    let mut auth = Authenticator::new(&opts.user, opts.password.as_deref());

    while !auth.is_done() {
        let msg = conn.recv().await?.ok_or_else(|| {
            Error::Protocol("ReadyForQuery before authentication completed".into())
        })?;

        match msg {
            BackendMessage::Authentication(challenge) => {
                tracing::debug!(challenge = challenge.name(), "authentication");
                if let Some(response) = auth.handle(&challenge)? {
                    conn.write(response.as_message()).await?;
                }
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "{} during authentication",
                    other.name()
                )));
            }
        }
    }
    Ok(())
}

/// Consume the messages between AuthenticationOk and ReadyForQuery.
async fn finish_startup(conn: &mut Conn) -> Result<()> {
    while let Some(msg) = conn.recv().await? {
        match msg {
            BackendMessage::ParameterStatus(param) => {
                tracing::debug!(name = %param.name, value = %param.value, "server parameter");
            }
            BackendMessage::BackendKeyData(key) => {
                tracing::debug!(pid = key.process_id, "backend key data");
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "{} during startup",
                    other.name()
                )));
            }
        }
    }
    Ok(())
}

async fn load_types(conn: &mut Conn) -> Result<TypeCatalog> {
    conn.write(FrontendMessage::Query(BOOTSTRAP_SQL)).await?;

    let mut loader = CatalogLoader::new();
    while let Some(msg) = conn.recv().await? {
        loader.on_message(msg)?;
    }
    Ok(loader.finish())
}
