//! The callback leg of the authorization-code flow.
//!
//! Google redirects the user's browser back to the registered redirect URI with either `code` and
//! `state`, or `error` and `error_description`. [`CallbackParams`] is that query string, and
//! [`listen`] is a one-shot local HTTP server that captures it for installed (CLI) use.

use crate::{Error, Result};
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body};
use oauth2::AuthorizationCode;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

const DONE_HTML: &str = "<!doctype html><html><body>\
    <h1>YouTube account connected</h1><p>You can close this window.</p></body></html>";

const DENIED_HTML: &str = "<!doctype html><html><body>\
    <h1>Authorization was not completed</h1><p>You can close this window.</p></body></html>";

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// Space-separated scopes the user actually granted.
    pub scope: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            let v = Some(v.into_owned());
            match &*k {
                "code" => params.code = v,
                "state" => params.state = v,
                "error" => params.error = v,
                "error_description" => params.error_description = v,
                "scope" => params.scope = v,
                _ => {}
            }
        }
        params
    }

    /// Returns the authorization code if this callback is a successful answer to the
    /// authorization request that was issued with `expected_state`.
    pub fn authorization_code(&self, expected_state: &str) -> Result<AuthorizationCode> {
        if let Some(error) = &self.error {
            return Err(Error::AuthorizationDenied {
                error: error.clone(),
                description: self.error_description.clone(),
            });
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(Error::StateMismatch);
        }
        let Some(code) = &self.code else {
            return Err(Error::MissingCode);
        };
        Ok(AuthorizationCode::new(code.clone()))
    }

    fn is_oauth_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Binds a local HTTP listener at `addr` that waits for the provider's redirect.
///
/// Returns the bound address (useful when `addr` has port 0) and a future that resolves to the
/// parameters of the first request carrying either a `code` or an `error`. Other requests (like
/// a browser's `favicon.ico`) are answered with a 404 and otherwise ignored.
pub async fn listen(
    addr: SocketAddr,
) -> eyre::Result<(SocketAddr, impl Future<Output = eyre::Result<CallbackParams>>)> {
    let socket = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind callback listener to {addr}"))?;
    let local = socket.local_addr().context("get local address")?;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let r = async move {
            let (conn, _) = socket.accept().await.context("accept")?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let got = got.clone();
                async move {
                    let params = CallbackParams::from_query(req.uri().query().unwrap_or(""));
                    if !params.is_oauth_callback() {
                        let mut response = Response::new(Full::<Bytes>::from("not found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, Infallible>(response);
                    }
                    let page = if params.error.is_some() {
                        DENIED_HTML
                    } else {
                        DONE_HTML
                    };
                    // Only fails once the listener already has its answer.
                    let _ = got.send(params).await;
                    Ok(Response::new(Full::<Bytes>::from(page)))
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    if let Err(e) = exit {
                        Err(e).context("callback listener got bad request")
                    } else {
                        eyre::bail!("callback connection closed before the redirect arrived");
                    }
                }
                params = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    // Let the response page go out before hanging up.
                    if let Err(e) = serve.await {
                        tracing::debug!(error = %e, "callback connection closed uncleanly");
                    }
                    params.ok_or_else(|| eyre::eyre!("callback service dropped prematurely"))
                }
            }
        };
        let _ = tx.send(r.await);
    });
    Ok((local, async move {
        rx.await.context("callback listener dropped prematurely")?
    }))
}
