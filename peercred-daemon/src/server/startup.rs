use anyhow::{anyhow, Context, Result};
use axum::extract::ConnectInfo;
use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::crypto;
use crate::server::router;
use crate::state::AppState;
use peercred_common::QUERY_PATH;

pub async fn start_server(config: ServerConfig) -> Result<()> {
    info!("🛡️ Starting inet_peercred server");

    let (cert, key) = config.validate()?;
    info!("🔐 Loading TLS identity (cert: {}, key: {})", cert.display(), key.display());
    let acceptor = crypto::load_tls_acceptor(cert, key)
        .context("Failed to load TLS certificate and key")?;

    let state = AppState::host(&config.proc_root, config.lookup_timeout());
    let app = router::build(state);

    let listener = TcpListener::bind(config.listen)
        .await
        .context(format!("Failed to bind {} - are you running as root?", config.listen))?;
    info!("🚀 Listening on https://{}{}", config.listen, QUERY_PATH);

    serve(listener, acceptor, app, config.handshake_timeout()).await
}

/// Accept loop: one task per connection until ctrl-c
///
/// `handshake_timeout` bounds both the TLS handshake and the wait for each
/// request's headers, so idle peers are dropped.
pub async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: Duration,
) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("🛑 Received shutdown signal, stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let acceptor = acceptor.clone();
                    let app = app.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, peer, acceptor, app, handshake_timeout).await {
                            warn!("Client {} error: {:#}", peer, e);
                        }
                    });
                }
                Err(e) => error!("Socket accept error: {}", e),
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: Duration,
) -> Result<()> {
    let tls = tokio::time::timeout(handshake_timeout, acceptor.accept(stream))
        .await
        .map_err(|_| anyhow!("TLS handshake timed out after {:?}", handshake_timeout))?
        .context("TLS handshake failed")?;

    // The TCP peer, not anything the client sends, is what handlers authorize on
    let service = TowerToHyperService::new(app.layer(Extension(ConnectInfo(peer))));

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(handshake_timeout);
    builder.http2().timer(TokioTimer::new());

    builder
        .serve_connection(TokioIo::new(tls), service)
        .await
        .map_err(|e| anyhow!("HTTP error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::api::tests::{default_table, scenario_state, SCENARIO};
    use axum::body::Bytes;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::Full;
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, RootCertStore};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio_rustls::TlsConnector;

    fn self_signed() -> (rcgen::CertifiedKey, TlsAcceptor) {
        let identity = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, identity.cert.pem()).unwrap();
        std::fs::write(&key, identity.key_pair.serialize_pem()).unwrap();

        let acceptor = crypto::load_tls_acceptor(&cert, &key).unwrap();
        (identity, acceptor)
    }

    #[tokio::test]
    async fn test_silent_client_dropped_after_handshake_timeout() {
        let (_identity, acceptor) = self_signed();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            acceptor,
            router::build(scenario_state(default_table())),
            Duration::from_millis(100),
        ));

        // Connect and never send a ClientHello
        let mut tcp = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), tcp.read(&mut buf))
            .await
            .expect("server kept the idle connection open");
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected read {:?}", read);

        server.abort();
    }

    #[tokio::test]
    async fn test_https_unprivileged_client_rejected() {
        let (identity, acceptor) = self_signed();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            acceptor,
            router::build(scenario_state(default_table())),
            Duration::from_secs(5),
        ));

        let mut roots = RootCertStore::empty();
        roots.add(identity.cert.der().clone()).unwrap();
        let client_config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client_config));

        // Ephemeral source ports are never privileged
        let tcp = TcpStream::connect(addr).await.unwrap();
        let tls = connector
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap();
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await.unwrap();
        tokio::spawn(connection);

        let request = Request::post(QUERY_PATH)
            .header(header::HOST, "localhost")
            .body(Full::new(Bytes::from_static(SCENARIO.as_bytes())))
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        server.abort();
    }
}
