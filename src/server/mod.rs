pub mod dispatch;
pub mod gemini;
pub mod http;
pub mod response;
pub mod titan;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Overrides};
use crate::extension::Registry;
use crate::server::dispatch::Peer;
use crate::store::{FsStore, Store};
use crate::tls;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a connection needs: the configuration snapshot, the store,
/// and the extension registry built for that configuration.
pub struct Wiki {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub extensions: Registry,
}

impl Wiki {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FsStore::new(&config.wiki_dir));
        let extensions = Registry::from_names(&config.extensions);
        Self {
            config,
            store,
            extensions,
        }
    }
}

/// Shared server state. Connections capture an `Arc<Wiki>` at accept
/// time; a reload swaps the Arc and leaves in-flight connections on the
/// old configuration.
pub struct AppState {
    wiki: RwLock<Arc<Wiki>>,
    acceptor: RwLock<tokio_rustls::TlsAcceptor>,
}

impl AppState {
    #[must_use]
    pub fn new(wiki: Wiki, acceptor: tokio_rustls::TlsAcceptor) -> Self {
        Self {
            wiki: RwLock::new(Arc::new(wiki)),
            acceptor: RwLock::new(acceptor),
        }
    }

    #[must_use]
    pub fn wiki(&self) -> Arc<Wiki> {
        self.wiki
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn acceptor(&self) -> tokio_rustls::TlsAcceptor {
        self.acceptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, wiki: Wiki, acceptor: tokio_rustls::TlsAcceptor) {
        *self.wiki.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(wiki);
        *self.acceptor.write().unwrap_or_else(PoisonError::into_inner) = acceptor;
    }
}

/// Bind the listeners and serve until a shutdown signal arrives.
pub async fn run(overrides: Overrides) -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::load(&overrides)?;
    std::fs::create_dir_all(&config.wiki_dir)?;
    let acceptor = tls::acceptor(&config)?;
    let ports = config.ports.clone();
    let state = Arc::new(AppState::new(Wiki::new(config), acceptor));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let active = Arc::new(AtomicUsize::new(0));

    for port in ports {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("listening on port {port}");
        tokio::spawn(accept_loop(
            listener,
            state.clone(),
            shutdown_rx.clone(),
            active.clone(),
        ));
    }

    wait_for_shutdown(&overrides, &state).await?;

    let _ = shutdown_tx.send(true);
    drain(&active).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(overrides: &Overrides, state: &Arc<AppState>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate.recv() => break,
            _ = hangup.recv() => reload(overrides, state),
        }
    }
    info!("shutdown signal received, draining connections");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_overrides: &Overrides, _state: &Arc<AppState>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining connections");
    Ok(())
}

/// Rebuild configuration, certificates, and extension registry from the
/// original invocation. In-flight connections keep what they captured.
fn reload(overrides: &Overrides, state: &Arc<AppState>) {
    match Config::load(overrides).and_then(|config| Ok((tls::acceptor(&config)?, config))) {
        Ok((acceptor, config)) => {
            state.replace(Wiki::new(config), acceptor);
            info!("configuration reloaded");
        }
        Err(e) => error!("reload failed, keeping previous configuration: {e}"),
    }
}

async fn drain(active: &Arc<AtomicUsize>) {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while active.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let remaining = active.load(Ordering::SeqCst);
    if remaining > 0 {
        warn!("closing with {remaining} connections still in flight");
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (tcp, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };
                let acceptor = state.acceptor();
                let wiki = state.wiki();
                let active = active.clone();
                active.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    match acceptor.accept(tcp).await {
                        Ok(stream) => {
                            let peer = Peer {
                                ip: addr.ip().to_string(),
                                fingerprint: tls::peer_fingerprint(&stream),
                            };
                            dispatch::handle_connection(stream, peer, wiki).await;
                        }
                        Err(e) => debug!("{}: TLS handshake failed: {e}", addr.ip()),
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }
}
