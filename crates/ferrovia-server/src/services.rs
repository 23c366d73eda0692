//! Network services runner
//!
//! Starts the services a host talks to while it installs:
//! - TFTP for the boot loader, boot.cfg and media
//! - HTTP for ks.cfg and post-configuration
//!
//! Both stop when the shutdown channel flips to `true`.

use ferrovia_boot::KickstartRenderer;
use ferrovia_tftp::{TftpEvent, TftpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::boot_files::{BootFileProvider, KickstartEndpoint};
use crate::config::ServerConfig;
use crate::encryption::SecretCipher;
use crate::error::ServiceError;
use crate::http::{router, AppState, ConnectionAddrs};
use crate::provisioning::ProvisioningCoordinator;
use crate::store::{HostStore, MemoryStore};

/// Starts and owns the TFTP and HTTP listeners
pub struct ServiceRunner {
    config: ServerConfig,
    store: Arc<dyn HostStore>,
}

impl ServiceRunner {
    /// Runner backed by a memory store seeded from the config inventory
    pub fn new(config: ServerConfig) -> Result<Self, ServiceError> {
        let store = MemoryStore::from_inventory(config.inventory.clone())?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Runner over an existing store
    pub fn with_store(config: ServerConfig, store: Arc<dyn HostStore>) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> Arc<dyn HostStore> {
        self.store.clone()
    }

    /// Bind both listeners and start serving
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<ServiceHandles, ServiceError> {
        let cipher = match self.config.secret_key() {
            Ok(key) => Some(Arc::new(SecretCipher::from_secret(key).map_err(ServiceError::Secret)?)),
            Err(_) => {
                warn!("No secret key configured, only hosts without a root password can be provisioned");
                None
            }
        };
        let coordinator = ProvisioningCoordinator::new(
            self.store.clone(),
            Duration::from_secs(self.config.callback_timeout_secs),
        )?;

        let state = AppState {
            store: self.store.clone(),
            renderer: Arc::new(KickstartRenderer::new()),
            cipher,
            coordinator,
        };
        let (http_addr, http) = self.start_http(state, shutdown.clone()).await?;

        // boot.cfg must point at the port actually bound
        let kickstart = KickstartEndpoint {
            scheme: self.config.kickstart_scheme.clone(),
            port: self.config.advertised_port(http_addr.port()),
        };
        let (tftp_addr, tftp) = self.start_tftp(kickstart, shutdown).await?;

        Ok(ServiceHandles {
            tftp_addr,
            http_addr,
            tftp,
            http,
        })
    }

    async fn start_tftp(
        &self,
        kickstart: KickstartEndpoint,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, ServiceHandle<TftpEvent>), ServiceError> {
        let provider = BootFileProvider::new(self.store.clone(), self.config.images_root.clone(), kickstart);

        let server = TftpServer::bind(self.config.tftp_bind, Arc::new(provider))
            .await?
            .with_timeout(self.config.tftp_timeout_secs);
        let addr = server.local_addr()?;
        let events = server.subscribe();

        info!(
            addr = %addr,
            images = %self.config.images_root.display(),
            "Starting TFTP server"
        );

        let join_handle = tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "TFTP server error");
            }
        });

        Ok((addr, ServiceHandle { events, join_handle }))
    }

    async fn start_http(
        &self,
        state: AppState,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, JoinHandle<()>), ServiceError> {
        let bind = self.config.http_bind;
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| ServiceError::HttpBind { addr: bind, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServiceError::HttpBind { addr: bind, source })?;
        info!(addr = %addr, "Starting HTTP server");

        let app = router(state).into_make_service_with_connect_info::<ConnectionAddrs>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown))
                .await;
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => error!(error = %e, "HTTP server error"),
            }
        });

        Ok((addr, handle))
    }
}

/// Resolves once the flag is set or the sender is gone
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Running services
pub struct ServiceHandles {
    /// Bound TFTP address
    pub tftp_addr: SocketAddr,
    /// Bound HTTP address
    pub http_addr: SocketAddr,
    pub tftp: ServiceHandle<TftpEvent>,
    pub http: JoinHandle<()>,
}

impl ServiceHandles {
    /// Wait for both services to stop
    pub async fn join(self) -> Result<(), ServiceError> {
        self.tftp.join_handle.await?;
        self.http.await?;
        Ok(())
    }
}

/// Handle to a single service
pub struct ServiceHandle<E> {
    pub events: broadcast::Receiver<E>,
    pub join_handle: JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::inventory;

    fn local_config() -> ServerConfig {
        ServerConfig {
            tftp_bind: "127.0.0.1:0".parse().unwrap(),
            http_bind: "127.0.0.1:0".parse().unwrap(),
            inventory: inventory(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let runner = ServiceRunner::new(local_config()).unwrap();
        let (tx, rx) = watch::channel(false);
        let mut handles = runner.start(rx).await.unwrap();

        assert_ne!(handles.tftp_addr.port(), 0);
        assert_ne!(handles.http_addr.port(), 0);

        tx.send(true).unwrap();
        // Events are buffered from subscription, so the stop is visible
        loop {
            match handles.tftp.events.recv().await.unwrap() {
                TftpEvent::Stopped => break,
                _ => continue,
            }
        }
        tokio::time::timeout(Duration::from_secs(5), handles.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_short_secret_key_accepted() {
        let mut config = local_config();
        config.secret_key = Some("x".to_string());
        let runner = ServiceRunner::new(config).unwrap();
        let (_tx, rx) = watch::channel(false);
        assert!(runner.start(rx).await.is_ok());
    }

    #[test]
    fn test_invalid_inventory_rejected() {
        let mut config = local_config();
        config.inventory.hosts[0].ip = "192.168.1.1".to_string();
        assert!(matches!(
            ServiceRunner::new(config),
            Err(ServiceError::Store(_))
        ));
    }
}
