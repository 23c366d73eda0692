//! Kickstart and post-configuration endpoints
//!
//! Hosts are identified by the remote address of the connection; the local
//! address is the server address the host reached, which is written into
//! the rendered kickstart.

use axum::{
    extract::{connect_info::Connected, ConnectInfo, Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    serve::IncomingStream,
    Json, Router,
};
use ferrovia_boot::{KickstartContext, KickstartRenderer};
use ferrovia_common::{HostRecord, Stage};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::encryption::SecretCipher;
use crate::error::ProvisionError;
use crate::provisioning::ProvisioningCoordinator;
use crate::store::HostStore;

/// Both ends of an accepted connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionAddrs {
    pub remote: SocketAddr,
    pub local: SocketAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        let local = stream
            .io()
            .local_addr()
            .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        Self {
            remote: *stream.remote_addr(),
            local,
        }
    }
}

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HostStore>,
    pub renderer: Arc<KickstartRenderer>,
    pub cipher: Option<Arc<SecretCipher>>,
    pub coordinator: ProvisioningCoordinator,
}

impl AppState {
    fn decrypt_password(&self, ciphertext: &str) -> Result<String, ProvisionError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let cipher = self.cipher.as_ref().ok_or(ProvisionError::NoSecretKey)?;
        cipher.decrypt(ciphertext).map_err(ProvisionError::Secret)
    }

    async fn host_by_ip(&self, ip: IpAddr) -> Result<HostRecord, ProvisionError> {
        let ip = ip.to_string();
        self.store
            .host_by_ip(&ip)
            .await?
            .ok_or(ProvisionError::HostNotFound(ip))
    }
}

/// Build the router. Serve it with
/// `into_make_service_with_connect_info::<ConnectionAddrs>()`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ks.cfg", get(kickstart))
        .route("/v1/postconfig", get(postconfig))
        .route("/v1/postconfig/{id}", get(postconfig_by_id))
        .with_state(state)
}

async fn kickstart(
    State(state): State<AppState>,
    ConnectInfo(addrs): ConnectInfo<ConnectionAddrs>,
) -> Result<impl IntoResponse, ProvisionError> {
    let mut record = state.host_by_ip(addrs.remote.ip()).await?;
    info!(host_id = record.host.id, client = %addrs.remote, "Kickstart requested");

    // Keeps the host out of the PXE flow on its next boot
    state.store.set_reimage(record.host.id, false).await?;
    record.host.reimage = false;

    let password = state.decrypt_password(&record.group.password)?;
    let ctx = KickstartContext::from_record(&record, password, addrs.local)?;
    let script = state.renderer.render_for(&record, &ctx).map_err(|e| {
        error!(host_id = record.host.id, error = %e, "Failed to render kickstart");
        e
    })?;

    state.store.save_progress(record.host.id, Stage::Kickstart).await?;
    info!(
        host_id = record.host.id,
        progress = Stage::Kickstart.percent(),
        stage = Stage::Kickstart.label(),
        "Host progress updated"
    );
    record.host.set_stage(Stage::Kickstart);
    state.coordinator.spawn(record);

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], script))
}

async fn postconfig(
    State(state): State<AppState>,
    ConnectInfo(addrs): ConnectInfo<ConnectionAddrs>,
) -> Result<Json<HostRecord>, ProvisionError> {
    let record = state.host_by_ip(addrs.remote.ip()).await?;
    info!(host_id = record.host.id, "Post-configuration requested");
    Ok(start_postconfig(&state, record))
}

async fn postconfig_by_id(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<HostRecord>, ProvisionError> {
    let record = state
        .store
        .host_by_id(id)
        .await?
        .ok_or_else(|| ProvisionError::HostNotFound(format!("id {}", id)))?;
    info!(host_id = id, hostname = %record.host.hostname, "Manual post-configuration started");
    Ok(start_postconfig(&state, record))
}

fn start_postconfig(state: &AppState, record: HostRecord) -> Json<HostRecord> {
    let response = record.scrubbed();
    state.coordinator.spawn(record);
    Json(response)
}
