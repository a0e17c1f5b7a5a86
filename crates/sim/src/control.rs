//! HTTP control port exposing NEM status

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use log::error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::medium::{MediumCounters, SimulatedMedium};
use crate::nem::{NemMonitor, NemStatus};
use crate::HostError;

#[derive(Clone)]
struct ControlState {
    nems: Arc<Vec<NemMonitor>>,
    medium: Arc<SimulatedMedium>,
}

pub struct ControlPort {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ControlPort {
    pub async fn bind(
        endpoint: SocketAddr,
        nems: Vec<NemMonitor>,
        medium: Arc<SimulatedMedium>,
    ) -> Result<Self, HostError> {
        let control_error = |source| HostError::ControlPort { endpoint, source };
        let listener = TcpListener::bind(endpoint).await.map_err(control_error)?;
        let local_addr = listener.local_addr().map_err(control_error)?;

        let state = ControlState {
            nems: Arc::new(nems),
            medium,
        };
        let app = Router::new()
            .route("/", get(root))
            .route("/nems", get(nems_status))
            .route("/medium", get(medium_counters))
            .with_state(state);

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("control port on {} failed: {}", local_addr, err);
            }
        });

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn root(State(state): State<ControlState>) -> String {
    format!("embedded radio control port: {} NEM(s)\n", state.nems.len())
}

async fn nems_status(State(state): State<ControlState>) -> Json<Vec<NemStatus>> {
    Json(state.nems.iter().map(NemMonitor::status).collect())
}

async fn medium_counters(State(state): State<ControlState>) -> Json<MediumCounters> {
    Json(state.medium.counters())
}
