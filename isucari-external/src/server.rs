//! HTTP plumbing shared by both simulators.
//!
//! Every route sits behind a [`Gate`]: an adjustable response delay and an
//! optional client IP allow-list.

use crate::error::ApiError;
use crate::payment::PaymentService;
use crate::shipment::ShipmentService;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use isucari_core::{BenchConfig, Error, FailureAggregator, Result};
use parking_lot::RwLock;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Header trusted as the client address when present.
pub const TRUE_CLIENT_IP: &str = "true-client-ip";

/// Delay and allow-list applied in front of a simulator.
#[derive(Debug, Default)]
pub struct Gate {
    delay: RwLock<Duration>,
    allowed_ips: Vec<IpAddr>,
}

impl Gate {
    /// Gate with no delay; an empty list allows every client.
    #[must_use]
    pub fn new(allowed_ips: Vec<IpAddr>) -> Self {
        Self { delay: RwLock::new(Duration::ZERO), allowed_ips }
    }

    /// Current response delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        *self.delay.read()
    }

    /// Change the response delay.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    /// Whether `ip` may call the simulator.
    #[must_use]
    pub fn allows(&self, ip: Option<IpAddr>) -> bool {
        self.allowed_ips.is_empty() || ip.is_some_and(|ip| self.allowed_ips.contains(&ip))
    }
}

fn client_ip(request: &Request) -> Option<IpAddr> {
    if let Some(value) = request.headers().get(TRUE_CLIENT_IP) {
        return value.to_str().ok()?.trim().parse().ok();
    }
    request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip())
}

async fn gate_layer(State(gate): State<Arc<Gate>>, request: Request, next: Next) -> Response {
    let delay = gate.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let ip = client_ip(&request);
    if !gate.allows(ip) {
        warn!(?ip, "rejected client outside the allow-list");
        return ApiError::Forbidden("IP address is not allowed".into()).into_response();
    }

    next.run(request).await
}

/// Wrap `router` in `gate`.
pub fn gated(router: Router, gate: Arc<Gate>) -> Router {
    router.layer(middleware::from_fn_with_state(gate, gate_layer))
}

/// One simulator listening on a TCP port.
#[derive(Debug)]
pub struct SimulatorServer {
    name: &'static str,
    bind_address: SocketAddr,
    local_addr: Option<SocketAddr>,
    gate: Arc<Gate>,
    router: Router,
    shutdown_tx: Option<broadcast::Sender<()>>,
    server_task: Option<JoinHandle<()>>,
}

impl SimulatorServer {
    /// Prepare a server for `router`; nothing is bound until [`start`](Self::start).
    #[must_use]
    pub fn new(name: &'static str, bind_address: SocketAddr, router: Router, gate: Arc<Gate>) -> Self {
        Self {
            name,
            bind_address,
            local_addr: None,
            router: gated(router, Arc::clone(&gate)),
            gate,
            shutdown_tx: None,
            server_task: None,
        }
    }

    /// Bind and serve in a background task; returns the bound address.
    ///
    /// # Errors
    /// Returns an error if the server is already running or the port cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(Error::internal(format!("{} simulator is already running", self.name)));
        }

        let listener = tokio::net::TcpListener::bind(self.bind_address).await.map_err(|e| Error::Io {
            message: format!("failed to bind {} simulator on {}: {e}", self.name, self.bind_address),
        })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let name = self.name;
        let service = self.router.clone().into_make_service_with_connect_info::<SocketAddr>();
        self.server_task = Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
            };
            if let Err(e) = axum::serve(listener, service).with_graceful_shutdown(shutdown).await {
                error!(simulator = name, "server error: {}", e);
            }
        }));

        self.local_addr = Some(local_addr);
        info!(simulator = self.name, %local_addr, "simulator started");
        Ok(local_addr)
    }

    /// Stop serving and wait for the background task.
    ///
    /// # Errors
    /// Returns an error if the server is not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Err(Error::internal(format!("{} simulator is not running", self.name)));
        };
        let _ = shutdown_tx.send(());

        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }

        info!(simulator = self.name, "simulator stopped");
        Ok(())
    }

    /// Whether the background task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.server_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Bound address once started.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The gate in front of this server.
    #[must_use]
    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }
}

/// Both simulators of one benchmark run.
#[derive(Debug)]
pub struct Simulators {
    /// Payment back doors
    pub payment: Arc<PaymentService>,
    /// Shipment back doors
    pub shipment: Arc<ShipmentService>,
    payment_server: SimulatorServer,
    shipment_server: SimulatorServer,
}

impl Simulators {
    /// Build both simulators from `config`. The payment service reports
    /// invariant violations to `failures`.
    ///
    /// # Errors
    /// Returns an error for an invalid allow-list or unreadable shipping data.
    pub fn new(config: &BenchConfig, failures: Arc<FailureAggregator>) -> Result<Self> {
        let gate = Arc::new(Gate::new(config.allowed_ips()?));

        let payment = Arc::new(PaymentService::new(
            Duration::from_millis(config.external.card_token_ttl_ms),
            failures,
        ));
        let shipment = Arc::new(ShipmentService::new(Duration::from_millis(
            config.external.shipment_done_delay_ms,
        )));
        let shippings = config.data.data_dir.join("result").join("shippings_json.txt");
        if shippings.exists() {
            shipment.load_shippings(&shippings)?;
        }

        let payment_server = SimulatorServer::new(
            "payment",
            SocketAddr::from(([0, 0, 0, 0], config.external.payment_port)),
            Arc::clone(&payment).router(),
            Arc::clone(&gate),
        );
        let shipment_server = SimulatorServer::new(
            "shipment",
            SocketAddr::from(([0, 0, 0, 0], config.external.shipment_port)),
            Arc::clone(&shipment).router(),
            gate,
        );

        Ok(Self { payment, shipment, payment_server, shipment_server })
    }

    /// Start both listeners; returns `(payment, shipment)` addresses.
    ///
    /// # Errors
    /// Returns an error if either port cannot be bound.
    pub async fn start(&mut self) -> Result<(SocketAddr, SocketAddr)> {
        let payment = self.payment_server.start().await?;
        let shipment = self.shipment_server.start().await?;
        Ok((payment, shipment))
    }

    /// Stop both listeners.
    ///
    /// # Errors
    /// Returns an error if a listener was not running.
    pub async fn stop(&mut self) -> Result<()> {
        self.payment_server.stop().await?;
        self.shipment_server.stop().await
    }

    /// Set the response delay of both simulators (they share one gate).
    pub fn set_delay(&self, delay: Duration) {
        self.payment_server.gate().set_delay(delay);
    }
}
