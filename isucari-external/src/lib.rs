//! # isucari External
//!
//! In-process stand-ins for the payment and shipment services the target
//! application integrates with. Besides their HTTP surface, both expose back
//! doors the benchmarker uses to steer and inspect them.
//!
//! ## Architecture
//!
//! - [`payment`]: Card tokens, charges and payment reports
//! - [`shipment`]: Reservations, pickup QR codes and delivery tracking
//! - [`server`]: Listener lifecycle, latency injection and IP allow-list
//! - [`error`]: Error responses

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod payment;
pub mod server;
pub mod shipment;

pub use error::{ApiError, ApiResult};
pub use payment::{PaymentReport, PaymentService, TokenStatus};
pub use server::{Gate, SimulatorServer, Simulators};
pub use shipment::{accept_token, ShipmentService, ShipmentStatus};
