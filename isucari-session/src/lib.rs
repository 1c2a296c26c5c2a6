//! # isucari Session
//!
//! HTTP sessions of simulated users and the actions they perform against the
//! target marketplace and the payment service.
//!
//! ## Architecture
//!
//! - [`config`]: Endpoints of the target and the simulators
//! - [`session`]: Cookie-bearing client and response classification
//! - [`webapp`]: Regular marketplace actions
//! - [`wrong`]: Invalid requests and their expected rejections
//! - [`external`]: Payment `/card` client
//! - [`pool`]: FIFO session pools with scoped checkout
//! - [`types`]: Wire types

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod external;
pub mod pool;
pub mod session;
pub mod types;
pub mod webapp;
pub mod wrong;

pub use config::TargetUrls;
pub use pool::{Pool, PoolGuard, SessionPool};
pub use session::{ErrorBody, Session, DEFAULT_API_TIMEOUT};
pub use types::{
    Category, InitializeResponse, ItemDetail, ItemSimple, NewItemsPage, PageCursor,
    TransactionEvidence, TransactionsPage, User, UserItemsPage, UserSimple,
};
pub use reqwest::StatusCode;
pub use webapp::{BuyOutcome, SellForm};
