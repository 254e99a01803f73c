//! Gateway module - WebSocket submission gateway
//!
//! Clients connect over WebSocket, receive a session id on `init`, and send
//! `submit_exercise` events. Each valid submission is acknowledged and then
//! run in its own sandbox; failures are reported back on the same socket.
//!
//! ```text
//! ┌──────────┐   ws    ┌─────────┐  slot  ┌────────────┐  engine  ┌───────────┐
//! │  client  │ ──────▶ │ Session │ ─────▶ │ WorkerPool │ ───────▶ │Provisioner│
//! └──────────┘ ◀────── └─────────┘        └────────────┘          └───────────┘
//!                events
//! ```

pub mod pool;
pub mod protocol;
pub mod server;
pub mod session;

pub use pool::{Admission, PoolStats, Slot, Waiter, WorkerPool};
pub use protocol::{error_codes, events, ClientFrame, EventFrame, ProtocolError, PROTOCOL_VERSION};
pub use server::{build_router, serve};
pub use session::{EventSink, Gateway, Session};
