//! Gateway Protocol - event envelopes over WebSocket
//!
//! ## Protocol Overview
//!
//! - **JSON-based messages** over WebSocket text frames
//! - **Named events** in both directions, `{ "event": ..., "data": ... }`
//! - **One session per connection**, identified by a server-assigned id
//!
//! ## Flow
//!
//! ```text
//! client                          server
//!   init                 ───▶
//!                        ◀───    init_send_uuid { userId }
//!   submit_exercise      ───▶
//!                        ◀───    exercise_submitted { submissionId, timestamp }
//!                                 ... sandbox runs ...
//!                        ◀───    exercise_runtime_error { submissionId, timestamp }   (failure only)
//! ```

pub mod schema;
pub mod types;

pub use schema::{error_codes, ClientFrame, EventFrame, ProtocolError, PROTOCOL_VERSION};
pub use types::*;
