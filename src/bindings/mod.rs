//! Binding Layer
//!
//! Everything that crosses the thread boundary between the compute side and
//! the host:
//!
//! ```text
//! compute thread                         host thread
//! ┌──────────────┐   Message::Command    ┌──────────────┐
//! │ ComputeStub  │ ────────────────────► │ Host         │
//! │              │                       │  dispatch()  │
//! │  (blocked)   │ ◄──────────────────── │  BridgeCtx   │
//! └──────────────┘     AnswerChannel     └──────────────┘
//! ```
//!
//! - [`protocol`]: the closed command vocabulary and its wire decoding
//! - [`answer`]: the single-slot reply mailbox
//! - [`dispatch`]: host-side execution of one command
//! - [`stub`]: the compute-side API

pub mod answer;
pub mod dispatch;
pub mod protocol;
pub mod stub;

pub use answer::{Answer, AnswerChannel, AnswerType, STATE_DONE, STATE_FAULT, STATE_WAITING};
pub use dispatch::{dispatch, dispatch_named};
pub use protocol::{Arg, Command, CommandId};
pub use stub::ComputeStub;
