//! # Host Bridge
//!
//! A cross-thread bridge that lets a sandboxed "compute" program drive a
//! privileged host: UI elements, canvases, images, audio, network fetches
//! and input events, all reached through a closed command vocabulary.
//!
//! ## Features
//!
//! - **Synchronous answers**: the compute side blocks on a single-slot mailbox
//!   and receives a typed value, while the host never waits on the compute side
//! - **Resource tables**: append-only, handle-indexed host state with checked lookups
//! - **Event queue**: FIFO delivery of translated host input with monotonic ids
//! - **Draw batching**: canvas calls are recorded and flushed once per frame
//! - **Network multiplexer**: non-blocking fetches with chunked reads
//!
//! ## Architecture Design
//!
//! The host thread owns one [`crate::core::BridgeContext`] and passes it by reference
//! into every dispatch; there is no ambient global state. The compute thread
//! only holds a [`bindings::ComputeStub`].
//!
//! ### Example
//!
//! ```no_run
//! use host_bridge::config::BridgeConfig;
//! use host_bridge::core::BridgeBuilder;
//! use host_bridge::network::MemoryFetcher;
//!
//! let bridge = BridgeBuilder::new(BridgeConfig::default())
//!     .fetcher(MemoryFetcher::new())
//!     .build()?;
//! let mut compute = bridge.compute;
//! let host = bridge.host.spawn()?;
//!
//! let button = compute.create_element("button", "push-button")?;
//! compute.set_text(button, "OK")?;
//! assert_eq!(compute.text_len(button)?, 2);
//! compute.stop_execution()?;
//! host.join().ok();
//! # Ok::<(), host_bridge::core::BridgeError>(())
//! ```
//!
//! ## Modules
//!
//! - [`crate::core`]: bridge context, host loop, errors and logging
//! - [`bindings`]: command protocol, answer channel, dispatcher and compute stub
//! - [`resources`]: resource tables and uploaded images
//! - [`ui`]: host-side element model
//! - [`render`]: draw command buffer and canvas surfaces
//! - [`platform`]: event queue and input translation
//! - [`audio`]: audio sources and output
//! - [`network`]: fetch multiplexing

/// Bridge context, host loop and error types
pub mod core;
/// Configuration system
pub mod config;
/// Command protocol and the compute/host boundary
pub mod bindings;
/// Append-only resource tables
pub mod resources;
/// Host-side UI element model
pub mod ui;
/// Draw command batching and canvas surfaces
pub mod render;
/// Event queue and input translation
pub mod platform;
/// Audio sources and output
pub mod audio;
/// Network request multiplexing
pub mod network;

pub use bindings::{Answer, AnswerType, Command, ComputeStub};
pub use config::BridgeConfig;
pub use crate::core::{Bridge, BridgeBuilder, BridgeError, BridgeResult, Host};
