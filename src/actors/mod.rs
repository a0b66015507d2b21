//! Actor-based gateway runtime
//!
//! Each actor runs as an independent async task and is controlled through a
//! cloneable handle that sends commands over an mpsc channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!   serial port ──► line reader thread
//!                        │ lines
//!                ┌───────▼───────┐      ┌────────────────┐
//!                │  IngestActor  │      │ SimulatorActor │
//!                └───────┬───────┘      └───────┬────────┘
//!                        │ append               │ append
//!                        └────────► EventStore ◄┘
//!                                      │ latest_by_node (poll)
//!                              ┌───────▼───────┐
//!                              │  AlertActor   │──► Notifier
//!                              └───────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Shared store**: Producers append through one `Arc<dyn EventStore>`
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod alert;
pub mod ingest;
pub mod messages;
pub mod simulator;
