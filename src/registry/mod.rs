//! Rendezvous registry
//!
//! The registry pairs one sender with a declared number of receivers on a
//! shared path and promotes the group to an active transfer once both
//! sides are complete.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<PathRegistry>
//!                  ┌────────────────────────────┐
//!                  │ paths: HashMap<RelayPath,  │
//!                  │   Pending {                │
//!                  │     n_receivers,           │
//!                  │     sender?,               │
//!                  │     receivers[],           │
//!                  │   } | Established          │
//!                  │ >                          │
//!                  └─────────────┬──────────────┘
//!                                │ promotion
//!                                ▼
//!     [Sender] ──body──► pipe::engine::run ──fan-out──► [Receiver]
//!         ▲                                             [Receiver]
//!         └── status lines (waiting / connected / start / terminal)
//! ```
//!
//! A rendezvous is *pending* while participants may still join or
//! withdraw, and *established* from the moment the declared receiver
//! count is met. Promotion atomically swaps the pending entry for the
//! established marker and disarms every abort watcher, so connection
//! closes afterwards are transfer events rather than withdrawals.

pub mod entry;
pub mod error;
pub mod path;
pub mod store;

pub use entry::{EstablishedPipe, NoticeChannel, ReceiverEnd, SenderEnd};
pub use error::RegistryError;
pub use path::{RelayPath, RESERVED_PATHS};
pub use store::{AbortGuard, PathRegistry};
