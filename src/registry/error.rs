//! Registry error types
//!
//! Every variant maps to an HTTP 400 response; the `Display` output is the
//! sentence shown to the rejected client.

use super::path::RelayPath;

/// Error type for registration operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// The declared receiver count was zero or negative
    InvalidReceiverCount,
    /// A transfer is already in progress on the path
    PathEstablished(RelayPath),
    /// The path already has a waiting sender
    SenderAlreadyRegistered(RelayPath),
    /// The declared receiver count differs from the pending rendezvous
    ReceiverCountMismatch { expected: u32, offered: u32 },
    /// The pending rendezvous already holds its full set of receivers
    ReceiverLimitReached(u32),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::InvalidReceiverCount => {
                write!(f, "The number of receivers should be a positive integer.")
            }
            RegistryError::PathEstablished(path) => {
                write!(f, "Connection on '{}' has been established already.", path)
            }
            RegistryError::SenderAlreadyRegistered(path) => {
                write!(f, "Another sender has been registered on '{}'.", path)
            }
            RegistryError::ReceiverCountMismatch { expected, offered } => {
                write!(
                    f,
                    "The number of receivers should be {} but {}.",
                    expected, offered
                )
            }
            RegistryError::ReceiverLimitReached(limit) => {
                write!(
                    f,
                    "The number of receivers has reached its limit of {}.",
                    limit
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {}
