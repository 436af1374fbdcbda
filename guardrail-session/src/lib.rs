//! Session manager (§2, §4.1): token issue/verify/revoke and the per-session
//! outbound queues the stream transport drains.

pub mod manager;
pub mod token;

pub use manager::{
    ConnectionState, InitOutcome, SessionEntry, SessionManager, CAPABILITIES,
    DEFAULT_PREAMBLE, DEFAULT_QUEUE_CAPACITY, DEFAULT_SESSION_TTL,
};
pub use token::{validate_signing_secret, SigningSecretError, TokenCodec, MIN_SECRET_LEN};
