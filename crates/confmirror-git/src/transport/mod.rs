//! Transport resolution and the smart-HTTP fallback transport.
//!
//! Clones and fetches go through the engine's native transport first. When
//! that fails for an HTTP(S) remote, the clone is retried once through a
//! hand-rolled smart-HTTP implementation registered with libgit2 for the
//! duration of that single attempt.

mod client;
mod registration;
mod resolver;
mod service;
mod subtransport;

pub use client::{
    CHUNK_SIZE, MAX_REDIRECTS, SmartHttpClient, SmartHttpResponse, TransportError,
    copy_in_chunks,
};
pub use registration::{FallbackRegistration, native_transport_guard};
pub use resolver::{Attempt, AttemptPlan, Route, TransportResolver, fallback_scheme};
pub use service::SmartAction;
pub use subtransport::FailureSlot;
