//! Process-wide registration of the fallback transport.
//!
//! libgit2 keeps custom transports in a global table keyed by URL scheme,
//! and its socket timeouts in global options. [`TRANSPORT_LOCK`] makes both
//! scoped resources: native attempts hold it shared, a
//! [`FallbackRegistration`] holds it exclusively from registration until it
//! is dropped.

use std::ffi::{CString, c_int};
use std::time::Duration;

use confmirror_core::{MirrorError, Result};
use git2::transport::Transport;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::client::SmartHttpClient;
use super::subtransport::{FailureSlot, FallbackSubtransport};

/// Guards the transport table; holds the socket timeout currently set.
static TRANSPORT_LOCK: RwLock<Option<Duration>> = parking_lot::const_rwlock(None);

/// Shared hold on the transport table for an attempt on the native transport.
///
/// The engine's connect and socket read/write timeouts are set to
/// `timeout` first, so a remote that accepts the connection but never
/// answers fails the attempt instead of blocking it. While any of these is
/// alive no fallback can be registered and the timeouts cannot change.
pub fn native_transport_guard(timeout: Duration) -> RwLockReadGuard<'static, Option<Duration>> {
    let shared = TRANSPORT_LOCK.read();
    if *shared == Some(timeout) {
        return shared;
    }
    drop(shared);

    let mut exclusive = TRANSPORT_LOCK.write();
    if *exclusive != Some(timeout) {
        set_socket_timeouts(timeout);
        *exclusive = Some(timeout);
    }
    RwLockWriteGuard::downgrade(exclusive)
}

fn set_socket_timeouts(timeout: Duration) {
    // zero means "no timeout" to libgit2
    let millis = c_int::try_from(timeout.as_millis())
        .unwrap_or(c_int::MAX)
        .max(1);

    // SAFETY: global options must not change while a transport is in use.
    // The caller holds the transport lock exclusively.
    let set = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(millis))
    };

    match set {
        Ok(()) => debug!("Native transport socket timeouts set to {} ms", millis),
        Err(e) => warn!("Cannot set native transport socket timeouts: {}", e.message()),
    }
}

/// The fallback transport, registered for one URL scheme.
///
/// Dropping the value unregisters the transport and then releases the
/// exclusive hold on the transport table.
pub struct FallbackRegistration {
    scheme: &'static str,
    failure: FailureSlot,
    // Must stay the last field: released after `Drop::drop` unregistered.
    _exclusive: RwLockWriteGuard<'static, Option<Duration>>,
}

impl FallbackRegistration {
    /// Registers the fallback transport for `scheme` (`http` or `https`).
    ///
    /// Blocks until no other attempt is using the transport table.
    pub fn register(scheme: &'static str, client: SmartHttpClient) -> Result<Self> {
        let exclusive = TRANSPORT_LOCK.write();
        let failure = FailureSlot::default();
        let factory_failure = failure.clone();

        // SAFETY: libgit2 requires registration to be synchronized with the
        // creation of other transports. The exclusive lock is held, so no
        // clone or fetch is running in this process.
        let registered = unsafe {
            git2::transport::register(scheme, move |remote| {
                let subtransport =
                    FallbackSubtransport::new(client.clone(), factory_failure.clone());
                Transport::smart(remote, true, subtransport)
            })
        };

        registered.map_err(|e| {
            MirrorError::engine(format!(
                "cannot register fallback transport for {}: {}",
                scheme,
                e.message()
            ))
        })?;

        info!("Registered fallback smart-HTTP transport for {}://", scheme);

        Ok(Self {
            scheme,
            failure,
            _exclusive: exclusive,
        })
    }

    /// Returns the slot holding the typed failure of the last request.
    pub fn failure(&self) -> &FailureSlot {
        &self.failure
    }
}

impl Drop for FallbackRegistration {
    fn drop(&mut self) {
        let scheme = match CString::new(self.scheme) {
            Ok(scheme) => scheme,
            Err(_) => return,
        };

        // SAFETY: the pointer is valid for the duration of the call and the
        // exclusive lock is still held. The factory box passed at
        // registration is leaked by git2; it is a few bytes per fallback.
        let rc = unsafe { libgit2_sys::git_transport_unregister(scheme.as_ptr()) };

        if rc < 0 {
            warn!(
                "Failed to unregister fallback transport for {}:// (code {})",
                self.scheme, rc
            );
        } else {
            info!("Unregistered fallback smart-HTTP transport for {}://", self.scheme);
        }
    }
}

impl std::fmt::Debug for FallbackRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRegistration")
            .field("scheme", &self.scheme)
            .field("failure", &self.failure)
            .finish()
    }
}
