//! The smart-HTTP fallback as a `git2` subtransport.
//!
//! libgit2 drives the protocol (negotiation, pack parsing); this module only
//! moves bytes. Every stream buffers what libgit2 writes and performs the
//! HTTP request on the first read, so POST bodies always go out complete.

use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use git2::transport::{Service, SmartSubtransport, SmartSubtransportStream};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::client::{SmartHttpClient, TransportError};
use super::SmartAction;

/// Holds the first typed failure of the fallback transport.
///
/// libgit2 only sees an opaque I/O error; the mirror manager reads the
/// original [`TransportError`] back from here.
#[derive(Debug, Clone, Default)]
pub struct FailureSlot(Arc<Mutex<Option<TransportError>>>);

impl FailureSlot {
    /// Records a failure unless one is already stored.
    pub fn record(&self, error: TransportError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// Removes and returns the stored failure.
    pub fn take(&self) -> Option<TransportError> {
        self.0.lock().take()
    }

    /// Returns true when a failure is stored.
    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }
}

/// Subtransport handed to libgit2 for one remote connection.
pub(crate) struct FallbackSubtransport {
    client: SmartHttpClient,
    // Set once a list request was redirected; pack requests follow it.
    base_url: Arc<Mutex<Option<String>>>,
    failure: FailureSlot,
}

impl FallbackSubtransport {
    pub(crate) fn new(client: SmartHttpClient, failure: FailureSlot) -> Self {
        Self {
            client,
            base_url: Arc::new(Mutex::new(None)),
            failure,
        }
    }
}

impl SmartSubtransport for FallbackSubtransport {
    fn action(
        &self,
        url: &str,
        service: Service,
    ) -> Result<Box<dyn SmartSubtransportStream>, git2::Error> {
        let action = SmartAction::from_service(service);
        let base = self
            .base_url
            .lock()
            .clone()
            .unwrap_or_else(|| url.to_string());

        Ok(Box::new(FallbackStream {
            client: self.client.clone(),
            action,
            base,
            rebase: Arc::clone(&self.base_url),
            failure: self.failure.clone(),
            request: Vec::new(),
            response: None,
        }))
    }

    fn close(&self) -> Result<(), git2::Error> {
        Ok(())
    }
}

struct FallbackStream {
    client: SmartHttpClient,
    action: SmartAction,
    base: String,
    rebase: Arc<Mutex<Option<String>>>,
    failure: FailureSlot,
    request: Vec<u8>,
    response: Option<Cursor<Vec<u8>>>,
}

impl FallbackStream {
    fn execute(&mut self) -> io::Result<Cursor<Vec<u8>>> {
        match self.client.execute(self.action, &self.base, &self.request) {
            Ok(response) => {
                if self.action.is_list()
                    && response.redirects > 0
                    && let Some(base) = response
                        .final_url
                        .strip_suffix(self.action.endpoint_suffix())
                {
                    debug!("Fallback transport rebased to {}", base);
                    *self.rebase.lock() = Some(base.to_string());
                }
                Ok(Cursor::new(response.body))
            },
            Err(e) => {
                warn!("Fallback transport {} failed: {}", self.action, e);
                let message = e.to_string();
                self.failure.record(e);
                Err(io::Error::other(message))
            },
        }
    }
}

impl Read for FallbackStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.response.is_none() {
            let response = self.execute()?;
            self.request.clear();
            self.response = Some(response);
        }

        match self.response.as_mut() {
            Some(body) => body.read(buf),
            None => Ok(0),
        }
    }
}

impl Write for FallbackStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.action.is_list() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not take a request body", self.action),
            ));
        }
        self.request.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
