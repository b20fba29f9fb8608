//! Chooses how each attempt of a clone or fetch moves bytes.

use std::fmt;

use confmirror_core::ConnectionProfile;

use crate::credentials::CredentialMode;

/// The two named attempts of a clone or fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attempt {
    Primary,
    Fallback,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// How an attempt reaches the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The engine's built-in transport.
    Native(CredentialMode),
    /// The smart-HTTP fallback registered for `scheme`, with the profile's
    /// explicit credentials.
    SmartHttp { scheme: &'static str },
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(CredentialMode::Default) => f.write_str("native/default-credentials"),
            Self::Native(CredentialMode::Explicit) => {
                f.write_str("native/explicit-credentials")
            },
            Self::SmartHttp { scheme } => write!(f, "smart-http/{}", scheme),
        }
    }
}

/// The routes of a two-attempt operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    pub primary: Route,
    pub fallback: Option<Route>,
}

impl AttemptPlan {
    /// Returns the route for an attempt, if the plan has one.
    pub fn route(&self, attempt: Attempt) -> Option<Route> {
        match attempt {
            Attempt::Primary => Some(self.primary),
            Attempt::Fallback => self.fallback,
        }
    }
}

/// Builds attempt plans from a connection profile.
#[derive(Debug, Clone, Copy)]
pub struct TransportResolver<'a> {
    profile: &'a ConnectionProfile,
}

impl<'a> TransportResolver<'a> {
    pub fn new(profile: &'a ConnectionProfile) -> Self {
        Self { profile }
    }

    /// Clone: native transport first, then the smart-HTTP fallback when the
    /// remote speaks HTTP and the profile allows it.
    ///
    /// Otherwise the only other route would repeat the primary, so there is
    /// no fallback.
    pub fn clone_plan(&self) -> AttemptPlan {
        let fallback = fallback_scheme(self.profile.remote_url())
            .filter(|_| self.profile.fallback_transport())
            .map(|scheme| Route::SmartHttp { scheme });

        AttemptPlan {
            primary: Route::Native(CredentialMode::Explicit),
            fallback,
        }
    }

    /// Fetch: default credentials first, then the explicit ones.
    ///
    /// Without explicit credentials there is nothing different to retry with.
    pub fn fetch_plan(&self) -> AttemptPlan {
        AttemptPlan {
            primary: Route::Native(CredentialMode::Default),
            fallback: self
                .profile
                .has_credentials()
                .then_some(Route::Native(CredentialMode::Explicit)),
        }
    }
}

/// Returns the URL scheme the fallback transport can serve for `url`.
pub fn fallback_scheme(url: &str) -> Option<&'static str> {
    let (scheme, _) = url.split_once("://")?;
    if scheme.eq_ignore_ascii_case("https") {
        Some("https")
    } else if scheme.eq_ignore_ascii_case("http") {
        Some("http")
    } else {
        None
    }
}
