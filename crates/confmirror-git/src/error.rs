//! Translation of engine failures into [`MirrorError`].

use confmirror_core::MirrorError;
use git2::{ErrorClass, ErrorCode};
use tokio_util::sync::CancellationToken;

/// Maps a failed clone or fetch to the domain taxonomy.
///
/// libgit2 reports HTTP statuses only in its messages, so the status is
/// parsed out of them. Failures in the mirror's own objects or refs are
/// engine errors; anything unrecognised is a network error.
pub fn classify(err: &git2::Error, url: &str, cancel: &CancellationToken) -> MirrorError {
    if cancel.is_cancelled() {
        return MirrorError::Cancelled;
    }

    let message = err.message();
    let lower = message.to_ascii_lowercase();
    let detail = format!("{} ({})", url, message);
    let status = http_status(&lower);

    if err.code() == ErrorCode::Auth
        || status == Some(401)
        || lower.contains("authentication")
    {
        return MirrorError::Unauthorized(detail);
    }

    if status == Some(403) {
        return MirrorError::Forbidden(detail);
    }

    let not_found_class = matches!(
        err.class(),
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Repository
    );
    if status == Some(404)
        || lower.contains("could not find repository")
        || (err.code() == ErrorCode::NotFound && not_found_class)
    {
        return MirrorError::RepositoryNotFound(detail);
    }

    if is_local_state(err, &lower) {
        return MirrorError::engine(detail);
    }

    MirrorError::network(detail)
}

fn is_local_state(err: &git2::Error, lower: &str) -> bool {
    err.code() == ErrorCode::Peel
        || matches!(
            err.class(),
            ErrorClass::Odb | ErrorClass::Object | ErrorClass::Reference
        )
        || lower.contains("not a committish")
}

/// Extracts `NNN` from "... status code: NNN" or "... status code NNN".
fn http_status(message: &str) -> Option<u16> {
    let (_, rest) = message.split_once("status code")?;
    let digits: String = rest
        .trim_start_matches([':', ' '])
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Maps a failure while reading the mirror.
pub fn engine(err: git2::Error) -> MirrorError {
    MirrorError::engine(err.message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: ErrorCode, class: ErrorClass, message: &str) -> git2::Error {
        git2::Error::new(code, class, message)
    }

    const URL: &str = "https://git.example.com/cfg.git";

    #[test]
    fn test_status_codes() {
        let cancel = CancellationToken::new();

        let e = err(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 401");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Unauthorized(_)));

        let e = err(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 403");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Forbidden(_)));

        let e = err(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 404");
        assert!(matches!(
            classify(&e, URL, &cancel),
            MirrorError::RepositoryNotFound(_)
        ));
    }

    #[test]
    fn test_auth_code_and_missing_local_repository() {
        let cancel = CancellationToken::new();

        let e = err(ErrorCode::Auth, ErrorClass::Http, "too many redirects or authentication replays");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Unauthorized(_)));

        let e = err(
            ErrorCode::NotFound,
            ErrorClass::Repository,
            "could not find repository at '/srv/none'",
        );
        assert!(matches!(
            classify(&e, "/srv/none", &cancel),
            MirrorError::RepositoryNotFound(_)
        ));
    }

    #[test]
    fn test_http_status() {
        assert_eq!(http_status("unexpected http status code: 404"), Some(404));
        assert_eq!(http_status("unexpected http status code 502"), Some(502));
        assert_eq!(http_status("failed to connect to 10.4.0.1:4013"), None);
    }

    #[test]
    fn test_digits_in_paths_are_not_statuses() {
        let cancel = CancellationToken::new();
        let e = err(
            ErrorCode::GenericError,
            ErrorClass::Os,
            "failed to open '/tmp/.tmp401abc/config': Permission denied",
        );
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Network(_)));
    }

    #[test]
    fn test_everything_else_is_network() {
        let cancel = CancellationToken::new();
        let e = err(
            ErrorCode::GenericError,
            ErrorClass::Net,
            "failed to connect to 127.0.0.1: Connection refused",
        );
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Network(_)));
    }

    #[test]
    fn test_local_state_failures_are_engine_errors() {
        let cancel = CancellationToken::new();

        let e = err(ErrorCode::Peel, ErrorClass::Invalid, "object is not a committish");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Engine(_)));

        let e = err(ErrorCode::GenericError, ErrorClass::Odb, "object not found - no match for id");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Engine(_)));
    }

    #[test]
    fn test_cancellation_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let e = err(ErrorCode::User, ErrorClass::Callback, "operation aborted");
        assert!(matches!(classify(&e, URL, &cancel), MirrorError::Cancelled));
    }
}
