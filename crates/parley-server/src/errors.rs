//! Error mapping at the RPC edge.
//!
//! Internal code works in [`ParleyError`]; this module owns the single
//! translation to `tonic::Status`. Peer-returned statuses never pass
//! through here; they propagate unchanged from the federation client.

use tonic::{Code, Status};

use parley_types::ParleyError;

/// Maps a semantic proxy error to its transport status.
pub(crate) fn to_status(err: ParleyError) -> Status {
    let code = match err {
        ParleyError::Unauthenticated
        | ParleyError::NeedFinalise
        | ParleyError::BadPassword
        | ParleyError::BadTotp
        | ParleyError::PasswordPolicy => Code::Unauthenticated,

        ParleyError::Input => Code::InvalidArgument,

        ParleyError::MismatchedSender | ParleyError::MismatchedDomain => Code::PermissionDenied,

        ParleyError::BadGroup | ParleyError::BadUser | ParleyError::NotPeered => Code::NotFound,

        ParleyError::InaccessiblePeer => Code::Unavailable,

        ParleyError::General => Code::Internal,
    };

    Status::new(code, err.to_string())
}

/// Collapses a backend failure to `general`, keeping the cause in the
/// logs only.
pub(crate) fn internal(err: impl std::fmt::Display) -> ParleyError {
    tracing::warn!(%err, "backend failure");
    ParleyError::General
}
