//! Error translation — maps connection-manager status reasons and error
//! names onto [`ErrorKind`].

use crate::error::{AccountError, ErrorKind};
use crate::manager::StatusReason;

/// Stateless mapping from low-level failure signals to the wizard taxonomy.
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Map a disconnect reason.
    pub fn translate_reason(reason: StatusReason) -> ErrorKind {
        match reason {
            StatusReason::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            StatusReason::NameInUse => ErrorKind::NameInUse,
            StatusReason::NetworkError | StatusReason::Requested => ErrorKind::ConnectionFailed,
            StatusReason::None | StatusReason::EncryptionError | StatusReason::CertificateError => {
                ErrorKind::Unknown
            }
        }
    }

    /// Map a manager error name such as
    /// `org.freedesktop.Telepathy.Error.AuthenticationFailed`.
    ///
    /// Only the last dotted component is considered.
    pub fn translate_error_name(name: &str) -> Option<ErrorKind> {
        let short = name.rsplit('.').next().unwrap_or(name);
        match short {
            "AuthenticationFailed" => Some(ErrorKind::AuthenticationFailed),
            "NameInUse" | "AlreadyConnected" => Some(ErrorKind::NameInUse),
            "NetworkError" | "ConnectionFailed" | "ConnectionRefused" | "ConnectionLost" => {
                Some(ErrorKind::ConnectionFailed)
            }
            _ => None,
        }
    }

    /// Map a disconnect, refining an unspecified reason with the last error
    /// name the connection reported.
    pub fn translate(reason: StatusReason, last_error: Option<&str>) -> ErrorKind {
        match Self::translate_reason(reason) {
            ErrorKind::Unknown => last_error
                .and_then(Self::translate_error_name)
                .unwrap_or(ErrorKind::Unknown),
            kind => kind,
        }
    }

    /// Build the error for a failed connection of `account`.
    pub fn to_error(kind: ErrorKind, account: &str) -> AccountError {
        match kind {
            ErrorKind::AuthenticationFailed => AccountError::AuthenticationFailed {
                account: account.to_string(),
            },
            ErrorKind::NameInUse => AccountError::NameInUse {
                account: account.to_string(),
            },
            ErrorKind::ConnectionFailed => AccountError::ConnectionFailed,
            ErrorKind::UserCancelled => AccountError::UserCancelled,
            ErrorKind::AlreadyInProgress | ErrorKind::InvalidValue | ErrorKind::Unknown => {
                AccountError::Unknown(format!("connection for {account} failed ({kind})"))
            }
        }
    }
}
