use std::{error, fmt, io};

use picky_asn1::restricted_string::CharSetError;
use picky_asn1_der::Asn1DerError;
use picky_krb::constants::error_codes::{
    KDC_ERR_C_PRINCIPAL_UNKNOWN, KDC_ERR_CLIENT_REVOKED, KDC_ERR_ETYPE_NOSUPP, KDC_ERR_KEY_EXPIRED,
    KDC_ERR_POLICY, KDC_ERR_PREAUTH_FAILED, KDC_ERR_PREAUTH_REQUIRED, KDC_ERR_S_PRINCIPAL_UNKNOWN,
    KDC_ERR_WRONG_REALM, KRB_AP_ERR_BAD_INTEGRITY, KRB_AP_ERR_MODIFIED, KRB_AP_ERR_SKEW, KRB_AP_ERR_TKT_EXPIRED,
    KRB_ERR_GENERIC, KRB_ERR_RESPONSE_TOO_BIG,
};
use picky_krb::crypto::KerberosCryptoError;
use picky_krb::gss_api::GssApiMessageError;
use picky_krb::messages::KrbError;

/// Representation of a token issuance result: either the value or an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of failure that stopped a token issuance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A request field, the realm or a KDC address is malformed.
    InvalidConfiguration,
    /// None of the configured KDC addresses answered within the timeout.
    KdcUnreachable,
    /// The KDC refused the supplied password, or the AS-REP could not be decrypted with it.
    PreAuthFailed,
    /// The KDC answered with any other error: unknown principal, locked account, clock skew, ...
    KdcRejected,
    /// The KDC refused to issue a ticket for the target service.
    ServiceTicketUnavailable,
    /// The SPNEGO initial context token could not be built.
    ContextInitFailed,
    /// The token could not be serialized.
    EncodingFailed,
    /// The caller cancelled the request.
    Cancelled,
    /// Codec or crypto failure below a stage boundary. Stages translate it into their own kind.
    InternalError,
}

/// Coarse grouping of [`ErrorKind`] values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Config,
    Auth,
    Negotiation,
    Encoding,
    Cancellation,
    Internal,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::InvalidConfiguration => ErrorCategory::Config,
            ErrorKind::KdcUnreachable | ErrorKind::PreAuthFailed | ErrorKind::KdcRejected => ErrorCategory::Auth,
            ErrorKind::ServiceTicketUnavailable | ErrorKind::ContextInitFailed => ErrorCategory::Negotiation,
            ErrorKind::EncodingFailed => ErrorCategory::Encoding,
            ErrorKind::Cancelled => ErrorCategory::Cancellation,
            ErrorKind::InternalError => ErrorCategory::Internal,
        }
    }
}

/// The step of the issuance pipeline an error was raised in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Authentication,
    ServiceTicket,
    ContextInitialization,
    Encoding,
}

impl Stage {
    /// Kind reported for internal failures raised inside this stage.
    pub fn default_error_kind(self) -> ErrorKind {
        match self {
            Stage::Configuration => ErrorKind::InvalidConfiguration,
            Stage::Authentication => ErrorKind::KdcRejected,
            Stage::ServiceTicket => ErrorKind::ServiceTicketUnavailable,
            Stage::ContextInitialization => ErrorKind::ContextInitFailed,
            Stage::Encoding => ErrorKind::EncodingFailed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Authentication => "authentication",
            Stage::ServiceTicket => "service ticket",
            Stage::ContextInitialization => "context initialization",
            Stage::Encoding => "encoding",
        };

        f.write_str(name)
    }
}

/// Holds the [`ErrorKind`], a human readable description and the [`Stage`] the error was raised in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub error_type: ErrorKind,
    pub description: String,
    pub stage: Option<Stage>,
}

impl Error {
    /// Allows to fill a new error easily, supplying it with a coherent description.
    pub fn new(error_type: ErrorKind, description: impl ToString) -> Self {
        Self {
            error_type,
            description: description.to_string(),
            stage: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error_type
    }

    /// Tags the error with the stage it escaped from.
    ///
    /// The first tag wins. [`ErrorKind::InternalError`] becomes the stage's default kind.
    pub fn in_stage(mut self, stage: Stage) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage);
        }

        if self.error_type == ErrorKind::InternalError {
            self.error_type = stage.default_error_kind();
        }

        self
    }

    /// The supplied credentials are wrong or the principal is not allowed to log on.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self.error_type, ErrorKind::PreAuthFailed | ErrorKind::KdcRejected)
    }

    /// The KDC could not be reached, or the service is not known to it.
    pub fn is_infrastructure_problem(&self) -> bool {
        matches!(
            self.error_type,
            ErrorKind::KdcUnreachable | ErrorKind::ServiceTicketUnavailable
        )
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "the request was cancelled")
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = self.stage {
            write!(f, "{} failed: ", stage)?;
        }

        write!(f, "{:?}: {}", self.error_type, self.description)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::InternalError, format!("IO error: {:?}", err))
    }
}

impl From<Asn1DerError> for Error {
    fn from(err: Asn1DerError) -> Self {
        Self::new(ErrorKind::InternalError, format!("ASN.1 DER error: {:?}", err))
    }
}

impl From<KerberosCryptoError> for Error {
    fn from(err: KerberosCryptoError) -> Self {
        Self::new(ErrorKind::InternalError, format!("Kerberos crypto error: {:?}", err))
    }
}

impl From<GssApiMessageError> for Error {
    fn from(err: GssApiMessageError) -> Self {
        Self::new(ErrorKind::EncodingFailed, format!("GSS-API message error: {:?}", err))
    }
}

impl From<CharSetError> for Error {
    fn from(err: CharSetError) -> Self {
        Self::new(
            ErrorKind::InvalidConfiguration,
            format!("value is not a valid Kerberos string: {:?}", err),
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, format!("invalid KDC address: {}", err))
    }
}

/// Converts a KRB-ERROR received during the AS exchange.
///
/// Pre-authentication failures become [`ErrorKind::PreAuthFailed`], anything else [`ErrorKind::KdcRejected`].
impl From<KrbError> for Error {
    fn from(krb_error: KrbError) -> Self {
        let error_type = match krb_error_code(&krb_error) {
            KDC_ERR_PREAUTH_FAILED | KRB_AP_ERR_BAD_INTEGRITY => ErrorKind::PreAuthFailed,
            _ => ErrorKind::KdcRejected,
        };

        Self::new(error_type, describe_krb_error(&krb_error))
    }
}

pub(crate) fn krb_error_code(krb_error: &KrbError) -> u32 {
    krb_error.0.error_code.0
}

/// Formats a KRB-ERROR as `NAME (code): e-text`.
pub(crate) fn describe_krb_error(krb_error: &KrbError) -> String {
    let code = krb_error_code(krb_error);
    let mut description = format!("{} ({})", krb_error_name(code), code);

    if let Some(e_text) = krb_error.0.e_text.0.as_ref() {
        description.push_str(": ");
        description.push_str(&e_text.0.to_string());
    }

    description
}

fn krb_error_name(code: u32) -> &'static str {
    match code {
        KDC_ERR_C_PRINCIPAL_UNKNOWN => "KDC_ERR_C_PRINCIPAL_UNKNOWN",
        KDC_ERR_S_PRINCIPAL_UNKNOWN => "KDC_ERR_S_PRINCIPAL_UNKNOWN",
        KDC_ERR_CLIENT_REVOKED => "KDC_ERR_CLIENT_REVOKED",
        KDC_ERR_KEY_EXPIRED => "KDC_ERR_KEY_EXPIRED",
        KDC_ERR_ETYPE_NOSUPP => "KDC_ERR_ETYPE_NOSUPP",
        KDC_ERR_POLICY => "KDC_ERR_POLICY",
        KDC_ERR_PREAUTH_FAILED => "KDC_ERR_PREAUTH_FAILED",
        KDC_ERR_PREAUTH_REQUIRED => "KDC_ERR_PREAUTH_REQUIRED",
        KDC_ERR_WRONG_REALM => "KDC_ERR_WRONG_REALM",
        KRB_AP_ERR_BAD_INTEGRITY => "KRB_AP_ERR_BAD_INTEGRITY",
        KRB_AP_ERR_TKT_EXPIRED => "KRB_AP_ERR_TKT_EXPIRED",
        KRB_AP_ERR_SKEW => "KRB_AP_ERR_SKEW",
        KRB_AP_ERR_MODIFIED => "KRB_AP_ERR_MODIFIED",
        KRB_ERR_RESPONSE_TOO_BIG => "KRB_ERR_RESPONSE_TOO_BIG",
        KRB_ERR_GENERIC => "KRB_ERR_GENERIC",
        _ => "KRB_ERROR",
    }
}
