//! Gattway errors and GATT operation status classification

use num_enum::TryFromPrimitive;

/// The error type for synchronous Bluetooth operations
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    message: String,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
        message: impl Into<String>,
    ) -> Self {
        Error {
            kind,
            source,
            message: message.into(),
        }
    }

    /// Returns the corresponding [ErrorKind] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (true, Some(err)) => write!(f, "{}: {}", &self.kind, err),
            (false, Some(err)) => write!(f, "{}: {} ({})", &self.kind, &self.message, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = &**x;
            x
        })
    }
}

/// A list of general categories of Bluetooth error.
#[non_exhaustive]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// the Bluetooth adapter is not available
    AdapterUnavailable,
    /// the Bluetooth adapter is already scanning
    AlreadyScanning,
    /// the Bluetooth device isn't connected
    NotConnected,
    /// the Bluetooth operation is unsupported on this platform
    NotSupported,
    /// invalid parameter
    InvalidParameter,
    /// an internal error has occured
    Internal,
    /// error
    Other,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}

/// The uniform outcome of an asynchronous GATT operation.
///
/// Every platform-specific status or error object is classified into exactly one of
/// these four values before it reaches application code; no platform error type
/// crosses the [`Device`][crate::Device] boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GattOperationResult {
    /// The operation completed successfully.
    Success,
    /// The operation failed for a reason other than permissions or support.
    Failure,
    /// The peripheral refused the operation (permissions, security, or bounds).
    NotPermitted,
    /// The peripheral does not support the requested operation.
    RequestNotSupported,
}

impl GattOperationResult {
    /// Returns `true` for [`GattOperationResult::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, GattOperationResult::Success)
    }
}

/// Bluetooth Attribute Protocol status codes relevant to result classification.
/// See the Bluetooth Core Specification, Vol 3, Part F, §3.4.1.1.
#[repr(u8)]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive)]
pub enum AttErrorCode {
    /// The operation completed successfully.
    Success = 0x00,
    /// The attribute cannot be read.
    ReadNotPermitted = 0x02,
    /// The attribute cannot be written.
    WriteNotPermitted = 0x03,
    /// The attribute requires authentication before it can be read or written.
    InsufficientAuthentication = 0x05,
    /// Attribute server does not support the request received from the client.
    RequestNotSupported = 0x06,
    /// Offset specified was past the end of the attribute.
    InvalidOffset = 0x07,
    /// The attribute value length is invalid for the operation.
    InvalidAttributeValueLength = 0x0d,
    /// The attribute requires encryption before it can be read or written.
    InsufficientEncryption = 0x0f,
}

/// A raw status code reported by a native GATT stack.
///
/// This type only crosses the boundary between a platform adapter and the
/// callback sink; [`GattStatus::classify`] collapses it into a
/// [`GattOperationResult`] before any event is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(pub i32);

impl GattStatus {
    /// The generic success status shared by all platforms.
    pub const SUCCESS: GattStatus = GattStatus(0);

    /// The generic failure status (`GATT_FAILURE` on Android-like stacks).
    pub const FAILURE: GattStatus = GattStatus(0x101);

    /// Returns `true` if this status reports success.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Classifies this raw status into the four-way uniform result.
    ///
    /// Permission- and bounds-related ATT codes collapse to
    /// [`NotPermitted`][GattOperationResult::NotPermitted]; unrecognized codes
    /// collapse to [`Failure`][GattOperationResult::Failure].
    pub fn classify(self) -> GattOperationResult {
        let code = match u8::try_from(self.0).ok().and_then(|x| AttErrorCode::try_from(x).ok()) {
            Some(code) => code,
            None => return GattOperationResult::Failure,
        };
        match code {
            AttErrorCode::Success => GattOperationResult::Success,
            AttErrorCode::ReadNotPermitted
            | AttErrorCode::WriteNotPermitted
            | AttErrorCode::InsufficientAuthentication
            | AttErrorCode::InvalidOffset
            | AttErrorCode::InvalidAttributeValueLength
            | AttErrorCode::InsufficientEncryption => GattOperationResult::NotPermitted,
            AttErrorCode::RequestNotSupported => GattOperationResult::RequestNotSupported,
        }
    }
}

impl From<AttErrorCode> for GattStatus {
    fn from(code: AttErrorCode) -> Self {
        GattStatus(code as u8 as i32)
    }
}
