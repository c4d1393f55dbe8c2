//! Error handling.

use std::fmt;

/// A specialized [`Result`] type for context and negotiation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all context lifecycle and negotiation operations.
#[derive(Debug, Clone)]
pub struct Error {
    /// The raw code of the underlying platform error.
    raw_code: Option<i64>,

    /// The raw message from the os in case it could be obtained.
    raw_os_message: Option<String>,

    /// The simplified error kind to handle matching.
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(
        raw_code: Option<i64>,
        raw_os_message: Option<String>,
        kind: ErrorKind,
    ) -> Self {
        Self { raw_code, raw_os_message, kind }
    }

    /// Helper to check that error is [`ErrorKind::NotSupported`].
    #[inline]
    pub fn not_supported(&self) -> bool {
        matches!(&self.kind, ErrorKind::NotSupported(_))
    }

    /// The underlying error kind.
    #[inline]
    pub fn error_kind(&self) -> ErrorKind {
        self.kind
    }

    /// The underlying raw platform code in case it's present.
    #[inline]
    pub fn raw_code(&self) -> Option<i64> {
        self.raw_code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(raw_code) = self.raw_code {
            write!(f, "[{raw_code:x}] ")?;
        }

        let msg = if let Some(raw_os_message) = self.raw_os_message.as_ref() {
            raw_os_message
        } else {
            self.kind.as_str()
        };

        write!(f, "{msg}")
    }
}

impl std::error::Error for Error {}

/// Build an error with just a kind.
impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error { raw_code: None, raw_os_message: None, kind }
    }
}

/// Capture the platform "last error" code verbatim, since it's the only
/// diagnosable piece of information drivers report on failure.
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error {
            raw_code: error.raw_os_error().map(|code| code as i64),
            raw_os_message: Some(error.to_string()),
            kind: ErrorKind::Platform,
        }
    }
}

/// A list specifying general categories of context and negotiation errors.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested backend or some required symbol in it was missing.
    NotFound,

    /// Failed to perform resource initialization.
    InitializationFailed,

    /// Can't access a requested resource.
    ///
    /// For example when trying to release a context that is current on
    /// another thread.
    BadAccess,

    /// The capabilities chooser returned an index outside the candidate list.
    ///
    /// This is a contract violation of the chooser, never downgraded to a
    /// fallback pick.
    BadChooserIndex,

    /// An incompatible combination of capabilities was requested.
    ///
    /// For example render-to-texture-rectangle without render-to-texture.
    BadCapabilities(&'static str),

    /// The context is no longer valid.
    BadContext,

    /// The context is in a state the requested transition is invalid for.
    BadContextState,

    /// Invalid config was passed.
    BadConfig,

    /// The surface is invalid.
    BadSurface,

    /// One or more argument values are invalid.
    BadParameter,

    /// Bad native window was provided.
    BadNativeWindow,

    /// A pixel format was already applied to the surface.
    ///
    /// A surface's format is chosen exactly once for its lifetime.
    PixelFormatAlreadySet,

    /// No pixel format matched the requested capabilities.
    NoAvailablePixelFormat,

    /// The operation is not supported by the platform.
    NotSupported(&'static str),

    /// A native call failed; the raw platform code is carried alongside.
    Platform,

    /// The misc error that can't be classified occurred.
    Misc,
}

impl ErrorKind {
    pub(crate) fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            NotFound => "not found",
            InitializationFailed => "initialization failed",
            BadAccess => "access to the resource failed",
            BadChooserIndex => "capabilities chooser returned an out of range index",
            BadCapabilities(reason) => reason,
            BadContext => "argument does not name a valid context",
            BadContextState => "the context is in a bad state",
            BadConfig => "argument does not name a valid config",
            BadSurface => "argument does not name a valid surface",
            BadParameter => "one or more argument values are invalid",
            BadNativeWindow => "argument does not refer to a valid native window",
            PixelFormatAlreadySet => "pixel format was already chosen for this surface",
            NoAvailablePixelFormat => "no pixel format matched the requested capabilities",
            NotSupported(reason) => reason,
            Platform => "platform error",
            Misc => "misc platform error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
