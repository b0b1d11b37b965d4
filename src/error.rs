use std::{convert, error, fmt, io};

/// The error type of this crate.
///
/// Errors raised while opening a converter are fatal to that call. Errors raised during
/// conversion stop the conversion at a specific input offset, reported by [`Error::offset`];
/// [`Converter::convert`] returns them alongside the output produced up to that point in a
/// [`ConvertError`].
///
/// Malformed, truncated, and unmappable input never surfaces as an error by itself; it is handed
/// to the converter's [`FallbackPolicy`] and only stops the conversion when the fallback cannot
/// make progress.
///
/// [`Converter::convert`]: crate::Converter::convert
/// [`FallbackPolicy`]: crate::FallbackPolicy
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Either encoding label is unknown to the codec.
    #[error("unsupported encoding pair: {from:?} to {to:?}")]
    UnsupportedEncodingPair { from: String, to: String },

    /// The labels were recognized but resolve to a codec that cannot convert anything.
    #[error("codec for {from:?} to {to:?} is unusable")]
    NullHandle { from: String, to: String },

    /// The fallback policy tag is not one of the known policies.
    #[error("invalid fallback policy: {0}")]
    InvalidFallbackPolicy(String),

    /// The converter uses `ChainEncoding` but has no chained converter attached.
    #[error("no fallback converter attached; conversion stopped at input offset {offset}")]
    NilFallbackConverter { offset: usize },

    /// The fallback consumed no input, so the conversion cannot advance.
    #[error("fallback cannot advance conversion at input offset {offset}")]
    FallbackNoProgress { offset: usize },

    /// The converter has already been closed.
    #[error("converter used after close")]
    UseAfterClose,

    /// The codec failed to release its resources.
    #[error("failed to close codec: {0}")]
    NativeCloseFailure(#[source] Box<dyn error::Error + Send + Sync>),

    /// The output writer failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the input offset at which the conversion stopped, if this error stopped one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::NilFallbackConverter { offset } | Self::FallbackNoProgress { offset } => {
                Some(*offset)
            }
            _ => None,
        }
    }
}

impl From<convert::Infallible> for Error {
    fn from(value: convert::Infallible) -> Self {
        match value {}
    }
}

/// The error returned by [`Converter::convert`], carrying the output converted before the
/// conversion stopped.
///
/// The partial output is a valid conversion of `input[..offset]` and is meant to be used, not
/// discarded.
///
/// [`Converter::convert`]: crate::Converter::convert
///
/// # Examples
///
/// ```rust
/// use encoding_rs_conv::{Converter, Error, FallbackPolicy};
///
/// let mut conv = Converter::open_with_fallback("UTF-8", "ISO-8859-15", FallbackPolicy::ChainEncoding)?;
///
/// let e = conv.convert("€1 is cheap, 円 is not".as_bytes()).unwrap_err();
/// assert!(matches!(e.error(), Error::NilFallbackConverter { offset: 15 }));
/// assert_eq!(e.partial_output(), b"\xa41 is cheap, ");
/// # Ok::<(), Error>(())
/// ```
#[derive(Debug)]
pub struct ConvertError {
    error: Error,
    output: Vec<u8>,
}

impl ConvertError {
    pub(crate) fn new(error: Error, output: Vec<u8>) -> Self {
        Self { error, output }
    }

    /// Returns the error that stopped the conversion.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Returns the output produced before the conversion stopped.
    pub fn partial_output(&self) -> &[u8] {
        &self.output
    }

    /// Disassembles `self` into the error and the partial output.
    pub fn into_parts(self) -> (Error, Vec<u8>) {
        (self.error, self.output)
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes converted before stopping)",
            self.error,
            self.output.len()
        )
    }
}

impl error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ConvertError> for Error {
    fn from(value: ConvertError) -> Self {
        value.error
    }
}
