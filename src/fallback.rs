use std::{fmt, io, str};

use tracing::trace;

use super::{codec::Codec, Converter, Error};

/// The rule a [`Converter`] applies to input bytes its codec cannot convert.
///
/// A codec stops at a unit that is malformed in the source encoding, truncated at the end of the
/// input, or unmappable in the target encoding. The converter then hands the remaining input to
/// its fallback policy, which consumes some bytes and may produce output before the codec resumes.
///
/// Policies can also be given by their numeric tags (`0`, `1`, `2`) or by name, which is how an
/// invalid policy is rejected with [`Error::InvalidFallbackPolicy`]:
///
/// ```rust
/// use encoding_rs_conv::{Error, FallbackPolicy};
///
/// assert_eq!("keep".parse::<FallbackPolicy>()?, FallbackPolicy::KeepVerbatim);
/// assert_eq!(FallbackPolicy::try_from(2)?, FallbackPolicy::ChainEncoding);
/// assert!(matches!(
///     FallbackPolicy::try_from(3),
///     Err(Error::InvalidFallbackPolicy(_))
/// ));
/// # Ok::<(), Error>(())
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FallbackPolicy {
    /// Drops one byte.
    #[default]
    Discard,
    /// Copies one byte to the output unchanged.
    KeepVerbatim,
    /// Re-reads the remaining input with the chained converter attached by
    /// [`Converter::set_fallback`], which writes whatever it converts and consumes as much as its
    /// own conversion loop does.
    ChainEncoding,
}

impl FallbackPolicy {
    /// Applies the policy to `rest`, the non-empty remaining input starting at `offset`, and
    /// returns the number of bytes consumed.
    ///
    /// A return value of zero means the policy could not advance.
    pub(crate) fn recover<C: Codec, W: io::Write>(
        self,
        chained: Option<&mut Converter<C>>,
        rest: &[u8],
        offset: usize,
        writer: &mut W,
    ) -> Result<usize, Error> {
        debug_assert!(!rest.is_empty());
        match self {
            Self::Discard => {
                trace!(offset, byte = rest[0], "discarding unconvertible byte");
                Ok(1)
            }
            Self::KeepVerbatim => {
                trace!(offset, byte = rest[0], "keeping unconvertible byte");
                writer.write_all(&rest[..1])?;
                Ok(1)
            }
            Self::ChainEncoding => {
                let Some(chained) = chained else {
                    return Err(Error::NilFallbackConverter { offset });
                };
                trace!(
                    offset,
                    len = rest.len(),
                    from = ?chained.source_name(),
                    "delegating remaining input to chained converter"
                );
                match chained.convert_to(rest, writer) {
                    Ok(()) => Ok(rest.len()),
                    Err(e) => match e.offset() {
                        Some(consumed) => {
                            trace!(consumed, error = %e, "chained converter stopped early");
                            Ok(consumed)
                        }
                        None => Err(e),
                    },
                }
            }
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discard => "discard",
            Self::KeepVerbatim => "keep",
            Self::ChainEncoding => "next",
        })
    }
}

impl str::FromStr for FallbackPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" | "discard_unrecognized" => Ok(Self::Discard),
            "keep" | "keep_verbatim" | "keep_unrecognized" => Ok(Self::KeepVerbatim),
            "next" | "chain" | "chain_encoding" | "next_enc_unrecognized" => {
                Ok(Self::ChainEncoding)
            }
            _ => Err(Error::InvalidFallbackPolicy(format!("{:?}", s))),
        }
    }
}

impl TryFrom<&str> for FallbackPolicy {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<i32> for FallbackPolicy {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Discard),
            1 => Ok(Self::KeepVerbatim),
            2 => Ok(Self::ChainEncoding),
            _ => Err(Error::InvalidFallbackPolicy(value.to_string())),
        }
    }
}
