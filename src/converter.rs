use std::{io, iter};

use tracing::{debug, warn};

use super::{
    codec::{Chunk, ChunkStatus, Codec, CodecHandle},
    ConvertError, Error, FallbackPolicy,
};

/// The minimum size of the scratch output buffer once it has to grow.
const MIN_BUF_SIZE: usize = 32;

/// The scratch buffer size past which a codec that asks for more room without consuming or
/// writing anything is considered stuck.
const MAX_STALLED_BUF_SIZE: usize = 64 * 1024;

/// A reusable conversion pipeline from one encoding to another that recovers from bytes its codec
/// cannot convert.
///
/// A converter owns a [`Codec`], a [`FallbackPolicy`], and optionally a chained converter, which
/// the [`ChainEncoding`] policy uses to re-read unconvertible input as another source encoding.
///
/// The codec carries shift state from one chunk to the next while a conversion runs, so
/// [`convert`](Converter::convert) takes `&mut self`; a converter shared between threads has to be
/// put behind a lock so that conversions are serialized.
///
/// Each conversion is a complete document: the codec is flushed back to its initial state at the
/// end, and before every fallback that writes output so that this output starts in that state too.
///
/// The codec is released by [`close`](Converter::close), or when the converter is dropped.
///
/// [`ChainEncoding`]: FallbackPolicy::ChainEncoding
///
/// # Examples
///
/// ```rust
/// use encoding_rs_conv::{Converter, FallbackPolicy};
///
/// // UTF-8 text with a stray Shift_JIS fragment
/// let src = b"Hello \x90\xa2\x8a\x45";
///
/// let mut conv = Converter::open_with_fallback("UTF-8", "UTF-8", FallbackPolicy::ChainEncoding)?;
/// conv.set_fallback(Converter::open("SJIS", "UTF-8")?);
/// assert_eq!(conv.convert(src)?, "Hello 世界".as_bytes());
///
/// conv.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Converter<C: Codec = CodecHandle> {
    /// `None` once closed.
    codec: Option<C>,
    policy: FallbackPolicy,
    chained: Option<Box<Converter<C>>>,
}

impl Converter<CodecHandle> {
    /// Opens a converter from the `from` encoding to the `to` encoding that discards unconvertible
    /// bytes.
    ///
    /// Encoding names are `encoding_rs` labels; see [`CodecHandle::open`].
    pub fn open(from: &str, to: &str) -> Result<Self, Error> {
        Self::open_with_fallback(from, to, FallbackPolicy::Discard)
    }

    /// Opens a converter from the `from` encoding to the `to` encoding with the specified fallback
    /// policy.
    ///
    /// The policy can be given as a [`FallbackPolicy`], its numeric tag, or its name, and is
    /// validated before the codec is opened.
    pub fn open_with_fallback<P>(from: &str, to: &str, policy: P) -> Result<Self, Error>
    where
        P: TryInto<FallbackPolicy>,
        Error: From<P::Error>,
    {
        let policy = policy.try_into()?;
        let codec = CodecHandle::open(from, to)?;
        debug!(
            from = codec.source_name(),
            to = codec.target_name(),
            %policy,
            "opened converter"
        );
        Ok(Self::with_codec(codec, policy))
    }
}

impl<C: Codec> Converter<C> {
    /// Creates a converter driving the specified codec.
    pub fn with_codec(codec: C, policy: FallbackPolicy) -> Self {
        Self {
            codec: Some(codec),
            policy,
            chained: None,
        }
    }

    /// Returns the fallback policy.
    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Returns `true` if [`close`](Converter::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.codec.is_none()
    }

    /// Returns the source encoding name, or `None` if closed.
    pub fn source_name(&self) -> Option<&str> {
        self.codec.as_ref().map(Codec::source_name)
    }

    /// Returns the target encoding name, or `None` if closed.
    pub fn target_name(&self) -> Option<&str> {
        self.codec.as_ref().map(Codec::target_name)
    }

    /// Returns a reference to the chained converter, if any.
    pub fn fallback_ref(&self) -> Option<&Self> {
        self.chained.as_deref()
    }

    /// Returns an iterator over the chained converters, nearest first.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        iter::successors(self.fallback_ref(), |c| c.fallback_ref())
    }

    /// Attaches `chained` as the converter the [`ChainEncoding`] policy delegates to, returning the
    /// previously attached one.
    ///
    /// The returned converter is not closed; the caller owns it. `chained` is expected to convert
    /// into the same target encoding as `self`.
    ///
    /// [`ChainEncoding`]: FallbackPolicy::ChainEncoding
    pub fn set_fallback(&mut self, chained: Self) -> Option<Self> {
        if let (Some(own), Some(other)) = (self.target_name(), chained.target_name()) {
            if own != other {
                warn!(
                    to = own,
                    chained_to = other,
                    "chained converter produces a different encoding"
                );
            }
        }
        self.chained.replace(Box::new(chained)).map(|b| *b)
    }

    /// Detaches and returns the chained converter without closing it.
    pub fn take_fallback(&mut self) -> Option<Self> {
        self.chained.take().map(|b| *b)
    }

    /// Converts `input`, returning the converted bytes.
    ///
    /// Bytes the codec cannot convert are handled by the fallback policy. If the fallback cannot
    /// make progress, the returned [`ConvertError`] holds the output produced up to that point.
    pub fn convert(&mut self, input: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let mut output = Vec::with_capacity(input.len());
        match self.convert_to(input, &mut output) {
            Ok(()) => Ok(output),
            Err(e) => Err(ConvertError::new(e, output)),
        }
    }

    /// Converts `input`, writing the converted bytes into `writer`.
    ///
    /// When this returns an error that has an [`offset`](Error::offset), `writer` has received the
    /// conversion of `input[..offset]`, ending in the target's initial shift state.
    pub fn convert_to<W: io::Write>(&mut self, input: &[u8], writer: &mut W) -> Result<(), Error> {
        let Self {
            codec,
            policy,
            chained,
        } = self;
        let codec = codec.as_mut().ok_or(Error::UseAfterClose)?;
        if input.is_empty() {
            return Ok(());
        }

        let mut scratch = vec![0u8; input.len()];
        let result = convert_chunks(codec, *policy, chained, input, &mut scratch, writer);
        // flushed on failure too, so the next conversion starts from a reset codec
        let offset = result.as_ref().err().and_then(Error::offset);
        let flushed = flush(codec, &mut scratch, writer, offset.unwrap_or(input.len()));
        result.and(flushed)
    }

    /// Releases the codec and closes the chained converter, if any.
    ///
    /// The chained converter is closed even if releasing the own codec fails; the first failure
    /// is returned. Closing a converter twice reports [`Error::UseAfterClose`].
    pub fn close(&mut self) -> Result<(), Error> {
        let codec = self.codec.take().ok_or(Error::UseAfterClose)?;
        debug!(
            from = codec.source_name(),
            to = codec.target_name(),
            "closing converter"
        );
        let result = codec.close();
        match self.chained.take() {
            Some(mut chained) => result.and(chained.close()),
            None => result,
        }
    }
}

impl<C: Codec> Drop for Converter<C> {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            if let Err(e) = codec.close() {
                warn!(error = %e, "failed to release codec on drop");
            }
        }
    }
}

/// Runs the conversion loop over `input`, leaving the final flush to the caller.
fn convert_chunks<C: Codec, W: io::Write>(
    codec: &mut C,
    policy: FallbackPolicy,
    chained: &mut Option<Box<Converter<C>>>,
    input: &[u8],
    scratch: &mut Vec<u8>,
    writer: &mut W,
) -> Result<(), Error> {
    let mut cursor = 0;
    while cursor < input.len() {
        let Chunk {
            consumed,
            written,
            status,
        } = codec.convert_chunk(&input[cursor..], scratch);
        writer.write_all(&scratch[..written])?;
        cursor += consumed;

        match status {
            ChunkStatus::Ok if consumed == 0 && cursor < input.len() => {
                return Err(Error::FallbackNoProgress { offset: cursor });
            }
            ChunkStatus::Ok => {}
            ChunkStatus::OutputBufferTooSmall => {
                if consumed == 0 && written == 0 && scratch.len() >= MAX_STALLED_BUF_SIZE {
                    return Err(Error::FallbackNoProgress { offset: cursor });
                }
                grow(scratch);
            }
            ChunkStatus::InvalidSequence | ChunkStatus::IncompleteSequence => {
                if policy != FallbackPolicy::Discard {
                    // fallback output starts in the initial shift state
                    flush(codec, scratch, writer, cursor)?;
                }
                let n = policy.recover(chained.as_deref_mut(), &input[cursor..], cursor, writer)?;
                if n == 0 {
                    return Err(Error::FallbackNoProgress { offset: cursor });
                }
                cursor += n;
            }
        }
    }
    Ok(())
}

/// Writes what the codec still holds and returns it to its initial state.
fn flush<C: Codec, W: io::Write>(
    codec: &mut C,
    scratch: &mut Vec<u8>,
    writer: &mut W,
    offset: usize,
) -> Result<(), Error> {
    loop {
        let Chunk {
            written, status, ..
        } = codec.finish(scratch);
        writer.write_all(&scratch[..written])?;
        match status {
            ChunkStatus::OutputBufferTooSmall => {
                if written == 0 && scratch.len() >= MAX_STALLED_BUF_SIZE {
                    return Err(Error::FallbackNoProgress { offset });
                }
                grow(scratch);
            }
            _ => return Ok(()),
        }
    }
}

/// Grows the scratch output buffer.
fn grow(scratch: &mut Vec<u8>) {
    let len = (scratch.len() * 2).max(MIN_BUF_SIZE);
    debug!(from = scratch.len(), to = len, "growing output buffer");
    scratch.resize(len, 0);
}
