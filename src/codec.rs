use encoding_rs::{DecoderResult, EncoderResult, Encoding, REPLACEMENT, UTF_16BE, UTF_16LE};

use super::{
    util::{drain_into, DebuggableDecoder, DebuggableEncoder},
    Error,
};

/// Capacity of the per-unit UTF-8 pivot; one decoder step never produces more than two
/// characters.
const UNIT_BUF_SIZE: usize = 16;

/// The outcome of a single [`Codec::convert_chunk`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// The number of input bytes consumed.
    pub consumed: usize,
    /// The number of bytes written to the output buffer.
    pub written: usize,
    /// Why the call returned.
    pub status: ChunkStatus,
}

/// The classified reason a [`Codec::convert_chunk`] call returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The whole input was converted.
    Ok,
    /// The unit at `consumed` is malformed in the source encoding or unmappable in the target.
    InvalidSequence,
    /// The unit at `consumed` is truncated by the end of the input.
    IncompleteSequence,
    /// The output buffer filled up; call again with the remaining input.
    OutputBufferTooSmall,
}

/// A stateful converter from one encoding to another, driven chunk by chunk by a
/// [`Converter`](crate::Converter).
///
/// An implementation carries its shift state from one call to the next, so each instance must be
/// used for one conversion stream at a time.
pub trait Codec {
    /// Converts as much of `src` as possible into `dst`.
    ///
    /// On [`ChunkStatus::InvalidSequence`] and [`ChunkStatus::IncompleteSequence`], `consumed`
    /// points at the first byte of the unit that could not be converted, and the next call is
    /// expected to start at or after that byte.
    fn convert_chunk(&mut self, src: &[u8], dst: &mut [u8]) -> Chunk;

    /// Writes whatever the codec still holds at the end of the input, such as a final shift
    /// sequence, and returns to the initial state.
    ///
    /// Reports [`ChunkStatus::OutputBufferTooSmall`] while there is more to write.
    fn finish(&mut self, dst: &mut [u8]) -> Chunk {
        let _ = dst;
        Chunk {
            consumed: 0,
            written: 0,
            status: ChunkStatus::Ok,
        }
    }

    /// Releases the codec.
    fn close(self) -> Result<(), Error>
    where
        Self: Sized;

    /// Returns the name of the source encoding.
    fn source_name(&self) -> &str;

    /// Returns the name of the target encoding.
    fn target_name(&self) -> &str;
}

/// The [`Codec`] built on `encoding_rs`, pivoting through UTF-8.
///
/// Input is decoded one byte at a time so that a unit (the bytes behind one step of decoder
/// output, normally a single character) can be reported at its first byte when it is malformed,
/// truncated, or unmappable in the target encoding. After such a failure the decoder restarts in
/// its initial state.
///
/// UTF-16LE and UTF-16BE, which `encoding_rs` decodes but does not encode, are supported as
/// targets as well.
///
/// # Examples
///
/// ```rust
/// use encoding_rs_conv::{ChunkStatus, Codec, CodecHandle};
///
/// let mut codec = CodecHandle::open("UTF-8", "SJIS")?;
/// let mut dst = [0u8; 16];
///
/// let chunk = codec.convert_chunk("漢字😂".as_bytes(), &mut dst);
/// assert_eq!(chunk.status, ChunkStatus::InvalidSequence);
/// assert_eq!(chunk.consumed, 6);
/// assert_eq!(&dst[..chunk.written], b"\x8a\xbf\x8e\x9a");
///
/// codec.close()?;
/// # Ok::<(), encoding_rs_conv::Error>(())
/// ```
#[derive(Debug)]
pub struct CodecHandle {
    source: &'static Encoding,
    target: &'static Encoding,
    decoder: DebuggableDecoder,
    encoder: TargetEncoder,
    /// The decoder output of the current unit.
    unit: String,
    /// The target bytes of the current unit.
    staged: Vec<u8>,
    /// Target bytes that did not fit into the previous output buffer.
    pending: Vec<u8>,
    /// Whether the unit at the start of the next call is already known to be unconvertible, which
    /// is reported once `pending` is flushed.
    unconvertible: bool,
}

#[derive(Debug)]
enum TargetEncoder {
    Native(DebuggableEncoder),
    Utf16 { big_endian: bool },
}

impl TargetEncoder {
    fn new(target: &'static Encoding) -> Self {
        if target == UTF_16LE {
            Self::Utf16 { big_endian: false }
        } else if target == UTF_16BE {
            Self::Utf16 { big_endian: true }
        } else {
            Self::Native(target.new_encoder().into())
        }
    }
}

/// The result of encoding one unit.
enum UnitResult {
    Mapped,
    Unmappable,
}

impl CodecHandle {
    /// Opens a codec converting from the `from` encoding to the `to` encoding.
    ///
    /// Labels are resolved as WHATWG encoding labels, case-insensitively (e.g. "UTF-8", "SJIS",
    /// "GB2312", "UTF-16LE", "ISO-8859-15").
    pub fn open(from: &str, to: &str) -> Result<Self, Error> {
        let (source, target) = match (
            Encoding::for_label(from.as_bytes()),
            Encoding::for_label(to.as_bytes()),
        ) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(Error::UnsupportedEncodingPair {
                    from: from.to_owned(),
                    to: to.to_owned(),
                })
            }
        };
        // the replacement encoding decodes everything to U+FFFD and encodes nothing
        if source == REPLACEMENT || target == REPLACEMENT {
            return Err(Error::NullHandle {
                from: from.to_owned(),
                to: to.to_owned(),
            });
        }

        Ok(Self {
            source,
            target,
            decoder: source.new_decoder_without_bom_handling().into(),
            encoder: TargetEncoder::new(target),
            unit: String::with_capacity(UNIT_BUF_SIZE),
            staged: Vec::new(),
            pending: Vec::new(),
            unconvertible: false,
        })
    }

    /// Returns the source encoding.
    pub fn source(&self) -> &'static Encoding {
        self.source
    }

    /// Returns the target encoding.
    pub fn target(&self) -> &'static Encoding {
        self.target
    }

    fn reset_decoder(&mut self) {
        self.decoder = self.source.new_decoder_without_bom_handling().into();
    }

    /// Feeds `src` (at most one byte, or none with `last`) to the decoder, leaving its output in
    /// `self.unit`.
    fn decode_step(&mut self, src: &[u8], last: bool) -> (DecoderResult, usize) {
        self.unit.clear();
        let (result, read) = self
            .decoder
            .decode_to_string_without_replacement(src, &mut self.unit, last);
        if let DecoderResult::OutputFull = result {
            debug_assert!(false, "unreachable");
        }
        (result, read)
    }

    /// Encodes `self.unit` into `self.staged`.
    ///
    /// On [`UnitResult::Unmappable`], `self.staged` keeps what the encoder wrote ahead of the
    /// unmappable character, e.g. the ISO-2022-JP escape back to ASCII.
    fn encode_unit(&mut self) -> UnitResult {
        self.staged.clear();
        match &mut self.encoder {
            TargetEncoder::Native(encoder) => {
                let max_len = encoder
                    .max_buffer_length_from_utf8_without_replacement(self.unit.len())
                    .map_or(UNIT_BUF_SIZE, |n| n.max(UNIT_BUF_SIZE));
                self.staged.reserve(max_len);
                let (result, _) = encoder.encode_from_utf8_to_vec_without_replacement(
                    &self.unit,
                    &mut self.staged,
                    false,
                );
                match result {
                    EncoderResult::InputEmpty => UnitResult::Mapped,
                    EncoderResult::Unmappable(_) => UnitResult::Unmappable,
                    EncoderResult::OutputFull => {
                        debug_assert!(false, "unreachable");
                        self.staged.clear();
                        UnitResult::Unmappable
                    }
                }
            }
            TargetEncoder::Utf16 { big_endian } => {
                let mut units = [0u16; 2];
                for c in self.unit.chars() {
                    for u in c.encode_utf16(&mut units) {
                        self.staged.extend_from_slice(&if *big_endian {
                            u.to_be_bytes()
                        } else {
                            u.to_le_bytes()
                        });
                    }
                }
                UnitResult::Mapped
            }
        }
    }

    /// Copies the staged unit into `dst`, keeping what does not fit for the next call, and
    /// returns the number of bytes copied.
    fn emit_staged(&mut self, dst: &mut [u8]) -> usize {
        let n = drain_into(&mut self.staged, dst);
        self.pending.append(&mut self.staged);
        n
    }

    fn fail(&mut self, consumed: usize, written: usize, status: ChunkStatus) -> Chunk {
        self.reset_decoder();
        Chunk {
            consumed,
            written,
            status,
        }
    }

    /// Reports the unit at `consumed` as unconvertible after emitting the bytes staged ahead of
    /// it. If they do not fit, the report is deferred to the next call.
    fn fail_unmappable(&mut self, consumed: usize, mut written: usize, dst: &mut [u8]) -> Chunk {
        written += self.emit_staged(&mut dst[written..]);
        if self.pending.is_empty() {
            self.fail(consumed, written, ChunkStatus::InvalidSequence)
        } else {
            self.unconvertible = true;
            self.fail(consumed, written, ChunkStatus::OutputBufferTooSmall)
        }
    }

    /// Decodes the unit held by the decoder at the end of the input, encoding it on success.
    fn finish_unit(&mut self) -> Option<UnitResult> {
        let (result, _) = self.decode_step(&[], true);
        self.reset_decoder();
        match result {
            DecoderResult::InputEmpty if self.unit.is_empty() => Some(UnitResult::Mapped),
            DecoderResult::InputEmpty => Some(self.encode_unit()),
            _ => None,
        }
    }
}

impl Codec for CodecHandle {
    fn convert_chunk(&mut self, src: &[u8], dst: &mut [u8]) -> Chunk {
        let mut written = drain_into(&mut self.pending, dst);
        if !self.pending.is_empty() {
            return Chunk {
                consumed: 0,
                written,
                status: ChunkStatus::OutputBufferTooSmall,
            };
        }
        if self.unconvertible {
            self.unconvertible = false;
            return Chunk {
                consumed: 0,
                written,
                status: ChunkStatus::InvalidSequence,
            };
        }

        // `consumed` is the start of the current unit; `fed` runs ahead of it while the decoder
        // buffers a multi-byte sequence
        let mut consumed = 0;
        let mut fed = 0;

        while fed < src.len() {
            let (result, read) = self.decode_step(&src[fed..fed + 1], false);
            fed += read;
            match result {
                DecoderResult::InputEmpty if self.unit.is_empty() => continue,
                DecoderResult::InputEmpty => {}
                _ => return self.fail(consumed, written, ChunkStatus::InvalidSequence),
            }
            if let UnitResult::Unmappable = self.encode_unit() {
                return self.fail_unmappable(consumed, written, dst);
            }
            written += self.emit_staged(&mut dst[written..]);
            consumed = fed;
            if !self.pending.is_empty() {
                return Chunk {
                    consumed,
                    written,
                    status: ChunkStatus::OutputBufferTooSmall,
                };
            }
        }

        if consumed < src.len() {
            // the decoder still holds the leading bytes of a unit
            match self.finish_unit() {
                Some(UnitResult::Mapped) => {
                    written += self.emit_staged(&mut dst[written..]);
                    consumed = src.len();
                }
                Some(UnitResult::Unmappable) => {
                    return self.fail_unmappable(consumed, written, dst)
                }
                None => return self.fail(consumed, written, ChunkStatus::IncompleteSequence),
            }
        }

        Chunk {
            consumed,
            written,
            status: if self.pending.is_empty() {
                ChunkStatus::Ok
            } else {
                ChunkStatus::OutputBufferTooSmall
            },
        }
    }

    fn finish(&mut self, dst: &mut [u8]) -> Chunk {
        if let TargetEncoder::Native(encoder) = &mut self.encoder {
            self.staged.clear();
            self.staged.reserve(
                encoder
                    .max_buffer_length_from_utf8_without_replacement(0)
                    .map_or(UNIT_BUF_SIZE, |n| n.max(UNIT_BUF_SIZE)),
            );
            let (result, _) =
                encoder.encode_from_utf8_to_vec_without_replacement("", &mut self.staged, true);
            debug_assert!(matches!(result, EncoderResult::InputEmpty));
            self.pending.append(&mut self.staged);
            self.encoder = TargetEncoder::new(self.target);
        }
        self.reset_decoder();
        self.unconvertible = false;

        let written = drain_into(&mut self.pending, dst);
        Chunk {
            consumed: 0,
            written,
            status: if self.pending.is_empty() {
                ChunkStatus::Ok
            } else {
                ChunkStatus::OutputBufferTooSmall
            },
        }
    }

    fn close(self) -> Result<(), Error> {
        Ok(())
    }

    fn source_name(&self) -> &str {
        self.source.name()
    }

    fn target_name(&self) -> &str {
        self.target.name()
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunk, ChunkStatus, Codec, CodecHandle, Error};

    fn chunk(consumed: usize, written: usize, status: ChunkStatus) -> Chunk {
        Chunk {
            consumed,
            written,
            status,
        }
    }

    #[test]
    fn open_errors() {
        assert!(matches!(
            CodecHandle::open("INVALID_ENCODING", "UTF-8"),
            Err(Error::UnsupportedEncodingPair { from, .. }) if from == "INVALID_ENCODING"
        ));
        assert!(matches!(
            CodecHandle::open("UTF-8", "INVALID_ENCODING"),
            Err(Error::UnsupportedEncodingPair { to, .. }) if to == "INVALID_ENCODING"
        ));
        assert!(matches!(
            CodecHandle::open("ISO-2022-KR", "UTF-8"),
            Err(Error::NullHandle { .. })
        ));
        assert!(matches!(
            CodecHandle::open("UTF-8", "replacement"),
            Err(Error::NullHandle { .. })
        ));
    }

    #[test]
    fn labels_resolve_to_canonical_names() {
        let codec = CodecHandle::open("sjis", " utf-16le ").unwrap();
        assert_eq!(codec.source_name(), "Shift_JIS");
        assert_eq!(codec.target_name(), "UTF-16LE");
        let codec = CodecHandle::open("GB2312", "latin1").unwrap();
        assert_eq!(codec.source_name(), "GBK");
        assert_eq!(codec.target_name(), "windows-1252");
    }

    #[test]
    fn malformed_unit_reported_at_its_first_byte() {
        let mut codec = CodecHandle::open("SJIS", "UTF-8").unwrap();
        let mut dst = [0u8; 32];
        // 0x81 expects a trail byte, not a space
        let c = codec.convert_chunk(b"ab\x81 cd", &mut dst);
        assert_eq!(c, chunk(2, 2, ChunkStatus::InvalidSequence));
        assert_eq!(&dst[..2], b"ab");

        // decoder restarts cleanly at the byte after the skipped one
        let c = codec.convert_chunk(b" cd", &mut dst);
        assert_eq!(c, chunk(3, 3, ChunkStatus::Ok));
        assert_eq!(&dst[..3], b" cd");
    }

    #[test]
    fn unmappable_unit_reported_at_its_first_byte() {
        let mut codec = CodecHandle::open("UTF-8", "ISO-8859-15").unwrap();
        let mut dst = [0u8; 32];
        let c = codec.convert_chunk("€漢".as_bytes(), &mut dst);
        assert_eq!(c, chunk(3, 1, ChunkStatus::InvalidSequence));
        assert_eq!(dst[0], 0xa4);
    }

    #[test]
    fn truncated_unit_at_end_of_input() {
        let mut codec = CodecHandle::open("UTF-8", "UTF-16BE").unwrap();
        let mut dst = [0u8; 32];
        let c = codec.convert_chunk(b"a\xe6\xbc", &mut dst);
        assert_eq!(c, chunk(1, 2, ChunkStatus::IncompleteSequence));
        assert_eq!(&dst[..2], b"\x00a");
    }

    #[test]
    fn output_kept_across_calls_when_buffer_is_small() {
        let mut codec = CodecHandle::open("UTF-8", "UTF-16LE").unwrap();
        let mut dst = [0u8; 3];
        let c = codec.convert_chunk(b"abc", &mut dst);
        assert_eq!(c, chunk(2, 3, ChunkStatus::OutputBufferTooSmall));
        assert_eq!(dst, *b"a\x00b");

        // the held byte goes out first
        let c = codec.convert_chunk(b"c", &mut dst);
        assert_eq!(c, chunk(1, 3, ChunkStatus::Ok));
        assert_eq!(dst, *b"\x00c\x00");
    }

    #[test]
    fn surrogate_pairs_to_utf16() {
        let mut codec = CodecHandle::open("UTF-8", "UTF-16BE").unwrap();
        let mut dst = [0u8; 8];
        let c = codec.convert_chunk("😂".as_bytes(), &mut dst);
        assert_eq!(c, chunk(4, 4, ChunkStatus::Ok));
        assert_eq!(&dst[..4], &[0xd8, 0x3d, 0xde, 0x02]);
    }

    #[test]
    fn finish_writes_shift_sequence() {
        let mut codec = CodecHandle::open("UTF-8", "ISO-2022-JP").unwrap();
        let mut dst = [0u8; 32];
        let c = codec.convert_chunk("漢".as_bytes(), &mut dst);
        assert_eq!(c, chunk(3, 5, ChunkStatus::Ok));
        assert_eq!(&dst[..5], b"\x1b$B4A");

        let c = codec.finish(&mut dst);
        assert_eq!(c, chunk(0, 3, ChunkStatus::Ok));
        assert_eq!(&dst[..3], b"\x1b(B");

        // the codec is back in its initial state
        assert_eq!(codec.finish(&mut dst), chunk(0, 0, ChunkStatus::Ok));
        let c = codec.convert_chunk(b"a", &mut dst);
        assert_eq!(c, chunk(1, 1, ChunkStatus::Ok));
    }

    #[test]
    fn shift_back_before_unmappable_unit() {
        let mut codec = CodecHandle::open("UTF-8", "ISO-2022-JP").unwrap();
        let mut dst = [0u8; 32];
        let c = codec.convert_chunk("漢😂".as_bytes(), &mut dst);
        assert_eq!(c, chunk(3, 8, ChunkStatus::InvalidSequence));
        assert_eq!(&dst[..8], b"\x1b$B4A\x1b(B");

        // already back in ASCII
        assert_eq!(codec.finish(&mut dst), chunk(0, 0, ChunkStatus::Ok));
    }

    #[test]
    fn shift_back_before_unmappable_unit_in_small_buffer() {
        let mut codec = CodecHandle::open("UTF-8", "ISO-2022-JP").unwrap();
        let mut dst = [0u8; 6];
        let c = codec.convert_chunk("漢😂".as_bytes(), &mut dst);
        assert_eq!(c, chunk(3, 6, ChunkStatus::OutputBufferTooSmall));
        assert_eq!(dst, *b"\x1b$B4A\x1b");

        // the held bytes go out first, then the unit is reported
        let c = codec.convert_chunk("😂".as_bytes(), &mut dst);
        assert_eq!(c, chunk(0, 2, ChunkStatus::InvalidSequence));
        assert_eq!(&dst[..2], b"(B");
        let c = codec.convert_chunk("😂a".as_bytes(), &mut dst);
        assert_eq!(c, chunk(0, 0, ChunkStatus::InvalidSequence));
    }

    #[test]
    fn finish_in_small_buffer() {
        let mut codec = CodecHandle::open("UTF-8", "ISO-2022-JP").unwrap();
        let mut dst = [0u8; 8];
        codec.convert_chunk("漢".as_bytes(), &mut dst);

        let mut small = [0u8; 2];
        assert_eq!(
            codec.finish(&mut small),
            chunk(0, 2, ChunkStatus::OutputBufferTooSmall)
        );
        assert_eq!(small, *b"\x1b(");
        assert_eq!(codec.finish(&mut small), chunk(0, 1, ChunkStatus::Ok));
        assert_eq!(small[0], b'B');
    }
}
