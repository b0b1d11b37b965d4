//! Charset conversion over encoding_rs with fallbacks for unconvertible bytes
//!
//! This crate converts byte sequences from one text encoding to another with a [`Converter`],
//! which drives a stateful [`Codec`] chunk by chunk over the input and grows its output buffer as
//! needed.
//!
//! ```rust
//! use encoding_rs_conv::Converter;
//!
//! let mut conv = Converter::open("SJIS", "UTF-8")?;
//! let utf8 = conv.convert(b"\x82\xb1\x82\xea\x82\xcd\x8a\xbf\x8e\x9a\x82\xc5\x82\xb7\x81B")?;
//! assert_eq!(utf8, "これは漢字です。".as_bytes());
//! conv.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Unlike a bare codec, a converter does not stop at bytes that are malformed in the source
//! encoding or unmappable in the target encoding. It applies its [`FallbackPolicy`] instead: drop
//! the byte, copy it verbatim, or re-read the rest of the input with a chained converter for
//! another source encoding.
//!
//! ```rust
//! use encoding_rs_conv::{Converter, FallbackPolicy};
//!
//! let src = "€1 is cheap, 円 is not".as_bytes();
//!
//! let mut discard = Converter::open("UTF-8", "ISO-8859-15")?;
//! assert_eq!(discard.convert(src)?, b"\xa41 is cheap,  is not");
//!
//! let mut keep = Converter::open_with_fallback("UTF-8", "ISO-8859-15", FallbackPolicy::KeepVerbatim)?;
//! assert_eq!(keep.convert(src)?, b"\xa41 is cheap, \xe5\x86\x86 is not");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The default codec, [`CodecHandle`], is built on [`encoding_rs`] and accepts its encoding labels.
//!
//! [`encoding_rs`]: https://crates.io/crates/encoding_rs

#![cfg_attr(docsrs, feature(doc_cfg))]

mod codec;
mod converter;
mod error;
mod fallback;

mod util;

pub use codec::{Chunk, ChunkStatus, Codec, CodecHandle};
pub use converter::Converter;
pub use error::{ConvertError, Error};
pub use fallback::FallbackPolicy;

#[cfg(test)]
mod tests;
