//! Compares the throughput of the fallback policies on unconvertible input.

#![feature(test)]

extern crate test;

use encoding_rs_conv::{Converter, FallbackPolicy};

const N_READ: usize = 32 * 1024;

#[bench]
fn mappable(b: &mut test::Bencher) {
    let src = test::black_box("€1 is cheap. ".repeat(N_READ / 16));
    b.iter(|| {
        let mut conv = Converter::open("UTF-8", "ISO-8859-15").unwrap();
        let dst = conv.convert(src.as_bytes()).unwrap();

        assert_eq!(dst.len(), src.len() - 2 * N_READ / 16);
    });
}

#[bench]
fn discard(b: &mut test::Bencher) {
    let src = test::black_box(vec![0xffu8; N_READ]);
    b.iter(|| {
        let mut conv = Converter::open("UTF-8", "ISO-8859-15").unwrap();
        let dst = conv.convert(&src).unwrap();

        assert!(dst.is_empty());
    });
}

#[bench]
fn keep_verbatim(b: &mut test::Bencher) {
    let src = test::black_box(vec![0xffu8; N_READ]);
    b.iter(|| {
        let mut conv =
            Converter::open_with_fallback("UTF-8", "ISO-8859-15", FallbackPolicy::KeepVerbatim)
                .unwrap();
        let dst = conv.convert(&src).unwrap();

        assert_eq!(dst, src);
    });
}

#[bench]
fn chain_encoding(b: &mut test::Bencher) {
    let src = test::black_box(b"\x90\xa2\x8a\x45".repeat(N_READ / 4));
    let expected = "世界".repeat(N_READ / 4);
    b.iter(|| {
        let mut conv =
            Converter::open_with_fallback("UTF-8", "UTF-8", FallbackPolicy::ChainEncoding)
                .unwrap();
        conv.set_fallback(Converter::open("SJIS", "UTF-8").unwrap());
        let dst = conv.convert(&src).unwrap();

        assert_eq!(dst, expected.as_bytes());
    });
}

#[bench]
fn raw_decoder(b: &mut test::Bencher) {
    let src = test::black_box(b"\x90\xa2\x8a\x45".repeat(N_READ / 4));
    let expected = "世界".repeat(N_READ / 4);
    b.iter(|| {
        let mut dst = String::new();
        let mut decoder = encoding_rs::SHIFT_JIS.new_decoder();
        dst.reserve(decoder.max_utf8_buffer_length(src.len()).unwrap());
        let (result, _, _) = decoder.decode_to_string(&src, &mut dst, true);
        assert!(matches!(result, encoding_rs::CoderResult::InputEmpty));

        assert_eq!(dst, expected);
    });
}
