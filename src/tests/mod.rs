
#[test]
fn ex_readme_examples() -> Result<(), super::Error> {
    use super::Converter;

    let sjis: &[u8] = &[72, 101, 108, 108, 111, 32, 144, 162, 138, 69];
    let big5: &[u8] = &[72, 101, 108, 108, 111, 32, 165, 64, 172, 201];

    let mut decoder = Converter::open("Shift_JIS", "UTF-8")?;
    let mut encoder = Converter::open("UTF-8", "Big5")?;

    let utf8 = decoder.convert(sjis)?;
    assert_eq!(utf8, "Hello 世界".as_bytes());
    assert_eq!(encoder.convert(&utf8)?, big5);

    let mut direct = Converter::open("Shift_JIS", "Big5")?;
    assert_eq!(direct.convert(sjis)?, big5);

    decoder.close()?;
    encoder.close()?;
    direct.close()
}
