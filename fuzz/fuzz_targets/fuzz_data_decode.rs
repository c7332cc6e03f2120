#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdbforge::data_section::DataDecoder;

fuzz_target!(|data: &[u8]| {
    let value = match DataDecoder::new(data).decode(0) {
        Ok(value) => value,
        Err(_) => return,
    };

    // Whatever decodes must re-encode canonically and decode to itself
    let bytes = value
        .to_canonical_bytes()
        .expect("decoded value re-encodes");
    let again = DataDecoder::new(&bytes)
        .decode(0)
        .expect("canonical bytes decode");
    assert_eq!(again, value);
});
