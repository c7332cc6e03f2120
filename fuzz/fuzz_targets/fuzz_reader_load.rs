#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdbforge::mmdb::Reader;

fuzz_target!(|data: &[u8]| {
    // Garbage input must produce errors, never panics or endless walks
    let reader = match Reader::from_bytes(data.to_vec()) {
        Ok(reader) => reader,
        Err(_) => return,
    };
    for item in reader.networks(true).take(10_000) {
        let _ = item;
    }
    let _ = reader.lookup("1.2.3.4".parse().unwrap());
    let _ = reader.lookup("2001:db8::1".parse().unwrap());
});
