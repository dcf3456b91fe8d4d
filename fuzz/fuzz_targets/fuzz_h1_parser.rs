#![no_main]

use interceptproxy::parser::HttpMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut request = HttpMessage::request();
    let _ = request.parse(data);

    let mut response = HttpMessage::response();
    let _ = response.parse(data);
});
