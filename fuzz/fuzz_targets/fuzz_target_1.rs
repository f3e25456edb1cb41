#![no_main]

use libfuzzer_sys::fuzz_target;
use tigotap::Parser;

fuzz_target!(|data: &[u8]| {
    Parser::new().feed(data);
});
