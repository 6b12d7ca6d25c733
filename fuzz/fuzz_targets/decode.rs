#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};
use unlz4::framed::LZ4FrameReader;

fuzz_target!(|data: &[u8]| {
    let input = Cursor::new(data);
    if let Ok(reader) = LZ4FrameReader::new(input) {
        let mut lz4_reader = reader.into_read();
        let mut buffer = vec![0; 4096];
        let mut result = lz4_reader.read(&mut buffer);
        while result.is_ok() && result.unwrap() > 0 {
            result = lz4_reader.read(&mut buffer);
        }
    }
});
