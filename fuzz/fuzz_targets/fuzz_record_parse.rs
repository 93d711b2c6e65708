#![no_main]

//! Fuzz target for record and handshake-header parsing.
//!
//! DTLS 1.2 record format:
//! - ContentType: 1 byte (20-23 valid values)
//! - ProtocolVersion: 2 bytes (0xFEFD for DTLS 1.2)
//! - Epoch: 2 bytes
//! - Sequence Number: 6 bytes (u48)
//! - Length: 2 bytes
//! - Fragment: variable

use libfuzzer_sys::fuzz_target;

use cadmium::message::{DtlsRecord, DtlsRecordSlice, Handshake};

fuzz_target!(|data: &[u8]| {
    // Raw input through the record slicer and parser.
    let mut rest = data;
    while let Ok(Some(slice)) = DtlsRecordSlice::try_read(rest) {
        rest = slice.rest;
        let _ = DtlsRecord::parse(slice.slice);
    }

    // Also as a handshake fragment straight into the handshake parser.
    let _ = Handshake::parse(data);

    // And with a well-formed record header prefixed, to reach deeper
    // into the fragment parsing.
    if !data.is_empty() {
        let mut record = vec![22u8]; // ContentType::Handshake
        record.extend_from_slice(&[0xFE, 0xFD]); // DTLS 1.2
        record.extend_from_slice(&[0, 0]); // epoch 0
        record.extend_from_slice(&[0, 0, 0, 0, 0, 1]); // sequence 1
        let frag_len = data.len().min(16384) as u16;
        record.extend_from_slice(&frag_len.to_be_bytes());
        record.extend_from_slice(&data[..frag_len as usize]);

        if let Ok((_, parsed)) = DtlsRecord::parse(&record) {
            let _ = Handshake::parse(parsed.fragment);
        }
    }
});
