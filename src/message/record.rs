use core::fmt;
use std::cmp::Ordering;
use std::ops::Range;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::ProtocolVersion;
use crate::util::{be_u48, put_u48};
use crate::Error;

/// One record carved out of a datagram, plus the remainder.
///
/// A single UDP datagram may carry several records back to back; the
/// dispatcher peels them off one at a time.
pub struct DtlsRecordSlice<'a> {
    pub slice: &'a [u8],
    pub rest: &'a [u8],
}

impl<'a> DtlsRecordSlice<'a> {
    pub fn try_read(input: &'a [u8]) -> Result<Option<DtlsRecordSlice<'a>>, Error> {
        if input.is_empty() {
            return Ok(None);
        }

        if input.len() < DtlsRecord::HEADER_LEN {
            return Err(Error::decode(0, "record header truncated"));
        }

        let length_bytes = input[DtlsRecord::LENGTH_OFFSET].try_into().unwrap();
        let length = u16::from_be_bytes(length_bytes) as usize;
        let mid = DtlsRecord::HEADER_LEN + length;

        if input.len() < mid {
            return Err(Error::decode(
                DtlsRecord::HEADER_LEN,
                "record fragment truncated",
            ));
        }

        let (slice, rest) = input.split_at(mid);

        Ok(Some(DtlsRecordSlice { slice, rest }))
    }
}

/// A DTLS record: 13-byte header plus fragment.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct DtlsRecord<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub sequence: Sequence,
    pub length: u16,
    pub fragment: &'a [u8],
}

/// Epoch and 48-bit sequence number identifying a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64, // technically u48
}

impl Sequence {
    /// Largest representable 48-bit sequence number.
    pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;
}

impl<'a> DtlsRecord<'a> {
    /// DTLS record header length: content_type(1) + version(2) + epoch(2) + seq(6) + length(2)
    pub const HEADER_LEN: usize = 13;

    /// Byte offset in the record header where the 2-byte length field is
    pub const LENGTH_OFFSET: Range<usize> = 11..13;

    pub fn parse(input: &'a [u8]) -> IResult<&[u8], DtlsRecord<'a>> {
        let (input, content_type) = ContentType::parse(input)?; // u8
        let (input, version) = ProtocolVersion::parse(input)?; // u16
        let (input, epoch) = be_u16(input)?; // u16
        let (input, sequence_number) = be_u48(input)?; // u48
        let (input, length) = be_u16(input)?; // u16
        let (rest, fragment) = take(length as usize)(input)?;

        let sequence = Sequence {
            epoch,
            sequence_number,
        };

        Ok((
            rest,
            DtlsRecord {
                content_type,
                version,
                sequence,
                length,
                fragment,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
        put_u48(output, self.sequence.sequence_number);
        output.extend_from_slice(&self.length.to_be_bytes());
        output.extend_from_slice(self.fragment);
    }
}

/// Record layer content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[epoch: {}, sequence_number: {}]",
            self.epoch, self.sequence_number,
        )
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.sequence_number.cmp(&other.sequence_number))
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
