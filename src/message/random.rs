use std::time::{SystemTime, UNIX_EPOCH};

use nom::bytes::complete::take;
use nom::IResult;

/// ClientHello/ServerHello random: 4-byte gmt_unix_time plus 28 random
/// bytes. Feeds the PRF seed and the ServerKeyExchange signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub const LEN: usize = 32;

    /// Generate a fresh random with the current wall-clock time stamp.
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        bytes[..4].copy_from_slice(&secs.to_be_bytes());

        Random(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, bytes) = take(Self::LEN)(input)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(bytes);
        Ok((input, Random(random)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.0);
    }
}
