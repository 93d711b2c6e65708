use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// TLS 1.2 PRF (RFC 5246 section 5) with HMAC-SHA256, the hash of every
/// supported cipher suite.
///
/// PRF(secret, label, seed) = P_SHA256(secret, label + seed)
pub fn prf_sha256(secret: &[u8], label: &str, seed: &[u8], output_len: usize) -> Vec<u8> {
    debug_assert!(label.is_ascii());

    let mut result = Vec::with_capacity(output_len);

    // Input seed for A(1) is label + seed
    let mut input = Vec::with_capacity(label.len() + seed.len());
    input.extend_from_slice(label.as_bytes());
    input.extend_from_slice(seed);

    // A(1) = HMAC_hash(secret, label + seed)
    let mut a = hmac(secret, &[&input]);

    while result.len() < output_len {
        // P_hash output block = HMAC_hash(secret, A(i) + [label + seed])
        let output = hmac(secret, &[&a, &input]);

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        // A(i+1) = HMAC_hash(secret, A(i))
        if result.len() < output_len {
            a = hmac(secret, &[&a]);
        }
    }

    result
}

fn hmac(secret: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    for chunk in chunks {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().to_vec()
}

/// Master secret calculation (RFC 5246 section 8.1).
///
/// master_secret = PRF(pre_master, "master secret",
///                     client_random + server_random, 48)
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> [u8; 48] {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    let out = prf_sha256(pre_master_secret, "master secret", &seed, 48);
    let mut master = [0u8; 48];
    master.copy_from_slice(&out);
    master
}

/// Key expansion (RFC 5246 section 6.3). Note the seed order flips to
/// server_random + client_random.
pub fn key_expansion(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    key_material_length: usize,
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    prf_sha256(master_secret, "key expansion", &seed, key_material_length)
}

/// Finished verify_data (RFC 5246 section 7.4.9): 12 bytes of PRF output
/// keyed by the master secret over the transcript hash.
pub fn verify_data(master_secret: &[u8], is_client: bool, transcript: &[u8]) -> [u8; 12] {
    let label = if is_client {
        "client finished"
    } else {
        "server finished"
    };

    let hash = Sha256::digest(transcript);
    let out = prf_sha256(master_secret, label, &hash, 12);

    let mut data = [0u8; 12];
    data.copy_from_slice(&out);
    data
}
