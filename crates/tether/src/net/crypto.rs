use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::protocol::{ChallengeResponse, IDENTIFIER_SIZE, Identifier, NONCE_SIZE, Nonce};

pub fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// SHA-256 over the client nonce, the server nonce and, when present, the
/// password. Both peers must feed the inputs in exactly this order.
pub fn challenge_response(
    client_nonce: &Nonce,
    server_nonce: &Nonce,
    password: Option<&[u8]>,
) -> ChallengeResponse {
    let mut hasher = Sha256::new();
    hasher.update(client_nonce);
    hasher.update(server_nonce);
    if let Some(password) = password {
        hasher.update(password);
    }

    let mut response = [0u8; 32];
    response.copy_from_slice(&hasher.finalize());
    response
}

pub fn identifier(response: &ChallengeResponse) -> Identifier {
    let mut identifier = [0u8; IDENTIFIER_SIZE];
    identifier.copy_from_slice(&response[..IDENTIFIER_SIZE]);
    identifier
}

pub fn password_bytes(password: &str) -> Vec<u8> {
    password.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonces_are_fresh() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
    }

    #[test]
    fn test_response_depends_on_every_input() {
        let client = [1u8; NONCE_SIZE];
        let server = [2u8; NONCE_SIZE];

        let base = challenge_response(&client, &server, Some(b"secret"));
        assert_eq!(base, challenge_response(&client, &server, Some(b"secret")));
        assert_ne!(base, challenge_response(&client, &server, Some(b"Secret")));
        assert_ne!(base, challenge_response(&server, &client, Some(b"secret")));
        assert_ne!(base, challenge_response(&client, &server, None));
    }

    #[test]
    fn test_empty_password_matches_absent_password() {
        let client = [5u8; NONCE_SIZE];
        let server = [6u8; NONCE_SIZE];
        assert_eq!(
            challenge_response(&client, &server, Some(b"")),
            challenge_response(&client, &server, None)
        );
    }

    #[test]
    fn test_response_matches_plain_sha256() {
        let client = [0x11u8; NONCE_SIZE];
        let server = [0x22u8; NONCE_SIZE];

        let mut input = Vec::new();
        input.extend_from_slice(&client);
        input.extend_from_slice(&server);
        input.extend_from_slice(b"pw");
        let expected = Sha256::digest(&input);

        let response = challenge_response(&client, &server, Some(b"pw"));
        assert_eq!(&response[..], &expected[..]);
        assert_eq!(identifier(&response), expected[..8]);
    }
}
