//! PKCE verifier/challenge pairs (RFC 7636, S256).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes drawn per verifier; encodes to 43 URL-safe characters.
pub const VERIFIER_BYTES: usize = 32;

pub const CHALLENGE_METHOD: &str = "S256";

pub fn generate_verifier() -> String {
    let mut raw = [0u8; VERIFIER_BYTES];
    rand::rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

pub async fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Authorization endpoint URL carrying the challenge.
pub fn authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
) -> Result<url::Url, url::ParseError> {
    url::Url::parse_with_params(
        authorize_endpoint,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("code_challenge", challenge),
            ("code_challenge_method", CHALLENGE_METHOD),
        ],
    )
}
