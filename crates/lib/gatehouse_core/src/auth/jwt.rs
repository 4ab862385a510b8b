//! Bearer credential verification against the authority's published keys.
//!
//! Only elliptic-curve signatures are accepted. The signing key is selected by
//! the credential's `iss` claim, which carries the key hash.

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use super::AuthError;
use crate::keys::KeyStore;
use crate::models::auth::TokenClaims;

/// Algorithms the authority signs with.
const ACCEPTED_ALGORITHMS: [Algorithm; 2] = [Algorithm::ES256, Algorithm::ES384];

/// `name` claim value that marks a credential as an access token.
pub const TOKEN_CLAIM_NAME: &str = "token";

/// Clock skew tolerated on `exp`, `nbf` and `iat` (seconds).
const LEEWAY_SECS: u64 = 60;

#[derive(Deserialize)]
struct IssuerOnly {
    #[serde(default)]
    iss: String,
}

/// Verify `credential` and return its claims.
///
/// Structural, lookup and signature failures all surface as
/// [`AuthError::CredentialInvalid`]. A well-signed credential that was not
/// minted as a token, or whose `iat` lies in the future, is
/// [`AuthError::TokenNotFound`].
pub fn verify_credential(keys: &KeyStore, credential: &str) -> Result<TokenClaims, AuthError> {
    let header = decode_header(credential)
        .map_err(|e| AuthError::CredentialInvalid(format!("jwt header: {e}")))?;
    if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::CredentialInvalid(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }

    let issuer = unverified_issuer(credential)?;
    let snapshot = keys.current();
    let key = snapshot
        .lookup(&issuer)
        .ok_or_else(|| AuthError::CredentialInvalid(format!("unknown signing key {issuer}")))?;

    let claims = decode_with_key(credential, key.decoding_key())?;

    if claims.name != TOKEN_CLAIM_NAME {
        debug!(name = %claims.name, "credential is not a token");
        return Err(AuthError::TokenNotFound);
    }
    if let Some(iat) = claims.issued_at
        && iat > Utc::now().timestamp() + LEEWAY_SECS as i64
    {
        debug!(iat, "credential issued in the future");
        return Err(AuthError::TokenNotFound);
    }
    Ok(claims)
}

/// Read `iss` without checking the signature, only to pick the key.
fn unverified_issuer(credential: &str) -> Result<String, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    let data = decode::<IssuerOnly>(credential, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::CredentialInvalid(format!("jwt claims: {e}")))?;
    Ok(data.claims.iss)
}

fn decode_with_key(credential: &str, key: &DecodingKey) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.leeway = LEEWAY_SECS;
    decode::<TokenClaims>(credential, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::CredentialInvalid(format!("jwt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;
    use crate::test_support::{
        PRIMARY_HASH, PRIMARY_PRIVATE_PEM, ROTATED_HASH, ROTATED_PRIVATE_PEM, claims_for,
        key_store, sign,
    };

    #[test]
    fn valid_credential_verifies() {
        let keys = key_store();
        let credential = sign(&claims_for("tok1", "user1"), PRIMARY_PRIVATE_PEM, PRIMARY_HASH);
        let claims = verify_credential(&keys, &credential).unwrap();
        assert_eq!(claims.subject, "tok1");
        assert_eq!(claims.user_id, "user1");
        assert_eq!(claims.issuer_hash, PRIMARY_HASH);
    }

    #[test]
    fn each_key_verifies_its_own_signatures() {
        let keys = key_store();
        let credential = sign(&claims_for("tok1", "user1"), ROTATED_PRIVATE_PEM, ROTATED_HASH);
        assert!(verify_credential(&keys, &credential).is_ok());
    }

    #[test]
    fn signature_from_other_key_fails() {
        let keys = key_store();
        // Signed with the rotated key but claims the primary key's hash.
        let credential = sign(&claims_for("tok1", "user1"), ROTATED_PRIVATE_PEM, PRIMARY_HASH);
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn unknown_issuer_fails() {
        let keys = key_store();
        let credential = sign(&claims_for("tok1", "user1"), PRIMARY_PRIVATE_PEM, "retired");
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn non_token_name_is_not_found() {
        let keys = key_store();
        let mut claims = claims_for("tok1", "user1");
        claims.name = "refresh".into();
        let credential = sign(&claims, PRIMARY_PRIVATE_PEM, PRIMARY_HASH);
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::TokenNotFound)
        ));
    }

    #[test]
    fn expired_credential_fails() {
        let keys = key_store();
        let mut claims = claims_for("tok1", "user1");
        claims.expires_at = Some(Utc::now().timestamp() - 3600);
        let credential = sign(&claims, PRIMARY_PRIVATE_PEM, PRIMARY_HASH);
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn future_issued_at_is_not_found() {
        let keys = key_store();
        let mut claims = claims_for("tok1", "user1");
        claims.issued_at = Some(Utc::now().timestamp() + 3600);
        let credential = sign(&claims, PRIMARY_PRIVATE_PEM, PRIMARY_HASH);
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::TokenNotFound)
        ));
    }

    #[test]
    fn symmetric_algorithm_is_rejected() {
        let keys = key_store();
        let mut claims = claims_for("tok1", "user1");
        claims.issuer_hash = PRIMARY_HASH.into();
        let credential = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn none_algorithm_is_rejected() {
        let keys = key_store();
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(
            json!({"sub": "tok1", "iss": PRIMARY_HASH, "name": "token"}).to_string(),
        );
        let credential = format!("{header}.{payload}.");
        assert!(matches!(
            verify_credential(&keys, &credential),
            Err(AuthError::CredentialInvalid(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = key_store();
        assert!(matches!(
            verify_credential(&keys, "not-a-jwt"),
            Err(AuthError::CredentialInvalid(_))
        ));
    }
}
