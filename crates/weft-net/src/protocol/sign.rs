// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Request signing and verification.
//!
//! Every request carries a detached ed25519 signature over the canonical
//! CBOR bytes of its body. The server re-encodes the body it received,
//! verifies the signature against the public key embedded in the header and
//! uses that key's fingerprint as the authenticated caller identity. A peer
//! therefore cannot claim another peer's identity without its private key,
//! even across an untrusted relay.

use libp2p::{
    identity::{Keypair, PublicKey},
    PeerId,
};
use serde::Serialize;

use crate::{
    error::NetError,
    protocol::{
        codec,
        types::{Header, SignedRequest},
    },
};

/// Sign `body` with `keypair` and wrap it in a request envelope.
pub fn sign_request<B: Serialize>(
    keypair: &Keypair,
    body: B,
) -> Result<SignedRequest<B>, NetError> {
    let bytes = codec::encode(&body)
        .map_err(|e| NetError::Internal(format!("request body encoding: {e}")))?;
    let signature = keypair
        .sign(&bytes)
        .map_err(|e| NetError::Internal(format!("request signing: {e}")))?;
    Ok(SignedRequest {
        header: Some(Header {
            pub_key: keypair.public().encode_protobuf(),
            signature,
        }),
        body: Some(body),
    })
}

/// Verify a request envelope and return the authenticated caller identity
/// together with the body.
///
/// Signature verification is CPU-bound and runs on the blocking pool so a
/// burst of requests cannot starve the I/O path.
pub async fn verify_request<B: Serialize>(
    req: SignedRequest<B>,
) -> Result<(PeerId, B), NetError> {
    let header = req
        .header
        .ok_or_else(|| NetError::InvalidArgument("missing request header".into()))?;
    let body = req
        .body
        .ok_or_else(|| NetError::InvalidArgument("missing request body".into()))?;

    let pub_key = PublicKey::try_decode_protobuf(&header.pub_key)
        .map_err(|e| NetError::InvalidArgument(format!("undecodable public key: {e}")))?;
    let bytes = codec::encode(&body)
        .map_err(|e| NetError::Internal(format!("request body encoding: {e}")))?;

    let key = pub_key.clone();
    let signature = header.signature;
    let valid = tokio::task::spawn_blocking(move || key.verify(&bytes, &signature))
        .await
        .map_err(|e| NetError::Internal(format!("signature verification task: {e}")))?;
    if !valid {
        return Err(NetError::Unauthenticated(
            "request signature verification failed".into(),
        ));
    }

    Ok((pub_key.to_peer_id(), body))
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Body {
        value: u32,
        name: String,
    }

    fn body() -> Body {
        Body {
            value: 7,
            name: "payload".into(),
        }
    }

    #[tokio::test]
    async fn signed_request_verifies_and_derives_caller() {
        let keypair = Keypair::generate_ed25519();
        let req = sign_request(&keypair, body()).unwrap();
        let (peer, verified) = verify_request(req).await.unwrap();
        assert_eq!(peer, keypair.public().to_peer_id());
        assert_eq!(verified, body());
    }

    #[tokio::test]
    async fn missing_header_is_invalid_argument() {
        let req = SignedRequest::<Body> {
            header: None,
            body: Some(body()),
        };
        let err = verify_request(req).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn missing_body_is_invalid_argument() {
        let keypair = Keypair::generate_ed25519();
        let mut req = sign_request(&keypair, body()).unwrap();
        req.body = None;
        let err = verify_request(req).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn tampered_body_is_unauthenticated() {
        let keypair = Keypair::generate_ed25519();
        let mut req = sign_request(&keypair, body()).unwrap();
        if let Some(b) = req.body.as_mut() {
            b.value = 8;
        }
        let err = verify_request(req).await.unwrap_err();
        assert!(matches!(err, NetError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn swapped_key_is_unauthenticated() {
        let signer = Keypair::generate_ed25519();
        let other = Keypair::generate_ed25519();
        let mut req = sign_request(&signer, body()).unwrap();
        if let Some(h) = req.header.as_mut() {
            h.pub_key = other.public().encode_protobuf();
        }
        let err = verify_request(req).await.unwrap_err();
        assert!(matches!(err, NetError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn garbage_key_is_invalid_argument() {
        let keypair = Keypair::generate_ed25519();
        let mut req = sign_request(&keypair, body()).unwrap();
        if let Some(h) = req.header.as_mut() {
            h.pub_key = vec![0xff; 8];
        }
        let err = verify_request(req).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidArgument(_)));
    }
}
