//! Signing trailer.
//!
//! A signed document is the original content followed by three
//! delimited segments, always in this order:
//!
//! ```text
//! <document>\n%SIGNATURE_DATA:<metadata json>\n%SIGNATURE:<raw signature>\n%PUBLIC_KEY:<pem>
//! ```
//!
//! The signature covers the metadata JSON bytes only. The document itself
//! is not part of the verification surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};
use crate::keypair::{PrivateKey, PublicKey};

/// Prefix written before every token.
pub const DELIMITER: &[u8] = b"\n%";

pub const DATA_TOKEN: &[u8] = b"SIGNATURE_DATA:";
pub const SIG_TOKEN: &[u8] = b"SIGNATURE:";
pub const PUBKEY_TOKEN: &[u8] = b"PUBLIC_KEY:";

/// Tokens in trailer order.
const TOKENS: [&[u8]; 3] = [DATA_TOKEN, SIG_TOKEN, PUBKEY_TOKEN];

/// Who signed a document and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMetadata {
    pub sign_date: DateTime<Utc>,
    pub signed_by: String,
    pub contact: String,
}

impl SignatureMetadata {
    pub fn new(signed_by: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            sign_date: Utc::now(),
            signed_by: signed_by.into(),
            contact: contact.into(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GuardError::Serialization(e.to_string()))
    }
}

/// The pieces of a signed document, borrowed from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer<'a> {
    pub document: &'a [u8],
    pub metadata: &'a [u8],
    pub signature: &'a [u8],
    pub public_key: &'a [u8],
}

/// Append the three trailer segments to `document`.
pub fn append_trailer(
    document: &[u8],
    metadata_json: &[u8],
    signature: &[u8],
    public_key_pem: &str,
) -> Vec<u8> {
    let segments: [&[u8]; 3] = [metadata_json, signature, public_key_pem.as_bytes()];

    let extra: usize = TOKENS
        .iter()
        .zip(segments.iter())
        .map(|(token, segment)| DELIMITER.len() + token.len() + segment.len())
        .sum();

    let mut out = Vec::with_capacity(document.len() + extra);
    out.extend_from_slice(document);
    for (token, segment) in TOKENS.iter().zip(segments.iter()) {
        out.extend_from_slice(DELIMITER);
        out.extend_from_slice(token);
        out.extend_from_slice(segment);
    }
    out
}

/// Split signed content into its document and trailer segments.
///
/// Scans once, left to right, looking for each delimited token in turn.
/// A segment runs from the end of its token to the start of the next
/// delimiter, or to the end of the input for the last one.
pub fn parse_trailer(content: &[u8]) -> Result<Trailer<'_>> {
    // starts[i] = offset of delimiter i, ends[i] = offset just past token i
    let mut starts = [0usize; 3];
    let mut ends = [0usize; 3];
    let mut seeking = 0;
    let mut pos = 0;

    while seeking < TOKENS.len() && pos < content.len() {
        let rest = &content[pos..];
        if rest.starts_with(DELIMITER) && rest[DELIMITER.len()..].starts_with(TOKENS[seeking]) {
            starts[seeking] = pos;
            pos += DELIMITER.len() + TOKENS[seeking].len();
            ends[seeking] = pos;
            seeking += 1;
        } else {
            pos += 1;
        }
    }

    if seeking < TOKENS.len() {
        let missing = String::from_utf8_lossy(TOKENS[seeking]).into_owned();
        return Err(GuardError::SignatureInvalid(format!(
            "incomplete trailer: missing {}",
            missing
        )));
    }

    Ok(Trailer {
        document: &content[..starts[0]],
        metadata: &content[ends[0]..starts[1]],
        signature: &content[ends[1]..starts[2]],
        public_key: &content[ends[2]..],
    })
}

/// Sign `document` and return it with the trailer appended.
pub fn sign_document(
    document: &[u8],
    metadata: &SignatureMetadata,
    private_key: &PrivateKey,
    public_key_pem: &str,
) -> Result<Vec<u8>> {
    let json = metadata.to_json()?;
    let signature = private_key.sign(&json)?;
    Ok(append_trailer(document, &json, &signature, public_key_pem))
}

/// Verify a signed document and return its metadata.
///
/// Every failure, including a malformed key or metadata segment, is
/// reported as [`GuardError::SignatureInvalid`].
pub fn verify_signed(content: &[u8]) -> Result<SignatureMetadata> {
    let trailer = parse_trailer(content)?;

    let pem = std::str::from_utf8(trailer.public_key)
        .map_err(|_| GuardError::SignatureInvalid("public key is not utf-8".into()))?;
    let public_key = PublicKey::from_pem(pem)
        .map_err(|e| GuardError::SignatureInvalid(format!("bad public key: {}", e)))?;

    let metadata: SignatureMetadata = serde_json::from_slice(trailer.metadata)
        .map_err(|e| GuardError::SignatureInvalid(format!("bad metadata: {}", e)))?;

    public_key.verify(trailer.signature, trailer.metadata)?;

    Ok(metadata)
}
