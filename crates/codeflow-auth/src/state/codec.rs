//! Length-prefixed framing of sealed payloads.
//!
//! Layout of every plaintext handed to the sealer:
//!
//! ```text
//! "CF" | version (u8) | kind (u8) | issued_at (i64 BE, unix seconds) | fields...
//! ```
//!
//! Fields are written in a fixed order per kind. Strings are `u32` BE
//! length-prefixed UTF-8, optional values carry a presence byte (0 or 1),
//! and lists carry a `u32` BE item count.

use std::collections::BTreeSet;

use super::{AuthorizationState, IdentityBinding};
use crate::principal::{Claim, ClaimsIdentity, ClaimsPrincipal};

const MAGIC: &[u8; 2] = b"CF";
const VERSION: u8 = 1;

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

/// Kind of sealed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TokenKind {
    /// Authorization state handed to the identity provider.
    State = 1,
    /// Authorization code handed to the client.
    Code = 2,
}

impl TokenKind {
    fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(Self::State),
            2 => Ok(Self::Code),
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

/// Structural decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum FrameError {
    #[error("payload truncated")]
    Truncated,

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown tag byte {0}")]
    UnknownTag(u8),

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("bad magic")]
    BadMagic,

    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),

    #[error("expected {expected:?} payload, found {found:?}")]
    KindMismatch {
        expected: TokenKind,
        found: TokenKind,
    },

    #[error("field exceeds maximum length")]
    TooLarge,
}

// =============================================================================
// Writer
// =============================================================================

pub(crate) struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    pub(crate) fn new(kind: TokenKind, issued_at: i64) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.push(kind as u8);
        buf.extend_from_slice(&issued_at.to_be_bytes());
        Self { buf }
    }

    pub(crate) fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_len(&mut self, len: usize) -> Result<(), FrameError> {
        let len = u32::try_from(len).map_err(|_| FrameError::TooLarge)?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }

    pub(crate) fn put_str(&mut self, value: &str) -> Result<(), FrameError> {
        self.put_len(value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub(crate) fn put_opt_str(&mut self, value: Option<&str>) -> Result<(), FrameError> {
        match value {
            Some(value) => {
                self.buf.push(PRESENT);
                self.put_str(value)
            }
            None => {
                self.buf.push(ABSENT);
                Ok(())
            }
        }
    }

    fn put_presence(&mut self, present: bool) {
        self.buf.push(if present { PRESENT } else { ABSENT });
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// Reader
// =============================================================================

pub(crate) struct FrameReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Checks the header and returns a reader positioned at the first field
    /// together with the `issued_at` timestamp.
    pub(crate) fn open(bytes: &'a [u8], expected: TokenKind) -> Result<(Self, i64), FrameError> {
        let mut reader = Self { bytes, pos: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(FrameError::BadMagic);
        }
        let version = reader.u8()?;
        if version != VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let found = TokenKind::from_u8(reader.u8()?)?;
        if found != expected {
            return Err(FrameError::KindMismatch { expected, found });
        }
        let issued_at = reader.i64()?;
        Ok((reader, issued_at))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let end = self.pos.checked_add(n).ok_or(FrameError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(FrameError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, FrameError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    fn presence(&mut self) -> Result<bool, FrameError> {
        match self.u8()? {
            ABSENT => Ok(false),
            PRESENT => Ok(true),
            other => Err(FrameError::UnknownTag(other)),
        }
    }

    pub(crate) fn string(&mut self) -> Result<String, FrameError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8)
    }

    fn opt_string(&mut self) -> Result<Option<String>, FrameError> {
        if self.presence()? {
            self.string().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a list count, rejecting counts the remaining bytes cannot hold.
    fn count(&mut self, min_item_size: usize) -> Result<usize, FrameError> {
        let count = self.u32()? as usize;
        let remaining = self.bytes.len() - self.pos;
        if count.saturating_mul(min_item_size) > remaining {
            return Err(FrameError::Truncated);
        }
        Ok(count)
    }

    pub(crate) fn finish(self) -> Result<(), FrameError> {
        let trailing = self.bytes.len() - self.pos;
        if trailing == 0 {
            Ok(())
        } else {
            Err(FrameError::TrailingBytes(trailing))
        }
    }
}

// =============================================================================
// Authorization State Fields
// =============================================================================

pub(crate) fn write_state(
    writer: &mut FrameWriter,
    state: &AuthorizationState,
) -> Result<(), FrameError> {
    writer.put_str(&state.response_type)?;
    writer.put_str(&state.client_id)?;
    writer.put_str(&state.redirect_uri)?;
    writer.put_len(state.scopes.len())?;
    for scope in &state.scopes {
        writer.put_str(scope)?;
    }
    writer.put_opt_str(state.external_state.as_deref())?;
    writer.put_opt_str(state.nonce.as_deref())?;

    writer.put_presence(state.binding.is_some());
    if let Some(ref binding) = state.binding {
        write_principal(writer, &binding.principal)?;
        writer.put_str(&binding.id_token)?;
        writer.put_str(&binding.code_id)?;
    }
    Ok(())
}

pub(crate) fn read_state(reader: &mut FrameReader<'_>) -> Result<AuthorizationState, FrameError> {
    let response_type = reader.string()?;
    let client_id = reader.string()?;
    let redirect_uri = reader.string()?;

    let count = reader.count(4)?;
    let mut scopes = BTreeSet::new();
    for _ in 0..count {
        scopes.insert(reader.string()?);
    }

    let external_state = reader.opt_string()?;
    let nonce = reader.opt_string()?;

    let binding = if reader.presence()? {
        Some(IdentityBinding {
            principal: read_principal(reader)?,
            id_token: reader.string()?,
            code_id: reader.string()?,
        })
    } else {
        None
    };

    Ok(AuthorizationState {
        response_type,
        client_id,
        redirect_uri,
        scopes,
        external_state,
        nonce,
        binding,
    })
}

fn write_principal(writer: &mut FrameWriter, principal: &ClaimsPrincipal) -> Result<(), FrameError> {
    writer.put_presence(principal.identity.is_some());
    if let Some(ref identity) = principal.identity {
        writer.put_opt_str(identity.authentication_type.as_deref())?;
        writer.put_len(identity.claims.len())?;
        for claim in &identity.claims {
            writer.put_str(&claim.claim_type)?;
            writer.put_str(&claim.value)?;
        }
    }
    Ok(())
}

fn read_principal(reader: &mut FrameReader<'_>) -> Result<ClaimsPrincipal, FrameError> {
    if !reader.presence()? {
        return Ok(ClaimsPrincipal::anonymous());
    }
    let authentication_type = reader.opt_string()?;
    let count = reader.count(8)?;
    let mut claims = Vec::with_capacity(count);
    for _ in 0..count {
        let claim_type = reader.string()?;
        let value = reader.string()?;
        claims.push(Claim::new(claim_type, value));
    }
    Ok(ClaimsPrincipal::new(ClaimsIdentity {
        authentication_type,
        claims,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut writer = FrameWriter::new(TokenKind::Code, 1_700_000_000);
        writer.put_str("client-1").unwrap();
        writer.put_i64(42);
        let bytes = writer.finish();

        let (mut reader, issued_at) = FrameReader::open(&bytes, TokenKind::Code).unwrap();
        assert_eq!(issued_at, 1_700_000_000);
        assert_eq!(reader.string().unwrap(), "client-1");
        assert_eq!(reader.i64().unwrap(), 42);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_kind_mismatch() {
        let bytes = FrameWriter::new(TokenKind::State, 0).finish();
        let result = FrameReader::open(&bytes, TokenKind::Code);
        assert!(matches!(
            result,
            Err(FrameError::KindMismatch {
                expected: TokenKind::Code,
                found: TokenKind::State
            })
        ));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(
            FrameReader::open(b"XX\x01\x01", TokenKind::State),
            Err(FrameError::BadMagic)
        ));
        assert!(matches!(
            FrameReader::open(b"CF\x07\x01", TokenKind::State),
            Err(FrameError::UnsupportedVersion(7))
        ));
        assert!(matches!(
            FrameReader::open(b"CF\x01\x09", TokenKind::State),
            Err(FrameError::UnknownTag(9))
        ));
        assert!(matches!(
            FrameReader::open(b"CF\x01\x01\x00", TokenKind::State),
            Err(FrameError::Truncated)
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = FrameWriter::new(TokenKind::State, 0).finish();
        bytes.push(0);
        let (reader, _) = FrameReader::open(&bytes, TokenKind::State).unwrap();
        assert_eq!(reader.finish(), Err(FrameError::TrailingBytes(1)));
    }

    #[test]
    fn test_string_length_beyond_payload() {
        let mut bytes = FrameWriter::new(TokenKind::State, 0).finish();
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(b"abc");
        let (mut reader, _) = FrameReader::open(&bytes, TokenKind::State).unwrap();
        assert_eq!(reader.string(), Err(FrameError::Truncated));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = FrameWriter::new(TokenKind::State, 0).finish();
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let (mut reader, _) = FrameReader::open(&bytes, TokenKind::State).unwrap();
        assert_eq!(reader.string(), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_bogus_list_count() {
        let mut bytes = FrameWriter::new(TokenKind::State, 0).finish();
        bytes.extend_from_slice(&1_000_000u32.to_be_bytes());
        let (mut reader, _) = FrameReader::open(&bytes, TokenKind::State).unwrap();
        assert_eq!(reader.count(4), Err(FrameError::Truncated));
    }
}
