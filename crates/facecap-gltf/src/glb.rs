//! Binary glTF (GLB) container: header, JSON chunk, optional BIN chunk.
//!
//! Layout (all little-endian):
//!   header: magic "glTF" | version 2 | total length
//!   chunk:  length | type ("JSON" / "BIN\0") | payload padded to 4 bytes

use serde_json::Value;
use thiserror::Error;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum GlbError {
    #[error("not a binary glTF file")]
    NotGlb,
    #[error("unsupported glTF container version {0}")]
    UnsupportedVersion(u32),
    #[error("truncated GLB: {0}")]
    Truncated(&'static str),
    #[error("invalid glTF document: {0}")]
    InvalidDocument(String),
    #[error("unsupported glTF content: {0}")]
    Unsupported(String),
    #[error("JSON chunk: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed GLB: the glTF JSON document plus the embedded binary buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Glb {
    pub json: Value,
    /// Contents of the BIN chunk (glTF buffer 0), if present.
    pub bin: Option<Vec<u8>>,
}

impl Glb {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GlbError> {
        if bytes.len() < HEADER_LEN {
            return Err(GlbError::NotGlb);
        }
        if read_u32(bytes, 0)? != GLB_MAGIC {
            return Err(GlbError::NotGlb);
        }
        let version = read_u32(bytes, 4)?;
        if version != GLB_VERSION {
            return Err(GlbError::UnsupportedVersion(version));
        }
        let total = read_u32(bytes, 8)? as usize;
        if total > bytes.len() {
            return Err(GlbError::Truncated("declared length exceeds file size"));
        }
        let bytes = &bytes[..total];

        let mut offset = HEADER_LEN;
        let mut json: Option<Value> = None;
        let mut bin = None;
        while offset + CHUNK_HEADER_LEN <= bytes.len() {
            let len = read_u32(bytes, offset)? as usize;
            let kind = read_u32(bytes, offset + 4)?;
            let start = offset + CHUNK_HEADER_LEN;
            let end = start
                .checked_add(len)
                .filter(|&end| end <= bytes.len())
                .ok_or(GlbError::Truncated("chunk runs past end of file"))?;
            let payload = &bytes[start..end];
            match kind {
                CHUNK_JSON if json.is_none() => json = Some(serde_json::from_slice(payload)?),
                CHUNK_BIN if bin.is_none() => bin = Some(payload.to_vec()),
                // Unknown extension chunks are skipped.
                _ => {}
            }
            offset = end;
        }

        let json = json.ok_or(GlbError::Truncated("missing JSON chunk"))?;
        if !json.is_object() {
            return Err(GlbError::InvalidDocument("root is not an object".into()));
        }
        Ok(Self { json, bin })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GlbError> {
        let mut json = serde_json::to_vec(&self.json)?;
        pad_to_4(&mut json, b' ');
        let bin = self.bin.as_ref().map(|b| {
            let mut b = b.clone();
            pad_to_4(&mut b, 0);
            b
        });

        let total = HEADER_LEN
            + CHUNK_HEADER_LEN
            + json.len()
            + bin.as_ref().map_or(0, |b| CHUNK_HEADER_LEN + b.len());
        let total_u32 = u32::try_from(total)
            .map_err(|_| GlbError::Unsupported("GLB larger than 4 GiB".into()))?;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&GLB_VERSION.to_le_bytes());
        out.extend_from_slice(&total_u32.to_le_bytes());
        write_chunk(&mut out, CHUNK_JSON, &json);
        if let Some(bin) = &bin {
            write_chunk(&mut out, CHUNK_BIN, bin);
        }
        Ok(out)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, GlbError> {
    bytes
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(GlbError::Truncated("header"))
}

fn write_chunk(out: &mut Vec<u8>, kind: u32, payload: &[u8]) {
    // Payload length is bounded by the total checked in `to_bytes`.
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(payload);
}

pub(crate) fn pad_to_4(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % 4 != 0 {
        buf.push(fill);
    }
}
