// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chunk codec.
//!
//! Compresses a plan payload and splits the compressed stream into ordered,
//! size-bounded chunks, each tagged with the SHA-256 of its payload. The
//! reverse operation sorts chunks by index, checks that the index range is
//! dense, concatenates and decompresses.
//!
//! ```text
//!   raw bytes ──gzip──► compressed stream ──split(max)──► [chunk 0][chunk 1]…[chunk n-1]
//!   raw bytes ◄─gunzip─ concatenated     ◄──sort/check── chunks (any order)
//! ```
//!
//! The codec is a pure transformation with no side effects.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default upper bound for a single chunk payload (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Errors from encoding or decoding chunks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The chunk size bound must be at least one byte.
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// An index inside the contiguous range has no chunk.
    #[error("Missing chunk {0}")]
    MissingChunk(usize),

    /// Two chunks claim the same index.
    #[error("Duplicate chunk {0}")]
    DuplicateChunk(usize),

    /// The reassembled stream could not be decompressed.
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// A chunk payload no longer matches the hash recorded at write time.
    #[error("Chunk {index} hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch {
        /// Index of the chunk.
        index: usize,
        /// Hash recorded at write time.
        expected: String,
        /// Hash of the payload as read.
        actual: String,
    },

    /// Compressing the payload failed.
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

impl CodecError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidChunkSize(_) => "INVALID_CHUNK_SIZE",
            Self::MissingChunk(_) => "MISSING_CHUNK",
            Self::DuplicateChunk(_) => "DUPLICATE_CHUNK",
            Self::CorruptArtifact(_) => "CORRUPT_ARTIFACT",
            Self::ChunkHashMismatch { .. } => "CHUNK_HASH_MISMATCH",
            Self::Compression(_) => "COMPRESSION_FAILED",
        }
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// How a payload is transformed before it is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// gzip-compressed (binary and JSON plans).
    #[default]
    Gzip,
    /// Stored as-is (human-readable plan text).
    Plain,
}

/// One size-bounded storage unit holding a slice of an encoded plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this slice in the encoded stream.
    pub index: usize,
    /// Plan ID of the artifact this chunk belongs to.
    pub plan_id: String,
    /// Slice of the encoded stream.
    pub payload: Vec<u8>,
    /// Hex SHA-256 of `payload` at write time.
    pub content_hash: String,
    /// Whether the stream this slice belongs to is gzip-compressed.
    pub is_compressed: bool,
}

impl Chunk {
    /// Build a chunk, hashing its payload.
    pub fn new(
        index: usize,
        plan_id: impl Into<String>,
        payload: Vec<u8>,
        is_compressed: bool,
    ) -> Self {
        let content_hash = sha256_hex(&payload);
        Self {
            index,
            plan_id: plan_id.into(),
            payload,
            content_hash,
            is_compressed,
        }
    }

    /// Check the payload against the recorded hash.
    pub fn verify(&self) -> Result<()> {
        let actual = sha256_hex(&self.payload);
        if actual != self.content_hash {
            return Err(CodecError::ChunkHashMismatch {
                index: self.index,
                expected: self.content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// gzip-compress a buffer.
pub fn gzip_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a gzip stream. Truncated or garbled input is a corrupt artifact.
pub fn gzip_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CodecError::CorruptArtifact(e.to_string()))?;
    Ok(out)
}

/// Encode a payload into chunks no larger than `max_chunk_size`.
///
/// Empty input still yields exactly one chunk so that decoding is symmetric.
/// A stream whose encoded length is an exact multiple of `max_chunk_size`
/// yields exactly `len / max_chunk_size` chunks.
pub fn encode(
    plan_id: &str,
    data: &[u8],
    max_chunk_size: usize,
    encoding: Encoding,
) -> Result<Vec<Chunk>> {
    if max_chunk_size == 0 {
        return Err(CodecError::InvalidChunkSize(max_chunk_size));
    }

    let (stream, is_compressed) = match encoding {
        Encoding::Gzip => (gzip_encode(data)?, true),
        Encoding::Plain => (data.to_vec(), false),
    };

    if stream.is_empty() {
        return Ok(vec![Chunk::new(0, plan_id, Vec::new(), is_compressed)]);
    }

    Ok(stream
        .chunks(max_chunk_size)
        .enumerate()
        .map(|(index, slice)| Chunk::new(index, plan_id, slice.to_vec(), is_compressed))
        .collect())
}

/// Reassemble chunks (in any order) into the original payload.
///
/// Hashes are not checked here; see [`decode_verified`].
pub fn decode(mut chunks: Vec<Chunk>) -> Result<Vec<u8>> {
    if chunks.is_empty() {
        return Err(CodecError::MissingChunk(0));
    }

    chunks.sort_by_key(|c| c.index);

    let is_compressed = chunks[0].is_compressed;
    let mut stream = Vec::with_capacity(chunks.iter().map(|c| c.payload.len()).sum());

    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.index < expected {
            return Err(CodecError::DuplicateChunk(chunk.index));
        }
        if chunk.index != expected {
            return Err(CodecError::MissingChunk(expected));
        }
        if chunk.is_compressed != is_compressed {
            return Err(CodecError::CorruptArtifact(format!(
                "chunk {} disagrees on compression",
                chunk.index
            )));
        }
        stream.extend_from_slice(&chunk.payload);
    }

    if is_compressed {
        gzip_decode(&stream)
    } else {
        Ok(stream)
    }
}

/// Like [`decode`], but first checks every chunk against its recorded hash.
pub fn decode_verified(chunks: Vec<Chunk>) -> Result<Vec<u8>> {
    for chunk in &chunks {
        chunk.verify()?;
    }
    decode(chunks)
}
