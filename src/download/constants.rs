//! Constants for the download module (timeouts, retry, chunking).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout (60 seconds, applied per read for streamed bodies).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Status codes the transport retries automatically.
pub const RETRYABLE_STATUS_CODES: [u16; 14] = [
    408, 413, 429, 500, 501, 502, 503, 504, 505, 506, 507, 509, 510, 511,
];

/// Chunk size used when hashing files (1 MiB keeps memory bounded).
pub const HASH_CHUNK_SIZE: usize = 1 << 20;

/// Upper bound on redirect hops followed by a single redirect-follow step.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Suffix of the temp file a transfer streams into before it is committed.
pub const PART_SUFFIX: &str = ".part";
