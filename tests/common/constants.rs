//! Shared constants for end-to-end tests
//!
//! When the fake provider's canned data changes, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// The only key the fake provider accepts
pub const TEST_API_KEY: &str = "sk-test";

// ============================================================================
// Fake Provider Data
// ============================================================================

/// Content pieces streamed by the fake chat completion endpoint, in order
pub const FAKE_CHAT_CHUNKS: [&str; 3] = ["Hello", " from", " fake"];

/// Reply content of the non-streaming fake chat completion
pub const FAKE_CHAT_REPLY: &str = "Hello from fake";

/// Embedding vector returned for every input
pub const FAKE_EMBEDDING: [f64; 3] = [0.1, 0.2, 0.3];

/// Audio bytes returned by the fake speech endpoint
pub const FAKE_AUDIO: &[u8] = b"ID3-fake-audio-bytes";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for a spawned server to answer (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness polls (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Maximum time to wait for a job to reach a terminal state (milliseconds)
pub const JOB_TIMEOUT_MS: u64 = 10_000;

/// Delay between job status polls (milliseconds)
pub const JOB_POLL_INTERVAL_MS: u64 = 20;
