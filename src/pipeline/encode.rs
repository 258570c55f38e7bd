//! Buffer encoding for `byBase64` comparisons.
//!
//! Documents are compared as their standard (padded) base64 text, the same
//! representation a caller would store as a fixture.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode a whole PDF buffer as base64.
pub fn encode_buffer(buffer: &[u8]) -> String {
    let b64 = STANDARD.encode(buffer);
    debug!("Encoded {} bytes → {} bytes base64", buffer.len(), b64.len());
    b64
}
