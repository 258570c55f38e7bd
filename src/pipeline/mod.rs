//! Pipeline stages for one PDF comparison.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the rasterisation backend can change without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ dispatch ──▶ (render ─▶ select ─▶ mask/crop ─▶ diff)   byImage
//! (path/     (mode)        └──────────── or ──── encode ─▶ diff)   byBase64
//!  buffer)
//! ```
//!
//! 1. [`input`]    resolve a caller path or buffer into a [`input::PdfSource`]
//!    and read its bytes
//! 2. [`select`]   reduce the rendered page list with include/exclude filters
//! 3. [`encode`]   base64 text of a buffer, for `byBase64`
//! 4. [`dispatch`] run a [`dispatch::ComparisonRequest`] in the chosen mode

pub mod dispatch;
pub mod encode;
pub mod input;
pub mod select;
