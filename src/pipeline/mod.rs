//! Pipeline stages for batch document conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the engine can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! sanitize ──▶ route ──▶ engine ──▶ batch ──▶ assemble
//! (names)     (decide)  (soffice)  (loop)    (file / zip)
//! ```
//!
//! 1. [`sanitize`] — turn a client-supplied name into a safe basename
//! 2. [`route`]    — convert, or copy through unchanged, based on extension
//!    and the batch's target
//! 3. [`engine`]   — run headless LibreOffice with a timeout, one at a time
//! 4. [`batch`]    — stage each upload, drive steps 1–3 in upload order,
//!    apply the failure and duplicate-name policies
//! 5. [`assemble`] — pick the single output or archive them all

pub mod assemble;
pub mod batch;
pub mod engine;
pub mod route;
pub mod sanitize;
