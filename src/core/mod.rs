//! Core terminal building blocks.
//!
//! - **surface**: per-session character grid backed by a VT emulator
//! - **text**: code-point based measuring, padding and word wrap
//!
//! # Architecture
//!
//! ```text
//! Session
//! └── Surface
//!     ├── vt100::Parser (grid + alternate screen + cursor)
//!     └── title tracking
//! ```

pub mod surface;
pub mod text;

pub use surface::Surface;
