//! Host-terminal rendering and input handling.
//!
//! - **renderer**: tab bar, active surface and status bar painter
//! - **keymapper**: keyboard input to VT byte sequence mapping

pub mod keymapper;
pub mod renderer;
