//! User interface rendering and input state.
//!
//! - **renderer**: crossterm drawing of the tab bar, tabs and status bar
//! - **view**: styled scrollback used by the terminal output and the log panel
//! - **input**: single-line command editor

pub mod input;
pub mod renderer;
pub mod view;

pub use renderer::{Renderer, StatusInfo};
