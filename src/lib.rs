// Vertreecal Library Entry Point
// This file exposes all modules so they can be imported by main.rs
// and tested independently.

pub mod error;
pub mod settings;

// Shared data model
pub mod state;

// Tab tree logic (no Tauri imports)
pub mod modules;

// Tauri shell hosting the panel webview
#[cfg(feature = "desktop")]
pub mod desktop;

#[cfg(feature = "desktop")]
pub use desktop::run;
