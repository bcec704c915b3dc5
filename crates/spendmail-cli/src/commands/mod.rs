//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Database setup (init) and shared utilities (open_db)
//! - `gmail` - Connecting Gmail, syncing, reviewing and confirming transactions
//! - `merchants` - Merchant dictionary management
//! - `parse` - Offline extraction from a saved message
//! - `serve` - Web server command
//! - `status` - Status and user management commands

pub mod core;
pub mod gmail;
pub mod merchants;
pub mod parse;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use gmail::*;
pub use merchants::*;
pub use parse::*;
pub use serve::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
