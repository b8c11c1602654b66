//! Saved session inspection (no network)

use anyhow::{Context, Result};

use wmtp_core::config::ClientConfig;
use wmtp_core::store::{clear_session, load_session};
use wmtp_core::FileStore;

use crate::output::{format_session, print_info, print_success};

/// Print the saved session record
pub fn session_show(config: &ClientConfig) -> Result<()> {
    let store = FileStore::new(config.session_dir.clone());
    let saved = load_session(&store);
    println!("{}", format_session(saved.as_ref()));
    if saved.is_some() {
        print_info(&format!("Stored at {}", store.dir().display()));
    }
    Ok(())
}

/// Forget the saved session without contacting the server
pub fn session_forget(config: &ClientConfig) -> Result<()> {
    let store = FileStore::new(config.session_dir.clone());
    clear_session(&store).context("Failed to delete saved session")?;
    print_success("Saved session removed");
    Ok(())
}
