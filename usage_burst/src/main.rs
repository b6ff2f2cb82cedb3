use anyhow::Result;
use usage_burst::cli;

// Main entry point
fn main() -> Result<()> {
    cli::handle_calls()
}
