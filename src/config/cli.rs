use clap::Parser;

use super::{CliArgs, LoadError, Settings, load};

/// Parse the process arguments and resolve the full settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}
