//! Config command handler.

use std::path::Path;

use anyhow::Result;

use crate::config::{ConfigLoader, FileConfig};

/// Print the effective configuration after all sources are merged.
pub fn execute(config: &FileConfig, source: Option<&Path>) -> Result<()> {
    let source = source
        .map(Path::to_path_buf)
        .or_else(|| ConfigLoader::default_config_path().filter(|p| p.exists()));
    match source {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in defaults"),
    }
    print!("{}", ConfigLoader::render(config)?);
    Ok(())
}
