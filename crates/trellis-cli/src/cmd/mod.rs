//! One module per subcommand.

pub mod download;
pub mod list;
pub mod publish;
pub mod resolve;

use anyhow::{Context, Result};
use trellis_schema::Coordinate;

fn coordinate(value: &str) -> Result<Coordinate> {
    value
        .parse()
        .with_context(|| format!("invalid coordinate '{value}', expected org#module;revision"))
}
