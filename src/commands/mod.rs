use anyhow::Result;
use serde::Serialize;

mod predict;
mod run;
mod status;
mod table;
mod train;
mod wait;

pub use predict::{OutputFormat, predict};
pub use run::run;
pub use status::status;
pub use train::train;
pub use wait::wait;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
