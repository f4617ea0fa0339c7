pub mod histogram;

pub use histogram::*;

use crate::errors::Result;
use crate::registry::OpRegistry;

/// Registers every op shipped with the crate
pub fn register_builtin(registry: &mut OpRegistry) -> Result<()> {
    histogram::register(registry)?;
    Ok(())
}
