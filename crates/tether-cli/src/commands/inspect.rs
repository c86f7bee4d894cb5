//! `tether inspect`: print a module's tables and disassembly

use super::files::load_module;
use super::Status;
use anyhow::Result;
use std::path::Path;
use tether_bytecode::disassemble;

pub fn execute(path: &Path) -> Result<Status> {
    let module = load_module(path)?;
    print!("{}", disassemble(&module));
    Ok(Status::Success)
}
