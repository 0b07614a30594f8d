use std::{fs, path::PathBuf};

use clap::Args;
use eyre::{Context, Result};

use super::{UnwrapOrExit, inputs::CompilerArgs};

#[derive(Args)]
pub struct HeadersCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,

    /// Write the compilation unit here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl HeadersCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        let headers = compiler.compile_for_headers().unwrap_or_exit();
        let json = headers
            .registry
            .to_compilation_unit()
            .to_json()
            .wrap_err("failed to serialize compilation unit")?;

        match &self.output {
            Some(path) => fs::write(path, json + "\n")
                .wrap_err_with(|| format!("failed to write '{}'", path.display()))?,
            None => println!("{}", json),
        }
        Ok(())
    }
}
