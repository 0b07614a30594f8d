use std::{fs, path::PathBuf};

use clap::Args;
use eyre::{Context, Result};
use stencil_compiler::Message;

use super::{UnwrapOrExit, inputs::CompilerArgs};

#[derive(Args)]
pub struct ExtractCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,

    /// Write the messages here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExtractCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        let bundle = compiler.extract_msgs().unwrap_or_exit();
        let messages: Vec<&Message> = bundle.messages().collect();
        let json =
            serde_json::to_string_pretty(&messages).wrap_err("failed to serialize messages")?;

        match &self.output {
            Some(path) => {
                fs::write(path, json + "\n")
                    .wrap_err_with(|| format!("failed to write '{}'", path.display()))?;
                eprintln!("{} message(s) written to {}", messages.len(), path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}
