// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to its
// use case in Layer 2.
//
//   1. `pretrain` — run masked-autoencoder pretraining
//   2. `preview`  — write one clip as a grid PNG

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PretrainArgs, PreviewArgs};

#[derive(Parser, Debug)]
#[command(
    name = "grid-mae",
    version = "0.1.0",
    about = "Masked-autoencoder pretraining on video clips tiled into frame grids."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Pretrain(args) => run_pretrain(args),
            Commands::Preview(args)  => run_preview(args),
        }
    }
}

fn run_pretrain(args: PretrainArgs) -> Result<()> {
    use crate::application::pretrain_use_case::PretrainUseCase;

    match &args.data_path {
        Some(path) => tracing::info!("Starting pretraining on clips in: {}", path),
        None => tracing::info!("Starting pretraining on synthetic clips"),
    }
    let output_dir = args.output_dir.clone();

    PretrainUseCase::new(args.into()).execute()?;

    println!("Pretraining complete. Checkpoints in '{output_dir}'.");
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    use crate::application::preview_use_case::PreviewUseCase;

    let path = PreviewUseCase::new(args.into()).execute()?;
    println!("Grid preview written to '{}'", path.display());
    Ok(())
}
