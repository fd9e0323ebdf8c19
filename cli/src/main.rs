use std::process::ExitCode;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "veil", version)]
#[command(about = "Anonymize personal data in documents with an LLM rewriting service")]
struct Args {
    #[command(flatten)]
    global: veil_lib::GlobalOptions,

    #[command(subcommand)]
    command: veil_lib::Command,
}

fn main() -> ExitCode {
    let args = Args::parse();
    veil_lib::run(args.command, &args.global)
}
