//! fileport CLI Client
//!
//! Command-line interface for interacting with a fileport server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fileport::{Client, Framing};

/// fileport CLI
#[derive(Parser, Debug)]
#[command(name = "fileport-cli")]
#[command(about = "CLI for the fileport file-transfer server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8889")]
    server: String,

    /// Use the line-based text framing instead of binary
    #[arg(short, long)]
    text: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored files
    List,

    /// Download a file
    Get {
        /// Name of the file on the server
        filename: String,

        /// Where to write it (defaults to the same name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file
    Upload {
        /// Local file to send
        path: PathBuf,

        /// Name to store it under (defaults to the local file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a file
    Delete {
        /// Name of the file on the server
        filename: String,
    },
}

fn main() {
    let args = Args::parse();
    let framing = if args.text { Framing::Text } else { Framing::Binary };
    let client = Client::new(&args.server, framing);

    if let Err(e) = run(&client, args.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(client: &Client, command: Commands) -> fileport::Result<()> {
    match command {
        Commands::List => {
            for name in client.list()? {
                println!("{}", name);
            }
        }
        Commands::Get { filename, output } => {
            let content = client.get(&filename)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&filename));
            std::fs::write(&output, &content)?;
            println!("{} bytes written to {}", content.len(), output.display());
        }
        Commands::Upload { path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        fileport::FileportError::InvalidName(path.display().to_string())
                    })?,
            };
            let content = std::fs::read(&path)?;
            println!("{}", client.upload(&name, &content)?);
        }
        Commands::Delete { filename } => {
            println!("{}", client.delete(&filename)?);
        }
    }
    Ok(())
}
