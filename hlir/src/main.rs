use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use hlir::module::Module;
use hlir::text::PrintOptions;

#[derive(Parser, Debug)]
#[command(
    name = "hlir",
    version,
    about = "Inspect serialized tensor dataflow modules: print, fingerprint, compare, verify"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log graph decoding and equality mismatches to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a module as text
    Print {
        /// Serialized module (JSON)
        file: PathBuf,

        /// Rename instructions and computations positionally, omit operand shapes
        #[arg(long)]
        canonical: bool,

        /// Include optimizer hints such as in-place slices
        #[arg(long)]
        backend_hints: bool,
    },
    /// Print the SHA-256 fingerprint of a module's canonical text
    Fingerprint {
        file: PathBuf,
    },
    /// Exit 0 if two modules are structurally equal, 1 otherwise
    Compare {
        lhs: PathBuf,
        rhs: PathBuf,
    },
    /// Check send/recv channel pairing
    Verify {
        file: PathBuf,
    },
}

fn load(path: &Path) -> Module {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hlir: error: {}: {}", path.display(), e);
            std::process::exit(2);
        }
    };
    match Module::from_json(&text) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("hlir: error: {}: {}", path.display(), e);
            std::process::exit(2);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Print {
            file,
            canonical,
            backend_hints,
        } => {
            let module = load(&file);
            let options = if canonical {
                PrintOptions::canonical()
            } else {
                PrintOptions::default()
            };
            let options = options.with_backend_hints(backend_hints);
            print!("{}", hlir::text::module_to_string(&module, &options));
        }
        Command::Fingerprint { file } => {
            let module = load(&file);
            println!("{}", hlir::fingerprint::fingerprint(&module));
        }
        Command::Compare { lhs, rhs } => {
            let a = load(&lhs);
            let b = load(&rhs);
            if hlir::equality::modules_equal(&a, &b) {
                println!("equal");
            } else {
                println!("different");
                std::process::exit(1);
            }
        }
        Command::Verify { file } => {
            let module = load(&file);
            match module.check_channel_pairs() {
                Ok(pairs) => {
                    if cli.verbose {
                        for pair in &pairs {
                            eprintln!(
                                "hlir: channel {}: send {:?}, recv {:?}",
                                pair.channel_id, pair.send, pair.recv
                            );
                        }
                    }
                    println!("ok: {} channels", pairs.len());
                }
                Err(e) => {
                    eprintln!("hlir: error: {}", e);
                    std::process::exit(2);
                }
            }
        }
    }
}
