use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-shade")]
#[command(about = "Relocate Java classes into a private package and drop the ones nothing uses")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config with keep/unshaded/ignore package sets and the shadow package
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Package or class whose classes are entry points (repeatable)
    #[arg(long = "keep", value_name = "PKG", global = true)]
    pub keep: Vec<String>,

    /// Package or class left under its original name (repeatable)
    #[arg(long = "unshaded", value_name = "PKG", global = true)]
    pub unshaded: Vec<String>,

    /// Package or class never treated as an entry point (repeatable)
    #[arg(long = "ignore", value_name = "PKG", global = true)]
    pub ignore: Vec<String>,

    #[arg(long, value_name = "PKG", global = true)]
    pub shadow_package: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Show how class names would be classified and renamed
    Classify {
        #[arg(required = true, value_name = "CLASS")]
        class_names: Vec<String>,
    },
    /// Scan inputs and print which classes would be kept and where
    Plan {
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Scan inputs and write the shaded jar
    ///
    /// Class files are copied unchanged: relocated classes move to their new
    /// paths but their constant pools are not remapped.
    Build {
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
