//! parfold - data-parallel transform and tree reduce on an ordered device queue
//!
//! # Usage
//!
//! ```bash
//! # Normalize random values by their maximum and print a few samples
//! parfold normalize --length 262144 --samples 1,20,300
//!
//! # Reduce values read from a file
//! parfold reduce --op sum --input values.txt
//!
//! # Show the device profile
//! parfold info
//! ```

mod manifest;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::process;

use parfold_algo::{
    logging, reduce_max, reduce_min, reduce_sum, transform, Buffer, Captures, ElementFn,
    FoldPlan, Placeholder, Queue, QueueConfig,
};

use manifest::{load_manifest, Manifest};

const DEFAULT_MANIFEST: &str = "parfold.toml";

#[derive(Parser)]
#[command(name = "parfold")]
#[command(version = "0.1.0")]
#[command(about = "Data-parallel transform and tree reduce on an ordered device queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Manifest with [device] and [run] tables (default: ./parfold.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the device's maximum work-group size
    #[arg(long, global = true)]
    max_work_group_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Divide every value by the maximum, read back through a placeholder
    Normalize {
        /// Number of generated values
        #[arg(long)]
        length: Option<usize>,

        /// Read values from a file instead of generating them
        #[arg(long)]
        input: Option<PathBuf>,

        /// Indices to print after the run
        #[arg(long, value_delimiter = ',')]
        samples: Option<Vec<usize>>,
    },

    /// Fold the values to a single scalar
    Reduce {
        #[arg(long, value_enum, default_value = "max")]
        op: ReduceOp,

        /// Number of generated values
        #[arg(long)]
        length: Option<usize>,

        /// Read values from a file instead of generating them
        #[arg(long)]
        input: Option<PathBuf>,

        /// Print the fold plan before running
        #[arg(long)]
        plan: bool,
    },

    /// Show the device profile and queue configuration
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReduceOp {
    Max,
    Min,
    Sum,
}

fn main() {
    let cli = Cli::parse();

    logging::init(cli.verbose);

    let result = load(&cli).and_then(|manifest| match cli.command {
        Commands::Normalize {
            length,
            input,
            samples,
        } => run_normalize(&manifest, length, input, samples),
        Commands::Reduce {
            op,
            length,
            input,
            plan,
        } => run_reduce(&manifest, op, length, input, plan),
        Commands::Info => show_info(&manifest.device),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Manifest with command-line overrides applied.
fn load(cli: &Cli) -> Result<Manifest, String> {
    let mut manifest = match &cli.config {
        Some(path) => load_manifest(path, true)?,
        None => load_manifest(Path::new(DEFAULT_MANIFEST), false)?,
    };
    if let Some(size) = cli.max_work_group_size {
        manifest.device.max_work_group_size = size;
    }
    Ok(manifest)
}

fn open_queue(config: &QueueConfig) -> Result<Queue, String> {
    let queue = Queue::new(config.clone()).map_err(|e| e.to_string())?;
    println!("Using device: {}", queue.device().name);
    Ok(queue)
}

fn run_normalize(
    manifest: &Manifest,
    length: Option<usize>,
    input: Option<PathBuf>,
    samples: Option<Vec<usize>>,
) -> Result<(), String> {
    let queue = open_queue(&manifest.device)?;
    let values = input_values(manifest, length, input.as_deref())?;
    let samples = samples.unwrap_or_else(|| manifest.run.samples.clone());
    let len = values.len();

    let data = Buffer::from_vec(values);
    let maxi: Buffer<f32> = Buffer::new(1);
    let norm: Buffer<f32> = Buffer::new(len);

    println!("Normalizing {} values...", len);
    reduce_max(&queue, &data, &maxi).map_err(|e| e.to_string())?;

    let m = Placeholder::new(&maxi);
    let normalize = ElementFn::with_captures("normalize", |cx| {
        let max = cx.capture(&m);
        move |x: &f32, c: &Captures| x / c.read(&max)[0]
    });
    transform(&queue, &data, &norm, &normalize, &[m.bind()]).map_err(|e| e.to_string())?;

    let r = data.host_read().map_err(|e| e.to_string())?;
    let n = norm.host_read().map_err(|e| e.to_string())?;
    let max = maxi.to_vec().map_err(|e| e.to_string())?;
    println!("done! max = {}", max[0]);

    for i in samples {
        match (r.get(i), n.get(i)) {
            (Some(value), Some(normalized)) => println!("{:>8}\t{:.12}\t{:.12}", i, value, normalized),
            _ => warn!("sample index {} is out of range for {} values", i, len),
        }
    }
    Ok(())
}

fn run_reduce(
    manifest: &Manifest,
    op: ReduceOp,
    length: Option<usize>,
    input: Option<PathBuf>,
    show_plan: bool,
) -> Result<(), String> {
    let queue = open_queue(&manifest.device)?;
    let values = input_values(manifest, length, input.as_deref())?;

    if show_plan {
        let plan = FoldPlan::new(values.len(), queue.device().max_work_group_size)
            .map_err(|e| e.to_string())?;
        println!("Fold plan: {}", plan);
        for pass in &plan.passes {
            println!(
                "  pass {}: {} elements, {} groups of {}, strides {:?}",
                pass.pass, pass.length, pass.groups, pass.group_size, pass.strides
            );
        }
    }

    let data = Buffer::from_vec(values);
    let out: Buffer<f32> = Buffer::new(1);
    let (name, result) = match op {
        ReduceOp::Max => ("max", reduce_max(&queue, &data, &out)),
        ReduceOp::Min => ("min", reduce_min(&queue, &data, &out)),
        ReduceOp::Sum => ("sum", reduce_sum(&queue, &data, &out)),
    };
    result.map_err(|e| e.to_string())?;

    let value = out.to_vec().map_err(|e| e.to_string())?;
    println!("{} = {}", name, value[0]);
    Ok(())
}

fn show_info(config: &QueueConfig) -> Result<(), String> {
    let queue = Queue::new(config.clone()).map_err(|e| e.to_string())?;
    let device = queue.device();
    println!("parfold v0.1.0");
    println!();
    println!("Device:");
    println!("  name:                {}", device.name);
    println!("  backend:             {}", device.backend.name());
    println!("  max work-group size: {}", device.max_work_group_size);
    println!();
    println!("Queue:");
    match config.memory_limit {
        Some(bytes) => println!("  memory limit:        {} bytes", bytes),
        None => println!("  memory limit:        unlimited"),
    }
    println!("  placeholder mode:    {:?}", config.placeholder_mode);

    #[cfg(feature = "webgpu-backend")]
    println!(
        "  wgpu adapter:        {}",
        if parfold_device::wgpu_probe::is_available() {
            "available"
        } else {
            "not found"
        }
    );
    Ok(())
}

/// Values from `input`, or generated per the manifest's `[run]` table.
fn input_values(
    manifest: &Manifest,
    length: Option<usize>,
    input: Option<&Path>,
) -> Result<Vec<f32>, String> {
    match input {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let values = parse_values(&content)?;
            info!("read {} values from {}", values.len(), path.display());
            Ok(values)
        }
        None => {
            let len = length.unwrap_or(manifest.run.length);
            println!("Generating {} random numbers", len);
            Ok(generate(len, manifest.run.seed))
        }
    }
}

/// Whitespace- or comma-separated floats.
fn parse_values(content: &str) -> Result<Vec<f32>, String> {
    content
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f32>()
                .map_err(|e| format!("Invalid value '{}': {}", token, e))
        })
        .collect()
}

/// Uniform values in `[0, 100)`, reproducible per seed.
fn generate(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0.0f32..100.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_values("3 100, 50\n2").unwrap(), vec![3.0, 100.0, 50.0, 2.0]);
        assert!(parse_values("1 two").is_err());
        assert!(parse_values("").unwrap().is_empty());
    }

    #[test]
    fn test_generate_is_seeded_and_bounded() {
        let a = generate(1000, 42);
        assert_eq!(a, generate(1000, 42));
        assert_ne!(a, generate(1000, 43));
        assert!(a.iter().all(|v| (0.0..100.0).contains(v)));
    }

    #[test]
    fn test_cli_overrides_manifest() {
        let cli = Cli::parse_from([
            "parfold",
            "--max-work-group-size",
            "32",
            "--config",
            "does-not-exist.toml",
            "info",
        ]);
        assert!(load(&cli).is_err());

        let cli = Cli::parse_from(["parfold", "reduce", "--op", "sum", "--max-work-group-size", "32"]);
        let manifest = load(&cli).unwrap();
        assert_eq!(manifest.device.max_work_group_size, 32);
    }
}
