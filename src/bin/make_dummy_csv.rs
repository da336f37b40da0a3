use anyhow::Context;
use clap::Parser;
use rand::Rng;
use rand::seq::SliceRandom;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CATEGORIES: [&str; 3] = ["foo", "bar", "baz"];

/// Writes a small random CSV for exercising the upload endpoint by hand.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output path
    #[arg(short, long, default_value = "test_data/dummy.csv")]
    out: PathBuf,

    /// Number of data rows
    #[arg(short, long, default_value_t = 10)]
    rows: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "make_dummy_csv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let file = std::fs::File::create(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let mut out = std::io::BufWriter::new(file);
    let mut rng = rand::thread_rng();

    writeln!(out, "A,B,C")?;
    for _ in 0..args.rows {
        let a: u32 = rng.gen_range(0..=100);
        let b: f64 = rng.gen_range(0.0..1.0);
        let c = CATEGORIES.choose(&mut rng).copied().unwrap_or("foo");
        writeln!(out, "{},{},{}", a, b, c)?;
    }
    out.flush()?;

    info!("📝 Wrote {} rows to {}", args.rows, args.out.display());
    Ok(())
}
