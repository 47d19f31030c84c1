mod field;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use field::CompiledField;
use smc::glam::DVec3;
use smc::{ExtractOptions, IndexedMesh, Stats, SurfaceExtractor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "meshtool")]
#[command(about = "Octree marching cubes surface extraction", long_about = None)]
struct Args {
    /// Input triangle mesh (OBJ)
    #[arg(long, conflicts_with = "expr")]
    input: Option<PathBuf>,

    /// Implicit field expression over x, y, z (e.g. "x*x + y*y + z*z - 1")
    #[arg(long)]
    expr: Option<String>,

    /// Isovalue for the implicit field
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    isovalue: f64,

    /// Bounding box minimum corner for --expr, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        num_args = 3,
        default_value = "-1.5,-1.5,-1.5",
        allow_hyphen_values = true
    )]
    bbox_min: Vec<f64>,

    /// Bounding box maximum corner for --expr, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        num_args = 3,
        default_value = "1.5,1.5,1.5",
        allow_hyphen_values = true
    )]
    bbox_max: Vec<f64>,

    /// Octree depth, clamped to [1, 9]
    #[arg(long, default_value = "6")]
    depth: i32,

    /// Triangulate merged leaves from their plane signature instead of
    /// resampling them at the finest resolution
    #[arg(long, default_value = "false")]
    planar_leaves: bool,

    /// Output mesh path (OBJ)
    #[arg(long)]
    output: PathBuf,

    /// Write extraction statistics as JSON to this path
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn extract(args: &Args, out: &mut IndexedMesh) -> Result<Stats> {
    let options = ExtractOptions {
        planar_leaves: args.planar_leaves,
    };
    if let Some(input) = &args.input {
        let soup = smc::read_obj(input).with_context(|| format!("reading {}", input.display()))?;
        tracing::info!(
            vertices = soup.vertex_count(),
            faces = soup.face_count(),
            "loaded triangle soup"
        );
        let extractor = SurfaceExtractor::from_mesh(&soup, args.depth).with_options(options);
        Ok(extractor.extract(out))
    } else if let Some(expr) = &args.expr {
        let compiled = CompiledField::compile(expr)?;
        let bbox_min = DVec3::from_slice(&args.bbox_min);
        let bbox_max = DVec3::from_slice(&args.bbox_max);
        let extractor = SurfaceExtractor::from_implicit(
            move |p| compiled.eval(p),
            args.isovalue,
            bbox_min,
            bbox_max,
            args.depth,
        )
        .with_options(options);
        Ok(extractor.extract(out))
    } else {
        bail!("either --input or --expr is required");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("meshtool={log_level},smc={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("meshtool v{}", env!("CARGO_PKG_VERSION"));

    let mut mesh = IndexedMesh::new();
    let stats = extract(&args, &mut mesh)?;

    smc::write_obj_file(&args.output, &mesh)
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "wrote {}",
        args.output.display()
    );

    if let Some(path) = &args.stats_json {
        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
