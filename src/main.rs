use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use rootcause::prelude::*;
use tracing::{Level, debug};

use studiomesh::data::MmapAssetSource;
use studiomesh::export::write_obj;
use studiomesh::{AssetLoader, IndexPolicy, LoadOptions, LoadResult};

/// Decode compiled Studio models into flat meshes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scale applied to every output position
    #[clap(long, default_value_t = 1.0)]
    scale: f32,

    /// What to do with strip indices outside the vertex array
    #[clap(long, value_enum, default_value_t = PolicyArg::Wrap)]
    index_policy: PolicyArg,

    /// Skip the topology file and guess triangles from vertex order
    #[clap(long)]
    vertices_only: bool,

    /// Print load reports as JSON
    #[clap(long)]
    json: bool,

    /// Write each loaded mesh as `<dir>/<name>.obj`
    #[clap(long, value_name = "DIR")]
    obj: Option<PathBuf>,

    /// Log decoding progress
    #[clap(short, long)]
    verbose: bool,

    /// .mdl files or glob patterns
    #[clap(required = true)]
    models: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Wrap,
    Drop,
}

impl From<PolicyArg> for IndexPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Wrap => IndexPolicy::Wrap,
            PolicyArg::Drop => IndexPolicy::Drop,
        }
    }
}

fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>, Report> {
    let mut paths = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }
        for entry in glob::glob(pattern).context("Invalid glob pattern")? {
            let path = entry.context("Could not read glob match")?;
            if path.is_file() {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

fn write_mesh(dir: &Path, path: &Path, result: &LoadResult) -> Result<(), Report> {
    let Some(asset) = result.asset() else {
        return Ok(());
    };
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| asset.header.name.clone());
    let out_path = dir.join(format!("{stem}.obj"));
    let file = File::create(&out_path).context("Failed to create OBJ file")?;
    write_obj(&asset.mesh, &stem, BufWriter::new(file)).context("Failed to write OBJ file")?;
    debug!(path = %out_path.display(), "wrote mesh");
    Ok(())
}

fn main() -> Result<(), Report> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let options = LoadOptions::builder()
        .scale(args.scale)
        .index_policy(args.index_policy.into())
        .topology(!args.vertices_only)
        .build();

    let paths = expand_paths(&args.models)?;
    let total = paths.len() as u64;
    let results: Vec<(PathBuf, LoadResult)> = paths
        .into_par_iter()
        .progress_count(total)
        .map(|path| {
            let result = AssetLoader::with_options(MmapAssetSource::new(&path), options).load();
            (path, result)
        })
        .collect();

    if let Some(dir) = &args.obj {
        fs::create_dir_all(dir).context("Failed to create OBJ output directory")?;
        for (path, result) in &results {
            write_mesh(dir, path, result)?;
        }
    }

    if args.json {
        let reports: Vec<_> = results.iter().map(|(_, result)| result.report()).collect();
        let json =
            serde_json::to_string_pretty(&reports).context("Failed to serialize load reports")?;
        println!("{json}");
    } else {
        for (_, result) in &results {
            print!("{}", result.report());
        }
    }

    let failed = results.iter().filter(|(_, result)| !result.is_ready()).count();
    if failed > 0 {
        return Err(rootcause::report!(
            "{} of {} models failed to load",
            failed,
            results.len()
        ));
    }
    Ok(())
}
