use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use tpswarp::{
    document::WarpDocument,
    eval::ThreadPool,
    landmark::{
        Input,
        csv::{CsvFlags, write_non_participating, write_pairs},
    },
    mesh::Mesh,
    solver::AffineFlags,
    validate::{ValidationCheckable, ValidationState},
};

/// Warps an OBJ mesh with a thin-plate spline defined by two landmark files
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// CSV file of source landmarks (`x,y,z` or `name,x,y,z`)
    #[clap(long)]
    source_landmarks: PathBuf,

    /// CSV file of destination landmarks
    #[clap(long)]
    destination_landmarks: PathBuf,

    /// CSV file of landmarks that are warped but don't shape the warp
    #[clap(long)]
    non_participating: Option<PathBuf>,

    /// Name of a `.csv` file for the warped non-participating landmarks
    #[clap(long)]
    non_participating_out: Option<PathBuf>,

    /// Name of a `.csv` file for the paired landmarks
    #[clap(long)]
    pairs_out: Option<PathBuf>,

    /// Leave the header row out of written CSV files
    #[clap(long)]
    no_header: bool,

    /// Leave the name column out of written CSV files
    #[clap(long)]
    no_names: bool,

    /// Name of an `.obj` file to warp
    #[clap(short, long)]
    mesh: Option<PathBuf>,

    /// Name of a `.stl` file to write
    #[clap(short, long)]
    out: Option<PathBuf>,

    /// Blending factor, from 0 (no warp) to 1 (full warp)
    #[clap(short, long, default_value_t = 1.0)]
    blend: f64,

    /// Drop the translation part of the warp
    #[clap(long)]
    no_translation: bool,

    /// Keep only the direction of the affine axes
    #[clap(long)]
    no_scale: bool,

    /// Keep only the magnitude of the affine axes
    #[clap(long)]
    no_rotation: bool,

    /// Drop the non-affine (bending) part of the warp
    #[clap(long)]
    no_non_affine: bool,

    /// Multiplier applied to source landmarks
    #[clap(long, default_value_t = 1.0)]
    source_prescale: f64,

    /// Multiplier applied to destination landmarks
    #[clap(long, default_value_t = 1.0)]
    destination_prescale: f64,

    /// Recompute vertex normals after warping
    #[clap(long)]
    recalculate_normals: bool,

    /// Number of threads to use
    #[clap(short, long)]
    threads: Option<NonZeroUsize>,

    /// Print the validation checklist and exit
    #[clap(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    let now = Instant::now();

    let mut doc = WarpDocument::new();
    for (input, path) in [
        (Input::Source, &args.source_landmarks),
        (Input::Destination, &args.destination_landmarks),
    ] {
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {path:?}"))?;
        let n = doc.load_landmarks(input, file)?;
        info!("Loaded {n} {input} landmarks from {path:?}");
    }
    if let Some(path) = &args.non_participating {
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {path:?}"))?;
        let n = doc.load_non_participating(file)?;
        info!("Loaded {n} non-participating landmarks from {path:?}");
    }
    if let Some(path) = &args.mesh {
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {path:?}"))?;
        doc.set_mesh(Input::Source, Some(Mesh::read_obj(file)?));
    }
    info!("Loaded inputs in {:?}", now.elapsed());

    doc.set_blending_factor(args.blend);
    doc.set_recalculate_normals(args.recalculate_normals);
    doc.set_source_prescale(args.source_prescale);
    doc.set_destination_prescale(args.destination_prescale);
    doc.set_flags(AffineFlags {
        translation: !args.no_translation,
        scale: !args.no_scale,
        rotation: !args.no_rotation,
        non_affine: !args.no_non_affine,
    });

    let checks = doc.checks();
    if args.check {
        for c in &checks {
            println!("{c}");
        }
        return Ok(());
    }
    for c in &checks {
        match c.state {
            ValidationState::Ok => (),
            ValidationState::Warning => warn!("{}", c.description),
            ValidationState::Error => bail!("{}", c.description),
        }
    }

    let start = Instant::now();
    let warp = doc.solve()?;
    info!(
        "Solved {} landmark pairs in {:?}",
        warp.control_points().len(),
        start.elapsed()
    );

    let pool = match args.threads {
        Some(n) if n.get() == 1 => None,
        Some(n) => Some(ThreadPool::with_threads(n.get())?),
        None => Some(ThreadPool::Global),
    };

    let flags = CsvFlags {
        header: !args.no_header,
        names: !args.no_names,
    };
    if let Some(out) = &args.pairs_out {
        info!("Writing paired landmarks to {out:?}");
        let mut handle = std::fs::File::create(out)?;
        write_pairs(doc.landmarks().pairs(), flags, &mut handle)?;
    }
    if let Some(out) = &args.non_participating_out {
        let warped = doc.warped_non_participating(&warp, pool.as_ref());
        info!("Writing {} warped non-participating landmarks to {out:?}", warped.len());
        let mut handle = std::fs::File::create(out)?;
        write_non_participating(&warped, flags, &mut handle)?;
    }

    let start = Instant::now();
    let Some(mesh) = doc.warped_source_mesh(&warp, pool.as_ref()) else {
        info!("No mesh given; nothing to warp");
        return Ok(());
    };
    info!(
        "Warped {} vertices in {:?}",
        mesh.vertices.len(),
        start.elapsed()
    );

    if let Some(out) = &args.out {
        info!("Writing STL to {out:?}");
        let mut handle = std::fs::File::create(out)?;
        mesh.write_stl(&mut handle)?;
    }
    Ok(())
}
