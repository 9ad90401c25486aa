use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use road_carver::config::{ProcessingMode, Settings};
use road_carver::world::roads::road_persistence::{export_control_points, import_control_points};
use road_carver::world::roads::road_structs::LayerProfile;
use road_carver::world::roads::road_subsystem::RoadSubsystem;
use road_carver::world::terrain::terrain::TerrainGenerator;
use road_carver::world::terrain::terrain_editing::{CarveBackend, TerrainEditor, TileOutcome};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "road_carver", version, about = "Build road meshes and carve them into terrain tiles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Cpu,
    Gpu,
}

impl From<Backend> for ProcessingMode {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Cpu => ProcessingMode::Cpu,
            Backend::Gpu => ProcessingMode::Gpu,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Generate the tile grid, build the road and carve it in
    Carve {
        /// Control point JSON file
        #[arg(long, short)]
        points: PathBuf,
        /// Settings TOML (defaults when omitted)
        #[arg(long, short)]
        settings: Option<PathBuf>,
        /// Override the configured processing mode
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        /// Fall back to the CPU when no GPU adapter is available
        #[arg(long)]
        allow_fallback: bool,
    },
    /// Write default settings with a two-layer road to a TOML file
    InitSettings {
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Rewrite a control point file in the current format
    Upgrade {
        #[arg(long, short)]
        input: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Carve {
            points,
            settings,
            backend,
            allow_fallback,
        } => carve(points, settings, backend, allow_fallback),
        Command::InitSettings { output } => {
            let settings = Settings {
                layers: vec![
                    LayerProfile::new("asphalt", 3.5, "road"),
                    LayerProfile::new("shoulder", 1.5, "gravel"),
                ],
                ..Default::default()
            };
            settings
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            log::info!("default settings written to {}", output.display());
            Ok(())
        }
        Command::Upgrade { input, output } => {
            let points = import_control_points(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            export_control_points(&output, &points)?;
            Ok(())
        }
    }
}

fn carve(
    points: PathBuf,
    settings: Option<PathBuf>,
    backend: Option<Backend>,
    allow_fallback: bool,
) -> Result<()> {
    let mut settings = match settings {
        Some(path) => {
            Settings::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Settings::default(),
    };
    if let Some(b) = backend {
        settings.processing_mode = b.into();
    }
    if settings.layers.is_empty() {
        bail!("settings define no road layers");
    }

    let mut roads = RoadSubsystem::new(&settings);
    roads
        .import_points(&points)
        .with_context(|| format!("loading control points {}", points.display()))?;

    let generator = TerrainGenerator::from_config(&settings.grid);
    let mut terrain = generator.build_tiles(&settings.grid);
    for layer in roads.layers() {
        for tile in &mut terrain.tiles {
            tile.register_layer(&layer.terrain_layer);
        }
    }

    let mut editor = match TerrainEditor::for_mode(settings.processing_mode) {
        Ok(editor) => editor,
        Err(e) if allow_fallback => {
            log::warn!("{e}; carving on the CPU instead");
            TerrainEditor::new(CarveBackend::Cpu)
        }
        Err(e) => return Err(e.into()),
    };

    let report = roads.execute(&mut terrain, &mut editor, |p| {
        log::debug!("tile {:?} ({}/{})", p.tile, p.done + 1, p.total);
        true
    })?;

    let mesh = roads.mesh();
    log::info!(
        "mesh: {} vertices, {} indices over {} submesh(es)",
        mesh.vertices.len(),
        mesh.index_count(),
        mesh.submeshes.len()
    );
    for tile in &report.apply.tiles {
        match &tile.outcome {
            TileOutcome::Carved {
                heights_changed,
                weight_cells_painted,
            } => log::info!(
                "tile {:?}: {heights_changed} heights, {weight_cells_painted} weight cells",
                tile.tile
            ),
            TileOutcome::Untouched => log::debug!("tile {:?}: untouched", tile.tile),
            TileOutcome::Failed(e) => log::warn!("tile {:?} skipped: {e}", tile.tile),
        }
    }
    log::info!(
        "{} normal set(s) rebuilt, {} link(s) between tiles",
        report.reconcile.normals_rebuilt,
        report.reconcile.links
    );
    Ok(())
}
