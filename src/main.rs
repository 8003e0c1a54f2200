use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use voxel_structure_generator::{
    decode, encode, frontier, load_config, Structure, TokenCatalog, TokenGrid,
};

#[derive(Parser)]
#[command(name = "structure-tool", about = "Convert voxel structures to and from token grids")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a structure JSON file into a token grid
    Encode {
        /// Input structure .json file
        #[arg(long)]
        structure: PathBuf,
        /// Catalog .json file; created if missing, updated with new blocks
        #[arg(long)]
        catalog: PathBuf,
        /// Output .vxtg grid file
        #[arg(long, short)]
        output: PathBuf,
        /// Map unseen blocks to the placeholder instead of growing the catalog
        #[arg(long)]
        freeze: bool,
        /// Generator config .json; its vocab_size caps catalog growth
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Decode a token grid back into a structure JSON file
    Decode {
        /// Input .vxtg grid file
        #[arg(long)]
        grid: PathBuf,
        /// Catalog .json file the grid was encoded with
        #[arg(long)]
        catalog: PathBuf,
        /// Output structure .json file
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Reset every layer at or above a height to unset, producing an infill prompt
    Mask {
        /// Input .vxtg grid file
        #[arg(long)]
        grid: PathBuf,
        /// Layers with y below this value are kept
        #[arg(long)]
        keep_below_y: usize,
        /// Output .vxtg grid file
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Print cell-state counts and frontier size of a token grid
    Inspect {
        /// Input .vxtg grid file
        #[arg(long)]
        grid: PathBuf,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn read_grid(path: &Path) -> Result<TokenGrid, Box<dyn std::error::Error>> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(TokenGrid::read_from(&mut reader)?)
}

fn write_grid(grid: &TokenGrid, path: &Path) -> CliResult {
    create_parent_dir(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    grid.write_to(&mut writer)?;
    println!("Saved {:?} grid to {}", grid.shape(), path.display());
    Ok(())
}

fn run_encode(
    structure: &Path,
    catalog_path: &Path,
    output: &Path,
    freeze: bool,
    config: Option<&Path>,
) -> CliResult {
    let structure = Structure::load_json(structure)?;
    let mut catalog = if catalog_path.exists() {
        TokenCatalog::load_json(catalog_path)?
    } else {
        log::info!("starting a fresh catalog at {}", catalog_path.display());
        TokenCatalog::new()
    };
    if let Some(config) = config {
        let config = load_config(config)?;
        catalog = catalog.with_capacity(config.vocab_size);
    }
    if freeze {
        catalog.freeze();
    }
    let known_before = catalog.len();
    let grid = encode(&structure, &mut catalog);
    if catalog.len() != known_before {
        catalog.save_json(catalog_path)?;
        println!(
            "Catalog grew from {} to {} blocks",
            known_before,
            catalog.len()
        );
    }
    write_grid(&grid, output)
}

fn run_decode(grid: &Path, catalog: &Path, output: &Path) -> CliResult {
    let grid = read_grid(grid)?;
    let catalog = TokenCatalog::load_json(catalog)?;
    let structure = decode(&grid, &catalog, None)?;
    create_parent_dir(output)?;
    structure.save_json(output)?;
    println!(
        "Saved {}x{}x{} structure to {}",
        structure.length(),
        structure.height(),
        structure.width(),
        output.display()
    );
    Ok(())
}

fn run_mask(grid: &Path, keep_below_y: usize, output: &Path) -> CliResult {
    let grid = read_grid(grid)?;
    let masked = grid.masked(|_, y, _| y < keep_below_y);
    write_grid(&masked, output)
}

fn run_inspect(grid: &Path) -> CliResult {
    let grid = read_grid(grid)?;
    let counts = grid.state_counts();
    let [depth, height, length] = grid.shape();
    println!("shape (z, y, x): {depth} x {height} x {length}");
    println!("cells:           {}", grid.len());
    println!("unset:           {}", counts.unset);
    println!("known empty:     {}", counts.known_empty);
    println!("known:           {}", counts.known);
    println!("frontier:        {}", frontier(&grid).len());
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Encode {
            structure,
            catalog,
            output,
            freeze,
            config,
        } => run_encode(&structure, &catalog, &output, freeze, config.as_deref()),
        Command::Decode {
            grid,
            catalog,
            output,
        } => run_decode(&grid, &catalog, &output),
        Command::Mask {
            grid,
            keep_below_y,
            output,
        } => run_mask(&grid, keep_below_y, &output),
        Command::Inspect { grid } => run_inspect(&grid),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
