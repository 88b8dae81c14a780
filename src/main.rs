//! Modular 3D Wave Function Collapse
//!
//! Fills a grid with modules from a JSON catalog (or the built-in pipes
//! catalog) so that all touching connectors match, saves the result, and
//! replays how it was built in an interactive 3D viewer.

mod visualization;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use blockwave::{
    check_adjacency, format_assignment, persistence, pipes, BorderConstraint, Catalog, Coord,
    Dimensions, Direction, Generation, Generator, Grid, Label, ModuleId, SetModuleConstraint,
    Strategy, DEFAULT_RETRY_COUNT,
};

/// Generates consistent 3D module layouts with wave function collapse.
#[derive(Parser)]
#[command(name = "blockwave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a layout and save it to disk.
    Solve(SolveArgs),
    /// Replay a saved layout in an interactive 3D viewer.
    Display(LoadArgs),
    /// Check a saved layout for mismatched neighbours.
    Check(LoadArgs),
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum StrategyArg {
    Greedy,
    #[default]
    Backtracking,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Greedy => Strategy::Greedy,
            StrategyArg::Backtracking => Strategy::Backtracking,
        }
    }
}

#[derive(clap::Args)]
struct SolveArgs {
    /// Catalog JSON file; the built-in pipes catalog when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Grid size as XxYxZ.
    #[arg(long, default_value = "8x4x8", value_parser = parse_size)]
    size: Dimensions,
    /// Seed for a reproducible run; drawn from system entropy when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_RETRY_COUNT)]
    retries: usize,
    #[arg(long, value_enum, default_value_t = StrategyArg::Backtracking)]
    strategy: StrategyArg,
    /// Required label on an outer face, e.g. `down=0` (repeatable).
    #[arg(long = "face", value_parser = parse_face)]
    faces: Vec<(Direction, Label)>,
    /// Pins a cell to a module, e.g. `0,0,0=3` (repeatable).
    #[arg(long = "pin", value_parser = parse_pin)]
    pins: Vec<(Coord, ModuleId)>,
    /// Search steps allowed per attempt.
    #[arg(long)]
    max_steps: Option<u64>,
    /// Re-check all adjacencies after solving.
    #[arg(long)]
    validate: bool,
    /// Directory to write generation.txt and generation.bin to.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

impl Default for SolveArgs {
    fn default() -> Self {
        Self {
            catalog: None,
            size: Dimensions::new(8, 4, 8),
            seed: None,
            retries: DEFAULT_RETRY_COUNT,
            strategy: StrategyArg::default(),
            faces: Vec::new(),
            pins: Vec::new(),
            max_steps: None,
            validate: false,
            out: PathBuf::from("."),
        }
    }
}

#[derive(clap::Args)]
struct LoadArgs {
    /// Catalog the layout was generated with; the built-in pipes catalog when
    /// omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Directory holding generation.bin.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Solve(args)) => run_solver(&args).map(|_| ()),
        Some(Command::Display(args)) => run_display(&args),
        Some(Command::Check(args)) => run_check(&args),
        None => {
            // default: solve and replay
            let args = SolveArgs::default();
            run_solver(&args).and_then(|(catalog, generation)| {
                let grid = Grid::with_unit_cells(generation.assignment.dimensions())
                    .map_err(|e| e.to_string())?;
                print_controls();
                visualization::display(&grid, &catalog, &generation.decisions);
                Ok(())
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_controls() {
    println!("Controls: Space pause, Right step, Up/Down speed, R restart");
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog, String> {
    let Some(path) = path else {
        return Ok(pipes());
    };
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Catalog::from_json(&source).map_err(|e| format!("{}: {e}", path.display()))
}

/// Generates a layout, saves it, and returns it with its catalog.
fn run_solver(args: &SolveArgs) -> Result<(Catalog, Generation), String> {
    let catalog = load_catalog(args.catalog.as_deref())?;

    let mut generator = Generator::from_dimensions(args.size, catalog.clone())
        .map_err(|e| e.to_string())?
        .with_strategy(args.strategy.into())
        .with_validation(args.validate);
    if let Some(max_steps) = args.max_steps {
        generator = generator.with_max_steps(max_steps);
    }
    if !args.faces.is_empty() {
        let border = args
            .faces
            .iter()
            .fold(BorderConstraint::new(), |border, &(direction, label)| {
                border.with_face(direction, label)
            });
        generator = generator
            .with_initial_constraint(border)
            .map_err(|e| e.to_string())?;
    }
    for &(coord, module) in &args.pins {
        generator = generator
            .with_initial_constraint(SetModuleConstraint::new(coord, module))
            .map_err(|e| e.to_string())?;
    }

    let generation = generator
        .generate(args.seed, args.retries)
        .map_err(|e| e.to_string())?;

    println!(
        "Solved {}x{}x{} in {} attempt(s) with seed {}",
        args.size.x, args.size.y, args.size.z, generation.attempts, generation.seed
    );
    print!("{}", format_assignment(&generation.assignment));

    if let Err(e) = persistence::save(&args.out, &generation) {
        error!("failed to save generation: {e}");
    } else {
        println!(
            "Wrote {} and {}",
            persistence::GENERATION_TXT,
            persistence::GENERATION_BIN
        );
    }

    Ok((catalog, generation))
}

fn load(args: &LoadArgs) -> Result<(Catalog, Generation), String> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let generation = persistence::load_all(&args.dir).ok_or_else(|| {
        format!(
            "No {} found in {}. Run 'blockwave solve' first.",
            persistence::GENERATION_BIN,
            args.dir.display()
        )
    })?;
    Ok((catalog, generation))
}

/// Loads a saved layout and replays it.
fn run_display(args: &LoadArgs) -> Result<(), String> {
    let (catalog, generation) = load(args)?;
    let grid =
        Grid::with_unit_cells(generation.assignment.dimensions()).map_err(|e| e.to_string())?;
    println!(
        "Loaded {} decisions (seed {})",
        generation.decisions.len(),
        generation.seed
    );
    print_controls();
    visualization::display(&grid, &catalog, &generation.decisions);
    Ok(())
}

/// Loads a saved layout and reports mismatched neighbours.
fn run_check(args: &LoadArgs) -> Result<(), String> {
    let (catalog, generation) = load(args)?;
    let violations = check_adjacency(&catalog, &generation.assignment);
    if violations.is_empty() {
        println!("All {} cells fit their neighbours", generation.assignment.len());
        return Ok(());
    }
    for (a, b) in &violations {
        println!("{a:?} does not fit {b:?}");
    }
    Err(format!("{} mismatched adjacencies", violations.len()))
}

fn parse_size(s: &str) -> Result<Dimensions, String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected XxYxZ, got '{s}'"));
    };
    let parse = |part: &str| {
        part.trim()
            .parse::<i32>()
            .map_err(|e| format!("bad size component '{part}': {e}"))
    };
    let dimensions = Dimensions::new(parse(*x)?, parse(*y)?, parse(*z)?);
    dimensions.validate().map_err(|e| e.to_string())
}

fn parse_face(s: &str) -> Result<(Direction, Label), String> {
    let (direction, label) = s
        .split_once('=')
        .ok_or_else(|| format!("expected DIRECTION=LABEL, got '{s}'"))?;
    let label = label
        .trim()
        .parse::<Label>()
        .map_err(|e| format!("bad label '{label}': {e}"))?;
    Ok((direction.parse()?, label))
}

fn parse_pin(s: &str) -> Result<(Coord, ModuleId), String> {
    let (coord, module) = s
        .split_once('=')
        .ok_or_else(|| format!("expected X,Y,Z=MODULE, got '{s}'"))?;
    let components = coord
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad coordinate '{coord}': {e}"))?;
    let [x, y, z] = components.as_slice() else {
        return Err(format!("expected three coordinates, got '{coord}'"));
    };
    let module = module
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad module id '{module}': {e}"))?;
    Ok(((*x, *y, *z), ModuleId(module)))
}
