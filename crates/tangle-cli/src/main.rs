use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tangle::config::MAX_PLOT_SIDE;
use tangle::{
    ChangeObserver, Image, Notebook, PassReport, Producer, Value, Workspace, WorkspaceConfig, report,
};

#[derive(Parser)]
#[command(name = "tangle")]
#[command(about = "Reactive cell notebooks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every cell invocation
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct RunOptions {
    /// Path to a notebook (`.tgl` text or `.json`)
    file: PathBuf,

    /// Only evaluate this variable and what it depends on
    #[arg(long)]
    root: Option<String>,

    /// Write plot images as `<cell>_<index>.png` into this directory
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the cache as JSON instead of text
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "480", value_parser = clap::value_parser!(u32).range(1..=MAX_PLOT_SIDE as i64))]
    plot_width: u32,

    #[arg(long, default_value = "320", value_parser = clap::value_parser!(u32).range(1..=MAX_PLOT_SIDE as i64))]
    plot_height: u32,
}

impl RunOptions {
    fn config(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            plot_width: self.plot_width,
            plot_height: self.plot_height,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a notebook once
    Run(RunOptions),
    /// Compile every cell and report errors without running anything
    Check {
        file: PathBuf,
    },
    /// Print producers and dependency edges
    Graph {
        file: PathBuf,
    },
    /// Verify `%! expect` directives
    Test {
        files: Vec<PathBuf>,
    },
    /// Re-run a notebook every time the file changes
    Watch(RunOptions),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_module("tangle", log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Run(options) => {
            let notebook = Notebook::load(&options.file)?;
            let mut workspace = Workspace::with_config(options.config());
            workspace.update(&notebook.sources(), &notebook.outputs());
            let pass = evaluate(&mut workspace, &options, None);
            present(&workspace, &notebook, &options, &pass)?;
        }
        Commands::Check { file } => check(&file)?,
        Commands::Graph { file } => graph(&file)?,
        Commands::Test { files } => test(&files)?,
        Commands::Watch(options) => watch(&options)?,
    }
    Ok(())
}

fn evaluate(workspace: &mut Workspace, options: &RunOptions, observer: Option<&mut dyn ChangeObserver>) -> PassReport {
    match &options.root {
        Some(root) => workspace.resolve(root, observer).1,
        None => workspace.run_pass(observer),
    }
}

/// Print the cache with error panels for failed values, then export images.
fn present(workspace: &Workspace, notebook: &Notebook, options: &RunOptions, pass: &PassReport) -> Result<()> {
    if options.json {
        let cache: serde_json::Map<String, serde_json::Value> = workspace
            .cache()
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&cache)?);
    } else {
        for cell in workspace.cells() {
            for output in &cell.outputs {
                match workspace.value(output) {
                    Some(Value::Error(error)) => {
                        let source = error
                            .cell()
                            .and_then(|cell| notebook.cell(cell))
                            .map(|cell| cell.source.as_str());
                        println!("{output} =");
                        print!("{}", report::render(error, source));
                    }
                    Some(value) => println!("{output} = {value}"),
                    None => println!("{output} = <not evaluated>"),
                }
            }
        }
    }
    if let Some(directory) = &options.export {
        export(directory, pass)?;
    }
    Ok(())
}

fn export(directory: &Path, pass: &PassReport) -> Result<()> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("cannot create '{}'", directory.display()))?;
    for (cell, images) in &pass.artifacts {
        for (index, image) in images.iter().enumerate() {
            let path = directory.join(format!("{cell}_{index}.png"));
            save_png(image, &path)?;
            log::info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn save_png(image: &Image, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("cannot write '{}'", path.display()))
}

fn check(file: &Path) -> Result<()> {
    eprintln!("Checking: {}", file.display());
    let notebook = Notebook::load(file)?;
    let mut workspace = Workspace::new();
    workspace.update(&notebook.sources(), &notebook.outputs());
    let mut failed = 0;
    for (name, cell) in workspace.compile_errors() {
        if let Some(error) = cell.compile_error() {
            let source = notebook.cell(name).map(|cell| cell.source.as_str());
            eprint!("{}", report::render(error, source));
            failed += 1;
        }
    }
    for conflict in workspace.graph().conflicts() {
        eprint!("{}", report::render(&conflict, None));
        failed += 1;
    }
    if failed > 0 {
        bail!("{failed} problem(s) in {}", file.display());
    }
    eprintln!("ok ({} cells)", notebook.cells.len());
    Ok(())
}

fn graph(file: &Path) -> Result<()> {
    let notebook = Notebook::load(file)?;
    let mut workspace = Workspace::new();
    workspace.update(&notebook.sources(), &notebook.outputs());
    let graph = workspace.graph();
    println!("producers:");
    for (name, producer) in graph.producers() {
        match producer {
            Producer::Cell(cell) => println!("  {name} <- {cell}"),
            Producer::Conflict(cells) => println!("  {name} <- CONFLICT({})", cells.join(", ")),
        }
    }
    println!("edges:");
    for (producer, consumer) in graph.edges() {
        println!("  {producer} -> {consumer}");
    }
    for (cell, input) in graph.unresolved() {
        println!("  ? {input} -> {cell}");
    }
    Ok(())
}

fn test(files: &[PathBuf]) -> Result<()> {
    let mut total = 0;
    let mut passed = 0;
    for file in files {
        let notebook = Notebook::load(file)?;
        let mut workspace = Workspace::new();
        workspace.update(&notebook.sources(), &notebook.outputs());
        eprintln!("{}", file.display());
        for expectation in &notebook.expectations {
            total += 1;
            eprint!("  {} ... ", expectation.name);
            let expected: serde_json::Value = match serde_json::from_str(&expectation.expected) {
                Ok(expected) => expected,
                Err(error) => {
                    eprintln!("FAILED (invalid expected JSON on line {}: {error})", expectation.line);
                    continue;
                }
            };
            let (value, _) = workspace.resolve(&expectation.name, None);
            let actual = value.to_json();
            if values_match(&actual, &expected) {
                eprintln!("ok");
                passed += 1;
            } else {
                eprintln!("FAILED");
                eprintln!("    expected: {expected}");
                eprintln!("    actual:   {actual}");
            }
        }
    }
    eprintln!("\n{total} tests: {passed} passed, {} failed", total - passed);
    if passed < total {
        bail!("{} test(s) failed", total - passed);
    }
    Ok(())
}

/// JSON equality where numbers compare by value, so `3` matches `3.0`.
fn values_match(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value as Json;
    match (actual, expected) {
        (Json::Number(a), Json::Number(b)) => a.as_f64() == b.as_f64(),
        (Json::Array(a), Json::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_match(a, b))
        }
        (Json::Object(a), Json::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, a)| b.get(key).is_some_and(|b| values_match(a, b)))
        }
        (a, b) => a == b,
    }
}

fn watch(options: &RunOptions) -> Result<()> {
    let mut workspace = Workspace::with_config(options.config());
    let run = |workspace: &mut Workspace| -> Result<()> {
        let notebook = match Notebook::load(&options.file) {
            Ok(notebook) => notebook,
            Err(error) => {
                eprintln!("{error}");
                return Ok(());
            }
        };
        workspace.update(&notebook.sources(), &notebook.outputs());
        let mut on_change = |cell: &str, index: usize| eprintln!("changed: {cell}[{index}]");
        let pass = evaluate(workspace, options, Some(&mut on_change));
        eprintln!(
            "invoked: [{}], reused: [{}]",
            pass.invoked.join(", "),
            pass.reused.join(", ")
        );
        present(workspace, &notebook, options, &pass)
    };
    run(&mut workspace)?;

    let (sender, receiver) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(sender)?;
    watcher.watch(&options.file, RecursiveMode::NonRecursive)?;
    eprintln!("Watching: {}", options.file.display());
    for event in receiver {
        match event {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => run(&mut workspace)?,
            Ok(_) => {}
            Err(error) => log::warn!("watch error: {error}"),
        }
    }
    Ok(())
}
