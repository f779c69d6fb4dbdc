//! Ghostscript API bridge CLI
//!
//! Command-line front end for the gsapi library. It loads the interpreter
//! library and adds:
//! - Revision reporting (text or JSON)
//! - Running files, command strings and streamed standard input
//! - Typed parameters and control paths from flags or a TOML config

use anyhow::{Context, Result};
use clap::Parser;
use gsapi::{GsError, GsLibrary, Instance, InstanceConfig, PermitKind, Registration, WriteSink};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

mod config;

/// Size of each chunk fed to the interpreter in --stdin mode
const STDIN_CHUNK_SIZE: usize = 64 * 1024;

/// gsapi - Drive a Ghostscript interpreter through its C API
#[derive(Parser, Debug)]
#[command(name = "gsapi-cli")]
#[command(about = "Run PostScript/PDF through the Ghostscript interpreter API", long_about = None)]
#[command(version)]
struct Args {
    /// Files to run, in order
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Path to the Ghostscript shared library (default: platform library name)
    #[arg(long, value_name = "PATH")]
    lib: Option<PathBuf>,

    /// Print product and revision of the library, then exit
    #[arg(long)]
    revision: bool,

    /// Print the revision as JSON
    #[arg(long, requires = "revision")]
    json: bool,

    /// PostScript to run after the files
    #[arg(short = 'c', long, value_name = "PS")]
    command: Option<String>,

    /// Stream standard input to the interpreter after files and command
    #[arg(long)]
    stdin: bool,

    /// Interpreter argument (can be repeated; default: "gs")
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    init_args: Vec<String>,

    /// Typed parameter NAME=VALUE (can be repeated)
    #[arg(long, value_name = "NAME=VALUE")]
    param: Vec<String>,

    /// Permit reading from PATH (can be repeated)
    #[arg(long, value_name = "PATH")]
    permit_read: Vec<String>,

    /// Permit writing to PATH (can be repeated)
    #[arg(long, value_name = "PATH")]
    permit_write: Vec<String>,

    /// Permit control access to PATH (can be repeated)
    #[arg(long, value_name = "PATH")]
    permit_control: Vec<String>,

    /// Path to configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// One unit of input for the interpreter
#[derive(Debug)]
enum Job {
    File(PathBuf),
    Command(String),
    Stdin,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("gsapi CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using gsapi library v{}", gsapi::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };

    let library = load_library(args.lib.as_ref().or(app_config.library.path.as_ref()))?;

    if args.revision {
        return print_revision(&library, args.json);
    }

    let jobs = collect_jobs(&args, &app_config);
    if jobs.is_empty() {
        println!("gsapi - No input specified");
        println!("\nQuick Start:");
        println!("  gsapi-cli --revision");
        println!("  gsapi-cli --arg=-sDEVICE=png16m --arg=-sOutputFile=out.png input.ps");
        println!("  gsapi-cli -c \"(hello) print flush\" --arg=-dNODISPLAY");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let instance_config = build_instance_config(&args, app_config.instance)?;
    run(&library, &instance_config, &jobs, app_config.run.user_errors)
}

fn load_library(path: Option<&PathBuf>) -> Result<Arc<GsLibrary>> {
    match path {
        Some(path) => GsLibrary::load(path)
            .with_context(|| format!("Failed to load library: {:?}", path)),
        None => GsLibrary::load_default()
            .context("Failed to load the Ghostscript library (use --lib)"),
    }
}

fn print_revision(library: &GsLibrary, json: bool) -> Result<()> {
    let revision = library.revision().context("Failed to query library revision")?;

    if json {
        let value = serde_json::json!({
            "product": &revision.product,
            "copyright": &revision.copyright,
            "revision": revision.revision,
            "revision_date": revision.revision_date,
            "version": revision.version(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", revision);
        println!("{}", revision.copyright);
    }
    Ok(())
}

fn collect_jobs(args: &Args, app_config: &config::AppConfig) -> Vec<Job> {
    let mut jobs: Vec<Job> = app_config
        .run
        .files
        .iter()
        .chain(&args.files)
        .cloned()
        .map(Job::File)
        .collect();
    if let Some(command) = &args.command {
        jobs.push(Job::Command(command.clone()));
    }
    if args.stdin {
        jobs.push(Job::Stdin);
    }
    jobs
}

/// Apply command-line flags on top of the configured instance settings
fn build_instance_config(args: &Args, base: InstanceConfig) -> Result<InstanceConfig> {
    let mut overlay = InstanceConfig::new();
    for arg in &args.init_args {
        overlay = overlay.add_arg(arg.as_str());
    }
    for text in &args.param {
        let (name, value) = config::parse_param(text)?;
        overlay = overlay.with_param(name, value);
    }
    for (kind, paths) in [
        (PermitKind::Reading, &args.permit_read),
        (PermitKind::Writing, &args.permit_write),
        (PermitKind::Control, &args.permit_control),
    ] {
        for path in paths {
            overlay = overlay.add_control_path(kind, path.as_str());
        }
    }

    let mut config = base.merge(overlay);
    if config.args.is_empty() {
        config.args.push("gs".to_string());
    }
    Ok(config)
}

/// Run the jobs on a fresh instance.
///
/// Once the instance exists it is always shut down with `exit()` and deleted,
/// whatever happened during initialisation or the jobs. The first error wins.
fn run(
    library: &Arc<GsLibrary>,
    config: &InstanceConfig,
    jobs: &[Job],
    user_errors: i32,
) -> Result<()> {
    let mut instance = Instance::new(library).context("Failed to create interpreter instance")?;

    let outcome = run_jobs(&mut instance, config, jobs, user_errors);
    let shutdown = instance.exit().context("Failed to shut the interpreter down");
    instance.delete();

    outcome.and(shutdown)
}

/// Initialise the interpreter, then run the jobs in order
fn run_jobs(
    instance: &mut Instance,
    config: &InstanceConfig,
    jobs: &[Job],
    user_errors: i32,
) -> Result<()> {
    instance.register(Registration::stdout(WriteSink(io::stdout())))?;
    instance.register(Registration::stderr(WriteSink(io::stderr())))?;

    match instance.configure(config) {
        Ok(()) => {}
        Err(e) if e.is_normal_exit() => {
            log::info!("Interpreter finished during initialisation ({})", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to initialise interpreter"),
    }

    for job in jobs {
        if !run_job(instance, job, user_errors)? {
            break;
        }
    }
    Ok(())
}

/// Run one job; returns `false` once interpretation has ended
fn run_job(instance: &mut Instance, job: &Job, user_errors: i32) -> Result<bool> {
    log::debug!("Running {:?}", job);
    let result = match job {
        Job::File(path) => instance.run_file(path, user_errors).map_err(anyhow::Error::from),
        Job::Command(command) => {
            instance.run_string(command, user_errors).map_err(anyhow::Error::from)
        }
        Job::Stdin => feed_stream(instance, io::stdin().lock(), user_errors),
    };

    match result {
        Ok(exit_code) => {
            log::debug!("{:?} finished with exit code {}", job, exit_code);
            Ok(true)
        }
        Err(e) if ends_interpretation(&e) => {
            log::info!("Interpreter finished during {:?} ({})", job, e);
            Ok(false)
        }
        Err(e) => Err(e.context(format!("Failed to run {:?}", job))),
    }
}

/// `Quit` or `InterpreterExit` from the interpreter
fn ends_interpretation(error: &anyhow::Error) -> bool {
    error.downcast_ref::<GsError>().is_some_and(GsError::is_normal_exit)
}

/// Feed `reader` to the interpreter in chunks.
///
/// The stream is closed with `run_string_end` even when reading fails; the
/// read error is returned after that.
fn feed_stream<R: Read>(instance: &mut Instance, mut reader: R, user_errors: i32) -> Result<i32> {
    instance.run_string_begin(user_errors)?;

    let mut buf = vec![0u8; STDIN_CHUNK_SIZE];
    let read_error = loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Some(e),
        };
        instance.run_string_continue(&buf[..n], user_errors)?;
    };

    let exit_code = instance.run_string_end(user_errors);
    if let Some(e) = read_error {
        return Err(e).context("Failed to read standard input");
    }
    Ok(exit_code?)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();
}
