use clap::Parser;
use qsub_runner::{
    command::{CommandLine, Value},
    config::{ConfigErrors, RunnerConfig},
    dispatcher::{DispatchError, Dispatcher},
    environment::Environment,
    executors::{MpiExecutor, PbsExecutor},
    locator::{Locator, Toolkit},
    resources::ResourceRequest,
};
use std::{path::PathBuf, process::exit};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Run a command over a stream of lines, thread parallel or through MPI, optionally as a PBS job
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// input file
    #[arg(long, default_value = "-", value_name = "FILE")]
    input: String,
    /// output file
    #[arg(long, default_value = "-", value_name = "FILE")]
    output: String,
    /// log file for stderr
    #[arg(long, value_name = "FILE")]
    logfile: Option<PathBuf>,
    /// command to run
    #[arg(long, value_name = "COMMAND")]
    command: String,

    /// maximum memory in GB [default: 4]
    #[arg(long, value_name = "MALLOC")]
    max_malloc: Option<f64>,
    /// toolkit directory
    #[arg(long, value_name = "DIRECTORY")]
    cicada_dir: Option<PathBuf>,
    /// MPI directory, if different from the standard location
    #[arg(long, value_name = "DIRECTORY")]
    mpi_dir: Option<PathBuf>,

    /// # of threads for thread-based parallel processing [default: 1]
    #[arg(long)]
    threads: Option<u32>,
    /// # of processes for MPI-based parallel processing. Identical to --np for mpirun
    #[arg(long)]
    mpi: Option<u32>,
    /// list of hosts to run job. Identical to --host for mpirun
    #[arg(long, value_name = "HOSTS")]
    mpi_host: Option<String>,
    /// host list file to run job. Identical to --hostfile for mpirun
    #[arg(long, value_name = "FILE")]
    mpi_host_file: Option<PathBuf>,
    /// additional MPI options
    #[arg(long, value_name = "OPTION", allow_hyphen_values = true)]
    mpi_options: Option<String>,

    /// PBS for launching processes
    #[arg(long)]
    pbs: bool,
    /// PBS process name (up to 15 characters!) [default: cicada-pipe]
    #[arg(long, value_name = "NAME")]
    pbs_name: Option<String>,
    /// PBS queue for launching processes
    #[arg(long, value_name = "NAME")]
    pbs_queue: Option<String>,

    /// YAML file with defaults for the options above
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// debug level
    #[arg(long, default_value_t = 0)]
    debug: u8,
}

impl Cli {
    /// explicit flags override the configuration file
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(ref dir) = self.cicada_dir {
            config.toolkit_dir = Some(dir.clone());
        }
        if let Some(threads) = self.threads {
            config.resources.threads = threads;
        }
        if let Some(max_malloc) = self.max_malloc {
            config.resources.max_malloc = max_malloc;
        }
        if let Some(ref logfile) = self.logfile {
            config.resources.logfile = Some(logfile.clone());
        }
        if let Some(ref dir) = self.mpi_dir {
            config.mpi.dir = Some(dir.clone());
        }
        if let Some(processes) = self.mpi {
            config.mpi.processes = processes;
        }
        if let Some(ref hosts) = self.mpi_host {
            config.mpi.hosts = Some(hosts.clone());
        }
        if let Some(ref hosts_file) = self.mpi_host_file {
            config.mpi.hosts_file = Some(hosts_file.clone());
        }
        if let Some(ref options) = self.mpi_options {
            config.mpi.options = options.clone();
        }
        if self.pbs {
            config.pbs.enabled = true;
        }
        if let Some(ref name) = self.pbs_name {
            config.pbs.name = name.clone();
        }
        if let Some(ref queue) = self.pbs_queue {
            config.pbs.queue = Some(queue.clone());
        }
    }
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, ConfigErrors> {
    let mut config = match cli.config {
        Some(ref path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };
    cli.apply(&mut config);

    if cli.command.trim().is_empty() {
        error!("no command?");
        return Err(ConfigErrors::FailedPreflight);
    }

    config.preflight_checks()?;

    Ok(config)
}

fn run(cli: &Cli) -> Result<(), DispatchError> {
    let config = load_config(cli)?;
    let locator = Locator::from_env();
    let environment = Environment::capture();

    let toolkit = Toolkit::locate(config.toolkit_dir.as_deref(), &locator)?;
    debug!(toolkit = ?toolkit, "Resolved toolkit launchers");

    let mpi = if config.mpi.is_requested() {
        Some(MpiExecutor::load(&config.mpi, &locator, environment.clone())?)
    } else {
        None
    };

    let pbs = if config.pbs.enabled {
        Some(PbsExecutor::load(
            config.pbs.queue.clone(),
            &locator,
            environment,
        )?)
    } else {
        None
    };

    let mut request = ResourceRequest::new(config.pbs.name.as_str())
        .threads(config.resources.threads)
        .memory(config.resources.max_malloc);
    request.log_path = config.resources.logfile.clone();

    let mut dispatcher = Dispatcher::new(mpi, pbs);

    if dispatcher.mpi().is_some() {
        let command = CommandLine::new(toolkit.mpipe.display())
            .option("--input", cli.input.as_str())
            .option("--output", cli.output.as_str())
            .option("--command", Value::quoted(&cli.command));

        dispatcher.mpirun(&command, &request)
    } else {
        let command = CommandLine::new(toolkit.thrpe.display())
            .option("--input", cli.input.as_str())
            .option("--output", cli.output.as_str())
            .option("--command", Value::quoted(&cli.command))
            .option("--threads", config.resources.threads);

        dispatcher.run(&command, &request)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(&cli) {
        Ok(()) => info!("Done with processing"),
        Err(error) => {
            error!("{error}");

            if !error.is_job_failure() {
                eprintln!("qsub-pipe: {error}");
            }

            exit(error.exit_code())
        }
    }
}
