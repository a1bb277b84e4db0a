use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info};
use serde::Serialize;

use capture_ingest::logging::{init_logging, LogFormat};
use capture_ingest::{load_config, Config, IngestService, JobPayload, UploadMeta};

const USAGE: &str = "\
Usage: capture-ingest [--config FILE] <command>

Commands:
  run                                  Process queued uploads until Ctrl-C
  enqueue <recording-id> <file>        Queue an upload and wait for it
          [--machine M] [--os O] [--original-filename NAME]
  status <job-id>                      Show a job
  jobs                                 List known jobs
  list                                 List stored recordings, newest first
  show <recording-id>                  Show a stored recording
  cleanup                              Trim job history";

/// Upper bound for `enqueue` waiting on its own job.
const FOREGROUND_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, PartialEq)]
enum Command {
    Run,
    Enqueue {
        recording_id: String,
        file: PathBuf,
        machine: Option<String>,
        os: Option<String>,
        original_filename: Option<String>,
    },
    Status(String),
    Jobs,
    List,
    Show(String),
    Cleanup,
}

#[derive(Debug, PartialEq)]
struct Cli {
    config: Option<PathBuf>,
    command: Command,
}

impl Cli {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let mut config = None;
        let mut machine = None;
        let mut os = None;
        let mut original_filename = None;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value_for = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("{} requires a value", flag))
            };
            match arg.as_str() {
                "--config" | "-c" => config = Some(PathBuf::from(value_for(&arg)?)),
                "--machine" => machine = Some(value_for(&arg)?),
                "--os" => os = Some(value_for(&arg)?),
                "--original-filename" => original_filename = Some(value_for(&arg)?),
                flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let name = positional.next().ok_or("missing command")?;
        let mut required = |what: &str| {
            positional
                .next()
                .ok_or_else(|| format!("{} requires <{}>", name, what))
        };

        let command = match name.as_str() {
            "run" => Command::Run,
            "enqueue" => Command::Enqueue {
                recording_id: required("recording-id")?,
                file: PathBuf::from(required("file")?),
                machine,
                os,
                original_filename,
            },
            "status" => Command::Status(required("job-id")?),
            "jobs" => Command::Jobs,
            "list" => Command::List,
            "show" => Command::Show(required("recording-id")?),
            "cleanup" => Command::Cleanup,
            other => return Err(format!("unknown command '{}'", other)),
        };

        if let Some(extra) = positional.next() {
            return Err(format!("unexpected argument '{}'", extra));
        }

        Ok(Self { config, command })
    }
}

fn main() -> ExitCode {
    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("error: {}\n\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(LogFormat::from_env()) {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let service = IngestService::open(&config)?;

    match cli.command {
        Command::Run => {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            ctrlc::set_handler(move || {
                let _ = stop_tx.try_send(());
            })?;

            service.scheduler.start()?;
            info!(
                "Processing uploads from {} (Ctrl-C to stop)",
                config.data_directory()?.display()
            );
            let _ = stop_rx.recv();

            service.scheduler.shutdown();
            service.scheduler.wait();
            Ok(ExitCode::SUCCESS)
        }
        Command::Enqueue {
            recording_id,
            file,
            machine,
            os,
            original_filename,
        } => {
            let mut payload = JobPayload::new(recording_id, file).with_upload_meta(UploadMeta {
                machine,
                os,
                ..UploadMeta::default()
            });
            if let Some(name) = original_filename {
                payload = payload.with_original_filename(name);
            }

            service.scheduler.start()?;
            let job_id = service.scheduler.enqueue(payload)?;
            let job = service
                .scheduler
                .wait_for_terminal(&job_id, FOREGROUND_TIMEOUT);
            service.scheduler.shutdown();
            service.scheduler.wait();

            match job {
                Some(job) => {
                    print_json(&job)?;
                    Ok(if job.status == capture_ingest::JobStatus::Completed {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                None => Err(format!("job {} disappeared from the queue", job_id).into()),
            }
        }
        Command::Status(job_id) => match service.scheduler.get_status(&job_id) {
            Some(job) => {
                print_json(&job)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("no job with id {}", job_id);
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Jobs => {
            print_json(&service.scheduler.jobs())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            print_json(&service.store.list()?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show(recording_id) => match service.store.get(&recording_id)? {
            Some(assets) => {
                print_json(&assets)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("no recording with id {}", recording_id);
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Cleanup => {
            let removed = service.scheduler.cleanup()?;
            print_json(&serde_json::json!({ "removed": removed }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
