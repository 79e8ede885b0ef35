use std::{path::PathBuf, process::ExitCode, sync::mpsc};

use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use tokio::runtime::Handle;
use tracing::{error, info, span, Level};
use tracing_subscriber::EnvFilter;

mod adapters;
mod archive;
mod connection;
mod download;
mod lister;
mod model;
mod util;

enum JobEvent {
    Progress(String),
    Complete,
    Failed(model::error::ObjectError),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let matches = cli().get_matches();

    let runtime = match tokio::runtime::Runtime::new() {
        Err(err) => {
            error!(error_message = %err, error_group = "runtime");
            return ExitCode::FAILURE;
        }
        Ok(runtime) => runtime,
    };

    match run(&matches, runtime.handle()) {
        Err(err) => {
            eprintln!("error: {}", err);
            if let Some(hint) = err.hint() {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

fn cli() -> Command {
    clap::command!()
        .subcommand_required(true)
        .arg(
            Arg::new("BUCKET")
                .help("Bucket name or s3://bucket/prefix")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("access-key")
                .long("access-key")
                .env("AWS_ACCESS_KEY_ID"),
        )
        .arg(
            Arg::new("secret-key")
                .long("secret-key")
                .env("AWS_SECRET_ACCESS_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .env("AWS_REGION")
                .default_value("us-east-1"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .help("Only keys starting with this prefix; blank means the whole bucket"),
        )
        .arg(
            Arg::new("endpoint-url")
                .long("endpoint-url")
                .env("AWS_ENDPOINT_URL")
                .help("Endpoint of an S3-compatible store"),
        )
        .subcommand(Command::new("list").about("List every object, sorted by key"))
        .subcommand(
            Command::new("download")
                .about("Download objects as files or as one zip archive")
                .arg(Arg::new("KEYS").num_args(0..).index(1))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Download every listed object"),
                )
                .arg(
                    Arg::new("index")
                        .long("index")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(usize))
                        .help("1-based position in the `list` output"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_parser(value_parser!(PathBuf))
                        .help("Destination folder for individual files"),
                )
                .arg(
                    Arg::new("zip")
                        .long("zip")
                        .value_parser(value_parser!(PathBuf))
                        .help("Bundle the objects into this zip file"),
                )
                .group(
                    ArgGroup::new("destination")
                        .args(["dest", "zip"])
                        .required(true),
                ),
        )
}

fn arg<'a>(matches: &'a ArgMatches, id: &str) -> Option<&'a str> {
    matches.get_one::<String>(id).map(String::as_str)
}

fn run(matches: &ArgMatches, handle: &Handle) -> Result<(), model::error::ObjectError> {
    let (bucket, uri_prefix) = util::object::parse_bucket_uri(arg(matches, "BUCKET").unwrap_or(""))?;
    let prefix = arg(matches, "prefix").map(str::to_string).or(uri_prefix);

    let connector = adapters::s3::S3Connector {
        handle: handle.clone(),
        endpoint_url: arg(matches, "endpoint-url").map(str::to_string),
    };

    let mut state = connection::ConnectionState::new();
    state.connect(
        &connector,
        arg(matches, "access-key").unwrap_or(""),
        arg(matches, "secret-key").unwrap_or(""),
        arg(matches, "region").unwrap_or(""),
        &bucket,
        prefix.as_deref(),
    )?;
    info!(connected = state.is_connected(), bucket = %state.bucket(), "ready");

    let res = match matches.subcommand() {
        Some(("list", _)) => list(&state),
        Some(("download", sub)) => download(&state, sub),
        _ => Ok(()),
    };

    state.disconnect();
    res
}

fn list(state: &connection::ConnectionState) -> Result<(), model::error::ObjectError> {
    let objects = lister::list_objects(state)?;

    for (i, o) in objects.iter().enumerate() {
        println!(
            "{:>6}  {:<60}  {:>10}  {}",
            i + 1,
            o.key,
            util::object::format_file_size(o.size),
            util::object::format_modified_time(o.modified_time)
        );
    }

    match state.prefix_filter() {
        Some(prefix) => println!("Found {} files under {}", objects.len(), prefix),
        None => println!("Found {} files", objects.len()),
    }

    Ok(())
}

fn download(
    state: &connection::ConnectionState,
    matches: &ArgMatches,
) -> Result<(), model::error::ObjectError> {
    let mut keys: Vec<String> = matches
        .get_many::<String>("KEYS")
        .map(|keys| keys.cloned().collect())
        .unwrap_or_default();

    let all = matches.get_flag("all");
    let indices: Vec<usize> = matches
        .get_many::<usize>("index")
        .map(|indices| indices.copied().collect())
        .unwrap_or_default();

    if all || !indices.is_empty() {
        let objects = lister::list_objects(state)?;
        if all {
            keys.extend(objects.iter().map(|o| o.key.clone()));
        }
        for index in indices {
            let object = index
                .checked_sub(1)
                .and_then(|i| objects.get(i))
                .ok_or(model::error::ObjectError::InvalidArgument("index"))?;
            keys.push(object.key.clone());
        }
    }

    if keys.is_empty() {
        return Err(model::error::ObjectError::InvalidArgument("keys"));
    }

    let (destination, mode) = match (
        matches.get_one::<PathBuf>("zip"),
        matches.get_one::<PathBuf>("dest"),
    ) {
        (Some(zip), _) => (zip.clone(), model::object::DownloadMode::Archive),
        (None, Some(dest)) => (dest.clone(), model::object::DownloadMode::Individual),
        (None, None) => return Err(model::error::ObjectError::InvalidArgument("destination")),
    };

    let job = model::object::DownloadJob {
        keys,
        destination,
        mode,
    };

    let (tx, rx) = mpsc::channel();
    let (progress, complete, failed) = (tx.clone(), tx.clone(), tx);
    let callbacks = download::JobCallbacks {
        on_progress: Box::new(move |msg: String| {
            let _ = progress.send(JobEvent::Progress(msg));
        }),
        on_complete: Box::new(move || {
            let _ = complete.send(JobEvent::Complete);
        }),
        on_error: Box::new(move |err: model::error::ObjectError| {
            let _ = failed.send(JobEvent::Failed(err));
        }),
    };

    let orchestrator = download::Orchestrator::new(
        Box::new(download::ThreadScheduler),
        archive::ArchiveBuilder::default(),
    );
    orchestrator.run_job(state, job, callbacks);

    // callbacks arrive on the job thread; print them from here
    loop {
        match rx.recv() {
            Ok(JobEvent::Progress(msg)) => println!("{}", msg),
            Ok(JobEvent::Complete) => {
                println!("Download completed successfully!");
                return Ok(());
            }
            Ok(JobEvent::Failed(err)) => return Err(err),
            Err(_) => {
                return Err(model::error::ObjectError::Backend(
                    "download job ended without reporting a result".to_string(),
                ));
            }
        }
    }
}
