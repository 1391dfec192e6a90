//! savestate: inspect, verify and clean save files from the shell.
//!
//! - `savestate inspect FILE`: header fields plus the decoded field tree
//! - `savestate verify FILE...`: integrity check, exit 1 if any file fails
//! - `savestate clean DIR`: delete slot temp files left by interrupted writes
//!
//! Set `RUST_LOG=savestate=debug` to see storage events on stderr.

mod commands;
mod format;

use std::path::{Path, PathBuf};
use std::process;

use clap::ArgMatches;
use savestate_durability::{AtomicStore, BinaryCodec, PersistConfig, UnknownTagPolicy};
use savestate_engine::PipelineConfig;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{
    format_clean, format_error, format_inspect, format_verify, OutputMode, VerifyOutcome,
    VerifySummary,
};

/// Settings resolved from `--config` and `--magic`.
struct Settings {
    magic: [u8; 4],
    policy: UnknownTagPolicy,
    slot_extension: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    let output_mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let settings = match resolve_settings(&matches) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", format_error(&e, output_mode));
            process::exit(1);
        }
    };

    let code = match matches.subcommand() {
        Some(("inspect", sub)) => run_inspect(sub, &settings, output_mode),
        Some(("verify", sub)) => run_verify(sub, &settings, output_mode),
        Some(("clean", sub)) => run_clean(sub, &settings, output_mode),
        _ => {
            eprintln!("{}", format_error("unknown command", output_mode));
            1
        }
    };
    process::exit(code);
}

fn resolve_settings(matches: &ArgMatches) -> Result<Settings, String> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => PipelineConfig::from_file(Path::new(path)).map_err(|e| e.to_string())?,
        None => PipelineConfig::default(),
    };
    let config = match matches.get_one::<String>("magic") {
        Some(magic) => config.with_magic(magic.as_str()),
        None => config,
    };
    let magic = config.magic_bytes().map_err(|e| e.to_string())?;
    Ok(Settings {
        magic,
        policy: config.unknown_tags.into(),
        slot_extension: config.slot_extension,
    })
}

fn store_for(settings: &Settings) -> AtomicStore {
    AtomicStore::new(PersistConfig::default().with_magic(settings.magic))
}

fn run_inspect(sub: &ArgMatches, settings: &Settings, mode: OutputMode) -> i32 {
    let Some(file) = sub.get_one::<String>("file") else {
        return 1;
    };
    let path = Path::new(file);
    let store = store_for(settings);

    // Always preserve unknown tags here so newer files can still be looked at.
    let codec = BinaryCodec::new(UnknownTagPolicy::Preserve);
    let result = store
        .read_durable(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
            let header = store.read_header(path).map_err(|e| e.to_string())?;
            let document = codec
                .decode(&bytes, settings.magic)
                .map_err(|e| e.to_string())?;
            Ok((header, document))
        });

    match result {
        Ok((header, document)) => {
            println!("{}", format_inspect(&header, &document, mode));
            0
        }
        Err(e) => {
            eprintln!("{}", format_error(&format!("{}: {}", file, e), mode));
            1
        }
    }
}

fn run_verify(sub: &ArgMatches, settings: &Settings, mode: OutputMode) -> i32 {
    let store = store_for(settings);
    let codec = BinaryCodec::new(settings.policy);

    let outcomes: Vec<VerifyOutcome> = sub
        .get_many::<String>("files")
        .into_iter()
        .flatten()
        .map(|file| VerifyOutcome {
            file: file.clone(),
            result: verify_one(&store, &codec, settings.magic, Path::new(file)),
        })
        .collect();

    println!("{}", format_verify(&outcomes, mode));
    if outcomes.iter().all(|o| o.result.is_ok()) {
        0
    } else {
        1
    }
}

fn verify_one(
    store: &AtomicStore,
    codec: &BinaryCodec,
    magic: [u8; 4],
    path: &Path,
) -> Result<VerifySummary, String> {
    let bytes = store.read_durable(path).map_err(|e| e.to_string())?;
    let document = codec.decode(&bytes, magic).map_err(|e| e.to_string())?;
    tracing::debug!(
        target: "savestate::cli",
        path = %path.display(),
        schema_version = document.schema_version(),
        "Verified"
    );
    Ok(VerifySummary {
        schema_version: document.schema_version(),
        fields: document.len(),
        opaque_fields: document
            .fields()
            .values()
            .filter(|v| v.contains_opaque())
            .count(),
    })
}

fn run_clean(sub: &ArgMatches, settings: &Settings, mode: OutputMode) -> i32 {
    let Some(dir) = sub.get_one::<String>("dir") else {
        return 1;
    };
    let suffix = sub
        .get_one::<String>("suffix")
        .map(String::as_str)
        .unwrap_or(".tmp");
    let extension = sub
        .get_one::<String>("extension")
        .map(String::as_str)
        .unwrap_or(settings.slot_extension.as_str());

    let config = PersistConfig::default()
        .with_magic(settings.magic)
        .with_temp_suffix(suffix);
    if let Err(e) = config.validate() {
        eprintln!("{}", format_error(&e.to_string(), mode));
        return 1;
    }

    match AtomicStore::new(config).cleanup_orphans(&PathBuf::from(dir), extension) {
        Ok(removed) => {
            println!("{}", format_clean(&removed, mode));
            0
        }
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string(), mode));
            1
        }
    }
}
