//! # cpuprof - Main Entry Point
//!
//! Three subcommands:
//! - **record** (`cpuprof record <PROCESS>` or `--pid <PID>`): sample a live process, write pprof
//! - **addr2func** (`--path ELF --addr A`): resolve one address with the symbol table
//! - **report** (`cpuprof report cpu.pprof`): print the top functions of a profile

// Time conversions lose precision for display
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use aya::maps::{HashMap, StackTraceMap};
use clap::Parser;
use cpuprof_common::{StackCountKey, COUNTS_MAP, STACK_TRACES_MAP};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cpuprof::analysis::{analyze_hotspots, total_samples, FunctionHotspot};
use cpuprof::cli::{Addr2FuncArgs, Args, Command, RecordArgs, ReportArgs};
use cpuprof::domain::Pid;
use cpuprof::export::{encode_profile, read_profile, write_profile};
use cpuprof::preflight::{check_proc_access, check_process_exists, run_preflight_checks};
use cpuprof::process_lookup::{find_process_by_name, resolve_exe_path};
use cpuprof::profiling::{
    attach_sampler, build_profile, init_ebpf_logger, load_ebpf_program, raise_memlock_rlimit,
    CaptureDiagnostics, ProfileMeta,
};
use cpuprof::symbolization::{parse_memory_maps, symbolize_profile, SymbolResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Record(record_args) => record(&record_args),
        Command::Addr2func(addr_args) => addr2func(&addr_args),
        Command::Report(report_args) => report(&report_args),
    }
}

/// Resolve PID and binary path from CLI arguments.
///
/// Supports three modes:
/// - `cpuprof record my-app` - find process by name, auto-detect binary
/// - `cpuprof record --pid 1234` - explicit PID, auto-detect binary from /proc
/// - `cpuprof record --pid 1234 --target ./app` - explicit PID and binary
fn resolve_pid_and_target(args: &RecordArgs) -> Result<(Pid, String)> {
    // Mode A: Process name provided - auto-detect both
    if let Some(ref name) = args.process {
        if args.pid.is_some() || args.target.is_some() {
            anyhow::bail!(
                "Cannot use PROCESS argument with --pid or --target.\n\n\
                 Use either:\n  \
                 cpuprof record my-app              (auto-detect)\n  \
                 cpuprof record --pid 1234          (explicit PID)"
            );
        }
        let info = find_process_by_name(name)?;
        let target = info.exe_path.to_string_lossy().into_owned();
        return Ok((info.pid, target));
    }

    // Mode B: Explicit PID provided
    if let Some(pid) = args.pid {
        let pid = Pid(pid);
        let target = if let Some(ref t) = args.target {
            std::fs::canonicalize(t)
                .with_context(|| format!("Failed to resolve path: {t}"))?
                .to_string_lossy()
                .into_owned()
        } else {
            resolve_exe_path(pid)?.to_string_lossy().into_owned()
        };
        return Ok((pid, target));
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         cpuprof record my-app              Auto-detect PID and binary\n  \
         cpuprof record --pid 1234          Explicit PID, auto-detect binary\n\n\
         Run 'cpuprof record --help' for more options"
    )
}

#[tokio::main]
async fn record(args: &RecordArgs) -> Result<()> {
    let quiet = args.quiet;

    let (pid, target_path) = resolve_pid_and_target(args)?;

    // Run pre-flight checks before anything else
    run_preflight_checks(&target_path, quiet)?;
    check_process_exists(pid)?;
    check_proc_access(pid)?;

    if !quiet {
        println!("cpuprof v{}", env!("CARGO_PKG_VERSION"));
        println!("target: {target_path}");
        println!("pid: {}", pid.0);
    }

    // Mappings are read once up front; later dlopen()s are unmapped addresses
    let mappings = parse_memory_maps(pid)?;
    if !mappings.iter().any(|m| m.is_backed_by(Path::new(&target_path))) {
        warn!("{target_path} has no executable mapping in {pid}, its frames stay unsymbolized");
    }
    if !quiet {
        for m in &mappings {
            println!("  {:#x}-{:#x} {:#x} {}", m.start, m.limit, m.offset, m.file);
        }
    }

    // ── Load eBPF and start sampling ────────────────────────────────────
    raise_memlock_rlimit();
    let mut bpf = load_ebpf_program()?;
    init_ebpf_logger(&mut bpf);

    let cpu_count = attach_sampler(&mut bpf, pid, args.frequency)?;
    if !quiet {
        println!("sampling: {} Hz on {cpu_count} CPUs for {}s", args.frequency, args.duration);
    }

    let time_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX));
    let profiling_start = Instant::now();
    let duration_limit = Duration::from_secs(args.duration);
    let proc_path = format!("/proc/{}", pid.0);

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit_reason = loop {
        if profiling_start.elapsed() >= duration_limit {
            break "duration limit reached";
        }
        if !Path::new(&proc_path).exists() {
            break "process exited";
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = &mut ctrl_c => break "interrupted",
        }
    };
    let elapsed = profiling_start.elapsed();
    info!("Stopped sampling: {exit_reason} after {:.1}s", elapsed.as_secs_f64());

    // ── Read the sampler's maps and assemble ────────────────────────────
    let counts: HashMap<_, StackCountKey, u64> = HashMap::try_from(
        bpf.take_map(COUNTS_MAP).with_context(|| format!("{COUNTS_MAP} map not found"))?,
    )?;
    let stack_traces = StackTraceMap::try_from(
        bpf.take_map(STACK_TRACES_MAP)
            .with_context(|| format!("{STACK_TRACES_MAP} map not found"))?,
    )?;

    if !quiet {
        CaptureDiagnostics::collect(&counts).print();
    }

    let meta = ProfileMeta::cpu(time_nanos, elapsed, args.frequency);
    let (mut profile, assembly) = build_profile(&counts, &stack_traces, mappings, meta);
    info!(
        "Assembled {} samples from {} stacks ({} skipped, {} warnings)",
        assembly.samples_emitted,
        assembly.keys_seen,
        assembly.keys_skipped(),
        assembly.warnings.len()
    );

    if !args.no_symbolize {
        if let Err(e) = symbolize_profile(&mut profile, Path::new(&target_path)) {
            warn!("Not symbolizing {target_path}: {e}");
        }
    }

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    write_profile(&profile, &mut writer).context("Failed to write profile")?;
    writer.flush()?;

    if !quiet {
        eprintln!(
            "\n{exit_reason}: {:.1}s, {} samples in {} stacks",
            elapsed.as_secs_f64(),
            profile.total_samples(),
            profile.samples.len()
        );
        if args.top > 0 {
            let encoded = encode_profile(&profile);
            print_hotspots(&analyze_hotspots(&encoded, args.top), total_samples(&encoded));
        }
        println!("saved: {}", args.output.display());
    }

    Ok(())
}

fn addr2func(args: &Addr2FuncArgs) -> Result<()> {
    let resolver = SymbolResolver::open(&args.path, args.file_offset, args.memory_start)
        .with_context(|| format!("Cannot symbolize {}", args.path.display()))?;
    debug!("{:?}", resolver.placement());
    println!("{}", resolver.resolve(args.addr));
    Ok(())
}

fn report(args: &ReportArgs) -> Result<()> {
    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let profile = read_profile(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    print_hotspots(&analyze_hotspots(&profile, args.top), total_samples(&profile));
    Ok(())
}

fn print_hotspots(hotspots: &[FunctionHotspot], total: i64) {
    println!("total samples: {total}");
    if hotspots.is_empty() {
        return;
    }
    println!("{:>10} {:>6} {:>10}  function", "flat", "flat%", "cum");
    for h in hotspots {
        println!("{:>10} {:>5.1}% {:>10}  {}", h.flat, h.percentage, h.cumulative, h.name);
    }
}
