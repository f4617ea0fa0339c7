use anyhow::{bail, Context, Result};
use framehist::{
    insert_frame, load_frame, logging, parse_histogram_column, Column, DeviceHandle, KernelConfig,
    OpRegistry, Settings, HISTOGRAM_OP,
};
use std::path::PathBuf;

const USAGE: &str = "usage: framehist [--debug] [--serial] [--json] [--config FILE] [--out FILE] IMAGE...";

#[derive(Debug, Default)]
struct CliArgs {
    debug: bool,
    serial: bool,
    json: bool,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    inputs: Vec<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" => parsed.debug = true,
            "--serial" => parsed.serial = true,
            "--json" => parsed.json = true,
            "--config" => parsed.config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--out" => parsed.out = Some(PathBuf::from(args.next().context("--out needs a path")?)),
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
            _ => parsed.inputs.push(PathBuf::from(&arg)),
        }
    }

    if parsed.inputs.is_empty() {
        bail!(USAGE);
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?,
        None => Settings::load(),
    };
    if args.serial {
        settings.parallel_frames = false;
    }
    logging::init_tracing(args.debug || settings.debug_logging);

    let registry = OpRegistry::with_builtin_ops()?;
    let config = KernelConfig::new(vec![DeviceHandle::cpu(0)], settings);
    let mut kernel = registry.instantiate(HISTOGRAM_OP, &config)?;

    let mut frames = Column::new();
    for path in &args.inputs {
        let frame = load_frame(path).map_err(|e| {
            e.log_and_report();
            e
        })?;
        insert_frame(&mut frames, frame);
    }

    let inputs = vec![frames];
    let mut outputs = vec![Column::new()];
    kernel.execute(&inputs, &mut outputs).map_err(|e| {
        e.log_and_report();
        e
    })?;

    let records = parse_histogram_column(&outputs[0])?;

    if args.json {
        let rows: Vec<_> = args
            .inputs
            .iter()
            .zip(records.iter())
            .map(|(path, record)| serde_json::json!({ "path": path.display().to_string(), "histogram": record }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (path, record) in args.inputs.iter().zip(records.iter()) {
            println!("{}", path.display());
            for (name, bins) in ["r", "g", "b"].iter().zip(record.channels().iter()) {
                let counts: Vec<String> = bins.iter().map(|c| c.to_string()).collect();
                println!("  {}: {}", name, counts.join(" "));
            }
        }
    }

    if let Some(out) = &args.out {
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
        std::fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
        tracing::info!(path = %out.display(), records = records.len(), "wrote histogram records");
    }

    Ok(())
}
