//! Native Data Inspector
//!
//! Reads the PS2 native-data section of a geometry and reports, per mesh,
//! the buffer size, its stored fix-up state and how much of it the DMA tag
//! chain accounts for. Each unfixed chain is then fixed against a synthetic
//! base address and walked, which validates every `ref` tag.
//!
//! Usage: native_data_inspect <FILE> --meshes <N> [--base <ADDR>] [--rewrite <OUT>]

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use ps2_native::chunk::{find_chunk, ID_NATIVEDATA};
use ps2_native::prelude::*;

const DEFAULT_BASE: &str = "0x00100000";

#[derive(Debug)]
struct InspectOptions {
    input: PathBuf,
    meshes: usize,
    offset: u64,
    base: DmaAddress,
    config: Option<PathBuf>,
    rewrite: Option<PathBuf>,
}

fn parse_address(text: &str) -> Result<u32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid address: {text}"))
}

fn parse_args() -> Result<(InspectOptions, bool)> {
    let matches = Command::new("native_data_inspect")
        .about("Inspects and validates PS2 native instance data")
        .arg(Arg::new("file").value_name("FILE").required(true).help("Stream containing the native data"))
        .arg(
            Arg::new("meshes")
                .short('m')
                .long("meshes")
                .value_name("N")
                .required(true)
                .help("Mesh count from the geometry's mesh header"),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .value_name("BYTES")
                .default_value("0")
                .help("Where to start searching for the native-data chunk"),
        )
        .arg(
            Arg::new("base")
                .short('b')
                .long("base")
                .value_name("ADDR")
                .default_value(DEFAULT_BASE)
                .help("Synthetic DMA base address used to validate chains"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Native-data settings (.toml or .ron)"),
        )
        .arg(
            Arg::new("rewrite")
                .short('o')
                .long("rewrite")
                .value_name("OUT")
                .help("Write the validated native data back out"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log every tag decision"),
        )
        .get_matches();

    let text = |name: &str| matches.get_one::<String>(name).cloned();
    let options = InspectOptions {
        input: text("file").map(PathBuf::from).context("missing input file")?,
        meshes: text("meshes")
            .context("missing mesh count")?
            .parse()
            .context("mesh count must be a number")?,
        offset: text("offset")
            .unwrap_or_default()
            .parse()
            .context("offset must be a number")?,
        base: parse_address(&text("base").unwrap_or_else(|| DEFAULT_BASE.to_string()))?,
        config: text("config").map(PathBuf::from),
        rewrite: text("rewrite").map(PathBuf::from),
    };
    Ok((options, matches.get_flag("verbose")))
}

/// Report one mesh; returns whether its chain walked to the terminator
fn inspect_mesh(index: usize, mesh: &mut InstanceBuffer, base: DmaAddress) -> bool {
    println!("Mesh {index}: {} bytes, {:?}", mesh.len(), mesh.state());

    match chain_extent(mesh) {
        Ok(extent) => println!(
            "   Chain:  {} bytes of tags, {} bytes used, {} trailing",
            extent.chain_len,
            extent.used(),
            extent.trailing()
        ),
        Err(e) => println!("   Chain:  unreadable ({e})"),
    }

    match fix(mesh, base) {
        Ok(FixOutcome::Relocated { references }) => {
            println!("   Fixed:  {references} ref tags at base {base:#010x}");
        }
        Ok(FixOutcome::Skipped) => {}
        Err(e) => {
            println!("   Fixed:  failed ({e})");
            return false;
        }
    }

    let walked = walk(mesh);
    match walked.end {
        WalkEnd::Terminated => println!(
            "   Walk:   {} fragments, {} payload bytes",
            walked.fragments.len(),
            walked.payload_len()
        ),
        WalkEnd::NotFixed => println!("   Walk:   skipped ({:?})", mesh.state()),
        WalkEnd::Faulted(e) => {
            println!("   Walk:   faulted after {} fragments ({e})", walked.fragments.len());
            return false;
        }
    }
    true
}

fn run(options: &InspectOptions) -> Result<()> {
    let config = match &options.config {
        Some(path) => NativeDataConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => NativeDataConfig::default(),
    };
    let codec = NativeDataCodec::new(config);

    let file = File::open(&options.input)
        .with_context(|| format!("failed to open {}", options.input.display()))?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(options.offset))?;

    // Accept either a whole native-data chunk or its bare struct
    match find_chunk(&mut reader, ID_NATIVEDATA)? {
        Some(chunk) => log::debug!("Native-data chunk: {} bytes, version {:#010x}", chunk.length, chunk.version),
        None => {
            reader.seek(SeekFrom::Start(options.offset))?;
        }
    }

    let mut header = codec
        .read(&mut reader, options.meshes)
        .with_context(|| format!("failed to read native data from {}", options.input.display()))?;

    println!("Native data: {} meshes, {} bytes", header.mesh_count(), header.computed_size());
    let mut faulted = 0;
    for (index, mesh) in header.meshes_mut().iter_mut().enumerate() {
        if !inspect_mesh(index, mesh, options.base) {
            faulted += 1;
        }
    }
    if faulted > 0 {
        bail!("{faulted} of {} meshes have broken DMA chains", header.mesh_count());
    }

    if let Some(out) = &options.rewrite {
        let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
        let mut writer = BufWriter::new(file);
        codec.write(&mut writer, &mut header)?;
        writer.flush()?;
        println!("Rewrote {} bytes to {}", header.computed_size(), out.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let (options, verbose) = parse_args()?;
    ps2_native::logging::init_with_filter(if verbose { "trace" } else { "warn" });
    log::debug!("{options:?}");
    run(&options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x00100000").unwrap(), 0x0010_0000);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
    }
}
