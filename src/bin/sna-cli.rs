//! sna-cli - Command-line inspector for OpenSpace snapshots
//!
//! Lists blocks and relocation tables, resolves single pointers, checks a
//! level's pointer graph and dumps block payloads.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use opensna::{
    open_container_with, open_level, open_relocation_table, EntryWidth, FormatProfile,
    RelocationTable, Resolver, XorMask,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "sna-cli")]
#[command(about = "Inspect OpenSpace SNA snapshots and relocation tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stream cipher the files are masked with
    #[arg(short, long, value_enum, default_value_t = CliCipher::None, global = true)]
    cipher: CliCipher,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the blocks of a container
    Info {
        /// Container file (.sna)
        input: PathBuf,
    },

    /// Show the lists of a relocation table
    Relocations {
        /// Relocation file (.rtb, .rtp, .rtt)
        input: PathBuf,

        /// Bytes per pointer record
        #[arg(short, long, default_value_t = 6)]
        entry_width: u8,

        /// Lists are stored without payload headers
        #[arg(long)]
        raw: bool,

        /// Try every known layout instead of the given one
        #[arg(long)]
        probe: bool,
    },

    /// Resolve the pointer stored at an address
    Resolve {
        /// Container file (.sna); the sibling .rtb is loaded too
        input: PathBuf,

        /// Source module
        module: u8,

        /// Source block id
        block_id: u8,

        /// Save-time address of the pointer (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_address)]
        address: u32,
    },

    /// Verify that every relocation entry of a level resolves
    Check {
        /// Container file (.sna); the sibling .rtb is loaded too
        input: PathBuf,
    },

    /// Write every block payload to its own file
    Extract {
        /// Container file (.sna)
        input: PathBuf,

        /// Output directory
        output: PathBuf,

        /// Force overwrite of existing files
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CliCipher {
    /// Plain files (Montreal)
    None,
    /// Stream-seeded rotating mask
    Rotate,
    /// Stream-seeded Park-Miller mask
    ParkMiller,
}

impl CliCipher {
    fn mask(self) -> Option<XorMask> {
        match self {
            CliCipher::None => None,
            CliCipher::Rotate => Some(XorMask::rotating()),
            CliCipher::ParkMiller => Some(XorMask::park_miller()),
        }
    }
}

fn parse_address(value: &str) -> Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

fn base_profile(cipher: CliCipher) -> FormatProfile {
    FormatProfile {
        cipher: cipher.mask(),
        ..FormatProfile::montreal()
    }
}

fn main() {
    let cli = Cli::parse();
    let profile = base_profile(cli.cipher);

    let result = match cli.command {
        Commands::Info { input } => show_container_info(&input, &profile, cli.verbose),
        Commands::Relocations {
            input,
            entry_width,
            raw,
            probe,
        } => show_relocations(&input, &profile, entry_width, raw, probe, cli.verbose),
        Commands::Resolve {
            input,
            module,
            block_id,
            address,
        } => resolve_pointer(&input, &profile, module, block_id, address),
        Commands::Check { input } => check_level(&input, &profile, cli.verbose),
        Commands::Extract {
            input,
            output,
            force,
        } => extract_blocks(&input, &output, &profile, force, cli.verbose, cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn ensure_exists(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file '{}' does not exist", input.display()).into());
    }
    Ok(())
}

fn show_container_info(
    input: &Path,
    profile: &FormatProfile,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_exists(input)?;

    let start_time = Instant::now();
    let container = open_container_with(input, profile)?;
    let elapsed = start_time.elapsed();

    println!("Container Information:");
    println!("  File:       {}", input.display());
    println!("  Name:       {}", container.name());
    println!("  Blocks:     {}", container.data_blocks().count());
    println!("  Payload:    {} bytes", container.total_payload_len());
    println!("  Consumed:   {} bytes", container.consumed());
    println!(
        "  Terminator: {}",
        if container.is_terminated() {
            "present"
        } else {
            "missing"
        }
    );
    println!("  Time:       {:.2?}", elapsed);

    println!();
    println!("  module block  base        size      stored    lzo");
    for block in container.data_blocks() {
        let (stored, compressed) = block
            .header()
            .map_or((0, false), |h| (h.compressed_size, h.is_compressed));
        println!(
            "  {:>6} {:>5}  {:#010x}  {:>8}  {:>8}  {}",
            block.module(),
            block.block_id(),
            block.base(),
            block.payload().len(),
            stored,
            if compressed { "yes" } else { "no" }
        );
        if verbose {
            println!(
                "                reserved {:08x} {:08x} {:08x}, block size {}, data position {:#x}",
                block.reserved()[0],
                block.reserved()[1],
                block.reserved()[2],
                block.block_size(),
                block.data_position()
            );
        }
    }

    Ok(())
}

fn print_table(table: &RelocationTable, verbose: bool) {
    println!("  Lists:    {}", table.lists().len());
    println!("  Pointers: {}", table.pointer_count());
    for list in table.lists() {
        println!(
            "  ({}, {}): {} pointers",
            list.module,
            list.block_id,
            list.entries.len()
        );
        if verbose {
            for entry in &list.entries {
                println!(
                    "    {:#010x} -> ({}, {})",
                    entry.memory_offset, entry.target_module, entry.target_block_id
                );
            }
        }
    }
}

fn show_relocations(
    input: &Path,
    profile: &FormatProfile,
    entry_width: u8,
    raw: bool,
    probe: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_exists(input)?;

    if probe {
        println!("Probing {}:", input.display());
        let mut matched = 0;
        for candidate in FormatProfile::candidates() {
            let candidate = FormatProfile {
                cipher: profile.cipher,
                ..candidate
            };
            let layout = candidate.relocation;
            match open_relocation_table(input, &candidate) {
                Ok(table) => {
                    matched += 1;
                    println!(
                        "  ✓ {}-byte entries, payload headers {}: {} lists, {} pointers",
                        layout.entry_width.bytes(),
                        if layout.inner_compression { "on" } else { "off" },
                        table.lists().len(),
                        table.pointer_count()
                    );
                }
                Err(e) => {
                    println!(
                        "  ✗ {}-byte entries, payload headers {}",
                        layout.entry_width.bytes(),
                        if layout.inner_compression { "on" } else { "off" }
                    );
                    if verbose {
                        println!("    Error: {}", e);
                    }
                }
            }
        }
        if matched == 0 {
            return Err("No known layout parses this file".into());
        }
        return Ok(());
    }

    let profile = profile
        .with_entry_width(EntryWidth::from_u8(entry_width)?)
        .with_inner_compression(!raw);
    let table = open_relocation_table(input, &profile)?;

    println!("Relocation Table:");
    println!("  File:     {}", input.display());
    print_table(&table, verbose);
    Ok(())
}

fn resolve_pointer(
    input: &Path,
    profile: &FormatProfile,
    module: u8,
    block_id: u8,
    address: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_exists(input)?;

    let resolver = open_level(input, profile)?.into_resolver();
    match resolver.resolve(module, block_id, address)? {
        Some(ptr) => println!(
            "({}, {}) @ {:#010x} -> {:#010x} = block ({}, {}) + {:#x}",
            module,
            block_id,
            address,
            ptr.address,
            ptr.block.module(),
            ptr.block.block_id(),
            ptr.offset
        ),
        None => println!(
            "({}, {}) @ {:#010x} is not a relocated pointer",
            module, block_id, address
        ),
    }
    Ok(())
}

fn check_level(
    input: &Path,
    profile: &FormatProfile,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_exists(input)?;

    let level = open_level(input, profile)?;
    if !level.has_relocations() {
        println!("  Note: no relocation table found, nothing to check");
    }
    let resolver: Resolver = level.into_resolver();
    let report = resolver.verify();

    println!("Link Check:");
    println!("  Lists:            {}", report.lists);
    println!("  Pointers:         {}", report.pointers);
    println!("  Resolved:         {}", report.resolved);
    println!("  Missing sources:  {}", report.missing_sources.len());
    println!("  Bad sites:        {}", report.sites_out_of_bounds.len());
    println!("  Dangling targets: {}", report.dangling_targets.len());
    println!("  Bad values:       {}", report.values_out_of_bounds.len());

    if verbose {
        for (module, block_id) in &report.missing_sources {
            println!("    missing source block ({}, {})", module, block_id);
        }
        let issues = report
            .sites_out_of_bounds
            .iter()
            .chain(&report.dangling_targets)
            .chain(&report.values_out_of_bounds);
        for issue in issues {
            println!(
                "    ({}, {}) @ {:#010x} -> ({}, {})",
                issue.module,
                issue.block_id,
                issue.entry.memory_offset,
                issue.entry.target_module,
                issue.entry.target_block_id
            );
        }
    }

    if report.is_clean() {
        println!("  Status: ✓ every pointer resolves");
        Ok(())
    } else {
        Err(format!(
            "{} of {} pointers do not resolve",
            report.pointers - report.resolved,
            report.pointers
        )
        .into())
    }
}

fn block_file_name(module: u8, block_id: u8) -> String {
    format!("{:02x}_{:02x}.bin", module, block_id)
}

fn extract_blocks(
    input: &Path,
    output: &Path,
    profile: &FormatProfile,
    force: bool,
    verbose: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_exists(input)?;

    let container = open_container_with(input, profile)?;
    fs::create_dir_all(output)?;

    let blocks: Vec<_> = container.data_blocks().collect();
    let progress = if !quiet {
        let pb = ProgressBar::new(blocks.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
        );
        pb.set_message("Extracting...");
        Some(pb)
    } else {
        None
    };

    let mut written = 0usize;
    for block in &blocks {
        let path = output.join(block_file_name(block.module(), block.block_id()));
        if path.exists() && !force {
            return Err(format!(
                "Output file '{}' already exists. Use --force to overwrite",
                path.display()
            )
            .into());
        }
        fs::write(&path, block.payload())?;
        written += block.payload().len();

        if verbose {
            if let Some(ref pb) = progress {
                pb.println(format!("{} ({} bytes)", path.display(), block.payload().len()));
            }
        }
        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(ref pb) = progress {
        pb.finish_with_message("Extraction complete");
    }

    if !quiet {
        println!("✓ Extracted {} blocks ({} bytes)", blocks.len(), written);
    }

    Ok(())
}
