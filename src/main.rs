use clap::{Parser, Subcommand};
use paperback::compression::CompressionLevel;
use paperback::config::{DecodeConfig, EncodeConfig, Margins};
use paperback::decode::{DecodeState, StepOutcome as DecodeOutcome};
use paperback::encode::{EncodeState, StepOutcome as EncodeOutcome};
use paperback::{bitmap, GrayBitmap};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "paperback", version = "1.0.0", about = "High-density paper backup: encode a file to printable pages and recover it from scans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a file into one or more 8-bpp grayscale BMP pages
    Encode {
        input: PathBuf,
        /// Output path prefix; pages are written as `<prefix>_pNNN.bmp`
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "200")]
        dpi: u32,
        #[arg(long, default_value = "70")]
        dotpercent: u32,
        /// Data blocks per XOR recovery block, [2,10]
        #[arg(short, long, default_value = "5")]
        redundancy: u32,
        /// 0=none, 1=fast, 2=max
        #[arg(short, long, default_value = "1")]
        compression: u8,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(long)]
        printheader: bool,
        #[arg(long)]
        printborder: bool,
    },
    /// Decode a file back from its scanned BMP pages
    Decode {
        /// Scanned page images, in any order
        #[arg(required = true, num_args = 1..)]
        pages: Vec<PathBuf>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(long, default_value = "200")]
        dpi_hint: u32,
        #[arg(short, long)]
        password: Option<String>,
        /// Enable the two-pass grid-lock search (`M_BEST`)
        #[arg(long)]
        best_quality: bool,
        /// Print per-page block statistics
        #[arg(long)]
        verbose: bool,
    },
    /// Show the first superblock found on a scanned page
    Info {
        page: PathBuf,
        #[arg(long, default_value = "200")]
        dpi_hint: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Encode {
            input,
            output,
            dpi,
            dotpercent,
            redundancy,
            compression,
            password,
            printheader,
            printborder,
        } => run_encode(
            &input, &output, dpi, dotpercent, redundancy, compression, password, printheader, printborder,
        )?,

        Commands::Decode {
            pages,
            output_dir,
            dpi_hint,
            password,
            best_quality,
            verbose,
        } => run_decode(&pages, &output_dir, dpi_hint, password, best_quality, verbose)?,

        Commands::Info { page, dpi_hint } => run_info(&page, dpi_hint)?,
    }

    Ok(())
}

fn run_encode(
    input: &Path,
    output_prefix: &Path,
    dpi: u32,
    dotpercent: u32,
    redundancy: u32,
    compression: u8,
    password: Option<String>,
    printheader: bool,
    printborder: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = CompressionLevel::from_u8(compression)
        .ok_or(paperback::config::ConfigError::InvalidCompressionLevel(compression))?;

    let config = EncodeConfig {
        dpi,
        dotpercent,
        redundancy,
        compression: level,
        encryption: password.is_some(),
        password,
        printheader,
        printborder,
        margins: Margins::default(),
    };
    config.validate()?;

    let mut state = EncodeState::printfile(input, config);
    let mut pages_written = 0u32;
    loop {
        match state.next_step() {
            EncodeOutcome::Continue => {}
            EncodeOutcome::PageReady { page_number, bitmap } => {
                let path = page_path(output_prefix, page_number);
                let file = std::fs::File::create(&path)?;
                let mut writer = paperback::perf::WriteBuffer::new(file, 64 * 1024);
                bitmap::write_bmp_gray(&mut writer, &bitmap.to_gray())?;
                writer.flush()?;
                println!("  wrote page {page_number} -> {}", path.display());
                pages_written += 1;
            }
            EncodeOutcome::Finished => break,
        }
    }

    if let Some(err) = state.error {
        return Err(format!("encode failed: {err}").into());
    }
    println!("Encoded {} page(s) from {}", pages_written, input.display());
    Ok(())
}

fn page_path(prefix: &Path, page_number: u32) -> PathBuf {
    let mut name = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "paperback".to_string());
    name.push_str(&format!("_p{:03}.bmp", page_number));
    match prefix.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

fn run_decode(
    page_paths: &[PathBuf],
    output_dir: &Path,
    dpi_hint: u32,
    password: Option<String>,
    best_quality: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(output_dir)?;

    let mut pages = Vec::with_capacity(page_paths.len());
    for path in page_paths {
        let file = std::fs::File::open(path)?;
        pages.push(bitmap::read_bmp_gray(file)?);
    }

    let config = DecodeConfig {
        dpi_hint,
        bestquality: best_quality,
        autosave: true,
        password,
    };
    config.validate()?;

    let mut state = DecodeState::new(pages, config);
    let mut files_written = 0u32;
    loop {
        match state.next_step() {
            DecodeOutcome::Continue => {}
            DecodeOutcome::PageDone {
                page_number,
                good_blocks,
                bad_blocks,
            } => {
                if verbose {
                    match page_number {
                        Some(n) => println!("  page {n}: {good_blocks} good, {bad_blocks} bad"),
                        None => println!("  page: grid lock failed ({bad_blocks} blocks unread)"),
                    }
                }
            }
            DecodeOutcome::FileReady(file) => {
                let path = output_dir.join(&file.name);
                std::fs::write(&path, &file.bytes)?;
                println!("  restored {} ({} B) -> {}", file.name, file.bytes.len(), path.display());
                files_written += 1;
            }
            DecodeOutcome::Finished => break,
        }
    }

    if let Some(err) = state.error {
        return Err(format!("decode failed: {err}").into());
    }
    if files_written == 0 {
        println!("No file completed reassembly; more pages may be needed.");
    } else {
        println!("Restored {files_written} file(s) to {}", output_dir.display());
    }
    Ok(())
}

fn run_info(page: &Path, dpi_hint: u32) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::open(page)?;
    let image: GrayBitmap = bitmap::read_bmp_gray(file)?;

    let decoded = paperback::decoder::decode_page(
        &image,
        dpi_hint,
        false,
        paperback::decoder::Orientation::default(),
    )
    .map_err(|e| format!("grid lock failed: {e}"))?;

    let superblock = decoded
        .blocks
        .iter()
        .find_map(|outcome| match outcome {
            paperback::decoder::sampler::BlockOutcome::Ok(r)
                if r.ok && r.addr == paperback::block::SUPERBLOCK_ADDR =>
            {
                paperback::Superblock::from_block(r.addr, &r.payload).ok()
            }
            _ => None,
        })
        .ok_or("no superblock found on this page")?;

    println!("── paperback page ──────────────────────────────────────");
    println!("  Path           {}", page.display());
    println!("  Orientation    {:?}", decoded.orientation);
    println!("  File name      {}", superblock.name);
    println!("  Page           {}", superblock.page);
    println!("  Original size  {} B", superblock.origsize);
    println!("  Compressed     {} B", superblock.datasize);
    println!("  This page      {} B", superblock.pagesize);
    println!("  Compressed?    {}", superblock.is_compressed());
    println!("  Encrypted?     {}", superblock.is_encrypted());
    println!("  Modified       {}", superblock.modified);
    println!("  File CRC16     {:#06x}", superblock.filecrc);
    Ok(())
}
