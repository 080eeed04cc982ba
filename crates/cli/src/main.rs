use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use slotdump_core::{
    ctr::ncsd::{self, NcsdHeader},
    ntr::{
        header::NtrHeader,
        key1::{Generation, KEY1_BYTES},
        secure_area::{self, SecureAreaStatus},
        unlock::{SECURE_AREA_OFFSET, SECURE_AREA_SIZE},
    },
};

mod keys;
mod logging;

#[derive(Parser)]
#[command(version, about = "Offline tools for NTR and CTR cartridge images")]
struct Args {
    /// KEY1 base table, defaults to the one in the config directory
    #[arg(long, global = true)]
    key1: Option<PathBuf>,

    /// Use the TWL (DSi) base table even if the header asks for the NTR one
    #[arg(long, global = true)]
    twl: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header of an image
    Info { image: PathBuf },
    /// Decrypt the secure area of an NTR image
    DecryptSecure {
        image: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Encrypt the secure area of an NTR image again
    EncryptSecure {
        image: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Check that the KEY1 table can be loaded
    CheckKeys,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let forced = args.twl.then_some(Generation::Twl);
    let generation_for = |header: &NtrHeader| forced.unwrap_or_else(|| header.generation());

    match args.command {
        Command::Info { image } => info(&image),
        Command::DecryptSecure { image, out } => {
            let (mut bin, header) = read_ntr_image(&image)?;
            let (_, table) = keys::load(args.key1, generation_for(&header))?;
            let status = secure_area::decrypt(secure_area_of(&mut bin), &table, header.game_code)?;
            if status == SecureAreaStatus::Unrecognized {
                tracing::warn!("secure area did not decrypt to a known id, writing anyway");
            }
            write(&out, &bin)
        }
        Command::EncryptSecure { image, out } => {
            let (mut bin, header) = read_ntr_image(&image)?;
            let (_, table) = keys::load(args.key1, generation_for(&header))?;
            if !bin[SECURE_AREA_OFFSET as usize..].starts_with(secure_area::SECURE_AREA_ID) {
                tracing::warn!("secure area does not look decrypted");
            }
            secure_area::encrypt(secure_area_of(&mut bin), &table, header.game_code)?;
            write(&out, &bin)
        }
        Command::CheckKeys => {
            let (path, table) = keys::load(args.key1, forced.unwrap_or(Generation::Ntr))?;
            println!("{}: {:#x} bytes, P[0] = {:#010x}", path.display(), KEY1_BYTES, table.words()[0]);
            Ok(())
        }
    }
}

fn info(path: &Path) -> Result<()> {
    let bin = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    if ncsd::has_magic(&bin, ncsd::NCSD_MAGIC) {
        let header = NcsdHeader::parse(&bin)?;
        println!("NCSD image");
        println!("  media unit:  {:#x}", header.media_unit());
        println!("  used size:   {} MiB", header.used_bytes() >> 20);
        if let Some(ncch) = bin.get(0x1000..0x1200) {
            if ncsd::has_magic(ncch, ncsd::NCCH_MAGIC) {
                println!("  product:     {}", ncsd::product_code(ncch));
            }
        }
        return Ok(());
    }

    let header = NtrHeader::parse(&bin)?;
    println!("NTR image");
    println!("  title:       {}", header.title);
    println!("  game code:   {}", header.game_code_str());
    println!("  maker:       {}", String::from_utf8_lossy(&header.maker_code));
    println!("  revision:    {}", header.rom_version);
    println!("  unit:        {:#04x} ({:?})", header.unit_code, header.generation());
    println!("  rom size:    {} KiB", header.rom_size_bytes() >> 10);
    println!("  used:        {} KiB", header.total_used_rom_size >> 10);
    println!("  KEY2 seed:   {}", header.seed_select);
    println!("  ROMCNT:      {:#010x} / {:#010x}", header.normal_romcnt, header.key1_romcnt);
    println!("  secure delay {} us", header.secure_area_delay_us());
    if !header.logo_ok() {
        println!("  logo checksum {:#06x} is unexpected", header.logo_crc);
    }
    Ok(())
}

fn read_ntr_image(path: &Path) -> Result<(Vec<u8>, NtrHeader)> {
    let bin = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let need = SECURE_AREA_OFFSET as usize + SECURE_AREA_SIZE;
    if bin.len() < need {
        bail!("{} is {:#x} bytes, needs at least {need:#x}", path.display(), bin.len());
    }
    let header = NtrHeader::parse(&bin)?;
    Ok((bin, header))
}

fn secure_area_of(bin: &mut [u8]) -> &mut [u8] {
    &mut bin[SECURE_AREA_OFFSET as usize..][..SECURE_AREA_SIZE]
}

fn write(path: &Path, bin: &[u8]) -> Result<()> {
    std::fs::write(path, bin).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "written");
    Ok(())
}
