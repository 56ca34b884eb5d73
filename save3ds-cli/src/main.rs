use clap::{Args, Parser, Subcommand};
use save3ds_core::aes_ctr_file::AesCtrFile;
use save3ds_core::db::{open_title_db, read_ticket_preheader};
use save3ds_core::diff::open_diff;
use save3ds_core::disa::open_disa;
use save3ds_core::disk_file::DiskFile;
use save3ds_core::error::Error;
use save3ds_core::ext_data::open_ext_data_meta;
use save3ds_core::extractor::{extract_ext_data_tree, extract_save_tree, extract_title_db_tree, ExtDataLocation};
use save3ds_core::memory_file::MemoryFile;
use save3ds_core::random_access_file::read_to_vec;
use save3ds_core::save_fs::open_save_fs;
use save3ds_core::sd::{sd_counter, sd_key};
use save3ds_core::signer::{DisaNandSigner, DisaSdSigner, ExtDataSigner, Signer, TitleDbSigner};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Opens `path` as a `DiskFile` and reads it whole, the same adapter the
/// core uses for every on-disk container image.
fn read_whole_file(path: &Path) -> Result<Vec<u8>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let disk = DiskFile::new(file).map_err(|e| e.to_string())?;
    read_to_vec(&disk).map_err(|e| e.to_string())
}

/// Extracts and verifies Nintendo 3DS save-data containers: DISA, DIFF
/// (ExtData subfiles, Title DB), and BDRI ticket databases.
#[derive(Parser)]
#[command(name = "save3ds")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a DISA container (SAVE partition, optional DATA partition)
    DisaExtract {
        input: PathBuf,
        output: Option<PathBuf>,
        #[command(flatten)]
        opts: CommonOpts,
    },
    /// Extract a DIFF container, or an ExtData root directory
    /// (layout <root>/<high:08x>/<low:08x>/...)
    DiffExtract {
        input: PathBuf,
        output: Option<PathBuf>,
        #[command(flatten)]
        opts: CommonOpts,
    },
    /// Print a BDRI ticket database's TICK preheader and dump its body
    TicketExtract { input: PathBuf, output: Option<PathBuf> },
}

#[derive(Args)]
struct CommonOpts {
    /// Save/ExtData/title-db id, as hex
    #[arg(long)]
    id: Option<String>,
    /// ExtData sub-id, as hex
    #[arg(long)]
    subid: Option<String>,
    /// ExtData CMAC kind / ExtData root directory layout
    #[arg(long)]
    extdata: bool,
    /// Title DB CMAC kind
    #[arg(long)]
    titledb: bool,
    /// SD CMAC kind
    #[arg(long)]
    sd: bool,
    /// NAND CMAC kind
    #[arg(long)]
    nand: bool,
    /// Cartridge save: no outer CMAC
    #[arg(long)]
    card: bool,
    /// Apply SD AES-CTR decryption before parsing (requires --id, a kind
    /// flag, and --key-x/--key-y)
    #[arg(long, requires = "id")]
    decrypt: bool,
    /// SD key X, 32 hex digits
    #[arg(long = "key-x")]
    key_x: Option<String>,
    /// SD key Y, 32 hex digits
    #[arg(long = "key-y")]
    key_y: Option<String>,
    /// Outer CMAC key, 32 hex digits (no key means verification is skipped
    /// with a notice)
    #[arg(long = "cmac-key")]
    cmac_key: Option<String>,
}

fn parse_hex_u64(s: &str) -> Result<u64, String> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_hex_u128(s: &str) -> Result<[u8; 16], String> {
    let s = s.trim_start_matches("0x");
    if s.len() != 32 {
        return Err("expected 32 hex digits".to_owned());
    }
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok(out)
}

struct ResolvedOpts {
    id: Option<u64>,
    sub_id: Option<u64>,
    extdata: bool,
    titledb: bool,
    nand: bool,
    card: bool,
    decrypt: bool,
    key_x: Option<[u8; 16]>,
    key_y: Option<[u8; 16]>,
    cmac_key: Option<[u8; 16]>,
}

impl CommonOpts {
    fn resolve(&self) -> Result<ResolvedOpts, String> {
        Ok(ResolvedOpts {
            id: self.id.as_deref().map(parse_hex_u64).transpose()?,
            sub_id: self.subid.as_deref().map(parse_hex_u64).transpose()?,
            extdata: self.extdata,
            titledb: self.titledb,
            nand: self.nand,
            card: self.card,
            decrypt: self.decrypt,
            key_x: self.key_x.as_deref().map(parse_hex_u128).transpose()?,
            key_y: self.key_y.as_deref().map(parse_hex_u128).transpose()?,
            cmac_key: self.cmac_key.as_deref().map(parse_hex_u128).transpose()?,
        })
    }
}

/// Decrypts the whole input image in place (spec §6's SD AES-CTR
/// fingerprint), keyed by the caller-supplied keyX/keyY and a counter
/// derived from `path`.
fn decrypt_whole(raw: Vec<u8>, path: &str, key_x: [u8; 16], key_y: [u8; 16]) -> Result<Vec<u8>, Error> {
    let key = sd_key(key_x, key_y);
    let ctr = sd_counter(path);
    let source = Rc::new(MemoryFile::new(raw));
    let view = AesCtrFile::new(source, key, ctr);
    read_to_vec(&view)
}

fn maybe_decrypt(raw: Vec<u8>, path: &str, opts: &ResolvedOpts) -> Result<Vec<u8>, String> {
    if !opts.decrypt {
        return Ok(raw);
    }
    let (kx, ky) = match (opts.key_x, opts.key_y) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err("--decrypt requires --key-x and --key-y".to_owned()),
    };
    decrypt_whole(raw, path, kx, ky).map_err(|e| e.to_string())
}

fn disa_signer(opts: &ResolvedOpts) -> Result<Option<(Box<dyn Signer>, [u8; 16])>, String> {
    if opts.card || opts.cmac_key.is_none() {
        return Ok(None);
    }
    let id = opts.id.ok_or("DISA CMAC verification requires --id")?;
    let key = opts.cmac_key.unwrap();
    if opts.nand {
        Ok(Some((Box::new(DisaNandSigner { id }), key)))
    } else {
        Ok(Some((Box::new(DisaSdSigner { id }), key)))
    }
}

fn diff_signer(opts: &ResolvedOpts) -> Result<Option<(Box<dyn Signer>, [u8; 16])>, String> {
    if opts.card || opts.cmac_key.is_none() {
        return Ok(None);
    }
    let key = opts.cmac_key.unwrap();
    if opts.titledb {
        let id = opts.id.ok_or("Title DB CMAC verification requires --id")?;
        Ok(Some((Box::new(TitleDbSigner { id: id as u32 }), key)))
    } else {
        let id = opts.id.ok_or("ExtData CMAC verification requires --id")?;
        Ok(Some((
            Box::new(ExtDataSigner {
                id,
                sub_id: opts.sub_id,
            }),
            key,
        )))
    }
}

fn run_disa_extract(input: &Path, output: Option<&Path>, opts: &CommonOpts) -> Result<(), String> {
    let resolved = opts.resolve()?;
    let raw = read_whole_file(input)?;
    let raw = maybe_decrypt(raw, &input.to_string_lossy(), &resolved)?;

    let signer = disa_signer(&resolved)?;
    let signer_ref = signer.as_ref().map(|(s, k)| (s.as_ref() as &dyn Signer, k));
    let disa = open_disa(&raw, signer_ref).map_err(|e| e.to_string())?;
    let fs_ = open_save_fs(&disa).map_err(|e| e.to_string())?;
    let root = fs_.open_root().map_err(|e| e.to_string())?;

    if let Some(dir) = output {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }
    extract_save_tree(&fs_, &root, output).map_err(|e| e.to_string())
}

fn run_diff_extract(input: &Path, output: Option<&Path>, opts: &CommonOpts) -> Result<(), String> {
    let resolved = opts.resolve()?;
    let metadata = std::fs::metadata(input).map_err(|e| e.to_string())?;

    if metadata.is_dir() {
        if !resolved.extdata {
            return Err("an ExtData root directory requires --extdata".to_owned());
        }
        let meta_path = input.join("00000000").join("00000001");
        let meta_raw = read_whole_file(&meta_path)?;
        let meta_raw = maybe_decrypt(meta_raw, &meta_path.to_string_lossy(), &resolved)?;

        let meta_signer = diff_signer(&resolved)?;
        let meta_signer_ref = meta_signer.as_ref().map(|(s, k)| (s.as_ref() as &dyn Signer, k));
        let meta_diff = open_diff(&meta_raw, meta_signer_ref).map_err(|e| e.to_string())?;
        let meta = open_ext_data_meta(&meta_diff).map_err(|e| e.to_string())?;
        let root = meta.open_root().map_err(|e| e.to_string())?;

        let location = ExtDataLocation { root: input.to_owned() };
        let file_signer = diff_signer(&resolved)?;
        let file_signer_ref = file_signer.as_ref().map(|(s, k)| (s.as_ref() as &dyn Signer, k));

        if let Some(dir) = output {
            std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        }
        extract_ext_data_tree(&meta, &location, file_signer_ref, &root, output).map_err(|e| e.to_string())
    } else {
        let raw = read_whole_file(input)?;
        let raw = maybe_decrypt(raw, &input.to_string_lossy(), &resolved)?;

        let signer = diff_signer(&resolved)?;
        let signer_ref = signer.as_ref().map(|(s, k)| (s.as_ref() as &dyn Signer, k));
        let diff = open_diff(&raw, signer_ref).map_err(|e| e.to_string())?;

        if resolved.titledb {
            let db = open_title_db(&diff).map_err(|e| e.to_string())?;
            let root = db.open_root().map_err(|e| e.to_string())?;
            if let Some(dir) = output {
                std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
            }
            extract_title_db_tree(&db, &root, output).map_err(|e| e.to_string())
        } else {
            let bytes = read_to_vec(&diff.partition).map_err(|e| e.to_string())?;
            if let Some(path) = output {
                std::fs::write(path, &bytes).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
    }
}

fn run_ticket_extract(input: &Path, output: Option<&Path>) -> Result<(), String> {
    let raw = read_whole_file(input)?;
    let pre = read_ticket_preheader(&raw).map_err(|e| e.to_string())?;
    log::info!(
        "TICK preheader: field0={:#010x} field1={:#010x} field2={:#010x}",
        pre.field0,
        pre.field1,
        pre.field2
    );
    if let Some(path) = output {
        std::fs::write(path, &raw[0x10..]).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::DisaExtract { input, output, opts } => run_disa_extract(input, output.as_deref(), opts),
        Command::DiffExtract { input, output, opts } => run_diff_extract(input, output.as_deref(), opts),
        Command::TicketExtract { input, output } => run_ticket_extract(input, output.as_deref()),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
