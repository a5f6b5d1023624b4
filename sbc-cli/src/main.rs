//! Assembles one already-lowered SBC text file (§4.2) straight into a
//! compiled `.spv`, mirroring `spq-as`'s "read assembly text, pick a
//! target environment, write `.spv`" shape. There is no on-disk format
//! for a source-runtime bytecode trace to assemble from instead — that
//! stage only ever existed as a live function object — so this binary
//! picks up the pipeline at the Opcode Registry, one level lower than
//! `spq-as` picks up SPIR-V assembly text.
use std::fs::File;
use std::io::{stderr, Read, Write};
use std::path::Path;
use std::process::exit;

use clap::Parser;

use sbc_backend::{generate_with_options, GenerateOptions};
use sbc_core::locator::ShaderStage;

const SPIRV_VERSION_1_0: u32 = 0x0001_0000;
const SPIRV_VERSION_1_1: u32 = 0x0001_0100;
const SPIRV_VERSION_1_2: u32 = 0x0001_0200;
const SPIRV_VERSION_1_3: u32 = 0x0001_0300;
const SPIRV_VERSION_1_4: u32 = 0x0001_0400;
const SPIRV_VERSION_1_5: u32 = 0x0001_0500;
const SPIRV_VERSION_1_6: u32 = 0x0001_0600;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(help = "Input SBC text file path. Or read from stdin if input file path is not provided.")]
    in_path: Option<String>,

    #[arg(
        short,
        long,
        help = "Output SPIR-V file path. The output file is defaulted to \
        {in_path}.spv if this path is not given."
    )]
    out_path: Option<String>,

    #[arg(
        long,
        default_value = "compute",
        help = "{vertex|fragment|compute} Which pipeline stage the entry point targets."
    )]
    stage: String,

    #[arg(
        long,
        help = "{spv1.0|spv1.1|spv1.2|spv1.3|spv1.4|spv1.5|spv1.6} Target SPIR-V version."
    )]
    target_env: Option<String>,

    #[arg(long, help = "Run the compiled module through spirv-val if it's on PATH.")]
    validate: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut in_file: Box<dyn Read> = if let Some(in_path) = &args.in_path {
        let in_file = File::open(Path::new(in_path)).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to open input file: {}", e).unwrap();
            exit(1);
        });
        Box::new(in_file)
    } else {
        Box::new(std::io::stdin())
    };
    let out_path = if let Some(out_path) = args.out_path {
        Path::new(&out_path).to_owned()
    } else {
        let in_path = args.in_path.as_deref().unwrap_or("out");
        Path::new(&format!("{}.spv", in_path)).to_owned()
    };

    let stage = match args.stage.as_str() {
        "vertex" => ShaderStage::Vertex,
        "fragment" => ShaderStage::Fragment,
        "compute" => ShaderStage::Compute,
        other => {
            writeln!(stderr(), "error: unknown stage: {}", other).unwrap();
            exit(1);
        }
    };

    let spirv_version = match args.target_env.as_deref() {
        Some("spv1.0") => SPIRV_VERSION_1_0,
        Some("spv1.1") => SPIRV_VERSION_1_1,
        Some("spv1.2") => SPIRV_VERSION_1_2,
        Some("spv1.3") => SPIRV_VERSION_1_3,
        Some("spv1.4") => SPIRV_VERSION_1_4,
        Some("spv1.5") => SPIRV_VERSION_1_5,
        Some("spv1.6") => SPIRV_VERSION_1_6,
        None => SPIRV_VERSION_1_4,
        Some(other) => {
            writeln!(stderr(), "error: unknown target environment: {}", other).unwrap();
            exit(1);
        }
    };

    let mut code = String::new();
    in_file.read_to_string(&mut code).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to read input file: {}", e).unwrap();
        exit(1);
    });

    let ops = sbc_sbc::parse(&code).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to parse SBC: {}", e).unwrap();
        exit(1);
    });

    let options = GenerateOptions { spirv_version };
    let spv = generate_with_options(&ops, stage, &options).unwrap_or_else(|e| {
        writeln!(stderr(), "error: {}", e).unwrap();
        exit(1);
    });

    let bytes: Vec<u8> = spv.iter().flat_map(|w| w.to_le_bytes()).collect();

    if args.validate {
        if sbc_validate::is_available() {
            if let Err(e) = sbc_validate::validate(&bytes) {
                writeln!(stderr(), "warning: spirv-val rejected the module:\n{}", e).unwrap();
            }
        } else {
            log::warn!("--validate was given but spirv-val isn't on PATH; skipping");
        }
    }

    let mut out_file = File::create(out_path).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to open output file: {}", e).unwrap();
        exit(1);
    });
    out_file.write_all(&bytes).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to write output file: {}", e).unwrap();
        exit(1);
    });
}
