//! Disassembles a compiled `.spv` file to a flat, human-readable
//! instruction dump, or round-trips an SBC text file through the
//! Opcode Registry's parser/printer. CLI shape grounded in
//! `spq-dis`/`spirq-dis`'s `main.rs` (stdin-or-path in, stdout-or-path
//! out, `clap` derive `Args`).
use std::fs::File;
use std::io::{stderr, Read, Write};
use std::path::Path;
use std::process::exit;

use clap::Parser;

use sbc_sbc::{parse, print};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(help = "Input file path. Or read from stdin if not provided.")]
    in_path: Option<String>,

    #[arg(short, long, help = "Output file path. Printed to stdout if not given.")]
    out_path: Option<String>,

    #[arg(
        long,
        help = "Treat input as an SBC text file (§4.2) instead of a compiled .spv binary."
    )]
    sbc: bool,
}

fn main() {
    let args = Args::parse();
    let is_sbc = args.sbc || args.in_path.as_deref().map_or(false, |p| p.ends_with(".sbc"));

    let text = if is_sbc {
        let src = read_input_text(args.in_path.as_deref());
        let ops = parse(&src).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to parse SBC: {}", e).unwrap();
            exit(1);
        });
        print(&ops)
    } else {
        let spv = read_input_bytes(args.in_path.as_deref());
        disassemble_spirv(&spv)
    };

    write_output(args.out_path.as_deref(), &text);
}

fn read_input_text(in_path: Option<&str>) -> String {
    let mut buf = String::new();
    open_input(in_path).read_to_string(&mut buf).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to read input file: {}", e).unwrap();
        exit(1);
    });
    buf
}

fn read_input_bytes(in_path: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::new();
    open_input(in_path).read_to_end(&mut buf).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to read input file: {}", e).unwrap();
        exit(1);
    });
    buf
}

fn open_input(in_path: Option<&str>) -> Box<dyn Read> {
    if let Some(in_path) = in_path {
        let file = File::open(Path::new(in_path)).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to open input file: {}", e).unwrap();
            exit(1);
        });
        Box::new(file)
    } else {
        Box::new(std::io::stdin())
    }
}

fn write_output(out_path: Option<&str>, text: &str) {
    if let Some(out_path) = out_path {
        let mut out_file = File::create(Path::new(out_path)).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to open output file: {}", e).unwrap();
            exit(1);
        });
        out_file.write_all(text.as_bytes()).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to write output file: {}", e).unwrap();
            exit(1);
        });
    } else {
        println!("{}", text);
    }
}

/// The handful of opcode mnemonics this dialect's back-end actually
/// emits (§4.4/§4.5); anything else prints as a bare `Op<N>` rather
/// than guessing — this is a debug dump, not a full SPIR-V assembler
/// (`sbc-validate::disassemble` wraps the real `spirv-dis` for that).
fn opcode_mnemonic(op: u32) -> &'static str {
    match op {
        0 => "Nop",
        1 => "Undef",
        5 => "Name",
        6 => "MemberName",
        11 => "ExtInstImport",
        12 => "ExtInst",
        14 => "MemoryModel",
        15 => "EntryPoint",
        16 => "ExecutionMode",
        17 => "Capability",
        19 => "TypeVoid",
        20 => "TypeBool",
        21 => "TypeInt",
        22 => "TypeFloat",
        23 => "TypeVector",
        24 => "TypeMatrix",
        25 => "TypeImage",
        26 => "TypeSampler",
        27 => "TypeSampledImage",
        28 => "TypeArray",
        29 => "TypeRuntimeArray",
        30 => "TypeStruct",
        32 => "TypePointer",
        33 => "TypeFunction",
        41 => "ConstantTrue",
        42 => "ConstantFalse",
        43 => "Constant",
        44 => "ConstantComposite",
        54 => "Function",
        56 => "FunctionEnd",
        59 => "Variable",
        61 => "Load",
        62 => "Store",
        65 => "AccessChain",
        71 => "Decorate",
        72 => "MemberDecorate",
        80 => "CompositeConstruct",
        81 => "CompositeExtract",
        87 => "SampledImage",
        88 => "ImageSampleImplicitLod",
        98 => "ImageRead",
        99 => "ImageWrite",
        126 => "ConvertFToU",
        127 => "ConvertFToS",
        128 => "ConvertSToF",
        129 => "ConvertUToF",
        131 => "Bitcast",
        132 => "SConvert",
        133 => "FConvert",
        136 => "UConvert",
        142 => "FNegate",
        143 => "SNegate",
        144 => "IAdd",
        147 => "FAdd",
        149 => "ISub",
        150 => "FSub",
        152 => "IMul",
        153 => "FMul",
        155 => "UDiv",
        156 => "SDiv",
        158 => "FDiv",
        159 => "UMod",
        161 => "SMod",
        162 => "FMod",
        167 => "BitwiseXor",
        168 => "BitwiseOr",
        169 => "BitwiseAnd",
        194 => "ShiftRightLogical",
        195 => "ShiftRightArithmetic",
        196 => "ShiftLeftLogical",
        203 => "LogicalNot",
        164 => "LogicalEqual",
        170 => "Not",
        171 => "IEqual",
        172 => "INotEqual",
        173 => "UGreaterThan",
        174 => "SGreaterThan",
        175 => "UGreaterThanEqual",
        176 => "SGreaterThanEqual",
        177 => "ULessThan",
        178 => "SLessThan",
        179 => "ULessThanEqual",
        180 => "SLessThanEqual",
        182 => "FOrdEqual",
        184 => "FOrdNotEqual",
        185 => "FOrdLessThan",
        187 => "FOrdGreaterThan",
        189 => "FOrdLessThanEqual",
        191 => "FOrdGreaterThanEqual",
        245 => "Phi",
        246 => "LoopMerge",
        247 => "SelectionMerge",
        248 => "Label",
        249 => "Branch",
        250 => "BranchConditional",
        252 => "Kill",
        253 => "Return",
        254 => "ReturnValue",
        _ => "Unknown",
    }
}

fn disassemble_spirv(bytes: &[u8]) -> String {
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words.len() < 5 {
        writeln!(stderr(), "error: input is shorter than a SPIR-V header").unwrap();
        exit(1);
    }
    let mut out = String::new();
    out.push_str(&format!("; Magic:     {:#010x}\n", words[0]));
    out.push_str(&format!("; Version:   {:#010x}\n", words[1]));
    out.push_str(&format!("; Generator: {:#010x}\n", words[2]));
    out.push_str(&format!("; Bound:     {}\n", words[3]));

    let mut i = 5;
    while i < words.len() {
        let header = words[i];
        let word_count = (header >> 16) as usize;
        let opcode = header & 0xFFFF;
        if word_count == 0 || i + word_count > words.len() {
            out.push_str(&format!("; <truncated instruction at word {}>\n", i));
            break;
        }
        let operands = &words[i + 1..i + word_count];
        out.push_str(&format!("Op{}", opcode_mnemonic(opcode)));
        for operand in operands {
            out.push_str(&format!(" {}", operand));
        }
        out.push('\n');
        i += word_count;
    }
    out
}
