//! Textual pretty-printer and parser for an SBC program: one opcode per
//! line, `co_<name> arg1 arg2 ...`. Parsing is the printer's exact
//! inverse (§4.2/§8 round-trip property), following the shape of
//! `spirq-spvasm::asm::assembler::Assembler` but over our flat,
//! label-free tuple stream instead of full SPIR-V assembly.
use anyhow::{anyhow, Result};

use crate::op::{Operand, SbcOp};
use crate::opcode::Opcode;
use crate::tokenizer::{Token, Tokenizer};

/// Render a full SBC program as text, one instruction per line.
pub fn print(ops: &[SbcOp]) -> String {
    let mut out = String::new();
    for op in ops {
        out.push_str(&op.to_string());
        out.push('\n');
    }
    out
}

struct TokenStream<'a> {
    tokenizer: Tokenizer<'a>,
    cache: Option<Token>,
}
impl<'a> TokenStream<'a> {
    fn new(src: &'a str) -> Result<Self> {
        let mut s = TokenStream {
            tokenizer: Tokenizer::new(src),
            cache: None,
        };
        s.advance()?;
        Ok(s)
    }
    fn advance(&mut self) -> Result<()> {
        self.cache = self.tokenizer.next().transpose()?;
        Ok(())
    }
    fn peek(&self) -> Option<&Token> {
        self.cache.as_ref()
    }
    fn next(&mut self) -> Result<Option<Token>> {
        let cur = self.cache.take();
        self.advance()?;
        Ok(cur)
    }
}

/// Parse a full SBC program from its textual form.
pub fn parse(src: &str) -> Result<Vec<SbcOp>> {
    let mut stream = TokenStream::new(src)?;
    let mut out = Vec::new();
    loop {
        // Skip blank lines.
        while matches!(stream.peek(), Some(Token::NewLine)) {
            stream.next()?;
        }
        let op_tok = match stream.next()? {
            Some(tok) => tok,
            None => break,
        };
        let mnemonic = match op_tok {
            Token::Ident(s) => s,
            other => return Err(anyhow!("expected opcode mnemonic, got {:?}", other)),
        };
        let opcode = Opcode::from_mnemonic(&mnemonic)
            .ok_or_else(|| anyhow!("unknown opcode mnemonic: {}", mnemonic))?;

        let mut operands = Vec::new();
        while let Some(tok) = stream.peek() {
            if matches!(tok, Token::NewLine) {
                stream.next()?;
                break;
            }
            let operand = match stream.next()?.unwrap() {
                Token::Ident(s) => Operand::Name(s),
                Token::Int(x) => Operand::Int(x),
                Token::Float(x) => Operand::Float(x.into()),
                Token::Str(s) => Operand::Str(s),
                Token::NewLine => unreachable!(),
            };
            operands.push(operand);
        }
        out.push(SbcOp::new(opcode, operands));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SbcOp> {
        vec![
            SbcOp::new(Opcode::SrcFilename, vec![Operand::str("shader.py")]),
            SbcOp::new(Opcode::Entrypoint, vec![]),
            SbcOp::new(
                Opcode::Resource,
                vec![
                    Operand::name("index"),
                    Operand::int(0),
                    Operand::name("ivec3"),
                ],
            ),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::float(1.5)]),
            SbcOp::new(Opcode::LoadConstant, vec![Operand::int(-4)]),
            SbcOp::new(
                Opcode::Binop,
                vec![Operand::name("add")],
            ),
            SbcOp::new(Opcode::FuncEnd, vec![]),
        ]
    }

    #[test]
    fn round_trip() {
        let ops = sample();
        let text = print(&ops);
        let parsed = parse(&text).unwrap();
        assert_eq!(ops, parsed);
    }

    #[test]
    fn negative_int_round_trips_as_int_not_name() {
        let ops = vec![SbcOp::new(Opcode::LoadConstant, vec![Operand::int(-100)])];
        let text = print(&ops);
        assert_eq!(text, "co_load_constant -100\n");
        assert_eq!(parse(&text).unwrap(), ops);
    }

    #[test]
    fn float_keeps_decimal_point_for_whole_numbers() {
        let ops = vec![SbcOp::new(Opcode::LoadConstant, vec![Operand::float(40.0)])];
        let text = print(&ops);
        assert_eq!(text, "co_load_constant 40.0\n");
        assert_eq!(parse(&text).unwrap(), ops);
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(parse("co_nonexistent 1\n").is_err());
    }
}
