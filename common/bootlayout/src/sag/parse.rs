use crate::sag::{Address, Block, BlockKind, Directive, Region, SagError, SagFile};

/// Strips a trailing `; comment`.
fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or("").trim()
}

pub(crate) struct Parser<'a> {
    lines: Vec<&'a str>,
    current: usize,
}

impl<'a> Parser<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().map(strip_comment).collect(),
            current: 0,
        }
    }

    fn line(&self) -> Option<&'a str> {
        self.lines.get(self.current).copied()
    }

    fn advance(&mut self) {
        self.current += 1;
    }

    fn error(&self, message: impl Into<String>) -> SagError {
        SagError::Parse {
            line: self.current + 1,
            message: message.into(),
        }
    }

    /// Moves to the next non-blank line and returns it.
    fn next_significant(&mut self) -> Option<&'a str> {
        while let Some(line) = self.line() {
            if !line.is_empty() {
                return Some(line);
            }
            self.advance();
        }
        None
    }

    /// Consumes an opening brace, either trailing the header line just read or on a line of its
    /// own.
    fn expect_open(&mut self, trailing: bool, context: &str) -> Result<(), SagError> {
        if trailing {
            return Ok(());
        }
        match self.next_significant() {
            Some("{") => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(self.error(format!("expected '{{' after {context}"))),
            None => Err(self.error(format!(
                "unexpected end of file, expected '{{' after {context}"
            ))),
        }
    }

    pub fn parse(mut self) -> Result<SagFile, SagError> {
        let mut sag = SagFile::default();

        while let Some(line) = self.next_significant() {
            let mut tokens = line.split_whitespace();
            let keyword = tokens.next().unwrap_or_default();

            if keyword == "USER_SECTIONS" {
                let sections: Vec<&str> = tokens.collect();
                if sections.is_empty() {
                    return Err(self.error("expected section name after USER_SECTIONS"));
                }
                sag.user_sections
                    .extend(sections.into_iter().map(String::from));
                self.advance();
            } else if let Some(kind) = BlockKind::from_keyword(keyword) {
                let block = self.parse_block(kind, tokens.collect())?;
                sag.blocks.push(block);
            } else {
                return Err(self.error(format!("unexpected {keyword:?} at top level")));
            }
        }

        tracing::debug!(
            "parsed SAG: {} user sections, {} blocks",
            sag.user_sections.len(),
            sag.blocks.len()
        );
        Ok(sag)
    }

    fn parse_block(&mut self, kind: BlockKind, mut args: Vec<&'a str>) -> Result<Block, SagError> {
        let trailing_brace = args.last() == Some(&"{");
        if trailing_brace {
            args.pop();
        }

        let (lma, rest) = match args.split_first() {
            Some((lma, rest)) => (lma, rest),
            None => return Err(self.error(format!("expected address after {}", kind.keyword()))),
        };
        let lma: Address = lma.parse().map_err(|e: SagError| self.error(e.to_string()))?;

        let alignment = match rest {
            [] => None,
            [align, value] if align.eq_ignore_ascii_case("ALIGN") => {
                let value: u64 = value
                    .parse()
                    .map_err(|_| self.error(format!("invalid alignment {value:?}")))?;
                if !value.is_power_of_two() {
                    return Err(self.error(format!("alignment {value} is not a power of two")));
                }
                Some(value)
            }
            _ => {
                return Err(self.error(format!(
                    "unexpected {:?} after block address",
                    rest.join(" ")
                )))
            }
        };

        self.advance();
        self.expect_open(trailing_brace, kind.keyword())?;

        let mut regions = Vec::new();
        loop {
            let Some(line) = self.next_significant() else {
                return Err(self.error(format!(
                    "unexpected end of file in {} block, expected '}}'",
                    kind.keyword()
                )));
            };
            if line == "}" {
                self.advance();
                break;
            }
            regions.push(self.parse_region(line)?);
        }

        Ok(Block {
            kind,
            lma,
            alignment,
            regions,
        })
    }

    fn parse_region(&mut self, line: &'a str) -> Result<Region, SagError> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let trailing_brace = tokens.last() == Some(&"{");
        if trailing_brace {
            tokens.pop();
        }

        let &[name, vma] = tokens.as_slice() else {
            return Err(self.error(format!("expected region `NAME address`, found {line:?}")));
        };
        if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(self.error(format!(
                "region name {name:?} must start with an uppercase letter"
            )));
        }
        let vma: Address = vma.parse().map_err(|e: SagError| self.error(e.to_string()))?;

        self.advance();
        self.expect_open(trailing_brace, name)?;

        let mut directives = Vec::new();
        loop {
            let Some(line) = self.next_significant() else {
                return Err(self.error(format!(
                    "unexpected end of file in region {name}, expected '}}'"
                )));
            };
            if line == "}" {
                self.advance();
                break;
            }
            match self.parse_directive(line)? {
                Some(directive) => directives.push(directive),
                None => tracing::warn!(
                    "line {}: ignoring unsupported directive {line:?}",
                    self.current + 1
                ),
            }
            self.advance();
        }

        Ok(Region {
            name: name.to_string(),
            vma,
            directives,
        })
    }

    fn parse_directive(&self, line: &str) -> Result<Option<Directive>, SagError> {
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));

        let symbol = |rest: &str| -> Result<(String, bool), SagError> {
            let (next, symbol) = match rest.strip_prefix("NEXT") {
                Some(symbol) if symbol.starts_with(char::is_whitespace) => (true, symbol.trim()),
                _ => (false, rest),
            };
            if symbol.is_empty() || symbol.contains(char::is_whitespace) {
                return Err(self.error(format!("expected a single symbol after {keyword}")));
            }
            Ok((symbol.to_string(), next))
        };

        match keyword {
            "ADDR" => {
                let (symbol, next) = symbol(rest)?;
                Ok(Some(Directive::Addr { symbol, next }))
            }
            "LOADADDR" => {
                let (symbol, next) = symbol(rest)?;
                Ok(Some(Directive::LoadAddr { symbol, next }))
            }
            _ if keyword == "STACK" || keyword.starts_with("STACK=") => {
                let value = line["STACK".len()..].trim();
                let value = value.strip_prefix('=').unwrap_or(value).trim();
                match value.parse::<Address>() {
                    Ok(Address::Absolute(address)) => Ok(Some(Directive::Stack(address))),
                    _ => Err(self.error(format!("invalid stack address {value:?}"))),
                }
            }
            _ if line.starts_with('*') => {
                let rest = line[1..].trim();
                let (keep, rest) = match rest.strip_prefix("KEEP") {
                    Some(rest) => (true, rest.trim()),
                    None => (false, rest),
                };
                let pattern = rest
                    .strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .ok_or_else(|| self.error(format!("expected '( patterns )' in {line:?}")))?
                    .trim();
                if pattern.is_empty() {
                    return Err(self.error("empty section pattern"));
                }
                Ok(Some(Directive::Section {
                    pattern: pattern.to_string(),
                    keep,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sag::{Address, BlockKind, Directive, SagError, SagFile};

    const SIMPLE: &str = r#"
USER_SECTIONS .bootloader

HEAD 0x00000000
{
    BOOTLOADER 0x80000000
    {
        ADDR __flash_start
        * KEEP ( .bootloader )
    }
}
"#;

    #[test]
    fn test_parse_simple_sag() {
        let sag: SagFile = SIMPLE.parse().unwrap();
        assert_eq!(sag.user_sections, [".bootloader"]);
        assert_eq!(sag.blocks.len(), 1);

        let block = &sag.blocks[0];
        assert_eq!(block.kind, BlockKind::Head);
        assert_eq!(block.lma, Address::Absolute(0));
        assert_eq!(block.alignment, None);
        assert_eq!(block.regions.len(), 1);

        let region = &block.regions[0];
        assert_eq!(region.name, "BOOTLOADER");
        assert_eq!(region.vma, Address::Absolute(0x8000_0000));
        assert_eq!(region.directives, [
            Directive::Addr {
                symbol: "__flash_start".to_string(),
                next: false
            },
            Directive::Section {
                pattern: ".bootloader".to_string(),
                keep: true
            },
        ]);
    }

    #[test]
    fn test_parse_ae350_ddr() {
        let sag: SagFile = include_str!("../../data/ae350-ddr.sag").parse().unwrap();
        assert_eq!(sag.user_sections, [".bootloader"]);
        assert_eq!(sag.blocks.len(), 2);
        assert_eq!(sag.blocks[1].kind, BlockKind::Mem);
        assert_eq!(sag.blocks[1].alignment, Some(256));
        assert_eq!(sag.blocks[1].regions.len(), 2);
        assert_eq!(sag.stack(), Some(0x0800_0000));
        assert!(sag.blocks[1].regions[0].directives.contains(&Directive::Addr {
            symbol: "__text_end".to_string(),
            next: true,
        }));
        assert!(sag.blocks[1].regions[0].directives.contains(&Directive::LoadAddr {
            symbol: "__text_lmastart".to_string(),
            next: false,
        }));
    }

    #[test]
    fn test_comments_and_trailing_braces() {
        let sag: SagFile =
            "; header\nEXEC 0x0 { ; run from ILM\n  ILM_TEXT +0 {\n    * ( +RO ) ; code\n  }\n}\n"
                .parse()
            .unwrap();
        assert_eq!(sag.blocks[0].kind, BlockKind::Exec);
        assert_eq!(sag.blocks[0].regions[0].vma, Address::Relative(0));
        assert_eq!(sag.blocks[0].regions[0].directives, [Directive::Section {
            pattern: "+RO".to_string(),
            keep: false
        }]);
    }

    fn error_line(content: &str) -> usize {
        match content.parse::<SagFile>() {
            Err(SagError::Parse { line, .. }) => line,
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_lines() {
        // missing brace after block header
        assert_eq!(error_line("\nHEAD 0x0\nBOOT 0x0\n"), 3);
        // unterminated region
        assert_eq!(error_line("HEAD 0x0\n{\n  BOOT 0x0\n  {\n    ADDR x\n"), 6);
        // bad alignment
        assert_eq!(error_line("\n\nMEM 0x0 ALIGN 3\n{\n}\n"), 3);
        // bad address
        assert_eq!(error_line("HEAD 0xnope\n{\n}\n"), 1);
        // stray top-level token
        assert_eq!(error_line("USER_SECTIONS .a\nHEADER 0x0\n"), 2);
        // lowercase region
        assert_eq!(error_line("HEAD 0x0\n{\n  boot 0x0\n  {\n  }\n}\n"), 3);
        // STACK without an absolute address
        assert_eq!(error_line("HEAD 0x0\n{\n  BOOT 0x0\n  {\n    STACK = +4\n  }\n}\n"), 5);
    }

    #[test]
    fn test_unsupported_directive_is_skipped() {
        let sag: SagFile = "HEAD 0x0\n{\n  BOOT 0x0\n  {\n    VAR foo\n    ADDR bar\n  }\n}\n"
            .parse()
            .unwrap();
        assert_eq!(sag.blocks[0].regions[0].directives.len(), 1);
    }
}
