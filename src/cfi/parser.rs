//! CFI Parser
//!
//! Parses EPUB CFI strings into structured Cfi objects.
//!
//! Grammar (simplified):
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step* [offset]
//! step      = "/" number [assertion] ["!"]
//! assertion = "[" [value] ["," value] (";" key "=" value)* "]"
//! offset    = ":" number [assertion] | "~" number | "@" number ":" number
//! ```
//!
//! Parsing never looks at a document: it is a pure string to AST transform
//! and fails on the first malformed construct.

use super::error::{CfiParseError, ParseErrorKind};
use super::types::*;

/// Raw content of one `[...]` group
#[derive(Debug, Default)]
struct Assertion {
    value: Option<String>,
    suffix: Option<String>,
    side_bias: Option<SideBias>,
    parameters: Vec<(String, String)>,
}

/// Parser state
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, kind: ParseErrorKind) -> CfiParseError {
        CfiParseError::new(kind, self.input, self.pos)
    }

    fn error_at(&self, kind: ParseErrorKind, pos: usize) -> CfiParseError {
        CfiParseError::new(kind, self.input, pos)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CfiParseError> {
        if self.skip_if(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> CfiParseError {
        match self.peek() {
            Some(ch) => self.error(ParseErrorKind::UnexpectedChar(ch)),
            None => self.error(ParseErrorKind::MissingClosingParen),
        }
    }

    fn skip_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn take_digits(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    /// Parse a sequence of digits as u32
    fn parse_number(&mut self) -> Result<u32, CfiParseError> {
        let start = self.pos;
        let digits = self.take_digits();
        if digits.is_empty() {
            return Err(self.error_at(ParseErrorKind::ExpectedNumber, start));
        }
        digits
            .parse()
            .map_err(|_| self.error_at(ParseErrorKind::ExpectedNumber, start))
    }

    /// Parse a structural step index; zero and negative values are malformed
    fn parse_index(&mut self) -> Result<u32, CfiParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            return Err(self.error_at(ParseErrorKind::NonPositiveIndex, start));
        }
        let index = self.parse_number()?;
        if index == 0 {
            return Err(self.error_at(ParseErrorKind::NonPositiveIndex, start));
        }
        Ok(index)
    }

    /// Parse a floating point number
    fn parse_float(&mut self, kind: ParseErrorKind) -> Result<f64, CfiParseError> {
        let start = self.pos;
        self.skip_if('-');
        self.take_digits();
        if self.skip_if('.') {
            self.take_digits();
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error_at(kind, start))
    }

    /// Read an assertion value up to one of `stops`, resolving `^` escapes
    fn parse_value(&mut self, stops: &[char]) -> Result<String, CfiParseError> {
        let start = self.pos;
        let mut result = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error_at(ParseErrorKind::UnclosedBracket, start)),
                Some('^') => {
                    self.advance();
                    match self.advance() {
                        Some(ch) => result.push(ch),
                        None => {
                            return Err(self.error_at(ParseErrorKind::UnclosedBracket, start))
                        }
                    }
                }
                Some(ch) if stops.contains(&ch) => return Ok(result),
                // Nested brackets not allowed without escape
                Some('[') | Some('(') | Some(')') => {
                    return Err(self.error(ParseErrorKind::InvalidAssertion))
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// Parse `[value,suffix;k=v...]` if present
    fn parse_assertion(&mut self) -> Result<Option<Assertion>, CfiParseError> {
        if !self.skip_if('[') {
            return Ok(None);
        }

        let mut assertion = Assertion::default();
        let value = self.parse_value(&[',', ';', ']'])?;
        if !value.is_empty() {
            assertion.value = Some(value);
        }

        if self.skip_if(',') {
            let suffix = self.parse_value(&[';', ']'])?;
            if !suffix.is_empty() {
                assertion.suffix = Some(suffix);
            }
        }

        while self.skip_if(';') {
            let key_pos = self.pos;
            let key = self.parse_value(&['=', ';', ']'])?;
            if key.is_empty() || !self.skip_if('=') {
                return Err(self.error_at(ParseErrorKind::InvalidAssertion, key_pos));
            }
            let value = self.parse_value(&[';', ']'])?;
            match (key.as_str(), SideBias::from_param(&value)) {
                ("s", Some(bias)) if assertion.side_bias.is_none() => {
                    assertion.side_bias = Some(bias)
                }
                _ => assertion.parameters.push((key, value)),
            }
        }

        self.expect(']')?;
        Ok(Some(assertion))
    }

    /// Parse a single `/N[assertion]!` step
    fn parse_step(&mut self) -> Result<CfiStep, CfiParseError> {
        if !self.skip_if('/') {
            return Err(self.error(ParseErrorKind::ExpectedStep));
        }

        let mut step = CfiStep::element(self.parse_index()?);

        if let Some(assertion) = self.parse_assertion()? {
            if assertion.suffix.is_some() {
                return Err(self.error(ParseErrorKind::InvalidAssertion));
            }
            step.id_assertion = assertion.value;
            step.side_bias = assertion.side_bias;
            step.parameters = assertion.parameters;
        }

        step.indirection = self.skip_if('!');
        Ok(step)
    }

    /// Parse a path (sequence of steps with optional offset)
    fn parse_path(&mut self) -> Result<CfiPath, CfiParseError> {
        let mut steps = Vec::new();

        while self.peek() == Some('/') {
            steps.push(self.parse_step()?);
        }

        let mut path = CfiPath::with_steps(steps);

        if self.skip_if(':') {
            let offset = self.parse_number()?;
            let assertion = self.parse_assertion()?.map(|a| TextAssertion {
                prefix: a.value,
                suffix: a.suffix,
                side_bias: a.side_bias,
                parameters: a.parameters,
            });
            path.character_offset = Some(CharacterOffset { offset, assertion });
        }

        if self.skip_if('~') {
            let seconds = self.parse_float(ParseErrorKind::InvalidTemporalOffset)?;
            path.temporal_offset = Some(TemporalOffset { seconds });
        }

        if self.skip_if('@') {
            let x = self.parse_float(ParseErrorKind::InvalidSpatialOffset)?;
            self.expect(':')?;
            let y = self.parse_float(ParseErrorKind::InvalidSpatialOffset)?;
            path.spatial_offset = Some(SpatialOffset { x, y });
        }

        Ok(path)
    }

    /// Parse a complete CFI
    fn parse_cfi(&mut self) -> Result<Cfi, CfiParseError> {
        if !self.skip_str("epubcfi(") {
            return Err(self.error(ParseErrorKind::MissingPrefix));
        }

        let path_start = self.pos;
        let path = self.parse_path()?;
        if path.steps.is_empty() {
            return Err(self.error_at(ParseErrorKind::ExpectedStep, path_start));
        }

        let range = if self.skip_if(',') {
            let range_start = self.pos;
            if path.has_offset() {
                return Err(self.error_at(ParseErrorKind::OffsetBeforeRange, path_start));
            }
            let start = self.parse_path()?;
            self.expect(',')?;
            let end = self.parse_path()?;
            if start.is_empty() && end.is_empty() {
                return Err(self.error_at(ParseErrorKind::EmptyRange, range_start));
            }
            for sub_path in [&path, &start, &end] {
                sub_path
                    .check_terminal_indirection(0)
                    .map_err(|_| self.error_at(ParseErrorKind::TerminalIndirection, range_start))?;
            }
            match start.compare(&end) {
                Ok(std::cmp::Ordering::Greater) => {
                    return Err(self.error_at(ParseErrorKind::InvertedRange, range_start))
                }
                Err(_) => {
                    return Err(self.error_at(ParseErrorKind::IncomparableRange, range_start))
                }
                Ok(_) => {}
            }
            Some(CfiRange { start, end })
        } else {
            path.check_terminal_indirection(0)
                .map_err(|_| self.error_at(ParseErrorKind::TerminalIndirection, path_start))?;
            None
        };

        if !self.skip_if(')') {
            return Err(self.unexpected());
        }

        Ok(Cfi { path, range })
    }
}

/// Parse a CFI string into a Cfi struct
pub fn parse(input: &str) -> Result<Cfi, CfiParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CfiParseError::new(ParseErrorKind::Empty, input, 0));
    }

    let mut parser = Parser::new(input);
    let cfi = parser.parse_cfi()?;

    // Ensure we consumed all input
    if !parser.at_end() {
        return Err(parser.unexpected());
    }

    Ok(cfi)
}

/// Parse a CFI string, returning None on failure
pub fn try_parse(input: &str) -> Option<Cfi> {
    parse(input).ok()
}

impl std::str::FromStr for Cfi {
    type Err = CfiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
