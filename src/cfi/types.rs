//! CFI (Canonical Fragment Identifier) types for EPUB
//!
//! EPUB CFI is a standardized way to reference specific locations within EPUB publications.
//! Format: epubcfi(/6/4[chap01ref]!/4/2/22/3:268)
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{CfiError, Result};

/// Characters that must be `^`-escaped inside assertions
pub(crate) const SPECIAL_CHARS: &[char] = &['^', '[', ']', '(', ')', ',', ';', '='];

/// A complete EPUB CFI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfi {
    /// The path components of this CFI (the shared prefix for a range)
    pub path: CfiPath,
    /// Optional range end (for selections)
    pub range: Option<CfiRange>,
}

/// A CFI path (sequence of steps plus an optional terminal offset)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiPath {
    /// Steps in this path
    pub steps: Vec<CfiStep>,
    /// Optional character offset at the end
    pub character_offset: Option<CharacterOffset>,
    /// Optional temporal offset (for audio/video)
    pub temporal_offset: Option<TemporalOffset>,
    /// Optional spatial offset (for images)
    pub spatial_offset: Option<SpatialOffset>,
}

/// A CFI range (for text selections)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiRange {
    /// Start of the range (relative path from the shared prefix)
    pub start: CfiPath,
    /// End of the range (relative path from the shared prefix)
    pub end: CfiPath,
}

/// A single step in a CFI path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiStep {
    /// 1-based structural index (even = element, odd = text)
    pub index: u32,
    /// Step crosses into the document referenced by this node (`!`)
    pub indirection: bool,
    /// Optional ID assertion [id]
    pub id_assertion: Option<String>,
    /// Optional side bias `;s=b` / `;s=a`
    pub side_bias: Option<SideBias>,
    /// Any other `;key=value` parameters, kept for round-tripping
    pub parameters: Vec<(String, String)>,
}

/// Side of a boundary position a location leans towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideBias {
    Before,
    After,
}

/// Text location assertion for disambiguation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAssertion {
    /// Text before the location
    pub prefix: Option<String>,
    /// Text after the location
    pub suffix: Option<String>,
    /// Side bias `;s=b` / `;s=a`
    pub side_bias: Option<SideBias>,
    /// Additional parameters
    pub parameters: Vec<(String, String)>,
}

/// Character offset within a text node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterOffset {
    /// The character index (0-based)
    pub offset: u32,
    /// Optional text assertion for validation
    pub assertion: Option<TextAssertion>,
}

/// Temporal offset for audio/video (in seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalOffset {
    /// Time in seconds
    pub seconds: f64,
}

impl Eq for TemporalOffset {}

/// Spatial offset for images (percentage-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialOffset {
    /// X coordinate as percentage (0.0-100.0)
    pub x: f64,
    /// Y coordinate as percentage (0.0-100.0)
    pub y: f64,
}

impl Eq for SpatialOffset {}

impl SideBias {
    pub(crate) fn from_param(value: &str) -> Option<Self> {
        match value {
            "b" => Some(SideBias::Before),
            "a" => Some(SideBias::After),
            _ => None,
        }
    }

    fn as_param(self) -> &'static str {
        match self {
            SideBias::Before => "b",
            SideBias::After => "a",
        }
    }
}

impl Cfi {
    /// Create a new CFI from a path
    pub fn new(path: CfiPath) -> Self {
        Self { path, range: None }
    }

    /// Create a range CFI from a shared prefix and two sub-paths.
    ///
    /// Fails if `end` sorts before `start`, or if the two cannot be ordered.
    /// None of the three paths may end in an indirection, and the prefix
    /// carries no offset.
    pub fn with_range(path: CfiPath, start: CfiPath, end: CfiPath) -> Result<Self> {
        if path.steps.is_empty() {
            return Err(CfiError::EmptyPath);
        }
        if path.has_offset() {
            return Err(CfiError::OffsetBeforeRange {
                prefix: path.to_string(),
            });
        }
        path.check_terminal_indirection(0)?;
        start.check_terminal_indirection(path.steps.len())?;
        end.check_terminal_indirection(path.steps.len())?;
        if start.compare(&end)? == std::cmp::Ordering::Greater {
            return Err(CfiError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            path,
            range: Some(CfiRange { start, end }),
        })
    }

    /// Check if this CFI represents a range (text selection)
    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }

    /// Absolute start location: the prefix joined with the range start
    pub fn start(&self) -> CfiPath {
        match self.range {
            Some(ref range) => self.path.join(&range.start),
            None => self.path.clone(),
        }
    }

    /// Absolute end location: the prefix joined with the range end
    pub fn end(&self) -> CfiPath {
        match self.range {
            Some(ref range) => self.path.join(&range.end),
            None => self.path.clone(),
        }
    }

    /// Get the spine index if this CFI references a spine item
    /// The spine index is typically at position 2 in the path (after /6/N)
    pub fn spine_index(&self) -> Option<u32> {
        // /6 refers to the spine element in the package document,
        // /N is 2*(spine_index+1)
        match self.path.steps.as_slice() {
            [first, second, ..] if first.index == 6 && second.index % 2 == 0 => {
                Some((second.index / 2).saturating_sub(1))
            }
            _ => None,
        }
    }
}

impl CfiPath {
    /// Create an empty path
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a path with steps
    pub fn with_steps(steps: Vec<CfiStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Add a step to the path
    pub fn push(&mut self, step: CfiStep) {
        self.steps.push(step);
    }

    /// Set the character offset
    pub fn set_character_offset(&mut self, offset: u32) {
        self.character_offset = Some(CharacterOffset {
            offset,
            assertion: None,
        });
    }

    /// True when the path has neither steps nor a terminal offset
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && !self.has_offset()
    }

    /// True when any terminal offset is present
    pub fn has_offset(&self) -> bool {
        self.character_offset.is_some()
            || self.temporal_offset.is_some()
            || self.spatial_offset.is_some()
    }

    /// Fails when the last step is an indirection; `base` is the number of
    /// steps preceding this path, for error reporting
    pub fn check_terminal_indirection(&self, base: usize) -> Result<()> {
        match self.steps.last() {
            Some(step) if step.indirection => Err(CfiError::TerminalIndirection {
                step: base + self.steps.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Side bias of the terminus: the offset assertion wins over the last step
    pub fn side_bias(&self) -> Option<SideBias> {
        self.character_offset
            .as_ref()
            .and_then(|o| o.assertion.as_ref())
            .and_then(|a| a.side_bias)
            .or_else(|| self.steps.last().and_then(|s| s.side_bias))
    }

    /// Steps of `self` followed by `tail`; the terminus comes from `tail`
    pub fn join(&self, tail: &CfiPath) -> CfiPath {
        let mut steps = self.steps.clone();
        steps.extend(tail.steps.iter().cloned());
        CfiPath {
            steps,
            character_offset: tail.character_offset.clone(),
            temporal_offset: tail.temporal_offset.clone(),
            spatial_offset: tail.spatial_offset.clone(),
        }
    }

    /// Everything after `position` steps, terminus included
    pub fn suffix(&self, position: usize) -> CfiPath {
        CfiPath {
            steps: self.steps.get(position..).unwrap_or_default().to_vec(),
            character_offset: self.character_offset.clone(),
            temporal_offset: self.temporal_offset.clone(),
            spatial_offset: self.spatial_offset.clone(),
        }
    }
}

impl CfiStep {
    /// Create an element step
    pub fn element(index: u32) -> Self {
        Self {
            index,
            indirection: false,
            id_assertion: None,
            side_bias: None,
            parameters: Vec::new(),
        }
    }

    /// Create an element step with ID assertion
    pub fn element_with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            id_assertion: Some(id.into()),
            ..Self::element(index)
        }
    }

    /// Mark this step as crossing into the referenced document
    pub fn indirected(mut self) -> Self {
        self.indirection = true;
        self
    }

    /// Check if this step points at an element (even index)
    pub fn is_element(&self) -> bool {
        self.index % 2 == 0
    }
}

// Display implementations for serialization

/// Write `value` with CFI special characters escaped by `^`
pub(crate) fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if SPECIAL_CHARS.contains(&ch) {
            write!(f, "^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}

fn write_parameters(
    f: &mut fmt::Formatter<'_>,
    side_bias: Option<SideBias>,
    parameters: &[(String, String)],
) -> fmt::Result {
    if let Some(bias) = side_bias {
        write!(f, ";s={}", bias.as_param())?;
    }
    for (key, value) in parameters {
        write!(f, ";")?;
        write_escaped(f, key)?;
        write!(f, "=")?;
        write_escaped(f, value)?;
    }
    Ok(())
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({}", self.path)?;
        if let Some(ref range) = self.range {
            write!(f, ",{},{}", range.start, range.end)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CfiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(ref offset) = self.character_offset {
            write!(f, ":{}", offset.offset)?;
            if let Some(ref assertion) = offset.assertion {
                write!(f, "{}", assertion)?;
            }
        }
        if let Some(ref temporal) = self.temporal_offset {
            write!(f, "~{}", temporal.seconds)?;
        }
        if let Some(ref spatial) = self.spatial_offset {
            write!(f, "@{}:{}", spatial.x, spatial.y)?;
        }
        Ok(())
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.index)?;
        if self.id_assertion.is_some() || self.side_bias.is_some() || !self.parameters.is_empty() {
            write!(f, "[")?;
            if let Some(ref id) = self.id_assertion {
                write_escaped(f, id)?;
            }
            write_parameters(f, self.side_bias, &self.parameters)?;
            write!(f, "]")?;
        }
        if self.indirection {
            write!(f, "!")?;
        }
        Ok(())
    }
}

impl fmt::Display for TextAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if let Some(ref prefix) = self.prefix {
            write_escaped(f, prefix)?;
        }
        if let Some(ref suffix) = self.suffix {
            write!(f, ",")?;
            write_escaped(f, suffix)?;
        }
        write_parameters(f, self.side_bias, &self.parameters)?;
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_cfi_display() {
        let cfi = Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element(4).indirected(),
            CfiStep::element(4),
            CfiStep::element(2),
        ]));

        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2)");
    }

    #[test]
    fn test_cfi_with_id_assertion() {
        let cfi = Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element_with_id(4, "chapter1").indirected(),
            CfiStep::element(4),
        ]));

        assert_eq!(cfi.to_string(), "epubcfi(/6/4[chapter1]!/4)");
    }

    #[test]
    fn test_cfi_with_character_offset() {
        let mut path = CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element(4).indirected(),
            CfiStep::element(4),
            CfiStep::element(2),
            CfiStep::element(1),
        ]);
        path.set_character_offset(42);

        let cfi = Cfi::new(path);
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2/1:42)");
    }

    #[test]
    fn test_escaped_assertion_display() {
        let step = CfiStep::element_with_id(4, "a]b,c");
        assert_eq!(step.to_string(), "/4[a^]b^,c]");
    }

    #[test]
    fn test_text_assertion_display() {
        let assertion = TextAssertion {
            prefix: Some("yes".to_string()),
            suffix: None,
            side_bias: Some(SideBias::After),
            parameters: Vec::new(),
        };
        assert_eq!(assertion.to_string(), "[yes;s=a]");
    }

    #[test]
    fn test_spine_index_extraction() {
        // /6/4 means spine item at index 1 (4/2 - 1 = 1)
        let cfi = Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element(4).indirected(),
            CfiStep::element(4),
        ]));

        assert_eq!(cfi.spine_index(), Some(1));

        // /6/2 means spine item at index 0
        let cfi2 = Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(6),
            CfiStep::element(2),
        ]));

        assert_eq!(cfi2.spine_index(), Some(0));
    }

    #[test]
    fn test_range_start_end_absolute() {
        let prefix = CfiPath::with_steps(vec![CfiStep::element(4)]);
        let mut start = CfiPath::with_steps(vec![CfiStep::element(2), CfiStep::element(1)]);
        start.set_character_offset(1);
        let mut end = CfiPath::with_steps(vec![CfiStep::element(2), CfiStep::element(1)]);
        end.set_character_offset(5);

        let cfi = Cfi::with_range(prefix, start, end).unwrap();
        assert_eq!(cfi.start().to_string(), "/4/2/1:1");
        assert_eq!(cfi.end().to_string(), "/4/2/1:5");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let prefix = CfiPath::with_steps(vec![CfiStep::element(4)]);
        let start = CfiPath::with_steps(vec![CfiStep::element(6)]);
        let end = CfiPath::with_steps(vec![CfiStep::element(2)]);

        let err = Cfi::with_range(prefix, start, end).unwrap_err();
        assert!(matches!(err, CfiError::InvertedRange { .. }));
    }

    #[test]
    fn test_range_rejects_unrenderable_prefix() {
        let start = CfiPath::with_steps(vec![CfiStep::element(2)]);
        let end = CfiPath::with_steps(vec![CfiStep::element(4)]);

        let prefix = CfiPath::with_steps(vec![CfiStep::element(6), CfiStep::element(4).indirected()]);
        let err = Cfi::with_range(prefix, start.clone(), end.clone()).unwrap_err();
        assert_eq!(err, CfiError::TerminalIndirection { step: 2 });

        let mut prefix = CfiPath::with_steps(vec![CfiStep::element(6)]);
        prefix.set_character_offset(3);
        let err = Cfi::with_range(prefix, start.clone(), end).unwrap_err();
        assert!(matches!(err, CfiError::OffsetBeforeRange { .. }));

        let prefix = CfiPath::with_steps(vec![CfiStep::element(6)]);
        let end = CfiPath::with_steps(vec![CfiStep::element(4).indirected()]);
        let err = Cfi::with_range(prefix, start, end).unwrap_err();
        assert_eq!(err, CfiError::TerminalIndirection { step: 2 });
    }
}
