//! Programmatic CFI construction
//!
//! Converts 0-based child positions into CFI's even/odd indexing so callers
//! never have to do the arithmetic themselves.

use super::error::{CfiError, Result};
use super::types::*;

/// Index of the spine element among the package's children
const SPINE_STEP: u32 = 6;

/// Builder for [`Cfi`] values
#[derive(Debug, Default, Clone)]
pub struct CfiBuilder {
    path: CfiPath,
    /// First position that had no representable index
    overflow: Option<u32>,
}

impl CfiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `/6`: the spine element of the package document
    pub fn package_step(mut self) -> Self {
        self.path.push(CfiStep::element(SPINE_STEP));
        self
    }

    /// Itemref at 0-based spine position
    pub fn spine_item(self, spine_index: u32) -> Self {
        self.element(spine_index)
    }

    /// Element child at 0-based position among element siblings
    pub fn element(self, position: u32) -> Self {
        let index = position.checked_add(1).and_then(|n| n.checked_mul(2));
        self.push_index(position, index)
    }

    /// Text run before the element at 0-based `position`
    /// (`position == element count` addresses the trailing run)
    pub fn text_node(self, position: u32) -> Self {
        let index = position.checked_mul(2).and_then(|n| n.checked_add(1));
        self.push_index(position, index)
    }

    fn push_index(mut self, position: u32, index: Option<u32>) -> Self {
        match index {
            Some(index) => self.path.push(CfiStep::element(index)),
            None => {
                self.overflow.get_or_insert(position);
            }
        }
        self
    }

    /// Attach an id assertion to the last step
    pub fn id(mut self, id: impl Into<String>) -> Self {
        if let Some(step) = self.path.steps.last_mut() {
            step.id_assertion = Some(id.into());
        }
        self
    }

    /// Mark the last step as an indirection into the referenced document
    pub fn indirection(mut self) -> Self {
        if let Some(step) = self.path.steps.last_mut() {
            step.indirection = true;
        }
        self
    }

    pub fn character_offset(mut self, offset: u32) -> Self {
        self.path.set_character_offset(offset);
        self
    }

    pub fn side_bias(mut self, bias: SideBias) -> Self {
        match self.path.character_offset {
            Some(ref mut offset) => {
                offset
                    .assertion
                    .get_or_insert_with(TextAssertion::default)
                    .side_bias = Some(bias);
            }
            None => {
                if let Some(step) = self.path.steps.last_mut() {
                    step.side_bias = Some(bias);
                }
            }
        }
        self
    }

    /// Finish the path, applying the same rules as the parser
    pub fn build(self) -> Result<Cfi> {
        let path = self.finish()?;
        if path.steps.is_empty() {
            return Err(CfiError::EmptyPath);
        }
        path.check_terminal_indirection(0)?;
        Ok(Cfi::new(path))
    }

    /// Finish as a range with the given sub-paths
    pub fn build_range(self, start: CfiPath, end: CfiPath) -> Result<Cfi> {
        Cfi::with_range(self.finish()?, start, end)
    }

    fn finish(self) -> Result<CfiPath> {
        match self.overflow {
            Some(position) => Err(CfiError::IndexOverflow { position }),
            None => Ok(self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_matches_parsed() {
        let cfi = CfiBuilder::new()
            .package_step()
            .spine_item(1)
            .indirection()
            .element(1)
            .element(0)
            .text_node(0)
            .character_offset(42)
            .build()
            .unwrap();

        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2/1:42)");
        assert_eq!(cfi, crate::cfi::parse("epubcfi(/6/4!/4/2/1:42)").unwrap());
    }

    #[test]
    fn test_builder_id_and_bias() {
        let cfi = CfiBuilder::new()
            .package_step()
            .spine_item(0)
            .id("chap01ref")
            .indirection()
            .element(1)
            .character_offset(3)
            .side_bias(SideBias::After)
            .build()
            .unwrap();

        assert_eq!(cfi.to_string(), "epubcfi(/6/2[chap01ref]!/4:3[;s=a])");
    }

    #[test]
    fn test_builder_rejects_terminal_indirection() {
        let err = CfiBuilder::new()
            .package_step()
            .spine_item(0)
            .indirection()
            .build()
            .unwrap_err();
        assert_eq!(err, CfiError::TerminalIndirection { step: 2 });

        let err = CfiBuilder::new()
            .package_step()
            .spine_item(0)
            .indirection()
            .character_offset(10)
            .build()
            .unwrap_err();
        assert_eq!(err, CfiError::TerminalIndirection { step: 2 });
    }

    #[test]
    fn test_builder_rejects_unrepresentable_positions() {
        let err = CfiBuilder::new()
            .package_step()
            .element(u32::MAX)
            .build()
            .unwrap_err();
        assert_eq!(err, CfiError::IndexOverflow { position: u32::MAX });

        let err = CfiBuilder::new()
            .package_step()
            .text_node(u32::MAX / 2 + 1)
            .element(0)
            .build()
            .unwrap_err();
        assert_eq!(err, CfiError::IndexOverflow { position: u32::MAX / 2 + 1 });

        let err = CfiBuilder::new()
            .element(u32::MAX / 2)
            .build_range(CfiPath::with_steps(vec![CfiStep::element(2)]), CfiPath::new())
            .unwrap_err();
        assert_eq!(err, CfiError::IndexOverflow { position: u32::MAX / 2 });

        let cfi = CfiBuilder::new()
            .element(u32::MAX / 2 - 1)
            .text_node(u32::MAX / 2)
            .build()
            .unwrap();
        assert_eq!(cfi.path.steps[0].index, u32::MAX - 1);
        assert_eq!(cfi.path.steps[1].index, u32::MAX);
    }

    #[test]
    fn test_builder_rejects_empty() {
        assert_eq!(CfiBuilder::new().build().unwrap_err(), CfiError::EmptyPath);
    }
}
