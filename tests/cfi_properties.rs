//! Property tests for CFI rendering, parsing and ordering

use std::cmp::Ordering;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

use epub_engine::cfi::{parse, Cfi, CfiPath, CfiStep, SideBias, TextAssertion};

const ID_CHARS: &[char] = &[
    'a', 'b', 'c', 'x', 'y', 'z', '0', '7', '-', '_', '.', ' ', '^', '[', ']', '(', ')', ',', ';',
    '=',
];

fn id(g: &mut Gen) -> String {
    let len = 1 + usize::arbitrary(g) % 8;
    (0..len).map(|_| *g.choose(ID_CHARS).unwrap()).collect()
}

fn maybe<T>(g: &mut Gen, f: impl FnOnce(&mut Gen) -> T) -> Option<T> {
    if bool::arbitrary(g) {
        Some(f(g))
    } else {
        None
    }
}

fn side_bias(g: &mut Gen) -> SideBias {
    *g.choose(&[SideBias::Before, SideBias::After]).unwrap()
}

fn step(g: &mut Gen, indirection: bool) -> CfiStep {
    CfiStep {
        index: 1 + u32::arbitrary(g) % 40,
        indirection,
        id_assertion: maybe(g, id),
        side_bias: maybe(g, side_bias),
        parameters: Vec::new(),
    }
}

/// Path of 1..=5 steps; only inner steps may cross an indirection
fn path(g: &mut Gen, allow_indirection: bool) -> CfiPath {
    let len = 1 + usize::arbitrary(g) % 5;
    let steps = (0..len)
        .map(|i| {
            let indirection = allow_indirection && i + 1 < len && u8::arbitrary(g) % 4 == 0;
            step(g, indirection)
        })
        .collect();
    let mut path = CfiPath::with_steps(steps);
    if bool::arbitrary(g) {
        path.set_character_offset(u32::arbitrary(g) % 500);
        if let Some(ref mut offset) = path.character_offset {
            offset.assertion = maybe(g, |g| TextAssertion {
                prefix: Some(id(g)),
                suffix: maybe(g, id),
                side_bias: maybe(g, side_bias),
                parameters: Vec::new(),
            });
        }
    }
    path
}

#[derive(Debug, Clone)]
struct ArbCfi(Cfi);

impl Arbitrary for ArbCfi {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbCfi(Cfi::new(path(g, true)))
    }
}

#[derive(Debug, Clone)]
struct ArbRange {
    prefix: CfiPath,
    start: CfiPath,
    end: CfiPath,
}

impl Arbitrary for ArbRange {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut prefix = path(g, true);
        prefix.character_offset = None;
        ArbRange {
            prefix,
            start: path(g, false),
            end: path(g, false),
        }
    }
}

#[derive(Debug, Clone)]
struct ArbPath(CfiPath);

impl Arbitrary for ArbPath {
    fn arbitrary(g: &mut Gen) -> Self {
        ArbPath(path(g, true))
    }
}

#[quickcheck]
fn test_render_then_parse_is_identity(cfi: ArbCfi) -> bool {
    let rendered = cfi.0.to_string();
    parse(&rendered).map(|parsed| parsed == cfi.0).unwrap_or(false)
}

#[quickcheck]
fn test_range_accepted_iff_ordered(range: ArbRange) -> bool {
    let ordered = range.start.compare(&range.end).unwrap() != Ordering::Greater;
    match Cfi::with_range(range.prefix, range.start, range.end) {
        Ok(cfi) => ordered && parse(&cfi.to_string()).map(|p| p == cfi).unwrap_or(false),
        Err(_) => !ordered,
    }
}

#[quickcheck]
fn test_compare_is_antisymmetric(a: ArbPath, b: ArbPath) -> bool {
    match (a.0.compare(&b.0), b.0.compare(&a.0)) {
        (Ok(x), Ok(y)) => x == y.reverse(),
        (Err(_), Err(_)) => true,
        _ => false,
    }
}

#[quickcheck]
fn test_compare_is_reflexive(a: ArbPath) -> bool {
    matches!(a.0.compare(&a.0), Ok(Ordering::Equal))
}
