use std::fmt;

/// One source operator. Every other byte is a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `>`: step the data pointer forward.
    Right,
    /// `<`: step the data pointer back.
    Left,
    /// `+`
    Inc,
    /// `-`
    Dec,
    /// `[`
    LoopBegin,
    /// `]`
    LoopEnd,
    /// `.`
    Output,
    /// `,`
    Input,
}

impl Op {
    pub fn from_byte(b: u8) -> Option<Op> {
        Some(match b {
            b'>' => Op::Right,
            b'<' => Op::Left,
            b'+' => Op::Inc,
            b'-' => Op::Dec,
            b'[' => Op::LoopBegin,
            b']' => Op::LoopEnd,
            b'.' => Op::Output,
            b',' => Op::Input,
            _ => return None,
        })
    }
}

/// Location of a byte in the source text. Line and column are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Iterator over the operators of a source text with their positions.
pub struct Ops<'a> {
    source: &'a [u8],
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Ops<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Iterator for Ops<'_> {
    type Item = (Op, SourcePos);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&b) = self.source.get(self.offset) {
            let pos = SourcePos {
                offset: self.offset,
                line: self.line,
                column: self.column,
            };
            self.offset += 1;
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            if let Some(op) = Op::from_byte(b) {
                return Some((op, pos));
            }
        }
        None
    }
}

/// Whether `text` contains only operators and whitespace, i.e. looks like
/// program text rather than a file name.
pub fn is_program_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| Op::from_byte(b).is_some() || b.is_ascii_whitespace())
}
