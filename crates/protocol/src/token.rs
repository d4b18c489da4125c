//! Line token classifier
//!
//! Classifies one input line as a scope delimiter or a command. The
//! classifier is stateless and total: every non-empty line maps to
//! exactly one `Token`. Empty lines are filtered upstream by
//! `Pipeline::receive` and never reach it.

/// Character opening a delimiter scope.
pub const OPEN_DELIMITER: char = '{';

/// Character closing a delimiter scope.
pub const CLOSE_DELIMITER: char = '}';

/// Classification of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Line contains the open delimiter character.
    ScopeOpen,
    /// Line contains the close delimiter character (and no open).
    ScopeClose,
    /// Plain command carrying the full line text.
    Command(&'a str),
}

/// Classify a single line.
///
/// A line containing `{` anywhere is `ScopeOpen`; otherwise a line
/// containing `}` is `ScopeClose`; otherwise it is a `Command`. Open
/// precedence on mixed lines is an inherited edge case - callers should
/// not send lines mixing both delimiters.
pub fn classify(line: &str) -> Token<'_> {
    if line.contains(OPEN_DELIMITER) {
        Token::ScopeOpen
    } else if line.contains(CLOSE_DELIMITER) {
        Token::ScopeClose
    } else {
        Token::Command(line)
    }
}
