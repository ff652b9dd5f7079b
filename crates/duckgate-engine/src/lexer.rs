//! Minimal SQL lexical scanner.
//!
//! Classifies every character of a SQL fragment as code, quoted text or
//! comment. That is all the named-parameter rewriter and the filter
//! containment check need: neither may react to a `$`, `;` or `--` that
//! appears inside a string literal or a quoted identifier.

/// Lexical region a character belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Code,
    /// `'...'` string literal, quotes included.
    Literal,
    /// `"..."` quoted identifier, quotes included.
    QuotedIdent,
    /// `-- ...` up to and including the newline.
    LineComment,
    /// `/* ... */`, delimiters included.
    BlockComment,
}

/// One scanned character.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Token {
    pub offset: usize,
    pub ch: char,
    pub region: Region,
}

/// Result of scanning a whole fragment.
pub(crate) struct Scan {
    pub tokens: Vec<Token>,
    /// Region in effect after the last character; anything but `Code` or
    /// `LineComment` means an unterminated literal or comment.
    pub trailing: Region,
}

pub(crate) fn scan(sql: &str) -> Scan {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut region = Region::Code;
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match region {
            Region::Code => match (ch, next) {
                ('\'', _) => {
                    tokens.push(Token { offset, ch, region: Region::Literal });
                    region = Region::Literal;
                }
                ('"', _) => {
                    tokens.push(Token { offset, ch, region: Region::QuotedIdent });
                    region = Region::QuotedIdent;
                }
                ('-', Some('-')) => {
                    tokens.push(Token { offset, ch, region: Region::LineComment });
                    region = Region::LineComment;
                }
                ('/', Some('*')) => {
                    tokens.push(Token { offset, ch, region: Region::BlockComment });
                    tokens.push(Token {
                        offset: chars[i + 1].0,
                        ch: '*',
                        region: Region::BlockComment,
                    });
                    region = Region::BlockComment;
                    i += 1;
                }
                _ => tokens.push(Token { offset, ch, region: Region::Code }),
            },
            Region::Literal | Region::QuotedIdent => {
                tokens.push(Token { offset, ch, region });
                let closing = if region == Region::Literal { '\'' } else { '"' };
                if ch == closing {
                    region = Region::Code;
                }
            }
            Region::LineComment => {
                tokens.push(Token { offset, ch, region });
                if ch == '\n' {
                    region = Region::Code;
                }
            }
            Region::BlockComment => {
                tokens.push(Token { offset, ch, region });
                if ch == '*' && next == Some('/') {
                    tokens.push(Token {
                        offset: chars[i + 1].0,
                        ch: '/',
                        region,
                    });
                    region = Region::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    Scan {
        tokens,
        trailing: region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_text(sql: &str) -> String {
        scan(sql)
            .tokens
            .iter()
            .filter(|t| t.region == Region::Code)
            .map(|t| t.ch)
            .collect()
    }

    #[test]
    fn test_literals_and_comments_are_not_code() {
        let sql = "SELECT 'a;b', \"c--d\" /* x; */ FROM t -- trailing;\nWHERE 1";
        assert_eq!(code_text(sql), "SELECT ,   FROM t WHERE 1");
    }

    #[test]
    fn test_escaped_quote_stays_in_literal() {
        let scan = scan("'it''s'");
        assert!(scan.tokens.iter().all(|t| t.region == Region::Literal));
        assert_eq!(scan.trailing, Region::Code);
    }

    #[test]
    fn test_unterminated_literal_is_reported() {
        assert_eq!(scan("name = 'abc").trailing, Region::Literal);
        assert_eq!(scan("a /* open").trailing, Region::BlockComment);
        assert_eq!(scan("a -- fine").trailing, Region::LineComment);
    }
}
