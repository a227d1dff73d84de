use std::path::Path;

use log::debug;

use super::lexer::{Token, TokenKind};
use crate::shell::error::ShellError;

/// Checks token ordering and rewrites context-dependent tokens in place.
///
/// On success the sequence only contains words, `(`, `)`, redirections,
/// `|`, `&&`, `||`, `;` (a sequence operator inside a subshell) and
/// newlines (one newline separates commands of the same tree, two or
/// more start a new top-level tree).
pub fn validate(tokens: &mut Vec<Token>) -> Result<(), ShellError> {
    let input = std::mem::take(tokens);
    let last_line = input.last().map_or(1, |t| t.line);
    let mut out: Vec<Token> = Vec::with_capacity(input.len());
    let mut depth = 0usize;
    let mut i = 0;

    while i < input.len() {
        let token = &input[i];
        let line = token.line;
        let next = input.get(i + 1).map(|t| &t.kind);
        let prev = out.last().map(|t| &t.kind);

        match &token.kind {
            TokenKind::Unknown(c) => {
                return Err(ShellError::Lexical { line, found: *c });
            }

            TokenKind::Word(_) => {
                if prev == Some(&TokenKind::RightParen) {
                    return Err(ShellError::syntax(line, "unexpected word after ')'"));
                }
                out.push(token.clone());
            }

            TokenKind::Semicolon => {
                if prev.is_none() {
                    return Err(ShellError::syntax(line, "';' cannot start a command"));
                }
                if next == Some(&TokenKind::Semicolon) {
                    return Err(ShellError::syntax(
                        line,
                        "semicolons cannot appear consecutively",
                    ));
                }
                if !prev.is_some_and(TokenKind::ends_command) {
                    return Err(ShellError::syntax(line, "';' must follow a command"));
                }
                match first_meaningful(&input[i + 1..]) {
                    // 末尾或右括号前的分号直接丢弃
                    None | Some(TokenKind::RightParen) => {}
                    Some(TokenKind::Word(_)) | Some(TokenKind::LeftParen) => {
                        let kind = if depth == 0 {
                            TokenKind::Newline
                        } else {
                            TokenKind::Semicolon
                        };
                        out.push(Token::new(kind, line));
                    }
                    Some(other) => {
                        return Err(ShellError::syntax(
                            line,
                            format!("unexpected '{}' after ';'", other),
                        ));
                    }
                }
            }

            TokenKind::Newline => {
                let mut end = i;
                while input.get(end).map(|t| &t.kind) == Some(&TokenKind::Newline) {
                    end += 1;
                }
                let run = end - i;

                if prev.is_some_and(TokenKind::is_redirect) {
                    return Err(ShellError::syntax(
                        line,
                        "newline cannot follow a redirection",
                    ));
                }
                let transparent = match prev {
                    None | Some(TokenKind::LeftParen) => true,
                    Some(kind) => kind.is_operator(),
                };
                match input.get(end).map(|t| &t.kind) {
                    None | Some(TokenKind::RightParen) => {}
                    Some(TokenKind::Word(_)) | Some(TokenKind::LeftParen) => {
                        if transparent {
                            // 运算符之后的换行不起作用
                        } else if depth > 0 {
                            out.push(Token::new(TokenKind::Semicolon, line));
                        } else {
                            for _ in 0..run.min(2) {
                                out.push(Token::new(TokenKind::Newline, line));
                            }
                        }
                    }
                    Some(other) => {
                        return Err(ShellError::syntax(
                            input.get(end).map_or(line, |t| t.line),
                            format!("newline cannot be followed by '{}'", other),
                        ));
                    }
                }
                i = end;
                continue;
            }

            TokenKind::LeftRedirect | TokenKind::RightRedirect => {
                if !prev.is_some_and(TokenKind::ends_command) {
                    return Err(ShellError::syntax(
                        line,
                        format!("'{}' must follow a command", token.kind),
                    ));
                }
                let target = match next {
                    Some(TokenKind::Word(target)) => target,
                    _ => {
                        return Err(ShellError::syntax(
                            line,
                            format!("'{}' must be followed by a file name", token.kind),
                        ));
                    }
                };
                if let Some(TokenKind::Word(extra)) = input.get(i + 2).map(|t| &t.kind) {
                    return Err(ShellError::syntax(
                        line,
                        format!("unexpected word '{}' after redirection target", extra),
                    ));
                }
                // 输入文件在执行时才真正打开，这里只做提示
                if token.kind == TokenKind::LeftRedirect && !Path::new(target).exists() {
                    debug!("第 {} 行: 输入文件 {} 目前不存在", line, target);
                }
                out.push(token.clone());
            }

            TokenKind::LeftParen => {
                if prev.is_some_and(TokenKind::ends_command) {
                    return Err(ShellError::syntax(line, "'(' cannot follow a command"));
                }
                depth += 1;
                out.push(token.clone());
            }

            TokenKind::RightParen => {
                if depth == 0 {
                    return Err(ShellError::Unbalanced { line });
                }
                if !prev.is_some_and(TokenKind::ends_command) {
                    return Err(ShellError::syntax(line, "empty or unfinished subshell"));
                }
                depth -= 1;
                out.push(token.clone());
            }

            TokenKind::Pipe | TokenKind::And | TokenKind::Or => {
                if !prev.is_some_and(TokenKind::ends_command) {
                    return Err(ShellError::syntax(
                        line,
                        format!("'{}' must be preceded by a command", token.kind),
                    ));
                }
                match first_meaningful(&input[i + 1..]) {
                    Some(TokenKind::Word(_)) | Some(TokenKind::LeftParen) => {}
                    None => {
                        return Err(ShellError::syntax(
                            line,
                            format!("end of file reached after '{}'", token.kind),
                        ));
                    }
                    Some(other) => {
                        return Err(ShellError::syntax(
                            line,
                            format!("'{}' cannot be followed by '{}'", token.kind, other),
                        ));
                    }
                }
                out.push(token.clone());
            }
        }
        i += 1;
    }

    if depth > 0 {
        return Err(ShellError::Unbalanced { line: last_line });
    }
    if out.is_empty() {
        return Err(ShellError::Empty);
    }

    debug!("语法检查通过，剩余 {} 个 token", out.len());
    *tokens = out;
    Ok(())
}

fn first_meaningful(tokens: &[Token]) -> Option<&TokenKind> {
    tokens
        .iter()
        .map(|t| &t.kind)
        .find(|kind| **kind != TokenKind::Newline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::lexer::tokenize;
    use crate::shell::source::SliceSource;

    fn check(input: &str) -> Result<Vec<TokenKind>, ShellError> {
        let mut tokens = tokenize(SliceSource::new(input));
        validate(&mut tokens)?;
        Ok(tokens.into_iter().map(|t| t.kind).collect())
    }

    fn word(w: &str) -> TokenKind {
        TokenKind::Word(w.to_string())
    }

    fn syntax_line(input: &str) -> usize {
        match check(input) {
            Err(ShellError::Syntax { line, .. }) => line,
            other => panic!("expected a syntax error for {:?}, got {:?}", input, other),
        }
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_semicolon_becomes_separator_outside_subshell() {
        assert_eq!(
            check("a ; b").unwrap(),
            vec![word("a"), TokenKind::Newline, word("b")]
        );
        assert_eq!(
            check("(a ; b)").unwrap(),
            vec![
                TokenKind::LeftParen,
                word("a"),
                TokenKind::Semicolon,
                word("b"),
                TokenKind::RightParen
            ]
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_trailing_separators_are_dropped() {
        assert_eq!(check("a;").unwrap(), vec![word("a")]);
        assert_eq!(check("a\n\n\n").unwrap(), vec![word("a")]);
        assert_eq!(
            check("(a;)").unwrap(),
            vec![TokenKind::LeftParen, word("a"), TokenKind::RightParen]
        );
        assert_eq!(
            check("(a;\n)").unwrap(),
            vec![TokenKind::LeftParen, word("a"), TokenKind::RightParen]
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_newline_rules() {
        // 运算符后的换行被忽略
        assert_eq!(
            check("a &&\nb").unwrap(),
            vec![word("a"), TokenKind::And, word("b")]
        );
        // 多个连续换行折叠成两个
        assert_eq!(
            check("a\n\n\n\nb").unwrap(),
            vec![word("a"), TokenKind::Newline, TokenKind::Newline, word("b")]
        );
        // 子 shell 内的换行变成分号
        assert_eq!(
            check("(\na\nb\n)").unwrap(),
            vec![
                TokenKind::LeftParen,
                word("a"),
                TokenKind::Semicolon,
                word("b"),
                TokenKind::RightParen
            ]
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirections() {
        assert_eq!(
            check("a < in > out").unwrap(),
            vec![
                word("a"),
                TokenKind::LeftRedirect,
                word("in"),
                TokenKind::RightRedirect,
                word("out")
            ]
        );
        // 输入文件缺失不是语法错误
        assert!(check("cat < definitely-missing-file").is_ok());
        assert_eq!(syntax_line("a >"), 1);
        assert_eq!(syntax_line("< in a"), 1);
        assert_eq!(syntax_line("a >\nout"), 1);
        assert_eq!(syntax_line("a\n> out"), 2);
        assert_eq!(syntax_line("a > out b"), 1);
        assert_eq!(syntax_line("a && > out"), 1);
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(syntax_line(";;"), 1);
        assert_eq!(syntax_line("a ;; b"), 1);
        assert_eq!(syntax_line("| a"), 1);
        assert_eq!(syntax_line("&& a"), 1);
        assert_eq!(syntax_line("a\n\n|| b"), 3);
        assert_eq!(syntax_line("a || | b"), 1);
        assert_eq!(syntax_line("a ||\n\n"), 1);
        assert_eq!(syntax_line("a\nb |"), 2);
        assert_eq!(syntax_line("a (b)"), 1);
        assert_eq!(syntax_line("(a) b"), 1);
        assert_eq!(syntax_line("()"), 1);
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(matches!(check("("), Err(ShellError::Unbalanced { line: 1 })));
        assert!(matches!(
            check("(a\nb"),
            Err(ShellError::Unbalanced { line: 2 })
        ));
        assert!(matches!(check("a )"), Err(ShellError::Unbalanced { line: 1 })));
    }

    #[test]
    fn test_unknown_token_is_lexical_error() {
        assert!(matches!(
            check("a\nb & c"),
            Err(ShellError::Lexical { line: 2, found: '&' })
        ));
    }

    #[test]
    fn test_empty_script() {
        assert!(matches!(check(""), Err(ShellError::Empty)));
        assert!(matches!(check("\n# nothing\n"), Err(ShellError::Empty)));
    }
}
