use std::iter::Peekable;
use std::vec::IntoIter;

use log::debug;

use super::ast::{Command, Operator, RedirectOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::validator::validate;
use crate::shell::error::ShellError;
use crate::shell::source::ByteSource;

/// One entry of the flat command stream that sits between the validated
/// tokens and the finished trees.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Simple(Vec<String>),
    Operator(Operator),
    LeftParen,
    RightParen,
    Redirect(RedirectOp, String),
    Newline,
    NewTree,
}

/// Operator stack frames; `(` opens a scope the reductions stop at.
#[derive(Debug, Clone, Copy)]
enum Frame {
    Operator(Operator),
    Paren,
}

pub struct Parser {
    tokens: Vec<Token>,
}

impl Parser {
    pub fn new<S: ByteSource>(source: S) -> Self {
        Parser {
            tokens: tokenize(source),
        }
    }

    /// Validates the tokens and builds the forest of top-level trees.
    pub fn parse(mut self) -> Result<Vec<Command>, ShellError> {
        validate(&mut self.tokens)?;
        let entries = resolve_newlines(flatten(self.tokens));
        let forest = reduce(entries)?;
        debug!("语法树构建完成，共 {} 棵命令树", forest.len());
        Ok(forest)
    }
}

pub fn parse<S: ByteSource>(source: S) -> Result<Vec<Command>, ShellError> {
    Parser::new(source).parse()
}

// 第一步：把连续的 word 合并成一个简单命令，其余 token 各自成为一项
fn flatten(tokens: Vec<Token>) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(tokens.len());
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        let entry = match token.kind {
            TokenKind::Word(first) => {
                let mut words = vec![first];
                while let Some(word) = next_word(&mut tokens) {
                    words.push(word);
                }
                Entry::Simple(words)
            }
            TokenKind::LeftRedirect => {
                Entry::Redirect(RedirectOp::Input, next_word(&mut tokens).unwrap_or_default())
            }
            TokenKind::RightRedirect => {
                Entry::Redirect(RedirectOp::Output, next_word(&mut tokens).unwrap_or_default())
            }
            TokenKind::Pipe => Entry::Operator(Operator::Pipe),
            TokenKind::And => Entry::Operator(Operator::And),
            TokenKind::Or => Entry::Operator(Operator::Or),
            TokenKind::Semicolon => Entry::Operator(Operator::Sequence),
            TokenKind::LeftParen => Entry::LeftParen,
            TokenKind::RightParen => Entry::RightParen,
            TokenKind::Newline => Entry::Newline,
            // 校验阶段已经拒绝了未知字符
            TokenKind::Unknown(_) => continue,
        };
        entries.push(entry);
    }
    entries
}

fn next_word(tokens: &mut Peekable<IntoIter<Token>>) -> Option<String> {
    match tokens.next_if(|t| matches!(t.kind, TokenKind::Word(_)))?.kind {
        TokenKind::Word(word) => Some(word),
        _ => None,
    }
}

// 第二步：换行要么被忽略，要么变成顺序运算符，两个以上则开始一棵新树
fn resolve_newlines(entries: Vec<Entry>) -> Vec<Entry> {
    let mut resolved: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut entries = entries.into_iter().peekable();

    while let Some(entry) = entries.next() {
        if entry != Entry::Newline {
            resolved.push(entry);
            continue;
        }

        let mut run = 1;
        while entries.peek() == Some(&Entry::Newline) {
            entries.next();
            run += 1;
        }

        let after_operator = matches!(
            resolved.last(),
            None | Some(Entry::Operator(_)) | Some(Entry::LeftParen) | Some(Entry::NewTree)
        );
        if after_operator || entries.peek().is_none() {
            continue;
        }
        resolved.push(if run >= 2 {
            Entry::NewTree
        } else {
            Entry::Operator(Operator::Sequence)
        });
    }
    resolved
}

/// Operand and operator stacks of the precedence reduction.
#[derive(Default)]
struct Reducer {
    operands: Vec<Command>,
    operators: Vec<Frame>,
}

impl Reducer {
    fn pop_operand(&mut self) -> Result<Command, ShellError> {
        self.operands
            .pop()
            .ok_or_else(|| ShellError::Internal("operand stack is empty".to_string()))
    }

    fn combine(&mut self, op: Operator) -> Result<(), ShellError> {
        let right = self.pop_operand()?;
        let left = self.pop_operand()?;
        self.operands.push(Command::binary(op, left, right));
        Ok(())
    }

    fn push_operator(&mut self, op: Operator) -> Result<(), ShellError> {
        // 优先级不低于新运算符的先归约（左结合）
        while let Some(Frame::Operator(top)) = self.operators.last().copied() {
            if top.precedence() < op.precedence() {
                break;
            }
            self.operators.pop();
            self.combine(top)?;
        }
        self.operators.push(Frame::Operator(op));
        Ok(())
    }

    fn close_paren(&mut self) -> Result<(), ShellError> {
        loop {
            match self.operators.pop() {
                Some(Frame::Paren) => break,
                Some(Frame::Operator(op)) => self.combine(op)?,
                None => {
                    return Err(ShellError::Internal(
                        "')' without a matching '(' on the operator stack".to_string(),
                    ))
                }
            }
        }
        let inner = self.pop_operand()?;
        self.operands.push(Command::subshell(inner));
        Ok(())
    }

    fn redirect(&mut self, op: RedirectOp, file: String) -> Result<(), ShellError> {
        let command = self.pop_operand()?.with_redirect(op, file);
        self.operands.push(command);
        Ok(())
    }

    /// Reduces everything left and returns the single finished tree.
    fn finish(&mut self) -> Result<Command, ShellError> {
        while let Some(frame) = self.operators.pop() {
            match frame {
                Frame::Operator(op) => self.combine(op)?,
                Frame::Paren => {
                    return Err(ShellError::Internal("unclosed '(' at end of tree".to_string()))
                }
            }
        }
        let tree = self.pop_operand()?;
        if !self.operands.is_empty() {
            return Err(ShellError::Internal(format!(
                "{} operands left without an operator",
                self.operands.len()
            )));
        }
        Ok(tree)
    }
}

// 第三步：双栈算符优先归约，得到命令树森林
fn reduce(entries: Vec<Entry>) -> Result<Vec<Command>, ShellError> {
    let mut forest = Vec::new();
    let mut stacks = Reducer::default();

    for entry in entries {
        match entry {
            Entry::Simple(words) => stacks.operands.push(Command::simple(words)),
            Entry::LeftParen => stacks.operators.push(Frame::Paren),
            Entry::RightParen => stacks.close_paren()?,
            Entry::Operator(op) => stacks.push_operator(op)?,
            Entry::Redirect(op, file) => stacks.redirect(op, file)?,
            Entry::NewTree => forest.push(stacks.finish()?),
            Entry::Newline => {
                return Err(ShellError::Internal(
                    "unresolved newline in command stream".to_string(),
                ))
            }
        }
    }
    if !stacks.operands.is_empty() || !stacks.operators.is_empty() {
        forest.push(stacks.finish()?);
    }
    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::ast::CommandKind;
    use crate::shell::source::SliceSource;

    fn parse_str(input: &str) -> Result<Vec<Command>, ShellError> {
        parse(SliceSource::new(input))
    }

    #[allow(clippy::unwrap_used)]
    fn parse_one(input: &str) -> Command {
        let mut forest = parse_str(input).unwrap();
        assert_eq!(forest.len(), 1, "expected a single tree for {:?}", input);
        forest.remove(0)
    }

    fn simple(words: &[&str]) -> Command {
        Command::simple(words.iter().copied())
    }

    fn bin(op: Operator, left: Command, right: Command) -> Command {
        Command::binary(op, left, right)
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(parse_one("ls -l"), simple(&["ls", "-l"]));
    }

    #[test]
    fn test_pipe_binds_tighter_than_and() {
        assert_eq!(
            parse_one("a | b && c"),
            bin(
                Operator::And,
                bin(Operator::Pipe, simple(&["a"]), simple(&["b"])),
                simple(&["c"])
            )
        );
        assert_eq!(
            parse_one("a && b | c"),
            bin(
                Operator::And,
                simple(&["a"]),
                bin(Operator::Pipe, simple(&["b"]), simple(&["c"]))
            )
        );
    }

    #[test]
    fn test_equal_precedence_is_left_associative() {
        assert_eq!(
            parse_one("a && b || c"),
            bin(
                Operator::Or,
                bin(Operator::And, simple(&["a"]), simple(&["b"])),
                simple(&["c"])
            )
        );
        assert_eq!(
            parse_one("a | b | c"),
            bin(
                Operator::Pipe,
                bin(Operator::Pipe, simple(&["a"]), simple(&["b"])),
                simple(&["c"])
            )
        );
    }

    #[test]
    fn test_sequence_is_loosest() {
        assert_eq!(
            parse_one("a || b ; c | d"),
            bin(
                Operator::Sequence,
                bin(Operator::Or, simple(&["a"]), simple(&["b"])),
                bin(Operator::Pipe, simple(&["c"]), simple(&["d"]))
            )
        );
    }

    #[test]
    fn test_subshell_scoping() {
        assert_eq!(
            parse_one("(a ; b) | c"),
            bin(
                Operator::Pipe,
                Command::subshell(bin(Operator::Sequence, simple(&["a"]), simple(&["b"]))),
                simple(&["c"])
            )
        );
        assert_eq!(
            parse_one("a && ((b || c) | d)"),
            bin(
                Operator::And,
                simple(&["a"]),
                Command::subshell(bin(
                    Operator::Pipe,
                    Command::subshell(bin(Operator::Or, simple(&["b"]), simple(&["c"]))),
                    simple(&["d"])
                ))
            )
        );
    }

    #[test]
    fn test_redirection_binds_to_last_command() {
        assert_eq!(
            parse_one("a < in > out | b"),
            bin(
                Operator::Pipe,
                simple(&["a"])
                    .with_redirect(RedirectOp::Input, "in")
                    .with_redirect(RedirectOp::Output, "out"),
                simple(&["b"])
            )
        );
        assert_eq!(
            parse_one("a | b > out"),
            bin(
                Operator::Pipe,
                simple(&["a"]),
                simple(&["b"]).with_redirect(RedirectOp::Output, "out")
            )
        );
        let tree = parse_one("(a && b) > out");
        assert_eq!(tree.output.as_deref(), Some("out"));
        assert!(matches!(tree.kind, CommandKind::Subshell(_)));
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_newlines_split_and_join() {
        // 单个换行等价于顺序运算符
        assert_eq!(
            parse_one("a\nb"),
            bin(Operator::Sequence, simple(&["a"]), simple(&["b"]))
        );
        // 运算符之后的换行被忽略
        assert_eq!(
            parse_one("a &&\nb"),
            bin(Operator::And, simple(&["a"]), simple(&["b"]))
        );
        // 空行分隔出独立的命令树
        let forest = parse_str("a\n\nb | c\n\n\n(d)\n").unwrap();
        assert_eq!(
            forest,
            vec![
                simple(&["a"]),
                bin(Operator::Pipe, simple(&["b"]), simple(&["c"])),
                Command::subshell(simple(&["d"])),
            ]
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_semicolon_then_blank_starts_new_tree() {
        let forest = parse_str("a ;\nb").unwrap();
        assert_eq!(forest, vec![simple(&["a"]), simple(&["b"])]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_multiline_subshell() {
        assert_eq!(
            parse_one("(\n  a\n  b\n) > out"),
            Command::subshell(bin(Operator::Sequence, simple(&["a"]), simple(&["b"])))
                .with_redirect(RedirectOp::Output, "out")
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_render_round_trip() {
        let scripts = [
            "a | b && c",
            "(a ; b) | c",
            "a < in > out | b",
            "a || b ; c | d && e",
            "(a && (b || c)) > out ; d < in",
            "exec cat f\nsort -u",
        ];
        for script in scripts {
            let forest = parse_str(script).unwrap();
            for tree in forest {
                let rendered = tree.to_string();
                let reparsed = parse_one(&rendered);
                assert_eq!(reparsed, tree, "round trip of {:?} via {:?}", script, rendered);
            }
        }
    }

    #[test]
    fn test_syntax_errors_surface() {
        assert!(matches!(parse_str(";;"), Err(ShellError::Syntax { .. })));
        assert!(matches!(parse_str("("), Err(ShellError::Unbalanced { .. })));
        assert!(matches!(parse_str("| a"), Err(ShellError::Syntax { .. })));
    }

    #[test]
    fn test_stack_underflow_is_internal_error() {
        let tokens = vec![
            Token::new(TokenKind::Word("a".to_string()), 1),
            Token::new(TokenKind::Pipe, 1),
        ];
        let entries = resolve_newlines(flatten(tokens));
        assert!(matches!(reduce(entries), Err(ShellError::Internal(_))));
    }
}
