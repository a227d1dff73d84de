pub mod ast;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use ast::{Command, CommandKind, Operator, RedirectOp};
pub use parser::{parse, Parser};
