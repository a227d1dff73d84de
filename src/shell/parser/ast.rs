use std::fmt;

/// Binary operators, from tightest to loosest binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,
    And,
    Or,
    Sequence,
}

impl Operator {
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Pipe => 3,
            Operator::And | Operator::Or => 2,
            Operator::Sequence => 1,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Sequence => ";",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Simple(Vec<String>),
    Pipe(Box<Command>, Box<Command>),
    Sequence(Box<Command>, Box<Command>),
    And(Box<Command>, Box<Command>),
    Or(Box<Command>, Box<Command>),
    Subshell(Box<Command>),
}

/// One node of a command tree.
///
/// The tree is fixed once the parser has built it; only `status` is written,
/// once per execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub input: Option<String>,
    pub output: Option<String>,
    pub status: Option<i32>,
}

impl Command {
    fn with_kind(kind: CommandKind) -> Self {
        Self {
            kind,
            input: None,
            output: None,
            status: None,
        }
    }

    pub fn simple<I, W>(words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        Self::with_kind(CommandKind::Simple(
            words.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn binary(op: Operator, left: Command, right: Command) -> Self {
        let (left, right) = (Box::new(left), Box::new(right));
        Self::with_kind(match op {
            Operator::Pipe => CommandKind::Pipe(left, right),
            Operator::And => CommandKind::And(left, right),
            Operator::Or => CommandKind::Or(left, right),
            Operator::Sequence => CommandKind::Sequence(left, right),
        })
    }

    pub fn subshell(inner: Command) -> Self {
        Self::with_kind(CommandKind::Subshell(Box::new(inner)))
    }

    pub fn redirect(&mut self, op: RedirectOp, file: impl Into<String>) {
        match op {
            RedirectOp::Input => self.input = Some(file.into()),
            RedirectOp::Output => self.output = Some(file.into()),
        }
    }

    pub fn with_redirect(mut self, op: RedirectOp, file: impl Into<String>) -> Self {
        self.redirect(op, file);
        self
    }

    /// The operator and both children of a binary node.
    pub fn operands(&self) -> Option<(Operator, &Command, &Command)> {
        match &self.kind {
            CommandKind::Pipe(l, r) => Some((Operator::Pipe, l, r)),
            CommandKind::And(l, r) => Some((Operator::And, l, r)),
            CommandKind::Or(l, r) => Some((Operator::Or, l, r)),
            CommandKind::Sequence(l, r) => Some((Operator::Sequence, l, r)),
            CommandKind::Simple(_) | CommandKind::Subshell(_) => None,
        }
    }
}

/// Renders the tree back to script text that parses to the same shape.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Simple(words) => write!(f, "{}", words.join(" "))?,
            CommandKind::Subshell(inner) => write!(f, "( {} )", inner)?,
            _ => {
                if let Some((op, left, right)) = self.operands() {
                    write!(f, "{} {} {}", left, op.symbol(), right)?;
                }
            }
        }
        if let Some(input) = &self.input {
            write!(f, " < {}", input)?;
        }
        if let Some(output) = &self.output {
            write!(f, " > {}", output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(Operator::Pipe.precedence() > Operator::And.precedence());
        assert_eq!(Operator::And.precedence(), Operator::Or.precedence());
        assert!(Operator::Or.precedence() > Operator::Sequence.precedence());
    }

    #[test]
    fn test_render() {
        let tree = Command::binary(
            Operator::And,
            Command::binary(
                Operator::Pipe,
                Command::simple(["cat"]).with_redirect(RedirectOp::Input, "in"),
                Command::simple(["sort", "-r"]),
            ),
            Command::subshell(Command::binary(
                Operator::Sequence,
                Command::simple(["a"]),
                Command::simple(["b"]),
            ))
            .with_redirect(RedirectOp::Output, "out"),
        );
        assert_eq!(tree.to_string(), "cat < in | sort -r && ( a ; b ) > out");
    }
}
