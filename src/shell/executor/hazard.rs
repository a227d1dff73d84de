use std::collections::BTreeSet;
use std::fmt;

use crate::shell::parser::ast::{Command, CommandKind};

/// Why one tree has to wait for an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterRead,
    WriteAfterWrite,
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hazard::ReadAfterWrite => "read-after-write",
            Hazard::WriteAfterRead => "write-after-read",
            Hazard::WriteAfterWrite => "write-after-write",
        };
        write!(f, "{}", name)
    }
}

/// Names a command tree may read and write.
///
/// Every argument word counts as a read, so two commands that mention the
/// same word are treated as touching the same file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HazardSet {
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
}

impl HazardSet {
    pub fn of(command: &Command) -> Self {
        let mut set = HazardSet::default();
        set.collect(command);
        set
    }

    fn collect(&mut self, command: &Command) {
        match &command.kind {
            CommandKind::Simple(words) => {
                self.add_redirections(command);
                self.reads.extend(words.iter().cloned());
            }
            CommandKind::Subshell(inner) => {
                self.add_redirections(command);
                self.collect(inner);
            }
            CommandKind::Pipe(left, right)
            | CommandKind::Sequence(left, right)
            | CommandKind::And(left, right)
            | CommandKind::Or(left, right) => {
                self.collect(left);
                self.collect(right);
            }
        }
    }

    fn add_redirections(&mut self, command: &Command) {
        if let Some(input) = &command.input {
            self.reads.insert(input.clone());
        }
        if let Some(output) = &command.output {
            self.writes.insert(output.clone());
        }
    }

    /// First hazard found between `self` (the later tree) and `earlier`.
    /// Two reads of the same name never conflict.
    pub fn hazard_with(&self, earlier: &HazardSet) -> Option<Hazard> {
        if !self.reads.is_disjoint(&earlier.writes) {
            Some(Hazard::ReadAfterWrite)
        } else if !self.writes.is_disjoint(&earlier.reads) {
            Some(Hazard::WriteAfterRead)
        } else if !self.writes.is_disjoint(&earlier.writes) {
            Some(Hazard::WriteAfterWrite)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::parse;
    use crate::shell::source::SliceSource;

    #[allow(clippy::unwrap_used)]
    fn hazards(script: &str) -> Vec<HazardSet> {
        parse(SliceSource::new(script))
            .unwrap()
            .iter()
            .map(HazardSet::of)
            .collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_reads_words_and_input() {
        let sets = hazards("sort -u names < in > out");
        assert_eq!(sets[0].reads, set(&["sort", "-u", "names", "in"]));
        assert_eq!(sets[0].writes, set(&["out"]));
    }

    #[test]
    fn test_composites_union_children() {
        let sets = hazards("(cat a > b ; cat c) < d > e | tee f");
        assert_eq!(sets[0].reads, set(&["cat", "a", "c", "d", "tee", "f"]));
        assert_eq!(sets[0].writes, set(&["b", "e"]));
    }

    #[test]
    fn test_hazard_kinds() {
        let sets = hazards("cat f > out\n\ncat out\n\necho f > g\n\nls > out\n\nls");
        assert_eq!(sets[1].hazard_with(&sets[0]), Some(Hazard::ReadAfterWrite));
        // 两者都只是读 f
        assert_eq!(sets[2].hazard_with(&sets[0]), None);
        assert_eq!(sets[3].hazard_with(&sets[0]), Some(Hazard::WriteAfterWrite));
        assert_eq!(sets[4].hazard_with(&sets[3]), None);
    }

    #[test]
    fn test_write_after_read() {
        let sets = hazards("cat notes\n\necho hi > notes");
        assert_eq!(sets[1].hazard_with(&sets[0]), Some(Hazard::WriteAfterRead));
    }
}
