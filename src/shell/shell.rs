use log::debug;
use std::io::Write;

use crate::shell::error::ShellError;
use crate::shell::executor::{execute_command, DependencyGraph};
use crate::shell::parser::Parser;
use crate::shell::scheduler::Scheduler;
use crate::shell::source::ByteSource;
use crate::utils::config::Config;

/// What to do with a parsed script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print every tree, run nothing.
    Print,
    /// Print the dependency graph, run nothing.
    Graph,
    /// Run the trees one after another in program order.
    Sequential,
    /// Run the trees with the dependency-aware scheduler.
    Parallel,
}

pub struct Shell<'a> {
    config: &'a Config,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Mode used when the command line does not ask for one.
    pub fn default_mode(&self) -> Mode {
        if self.config.parallel {
            Mode::Parallel
        } else {
            Mode::Sequential
        }
    }

    /// Parses the whole script, then prints or runs it. Returns the exit
    /// status of every top-level tree, or nothing for the printing modes.
    ///
    /// A parse error stops the run before any command starts.
    pub fn run<S, W>(&self, source: S, mode: Mode, out: &mut W) -> Result<Vec<i32>, ShellError>
    where
        S: ByteSource,
        W: Write,
    {
        debug!("初始化 {} ({:?})...", self.config.name, mode);
        let mut forest = Parser::new(source).parse()?;

        match mode {
            Mode::Print => {
                for (i, tree) in forest.iter().enumerate() {
                    writeln!(out, "# {}", i + 1)?;
                    writeln!(out, "  {}", tree)?;
                }
                out.flush()?;
                Ok(Vec::new())
            }
            Mode::Graph => {
                write!(out, "{}", DependencyGraph::build(&forest))?;
                out.flush()?;
                Ok(Vec::new())
            }
            Mode::Sequential => {
                let mut statuses = Vec::with_capacity(forest.len());
                for tree in forest.iter_mut() {
                    debug!("执行: {}", tree);
                    statuses.push(execute_command(tree)?);
                }
                Ok(statuses)
            }
            Mode::Parallel => {
                let graph = DependencyGraph::build(&forest);
                Scheduler::new(&graph).run(&mut forest)
            }
        }
    }
}
