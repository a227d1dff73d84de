use log::{debug, warn};
use nix::unistd::{fork, ForkResult};

use crate::shell::error::ShellError;
use crate::shell::executor::executor::{_exit, flush_stdout};
use crate::shell::executor::{execute_command, DependencyGraph};
use crate::shell::job_manager::JobManager;
use crate::shell::parser::ast::Command;

/// Wavefront scheduler: every tree whose dependencies have all finished
/// runs in its own child process, and each reaped child may release the
/// next wave.
pub struct Scheduler<'g> {
    graph: &'g DependencyGraph,
    jobs: JobManager,
    /// Dependencies of each node that have not finished yet.
    unmet: Vec<usize>,
}

impl<'g> Scheduler<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            jobs: JobManager::new(graph.nodes().iter().map(|node| node.label.clone())),
            unmet: graph
                .nodes()
                .iter()
                .map(|node| node.dependencies.len())
                .collect(),
        }
    }

    /// Runs the whole forest and returns the exit status of every tree in
    /// program order. Each root's status is also recorded on the tree.
    pub fn run(mut self, forest: &mut [Command]) -> Result<Vec<i32>, ShellError> {
        if forest.len() != self.graph.len() {
            return Err(ShellError::Internal(format!(
                "graph has {} nodes but forest has {} trees",
                self.graph.len(),
                forest.len()
            )));
        }

        let graph = self.graph;
        let mut statuses = vec![0; forest.len()];

        for index in graph.roots() {
            self.spawn_or_drain(index, forest)?;
        }

        while let Some((index, code)) = self.jobs.wait_any()? {
            if let Some(tree) = forest.get_mut(index) {
                tree.status = Some(code);
            }
            statuses[index] = code;
            for next in self.release(index) {
                self.spawn_or_drain(next, forest)?;
            }
        }

        if !self.jobs.all_finished() {
            return Err(ShellError::Internal(
                "scheduler stopped with unfinished trees".to_string(),
            ));
        }
        debug!("全部 {} 棵命令树执行完毕", statuses.len());
        Ok(statuses)
    }

    /// Counts `index` as finished and returns the dependents that have no
    /// unmet dependencies left.
    fn release(&mut self, index: usize) -> Vec<usize> {
        let Some(node) = self.graph.node(index) else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        for &dependent in &node.dependents {
            if let Some(count) = self.unmet.get_mut(dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(dependent);
                }
            }
        }
        ready
    }

    fn spawn_or_drain(&mut self, index: usize, forest: &mut [Command]) -> Result<(), ShellError> {
        if let Err(e) = self.spawn(index, forest) {
            // 已启动的子进程仍需回收
            while let Ok(Some(_)) = self.jobs.wait_any() {}
            return Err(e);
        }
        Ok(())
    }

    fn spawn(&mut self, index: usize, forest: &mut [Command]) -> Result<(), ShellError> {
        let tree = forest
            .get_mut(index)
            .ok_or_else(|| ShellError::Internal(format!("no tree at index {}", index)))?;

        flush_stdout();
        // SAFETY: the child evaluates one tree and exits without returning.
        match unsafe { fork() }? {
            ForkResult::Child => match execute_command(tree) {
                Ok(code) => _exit(code),
                Err(e) => {
                    eprintln!("wavesh: {}", e);
                    _exit(1)
                }
            },
            ForkResult::Parent { child } => {
                self.jobs.mark_running(index, child);
                Ok(())
            }
        }
    }
}

impl Drop for Scheduler<'_> {
    fn drop(&mut self) {
        if self.jobs.has_running() {
            warn!("调度器退出时仍有子进程在运行");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::job_manager::JobStatus;
    use crate::shell::parser::parse;
    use crate::shell::source::SliceSource;

    #[allow(clippy::unwrap_used)]
    fn graph(script: &str) -> DependencyGraph {
        DependencyGraph::build(&parse(SliceSource::new(script)).unwrap())
    }

    #[test]
    fn test_release_waits_for_every_dependency() {
        // 1 和 2 都依赖 0，3 同时依赖 1 和 2
        let g = graph("echo x > a\n\ncat a > b\n\ncat a > c\n\ncat b c");
        assert!(g.depends_on(3, 1) && g.depends_on(3, 2));
        assert!(!g.depends_on(3, 0));

        let mut scheduler = Scheduler::new(&g);
        assert_eq!(scheduler.unmet, vec![0, 1, 1, 2]);
        assert_eq!(scheduler.release(0), vec![1, 2]);
        assert_eq!(scheduler.release(1), Vec::<usize>::new());
        assert_eq!(scheduler.release(2), vec![3]);
        assert_eq!(scheduler.release(3), Vec::<usize>::new());
    }

    #[test]
    fn test_jobs_start_pending() {
        let g = graph("cat f > out\n\ncat out");
        let scheduler = Scheduler::new(&g);
        let jobs = &scheduler.jobs.jobs;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].command, "cat out");
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[test]
    fn test_forest_size_mismatch_is_rejected() {
        let g = graph("true\n\nfalse");
        let result = Scheduler::new(&g).run(&mut []);
        assert!(matches!(result, Err(ShellError::Internal(_))));
    }
}
