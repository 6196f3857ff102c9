//! One-task-per-tick cooperative scheduler, grounded on the original
//! implementation's `background/task.py`.

use std::collections::VecDeque;

pub struct Task {
    code: Option<Box<dyn FnOnce() + Send>>,
}

impl Task {
    pub fn new(code: impl FnOnce() + Send + 'static) -> Self {
        Self { code: Some(Box::new(code)) }
    }

    pub fn run(mut self) {
        if let Some(code) = self.code.take() {
            code();
        }
    }
}

#[derive(Default)]
pub struct TaskRunner {
    tasks: VecDeque<Task>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self { tasks: VecDeque::new() }
    }

    pub fn schedule(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Runs at most one queued task, mirroring `TaskRunner.run` in the
    /// original implementation: fairness across ticks, not throughput.
    pub fn run_one(&mut self) {
        if let Some(task) = self.tasks.pop_front() {
            task.run();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_one_task_per_tick() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut runner = TaskRunner::new();
        for _ in 0..3 {
            let counter = counter.clone();
            runner.schedule(Task::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        runner.run_one();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        runner.run_one();
        runner.run_one();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(runner.is_empty());
    }
}
