// Executor Engine
//
// Runs a batch of tasks on scoped worker threads and returns their outputs
// in submission order. Every thread is joined before `run` returns.

use crossbeam::channel;

use crate::common::{ShardingError, ShardingResult};

#[derive(Debug, Clone, Copy)]
pub struct ExecutorEngine {
    /// 0 spawns one thread per task
    worker_pool_size: usize,
}

impl ExecutorEngine {
    pub fn new(worker_pool_size: usize) -> Self {
        Self { worker_pool_size }
    }

    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size
    }

    fn workers_for(&self, tasks: usize) -> usize {
        if self.worker_pool_size == 0 { tasks } else { self.worker_pool_size.min(tasks) }
    }

    /// Apply `work` to every input in parallel; outputs keep input order.
    pub fn run<I, O, F>(&self, inputs: Vec<I>, work: F) -> ShardingResult<Vec<O>>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync,
    {
        let total = inputs.len();
        if total <= 1 {
            return Ok(inputs.into_iter().map(work).collect());
        }

        let (task_sender, task_receiver) = channel::unbounded::<(usize, I)>();
        let (result_sender, result_receiver) = channel::unbounded::<(usize, O)>();
        for task in inputs.into_iter().enumerate() {
            // Receiver is alive until the scope below ends
            let _ = task_sender.send(task);
        }
        drop(task_sender);

        let work = &work;
        let joined = crossbeam::scope(|scope| {
            for _ in 0..self.workers_for(total) {
                let tasks = task_receiver.clone();
                let results = result_sender.clone();
                scope.spawn(move |_| {
                    for (index, input) in tasks.iter() {
                        if results.send((index, work(input))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_sender);
        if joined.is_err() {
            return Err(ShardingError::Backend("execution worker panicked".to_string()));
        }

        let mut outputs: Vec<Option<O>> = (0..total).map(|_| None).collect();
        for (index, output) in result_receiver.try_iter() {
            outputs[index] = Some(output);
        }
        outputs
            .into_iter()
            .map(|o| o.ok_or_else(|| ShardingError::Backend("execution task produced no result".to_string())))
            .collect()
    }
}

impl Default for ExecutorEngine {
    fn default() -> Self {
        Self::new(0)
    }
}
