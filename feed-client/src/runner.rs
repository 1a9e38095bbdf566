//! Пул с ограничением параллелизма для пачек запросов.
//!
//! Задачи раздаются воркерам через очередь crossbeam, результаты и прогресс
//! возвращаются в вызывающий поток. Порядок результатов = порядок завершения,
//! поэтому каждый результат помечен индексом исходной задачи.

use std::thread;

use crossbeam_channel::unbounded;
use log::debug;

/// Результат задачи + её индекс во входном списке
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<T> {
    pub index: usize,
    pub value: T,
}

/// Колбэк прогресса `(завершено, всего)`
pub type Progress<'a> = &'a dyn Fn(usize, usize);

#[derive(Debug, Clone, Copy)]
pub struct BoundedConcurrencyRunner {
    concurrency: usize,
}

impl BoundedConcurrencyRunner {
    /// `concurrency == 0` трактуется как 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Выполнить задачи, держа в работе не больше `concurrency` одновременно.
    ///
    /// `on_progress` вызывается ровно один раз на каждую завершённую задачу,
    /// всегда из вызывающего потока, `completed` строго растёт.
    pub fn run<T, F>(&self, tasks: Vec<F>, on_progress: Option<Progress<'_>>) -> Vec<TaskResult<T>>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.concurrency.min(total);
        debug!("running {total} task(s) on {workers} worker(s)");

        let (job_tx, job_rx) = unbounded::<(usize, F)>();
        for job in tasks.into_iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        let (res_tx, res_rx) = unbounded::<TaskResult<T>>();

        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                s.spawn(move || {
                    for (index, task) in job_rx.iter() {
                        let value = task();
                        if res_tx.send(TaskResult { index, value }).is_err() {
                            break;
                        }
                    }
                });
            }
            // иначе res_rx.iter() никогда не закончится
            drop(res_tx);

            let mut out = Vec::with_capacity(total);
            for r in res_rx.iter() {
                out.push(r);
                if let Some(cb) = on_progress {
                    cb(out.len(), total);
                }
            }
            out
        })
    }
}

/// Вернуть значения в порядке исходных задач
pub fn into_input_order<T>(mut results: Vec<TaskResult<T>>) -> Vec<T> {
    results.sort_by_key(|r| r.index);
    results.into_iter().map(|r| r.value).collect()
}
